//! Runtime configuration.

use thiserror::Error;

use crate::subtype::BIT_STRING_CAPACITY;

/// Configuration of the subtype-check engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtypeCheckConfig {
    /// Deepest level at which classes can still hand out path characters to
    /// subclasses. Subclasses of a class at this depth are `Overflowed`.
    ///
    /// Range: 1..=6. Default: 6 (every bitstring position is used)
    pub max_depth: usize,
}

impl Default for SubtypeCheckConfig {
    fn default() -> Self {
        Self {
            max_depth: BIT_STRING_CAPACITY,
        }
    }
}

impl SubtypeCheckConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=BIT_STRING_CAPACITY).contains(&self.max_depth) {
            return Err(ConfigError::InvalidMaxDepth(self.max_depth));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `max_depth` outside 1..=6.
    #[error("subtype check max depth must be in 1..=6 (got {0})")]
    InvalidMaxDepth(usize),
}
