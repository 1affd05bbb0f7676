//! Heap configuration parameters.
//!
//! Addresses handed out by the heap are synthetic: spaces are laid out back to
//! back inside a reserved range starting at `heap_base`, and one card table
//! covers the whole reservation.

use ember_core::bit_utils::is_power_of_two;
use thiserror::Error;

/// Configuration for the managed heap.
///
/// # Example
///
/// ```
/// use ember_gc::HeapConfig;
///
/// let config = HeapConfig {
///     card_size: 1024,
///     ..HeapConfig::small()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct HeapConfig {
    // =========================================================================
    // Address Layout
    // =========================================================================
    /// First address of the heap reservation. Must be card aligned and
    /// non-zero (address 0 is the null reference).
    ///
    /// Default: 0x1000_0000
    pub heap_base: usize,

    /// Size of the address range reserved for all spaces.
    ///
    /// Default: 64MB
    pub reserved_size: usize,

    /// Size used by [`Heap::add_default_space`](crate::Heap::add_default_space).
    ///
    /// Default: 4MB
    pub default_space_size: usize,

    // =========================================================================
    // Card Table
    // =========================================================================
    /// Bytes of heap covered by one card byte. Power of two, minimum 64.
    ///
    /// Default: 512 bytes
    pub card_size: usize,

    // =========================================================================
    // Debugging
    // =========================================================================
    /// Check that every tracked card lies inside its space before each
    /// remembered-set scan.
    ///
    /// Default: enabled in debug builds
    pub verify_cards: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            heap_base: 0x1000_0000,
            reserved_size: 64 * 1024 * 1024,
            default_space_size: 4 * 1024 * 1024,
            card_size: 512,
            verify_cards: cfg!(debug_assertions),
        }
    }
}

impl HeapConfig {
    /// Small reservation for tests and embedders with tiny heaps.
    pub fn small() -> Self {
        Self {
            reserved_size: 1024 * 1024,
            default_space_size: 64 * 1024,
            ..Default::default()
        }
    }

    /// Coarse cards for large heaps where card-table memory matters.
    pub fn large_pages() -> Self {
        Self {
            reserved_size: 512 * 1024 * 1024,
            default_space_size: 32 * 1024 * 1024,
            card_size: 4096,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.card_size < 64 || !is_power_of_two(self.card_size) {
            return Err(ConfigError::InvalidCardSize(self.card_size));
        }
        if self.heap_base == 0 || self.heap_base % self.card_size != 0 {
            return Err(ConfigError::MisalignedBase {
                base: self.heap_base,
                card_size: self.card_size,
            });
        }
        if self.reserved_size == 0 || self.default_space_size == 0 {
            return Err(ConfigError::EmptySpace);
        }
        if self.heap_base.checked_add(self.reserved_size).is_none() {
            return Err(ConfigError::ReservationOverflow);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Card size must be a power of two, minimum 64.
    #[error("card size must be a power of two, minimum 64 (got {0})")]
    InvalidCardSize(usize),
    /// Heap base must be non-zero and card aligned.
    #[error("heap base {base:#x} is not aligned to the card size {card_size}")]
    MisalignedBase {
        /// Configured base.
        base: usize,
        /// Configured card size.
        card_size: usize,
    },
    /// Reservation or default space size is zero.
    #[error("heap reservation and space sizes must be non-zero")]
    EmptySpace,
    /// `heap_base + reserved_size` does not fit in the address space.
    #[error("heap reservation wraps the address space")]
    ReservationOverflow,
}
