//! Class lifecycle status.

use std::fmt;

/// Lifecycle status of a class, ordered from least to most prepared.
///
/// Statuses only move forward, except that any status may move to one of the
/// error statuses or to `Retired`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ClassStatus {
    /// Freshly allocated, nothing loaded.
    #[default]
    NotReady = 0,
    /// Replaced by a newer definition of the same class.
    Retired = 1,
    /// Linking failed after resolution.
    ErrorResolved = 2,
    /// Linking failed before resolution.
    ErrorUnresolved = 3,
    /// Loaded, but the superclass is still an unresolved index.
    Idx = 4,
    /// Loaded with a resolved superclass reference.
    Loaded = 5,
    /// Resolution in progress.
    Resolving = 6,
    /// Superclass and interfaces resolved.
    Resolved = 7,
    /// Verification in progress.
    Verifying = 8,
    /// Verification must be repeated at runtime.
    RetryVerificationAtRuntime = 9,
    /// Verified, access checks still needed at runtime.
    VerifiedNeedsAccessChecks = 10,
    /// Verified.
    Verified = 11,
    /// Superclass validated against this class.
    SuperclassValidated = 12,
    /// Static initializer running.
    Initializing = 13,
    /// Static initializer finished on the initializing thread.
    Initialized = 14,
    /// Initialization visible to every thread.
    VisiblyInitialized = 15,
}

impl ClassStatus {
    /// Every status in order.
    pub const ALL: [ClassStatus; 16] = [
        ClassStatus::NotReady,
        ClassStatus::Retired,
        ClassStatus::ErrorResolved,
        ClassStatus::ErrorUnresolved,
        ClassStatus::Idx,
        ClassStatus::Loaded,
        ClassStatus::Resolving,
        ClassStatus::Resolved,
        ClassStatus::Verifying,
        ClassStatus::RetryVerificationAtRuntime,
        ClassStatus::VerifiedNeedsAccessChecks,
        ClassStatus::Verified,
        ClassStatus::SuperclassValidated,
        ClassStatus::Initializing,
        ClassStatus::Initialized,
        ClassStatus::VisiblyInitialized,
    ];

    /// Decode a stored status byte.
    #[inline]
    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    /// Encoded status byte.
    #[inline]
    pub fn raw(self) -> u8 {
        self as u8
    }

    /// Linking failed.
    #[inline]
    pub fn is_erroneous(self) -> bool {
        matches!(self, ClassStatus::ErrorResolved | ClassStatus::ErrorUnresolved)
    }

    /// Superclass resolved (and not erroneous).
    #[inline]
    pub fn is_resolved(self) -> bool {
        self >= ClassStatus::Resolved
    }

    /// Static initialization finished.
    #[inline]
    pub fn is_initialized(self) -> bool {
        self >= ClassStatus::Initialized
    }

    /// Error statuses and `Retired` are never left for a normal status.
    #[inline]
    pub fn is_terminal(self) -> bool {
        self.is_erroneous() || self == ClassStatus::Retired
    }

    /// Whether a class may move from `self` to `next`.
    #[inline]
    pub fn can_transition_to(self, next: ClassStatus) -> bool {
        if self.is_terminal() {
            return next == self || next == ClassStatus::Retired;
        }
        next >= self || next.is_erroneous() || next == ClassStatus::Retired
    }
}

impl fmt::Display for ClassStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_values() {
        assert_eq!(ClassStatus::NotReady.raw(), 0);
        assert_eq!(ClassStatus::Loaded.raw(), 5);
        assert_eq!(ClassStatus::VisiblyInitialized.raw(), 15);
        for status in ClassStatus::ALL {
            assert_eq!(ClassStatus::from_raw(status.raw()), Some(status));
        }
        assert_eq!(ClassStatus::from_raw(16), None);
    }

    #[test]
    fn test_transitions() {
        assert!(ClassStatus::Loaded.can_transition_to(ClassStatus::Resolved));
        assert!(!ClassStatus::Resolved.can_transition_to(ClassStatus::Loaded));
        assert!(ClassStatus::Initialized.can_transition_to(ClassStatus::ErrorResolved));
        assert!(ClassStatus::Verified.can_transition_to(ClassStatus::Retired));
    }

    #[test]
    fn test_terminal_statuses_stay_put() {
        assert!(ClassStatus::ErrorResolved.is_terminal());
        assert!(ClassStatus::Retired.is_terminal());
        assert!(!ClassStatus::NotReady.is_terminal());
        assert!(!ClassStatus::ErrorResolved.can_transition_to(ClassStatus::Initializing));
        assert!(!ClassStatus::ErrorUnresolved.can_transition_to(ClassStatus::Loaded));
        assert!(!ClassStatus::Retired.can_transition_to(ClassStatus::VisiblyInitialized));
        assert!(ClassStatus::ErrorResolved.can_transition_to(ClassStatus::ErrorResolved));
        assert!(ClassStatus::ErrorResolved.can_transition_to(ClassStatus::Retired));
    }

    #[test]
    fn test_predicates() {
        assert!(ClassStatus::ErrorUnresolved.is_erroneous());
        assert!(!ClassStatus::ErrorUnresolved.is_resolved());
        assert!(ClassStatus::Verified.is_resolved());
        assert!(ClassStatus::VisiblyInitialized.is_initialized());
        assert!(!ClassStatus::Initializing.is_initialized());
    }
}
