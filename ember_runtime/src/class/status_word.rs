//! The class status / subtype-check composite word.
//!
//! A class's lifecycle status and its subtype-check bits are written by two
//! different subsystems (class initialization and linking) but read together
//! on every type check. They share one [`AtomicPair`] so a reader always sees
//! a status and bits that were current at the same moment, and each writer
//! preserves the half it does not own.

use std::fmt;

use ember_core::AtomicPair;
use ember_core::bit_utils::{bit_field_extract, bit_field_insert};

use super::status::ClassStatus;
use crate::subtype::{SUBTYPE_CHECK_BITS_WIDTH, SubtypeCheckBits};

const STATUS_SHIFT: u32 = SUBTYPE_CHECK_BITS_WIDTH;
const STATUS_WIDTH: u32 = 64 - SUBTYPE_CHECK_BITS_WIDTH;

/// Snapshot of a class's status and subtype-check bits, packed in a `u64`:
/// bits `[0, 56)` hold the subtype-check bits, bits `[56, 64)` the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InstanceOfAndStatus(u64);

impl InstanceOfAndStatus {
    /// Pack `bits` and `status`.
    #[inline]
    pub fn new(bits: SubtypeCheckBits, status: ClassStatus) -> Self {
        let packed = bit_field_insert(0, bits.raw(), 0, SUBTYPE_CHECK_BITS_WIDTH);
        Self(bit_field_insert(packed, u64::from(status.raw()), STATUS_SHIFT, STATUS_WIDTH))
    }

    /// Reinterpret a packed word.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Packed representation.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Subtype-check half.
    #[inline]
    pub fn subtype_bits(self) -> SubtypeCheckBits {
        SubtypeCheckBits::from_raw(bit_field_extract(self.0, 0, SUBTYPE_CHECK_BITS_WIDTH))
    }

    /// Status half. Unknown status bytes decode as `NotReady`.
    #[inline]
    pub fn status(self) -> ClassStatus {
        let raw = bit_field_extract(self.0, STATUS_SHIFT, STATUS_WIDTH) as u8;
        ClassStatus::from_raw(raw).unwrap_or_default()
    }

    /// Copy with a different status.
    #[inline]
    pub fn with_status(self, status: ClassStatus) -> Self {
        Self::new(self.subtype_bits(), status)
    }

    /// Copy with different subtype-check bits.
    #[inline]
    pub fn with_subtype_bits(self, bits: SubtypeCheckBits) -> Self {
        Self::new(bits, self.status())
    }
}

/// Shared word holding a class's status and subtype-check bits.
///
/// Stored as `(status, subtype bits)` in an [`AtomicPair`]; writers update
/// their half under the pair's lock bit.
pub struct ClassStatusWord {
    pair: AtomicPair,
}

impl ClassStatusWord {
    /// `NotReady` with uninitialized subtype-check bits.
    pub const fn new() -> Self {
        Self {
            pair: AtomicPair::new(ClassStatus::NotReady as u64, 0),
        }
    }

    /// Consistent snapshot of both halves.
    #[inline]
    pub fn load(&self) -> InstanceOfAndStatus {
        let (status, bits) = self.pair.load();
        let status = ClassStatus::from_raw(status as u8).unwrap_or_default();
        InstanceOfAndStatus::new(SubtypeCheckBits::from_raw(bits), status)
    }

    /// Current status.
    #[inline]
    pub fn status(&self) -> ClassStatus {
        self.load().status()
    }

    /// Current subtype-check bits.
    #[inline]
    pub fn subtype_bits(&self) -> SubtypeCheckBits {
        self.load().subtype_bits()
    }

    /// Publish a new status, keeping the subtype-check bits.
    pub fn write_status(&self, status: ClassStatus) {
        self.pair.update(|old_status, bits| {
            let old = ClassStatus::from_raw(old_status as u8).unwrap_or_default();
            debug_assert!(
                old.can_transition_to(status),
                "class status went backwards: {old} -> {status}"
            );
            (u64::from(status.raw()), bits)
        });
    }

    /// Move the status forward to `status` unless it is already there or
    /// beyond. Returns whether the status changed, or the current status if
    /// it is terminal and cannot advance.
    pub fn advance_status(&self, status: ClassStatus) -> Result<bool, ClassStatus> {
        let mut outcome = Ok(false);
        self.pair.update(|old_status, bits| {
            let old = ClassStatus::from_raw(old_status as u8).unwrap_or_default();
            if old.is_terminal() {
                outcome = Err(old);
                (old_status, bits)
            } else if old < status {
                outcome = Ok(true);
                (u64::from(status.raw()), bits)
            } else {
                (old_status, bits)
            }
        });
        outcome
    }

    /// Move to the error status matching how far linking got. A class that is
    /// already terminal keeps its status. Returns the resulting status.
    pub fn mark_erroneous(&self) -> ClassStatus {
        let mut result = ClassStatus::ErrorUnresolved;
        self.pair.update(|old_status, bits| {
            let old = ClassStatus::from_raw(old_status as u8).unwrap_or_default();
            result = if old.is_terminal() {
                old
            } else if old.is_resolved() {
                ClassStatus::ErrorResolved
            } else {
                ClassStatus::ErrorUnresolved
            };
            (u64::from(result.raw()), bits)
        });
        result
    }

    /// Publish new subtype-check bits, keeping the status.
    pub fn write_subtype_bits(&self, bits: SubtypeCheckBits) {
        self.pair.update(|status, old_bits| {
            debug_assert!(
                !SubtypeCheckBits::from_raw(old_bits).is_overflowed() || bits.is_overflowed(),
                "subtype-check overflow bit cleared"
            );
            (status, bits.raw())
        });
    }
}

impl Default for ClassStatusWord {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClassStatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.load();
        f.debug_struct("ClassStatusWord")
            .field("status", &snapshot.status())
            .field("bits", &snapshot.subtype_bits().bitstring())
            .field("overflowed", &snapshot.subtype_bits().is_overflowed())
            .finish()
    }
}
