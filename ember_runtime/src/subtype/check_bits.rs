//! Stored subtype-check bits: a path bitstring plus a sticky overflow flag.

use std::fmt;

use ember_core::bit_utils::mask_least_significant;

use super::bitstring::{BIT_STRING_BITS, BIT_STRING_CAPACITY, BIT_STRING_WIDTHS, BitChar, BitString};

/// Bit holding the overflow flag, just above the bitstring.
const OVERFLOW_BIT: u32 = BIT_STRING_BITS;

/// Width of [`SubtypeCheckBits`] when packed next to a class status.
pub const SUBTYPE_CHECK_BITS_WIDTH: u32 = BIT_STRING_BITS + 1;

/// Lifecycle of a class's path-to-root encoding.
///
/// States only move forward: `Uninitialized -> Initialized -> Assigned`, with
/// `Overflowed` reachable from the first two and final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BitstringState {
    /// No bits written yet.
    Uninitialized,
    /// Holds the parent's path; usable as a source but not as a target.
    Initialized,
    /// Holds a unique path; usable as a fast-check target.
    Assigned,
    /// The hierarchy is too wide or too deep to encode this class.
    Overflowed,
}

impl fmt::Display for BitstringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BitstringState::Uninitialized => "Uninitialized",
            BitstringState::Initialized => "Initialized",
            BitstringState::Assigned => "Assigned",
            BitstringState::Overflowed => "Overflowed",
        })
    }
}

/// Packed subtype-check bits as stored in a class status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SubtypeCheckBits(u64);

impl SubtypeCheckBits {
    /// Bits from a bitstring and overflow flag.
    #[inline]
    pub fn new(bitstring: BitString, overflowed: bool) -> Self {
        Self(bitstring.raw() | (u64::from(overflowed) << OVERFLOW_BIT))
    }

    /// Reinterpret the low [`SUBTYPE_CHECK_BITS_WIDTH`] bits of `raw`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        debug_assert_eq!(raw & !mask_least_significant(SUBTYPE_CHECK_BITS_WIDTH), 0);
        Self(raw)
    }

    /// Packed representation.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// The path bitstring.
    #[inline]
    pub fn bitstring(self) -> BitString {
        BitString::from_raw(self.0 & mask_least_significant(BIT_STRING_BITS))
    }

    /// Replace the path bitstring, keeping the overflow flag.
    #[inline]
    pub fn with_bitstring(self, bitstring: BitString) -> Self {
        Self::new(bitstring, self.is_overflowed())
    }

    /// Whether the overflow flag is set.
    #[inline]
    pub fn is_overflowed(self) -> bool {
        self.0 & (1 << OVERFLOW_BIT) != 0
    }

    /// Set the overflow flag. There is no way to clear it.
    #[inline]
    pub fn mark_overflowed(&mut self) {
        self.0 |= 1 << OVERFLOW_BIT;
    }

    /// Bits for a class at `depth` whose superclass holds `superclass`.
    ///
    /// Copies the superclass path, clears this depth's own character (the
    /// superclass's "next" counter) and seeds this depth's counter to 1 so
    /// the result can never read as uninitialized. Overflow is inherited.
    pub fn initialize_bitstring(superclass: SubtypeCheckBits, depth: usize) -> Self {
        let mut bitstring = superclass.bitstring();
        if depth < BIT_STRING_CAPACITY {
            bitstring.set_at(depth, BitChar::new(1, BIT_STRING_WIDTHS[depth]));
        }
        if depth >= 1 && depth - 1 < BIT_STRING_CAPACITY {
            bitstring.set_at(depth - 1, BitChar::empty_at(depth - 1));
        }
        Self::new(bitstring, superclass.is_overflowed())
    }

    /// State of these bits for a class at `depth`.
    pub fn state(self, depth: usize) -> BitstringState {
        if self.is_overflowed() {
            BitstringState::Overflowed
        } else if self.bitstring().is_empty() {
            BitstringState::Uninitialized
        } else if self.bitstring().truncate(depth).len() == depth {
            BitstringState::Assigned
        } else {
            BitstringState::Initialized
        }
    }

    /// Whether a class at `depth` holding these bits is `Assigned`.
    #[inline]
    pub fn is_assigned(self, depth: usize) -> bool {
        self.state(depth) == BitstringState::Assigned
    }

    /// The path to the root for a class at `depth`: the first `depth`
    /// characters, without the trailing "next" counter.
    #[inline]
    pub fn path_to_root(self, depth: usize) -> BitString {
        self.bitstring().truncate(depth)
    }

    /// Whether a class at `depth` holding these bits descends from the class
    /// at `target_depth` holding `target`.
    ///
    /// A masked compare of the low `cum(target_depth)` bits of both paths.
    /// Only meaningful when [`is_valid_fast_is_sub_class`](Self::is_valid_fast_is_sub_class)
    /// holds.
    #[inline]
    pub fn is_sub_class(self, depth: usize, target: SubtypeCheckBits, target_depth: usize) -> bool {
        let target_path = target.path_to_root(target_depth);
        let mask = path_mask(target_depth);
        self.path_to_root(depth).raw() & mask == target_path.raw()
    }

    /// Whether [`is_sub_class`](Self::is_sub_class) gives a definitive answer:
    /// the target is `Assigned` and the source is at least `Initialized`.
    #[inline]
    pub fn is_valid_fast_is_sub_class(self, depth: usize, target: SubtypeCheckBits, target_depth: usize) -> bool {
        target.state(target_depth) == BitstringState::Assigned
            && self.state(depth) != BitstringState::Uninitialized
    }
}

/// Mask selecting the path characters of a class at `depth`.
#[inline]
pub(crate) fn path_mask(depth: usize) -> u64 {
    let characters = depth.min(BIT_STRING_CAPACITY);
    mask_least_significant(super::bitstring::bit_length_total_at_position(characters))
}
