//! Fixed-width character strings packed into a `u64`.
//!
//! A [`BitString`] has [`BIT_STRING_CAPACITY`] positions. Position `p` is a
//! [`BitChar`] of [`BIT_STRING_WIDTHS`]`[p]` bits stored at bit offset
//! `cum(p)` (the sum of the widths before it), least significant first:
//!
//! ```text
//! bit 54                                                        bit 0
//! | pos5 (4) | pos4 (6) | pos3 (7) | pos2 (10) | pos1 (12) | pos0 (16) |
//! ```
//!
//! So the first `d` characters of a string are exactly its low `cum(d)` bits,
//! and prefix comparison is a single mask and compare.

use std::fmt;

use ember_core::bit_utils::{bit_field_extract, bit_field_insert, mask_least_significant, max_int};

/// Number of characters in a [`BitString`].
pub const BIT_STRING_CAPACITY: usize = 6;

/// Width in bits of each position. Shallow levels of a class hierarchy are
/// the widest.
pub const BIT_STRING_WIDTHS: [u32; BIT_STRING_CAPACITY] = [16, 12, 10, 7, 6, 4];

/// Total number of bits used by a [`BitString`].
pub const BIT_STRING_BITS: u32 = bit_length_total_at_position(BIT_STRING_CAPACITY);

/// Sum of the widths of positions `[0, position)`.
pub const fn bit_length_total_at_position(position: usize) -> u32 {
    debug_assert!(position <= BIT_STRING_CAPACITY);
    let mut total = 0;
    let mut i = 0;
    while i < position {
        total += BIT_STRING_WIDTHS[i];
        i += 1;
    }
    total
}

/// One character of a [`BitString`]: an unsigned value and its width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BitChar {
    data: u64,
    bit_length: u32,
}

impl BitChar {
    /// Character holding `data` in `bit_length` bits.
    #[inline]
    pub const fn new(data: u64, bit_length: u32) -> Self {
        debug_assert!(data <= max_int(bit_length), "BitChar value does not fit");
        Self { data, bit_length }
    }

    /// Zero character for `position`.
    #[inline]
    pub const fn empty_at(position: usize) -> Self {
        Self::new(0, BIT_STRING_WIDTHS[position])
    }

    /// Stored value.
    #[inline]
    pub const fn data(self) -> u64 {
        self.data
    }

    /// Width in bits.
    #[inline]
    pub const fn bit_length(self) -> u32 {
        self.bit_length
    }

    /// Largest value this character can hold.
    #[inline]
    pub const fn max_value(self) -> u64 {
        max_int(self.bit_length)
    }

    /// `true` for the zero character, which terminates a string.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.data == 0
    }

    /// Character one larger. Must not already be at `max_value`.
    #[inline]
    pub fn incremented(self) -> Self {
        debug_assert!(self.data < self.max_value(), "BitChar increment overflows");
        Self::new(self.data + 1, self.bit_length)
    }
}

impl fmt::Display for BitChar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data)
    }
}

/// Up to [`BIT_STRING_CAPACITY`] characters packed LSB-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BitString(u64);

impl BitString {
    /// String with every character zero.
    pub const EMPTY: Self = Self(0);

    /// Reinterpret the low [`BIT_STRING_BITS`] of `raw`.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        debug_assert!(raw & !mask_least_significant(BIT_STRING_BITS) == 0);
        Self(raw)
    }

    /// Packed representation.
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Character at `position`.
    #[inline]
    pub fn get(self, position: usize) -> BitChar {
        debug_assert!(position < BIT_STRING_CAPACITY);
        let width = BIT_STRING_WIDTHS[position];
        let lsb = bit_length_total_at_position(position);
        BitChar::new(bit_field_extract(self.0, lsb, width), width)
    }

    /// Replace the character at `position`.
    #[inline]
    pub fn set_at(&mut self, position: usize, value: BitChar) {
        debug_assert!(position < BIT_STRING_CAPACITY);
        let width = BIT_STRING_WIDTHS[position];
        debug_assert_eq!(value.bit_length, width, "BitChar width mismatch at {position}");
        let lsb = bit_length_total_at_position(position);
        self.0 = bit_field_insert(self.0, value.data, lsb, width);
    }

    /// Number of leading non-empty characters.
    pub fn len(self) -> usize {
        (0..BIT_STRING_CAPACITY)
            .find(|&position| self.get(position).is_empty())
            .unwrap_or(BIT_STRING_CAPACITY)
    }

    /// `true` when every character is zero.
    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Keep the first `count` characters and zero the rest. `count` is
    /// clamped to the capacity.
    #[inline]
    pub fn truncate(self, count: usize) -> Self {
        let count = count.min(BIT_STRING_CAPACITY);
        Self(self.0 & mask_least_significant(bit_length_total_at_position(count)))
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitString[")?;
        let len = self.len();
        for position in 0..len {
            if position > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", self.get(position))?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_constants() {
        assert_eq!(BIT_STRING_BITS, 55);
        assert_eq!(bit_length_total_at_position(0), 0);
        assert_eq!(bit_length_total_at_position(1), 16);
        assert_eq!(bit_length_total_at_position(3), 38);
    }

    #[test]
    fn test_set_and_get() {
        let mut bs = BitString::EMPTY;
        bs.set_at(0, BitChar::new(0xFFFF, 16));
        bs.set_at(1, BitChar::new(5, 12));
        bs.set_at(5, BitChar::new(15, 4));
        assert_eq!(bs.get(0).data(), 0xFFFF);
        assert_eq!(bs.get(1).data(), 5);
        assert_eq!(bs.get(2).data(), 0);
        assert_eq!(bs.get(5).data(), 15);
        assert_eq!(bs.raw() & 0xFFFF, 0xFFFF);
        assert_eq!((bs.raw() >> 16) & 0xFFF, 5);
    }

    #[test]
    fn test_len_stops_at_first_empty() {
        let mut bs = BitString::EMPTY;
        assert_eq!(bs.len(), 0);
        bs.set_at(0, BitChar::new(1, 16));
        bs.set_at(1, BitChar::new(2, 12));
        bs.set_at(3, BitChar::new(3, 7));
        assert_eq!(bs.len(), 2);
    }

    #[test]
    fn test_truncate() {
        let mut bs = BitString::EMPTY;
        for position in 0..BIT_STRING_CAPACITY {
            bs.set_at(position, BitChar::new(1, BIT_STRING_WIDTHS[position]));
        }
        assert_eq!(bs.len(), BIT_STRING_CAPACITY);
        assert_eq!(bs.truncate(2).len(), 2);
        assert_eq!(bs.truncate(0), BitString::EMPTY);
        assert_eq!(bs.truncate(99), bs);
    }

    #[test]
    fn test_bitchar_limits() {
        let c = BitChar::new(14, 4);
        assert_eq!(c.max_value(), 15);
        assert_eq!(c.incremented().data(), 15);
        assert!(BitChar::empty_at(2).is_empty());
    }

    #[test]
    fn test_display() {
        let mut bs = BitString::EMPTY;
        assert_eq!(bs.to_string(), "BitString[]");
        bs.set_at(0, BitChar::new(3, 16));
        bs.set_at(1, BitChar::new(1, 12));
        assert_eq!(bs.to_string(), "BitString[3,1]");
    }
}
