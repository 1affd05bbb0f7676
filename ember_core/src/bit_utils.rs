//! Bit-field helpers for packed metadata words.
//!
//! All helpers operate on `u64`. Widths above 64 bits or fields that run past
//! bit 63 are contract violations checked with `debug_assert!`.

/// Mask with the `bits` least significant bits set.
///
/// `mask_least_significant(0) == 0`, `mask_least_significant(64) == u64::MAX`.
#[inline]
pub const fn mask_least_significant(bits: u32) -> u64 {
    debug_assert!(bits <= 64);
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

/// Largest unsigned value representable in `bits` bits.
#[inline]
pub const fn max_int(bits: u32) -> u64 {
    mask_least_significant(bits)
}

/// Extract `width` bits starting at `lsb`.
#[inline]
pub const fn bit_field_extract(value: u64, lsb: u32, width: u32) -> u64 {
    debug_assert!(lsb + width <= 64);
    if width == 0 {
        return 0;
    }
    (value >> lsb) & mask_least_significant(width)
}

/// Replace `width` bits starting at `lsb` with the low bits of `data`.
///
/// `data` must fit in `width` bits.
#[inline]
pub const fn bit_field_insert(value: u64, data: u64, lsb: u32, width: u32) -> u64 {
    debug_assert!(lsb + width <= 64);
    debug_assert!(data <= max_int(width), "data does not fit in bit field");
    if width == 0 {
        return value;
    }
    let mask = mask_least_significant(width) << lsb;
    (value & !mask) | ((data << lsb) & mask)
}

/// Zero `width` bits starting at `lsb`.
#[inline]
pub const fn bit_field_clear(value: u64, lsb: u32, width: u32) -> u64 {
    debug_assert!(lsb + width <= 64);
    if width == 0 {
        return value;
    }
    value & !(mask_least_significant(width) << lsb)
}

/// `true` when `value` is a non-zero power of two.
#[inline]
pub const fn is_power_of_two(value: usize) -> bool {
    value != 0 && value & (value - 1) == 0
}

/// Round `value` up to the next multiple of `alignment` (a power of two).
#[inline]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(is_power_of_two(alignment));
    (value + alignment - 1) & !(alignment - 1)
}
