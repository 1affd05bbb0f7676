//! Shared resolution caches.
//!
//! [`NativePairArray`] memoizes `index -> resolved value` across threads.
//! Each slot holds the pair `(index, value)` so a reader can tell which
//! index the value belongs to; a slot whose stored index differs from the
//! requested one is a miss.
//!
//! The index shares its word with the pair's sequence bits and must fit in
//! [`MAX_INDEX`]; the value may use all 64 bits.

use ember_core::{AtomicPair, SEQ_MASK};

/// Largest index a slot can hold.
pub const MAX_INDEX: usize = !SEQ_MASK as usize;

/// Fixed-size, power-of-two array of `(index, value)` pairs.
pub struct NativePairArray<const N: usize> {
    entries: Box<[AtomicPair; N]>,
}

impl<const N: usize> NativePairArray<N> {
    const VALID: () = assert!(N.is_power_of_two(), "pair array size must be a power of two");

    /// Empty array.
    pub fn new() -> Self {
        let () = Self::VALID;
        Self {
            entries: Box::new(std::array::from_fn(|slot| {
                AtomicPair::new(invalid_index_for_slot(slot) as u64, 0)
            })),
        }
    }

    /// Number of slots.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Slot that `index` maps to.
    #[inline]
    pub const fn slot_of(index: usize) -> usize {
        index % N
    }

    /// Whether `index` can be cached at all.
    #[inline]
    pub const fn accepts(index: usize) -> bool {
        index <= MAX_INDEX
    }

    /// Value stored for `index`, if its slot still holds it.
    #[inline]
    pub fn get(&self, index: usize) -> Option<usize> {
        if !Self::accepts(index) {
            return None;
        }
        let (stored, value) = self.entries[Self::slot_of(index)].load();
        (stored == index as u64 && value != 0).then_some(value as usize)
    }

    /// Remember `value` for `index`, replacing the slot's previous pair.
    /// Returns `false`, storing nothing, when `index` exceeds [`MAX_INDEX`].
    #[inline]
    pub fn set(&self, index: usize, value: usize) -> bool {
        debug_assert_ne!(value, 0);
        if !Self::accepts(index) {
            return false;
        }
        self.entries[Self::slot_of(index)].store(index as u64, value as u64);
        true
    }

    /// Forget `index` if its slot currently holds it.
    pub fn clear(&self, index: usize) {
        if !Self::accepts(index) {
            return;
        }
        let slot = Self::slot_of(index);
        self.entries[slot].update(|stored, value| {
            if stored == index as u64 {
                (invalid_index_for_slot(slot) as u64, 0)
            } else {
                (stored, value)
            }
        });
    }
}

impl<const N: usize> Default for NativePairArray<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Index that can never map to `slot`: index 0 maps to slot 0, so slot 0
/// uses 1 and every other slot uses 0.
#[inline]
pub const fn invalid_index_for_slot(slot: usize) -> usize {
    if slot == 0 { 1 } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_array_misses_everything() {
        let array = NativePairArray::<8>::new();
        for index in 0..16 {
            assert_eq!(array.get(index), None);
        }
    }

    #[test]
    fn test_set_get_and_eviction() {
        let array = NativePairArray::<8>::new();
        array.set(3, 0x1000);
        assert_eq!(array.get(3), Some(0x1000));
        assert_eq!(array.get(11), None);

        array.set(11, 0x2000);
        assert_eq!(array.get(3), None);
        assert_eq!(array.get(11), Some(0x2000));
    }

    #[test]
    fn test_clear_only_matching_index() {
        let array = NativePairArray::<8>::new();
        array.set(0, 0x1000);
        array.clear(8);
        assert_eq!(array.get(0), Some(0x1000));
        array.clear(0);
        assert_eq!(array.get(0), None);
        assert_eq!(array.get(1), None);
    }

    #[test]
    fn test_values_keep_all_bits() {
        let array = NativePairArray::<8>::new();
        let wide = 0x0001_0000_0000_0040;
        assert!(array.set(5, wide));
        assert_eq!(array.get(5), Some(wide));
        assert!(array.set(6, usize::MAX));
        assert_eq!(array.get(6), Some(usize::MAX));
    }

    #[test]
    fn test_out_of_range_index_is_not_cached() {
        let array = NativePairArray::<8>::new();
        let index = MAX_INDEX + 1;
        assert!(!array.set(index, 0x40));
        assert_eq!(array.get(index), None);
        array.clear(index);
        assert!(array.set(MAX_INDEX, 0x40));
        assert_eq!(array.get(MAX_INDEX), Some(0x40));
        // Same slot as MAX_INDEX but truncation must not alias.
        assert_eq!(array.get(usize::MAX), None);
    }

    #[test]
    fn test_invalid_index_never_maps_to_its_slot() {
        for slot in 0..64 {
            assert_ne!(NativePairArray::<64>::slot_of(invalid_index_for_slot(slot)), slot);
        }
    }
}
