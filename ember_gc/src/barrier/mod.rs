//! Write barriers and cross-space reference tracking.
//!
//! The barrier dirties the card of any object that stores a reference into
//! a space some remembered set targets. Collectors later age those cards into
//! the owning space's [`RememberedSet`] and scan only them instead of the
//! whole space.

mod card_table;
mod remembered_set;

pub use card_table::{CARD_AGED, CARD_CLEAN, CARD_DIRTY, CardGeometry, CardTable, age_card};
pub use remembered_set::{
    CardScan, ReferenceMarkingVisitor, RememberedSet, RememberedSetObjectVisitor, ScanSummary,
};

use crate::heap::Heap;

// =============================================================================
// Write Barriers
// =============================================================================

/// Write barrier for reference stores.
///
/// Call this after storing `new_value` into a reference slot of the object
/// starting at `holder`. The card covering `holder` (not the slot) is
/// dirtied, so a scan of that card always finds the object header.
///
/// # Arguments
///
/// * `heap` - The heap owning both objects
/// * `holder` - Start address of the object containing the field
/// * `new_value` - The reference being stored (0 for null)
#[inline]
pub fn write_barrier(heap: &Heap, holder: usize, new_value: usize) {
    if new_value == 0 {
        return;
    }
    let Some(target) = heap.space_of(new_value) else {
        return;
    };
    if !heap.is_remembered_target(target.id()) || target.has_address(holder) {
        return;
    }
    write_barrier_unconditional(heap, holder);
}

/// Dirty the card of `holder` regardless of the stored value.
///
/// Used when the stored value's space is unknown.
#[inline]
pub fn write_barrier_unconditional(heap: &Heap, holder: usize) {
    heap.card_table().mark_card(holder);
    heap.stats().record_card_dirtied();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeapConfig;
    use crate::heap::SpaceKind;
    use std::sync::atomic::Ordering;

    fn generational_heap() -> (Heap, crate::SpaceId, crate::SpaceId) {
        let mut heap = Heap::new(HeapConfig::small()).unwrap();
        let old = heap.add_default_space("old", SpaceKind::FreeList).unwrap();
        let young = heap.add_default_space("young", SpaceKind::BumpPointer).unwrap();
        heap.create_remembered_set(old, young).unwrap();
        (heap, old, young)
    }

    #[test]
    fn test_old_to_young_dirties_holder_card() {
        let (heap, old, young) = generational_heap();
        let holder = heap.alloc(old, 1, 0).unwrap();
        let target = heap.alloc(young, 0, 0).unwrap();

        heap.write_reference(holder, 0, target).unwrap();
        assert!(heap.card_table().is_dirty(holder));
        assert_eq!(heap.stats().cards_dirtied.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_card_follows_object_start_not_slot() {
        let (heap, old, young) = generational_heap();
        let card_size = heap.config().card_size;
        // Pad so the holder starts near the end of a card and its slots spill
        // into the next one.
        let first = heap.alloc(old, 0, (card_size / 8 - 3) as u32).unwrap();
        let holder = heap.alloc(old, 8, 0).unwrap();
        assert_eq!(heap.card_table().card_index(first), heap.card_table().card_index(holder));
        let target = heap.alloc(young, 0, 0).unwrap();

        heap.write_reference(holder, 7, target).unwrap();
        assert!(heap.card_table().is_dirty(holder));
        assert!(!heap.card_table().is_dirty(holder + 8 * 8));
    }

    #[test]
    fn test_no_barrier_for_untracked_stores() {
        let (heap, old, young) = generational_heap();
        let old_a = heap.alloc(old, 1, 0).unwrap();
        let old_b = heap.alloc(old, 0, 0).unwrap();
        let young_a = heap.alloc(young, 1, 0).unwrap();
        let young_b = heap.alloc(young, 0, 0).unwrap();

        heap.write_reference(old_a, 0, old_b).unwrap();
        heap.write_reference(young_a, 0, young_b).unwrap();
        heap.write_reference(young_a, 0, old_b).unwrap();
        heap.write_reference(old_a, 0, 0).unwrap();
        assert_eq!(heap.card_table().dirty_count(), 0);
    }
}
