//! Remembered set: the cards of one space that may point into another.
//!
//! The card table is shared by every space; a remembered set takes ownership
//! of one space's dirty cards when the collector ages them
//! ([`RememberedSet::clear_cards`]) and keeps them across cycles for as long
//! as they still hold a reference into the target space.
//!
//! # Scanning
//!
//! [`RememberedSet::update_and_mark_references`] visits every live object
//! whose start lies in a tracked card, hands each reference into the target
//! space to a [`GarbageCollector`], and forgets cards that no longer hold such
//! a reference. Cards added by mutators while a scan is running go to an
//! overflow set and are merged once the scan has finished removing cards.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::card_table::{CARD_DIRTY, CardGeometry, age_card};
use crate::collector::GarbageCollector;
use crate::heap::{ContinuousSpace, Heap, SpaceId};
use crate::stats::GcTimer;

use ember_core::bit_utils::align_up;

/// Per-card context handed to a [`RememberedSetObjectVisitor`].
pub struct CardScan<'a> {
    heap: &'a Heap,
    target: &'a ContinuousSpace,
    collector: &'a mut dyn GarbageCollector,
    contains_reference_to_target: bool,
    references_marked: usize,
}

impl<'a> CardScan<'a> {
    /// The heap being scanned.
    #[inline]
    pub fn heap(&self) -> &'a Heap {
        self.heap
    }

    /// Space whose incoming references are being marked.
    #[inline]
    pub fn target(&self) -> &'a ContinuousSpace {
        self.target
    }

    /// The collector receiving marked references.
    #[inline]
    pub fn collector(&mut self) -> &mut dyn GarbageCollector {
        &mut *self.collector
    }

    /// Hand the reference stored at `slot` to the collector and keep the card.
    pub fn mark_reference(&mut self, slot: usize) {
        self.collector.mark_heap_reference(self.heap, slot);
        self.references_marked += 1;
        self.contains_reference_to_target = true;
    }

    /// Keep the current card tracked. The flag can only be raised.
    #[inline]
    pub fn raise_contains_reference(&mut self) {
        self.contains_reference_to_target = true;
    }

    /// Whether anything visited so far in this card references the target.
    #[inline]
    pub fn contains_reference_to_target(&self) -> bool {
        self.contains_reference_to_target
    }
}

/// Visits the objects found in tracked cards.
pub trait RememberedSetObjectVisitor {
    /// Visit the object starting at `obj`.
    fn visit_object(&mut self, obj: usize, scan: &mut CardScan<'_>);
}

/// Default visitor: marks every reference slot pointing into the target.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReferenceMarkingVisitor;

impl RememberedSetObjectVisitor for ReferenceMarkingVisitor {
    fn visit_object(&mut self, obj: usize, scan: &mut CardScan<'_>) {
        let heap = scan.heap();
        let Some(space) = heap.space_of(obj) else {
            return;
        };
        for slot in space.reference_slots(obj) {
            let referent = space.load_word(slot);
            if referent != 0 && scan.target().has_address(referent) {
                scan.mark_reference(slot);
            }
        }
    }
}

/// Outcome of one [`RememberedSet::update_and_mark_references`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    /// Cards visited.
    pub cards_scanned: usize,
    /// Visited cards kept because they still reference the target.
    pub cards_retained: usize,
    /// Visited cards removed.
    pub cards_removed: usize,
    /// Cards added concurrently and merged after the scan.
    pub cards_merged: usize,
    /// Objects handed to the visitor.
    pub objects_visited: usize,
    /// References marked through [`CardScan::mark_reference`].
    pub references_marked: usize,
}

/// Cards of one space that may hold references into another space.
pub struct RememberedSet {
    name: String,
    space: SpaceId,
    target: SpaceId,
    geometry: CardGeometry,
    /// Cards `[first_card, end_card)` cover the owning space.
    first_card: usize,
    end_card: usize,
    dirty_cards: Mutex<BTreeSet<usize>>,
    /// Cards added while a scan holds the primary set.
    overflow: Mutex<BTreeSet<usize>>,
    scanning: AtomicBool,
}

impl RememberedSet {
    pub(crate) fn new(name: String, space: &ContinuousSpace, target: SpaceId, geometry: CardGeometry) -> Self {
        Self {
            name,
            space: space.id(),
            target,
            geometry,
            first_card: geometry.card_index(space.begin()),
            end_card: geometry.card_index(space.limit() - 1) + 1,
            dirty_cards: Mutex::new(BTreeSet::new()),
            overflow: Mutex::new(BTreeSet::new()),
            scanning: AtomicBool::new(false),
        }
    }

    /// Name used in logs and dumps.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Space whose cards this set tracks.
    #[inline]
    pub fn space(&self) -> SpaceId {
        self.space
    }

    /// Space the tracked cards point into.
    #[inline]
    pub fn target(&self) -> SpaceId {
        self.target
    }

    /// Track `card`. Idempotent and safe to call from any thread.
    pub fn add_dirty_card(&self, card: usize) {
        debug_assert!(
            (self.first_card..self.end_card).contains(&card),
            "card {card} outside {}",
            self.name
        );
        if self.scanning.load(Ordering::Acquire) {
            let mut overflow = self.overflow.lock();
            // Re-check under the lock: the scan clears the flag while
            // holding it.
            if self.scanning.load(Ordering::Acquire) {
                overflow.insert(card);
                return;
            }
        }
        self.dirty_cards.lock().insert(card);
    }

    /// Age every card of the owning space and take ownership of the ones
    /// that were dirty. Returns how many cards were collected.
    pub fn clear_cards(&self, heap: &Heap) -> usize {
        let space = heap.space(self.space);
        let end = align_up(space.end(), self.geometry.card_size());
        let mut collected = 0;
        heap.card_table().modify_cards_atomic(space.begin(), end, age_card, |card, old, _| {
            if old == CARD_DIRTY {
                self.add_dirty_card(card);
                collected += 1;
            }
        });
        heap.stats().record_cards_collected(collected);
        tracing::debug!(set = %self.name, collected, tracked = self.len(), "cleared cards");
        collected
    }

    /// Visit every object in the tracked cards, mark its references into
    /// `target` through `collector`, and drop cards with no such reference.
    ///
    /// `visitor` defaults to [`ReferenceMarkingVisitor`].
    pub fn update_and_mark_references(
        &self,
        heap: &Heap,
        target: SpaceId,
        collector: &mut dyn GarbageCollector,
        visitor: Option<&mut dyn RememberedSetObjectVisitor>,
    ) -> ScanSummary {
        if heap.config().verify_cards {
            self.assert_all_dirty_cards_within_space(heap);
        }
        let timer = GcTimer::start("remembered set scan");
        let mut default_visitor = ReferenceMarkingVisitor;
        let visitor: &mut dyn RememberedSetObjectVisitor = match visitor {
            Some(visitor) => visitor,
            None => &mut default_visitor,
        };

        let space = heap.space(self.space);
        let target_space = heap.space(target);
        let card_size = self.geometry.card_size();

        self.scanning.store(true, Ordering::Release);
        let cards: Vec<usize> = self.dirty_cards.lock().iter().copied().collect();

        let mut summary = ScanSummary::default();
        let mut removable = Vec::new();
        for &card in &cards {
            let start = self.geometry.addr_from_card(card);
            let mut scan = CardScan {
                heap,
                target: target_space,
                collector: &mut *collector,
                contains_reference_to_target: false,
                references_marked: 0,
            };
            space.visit_marked_range(start, start + card_size, |obj| {
                summary.objects_visited += 1;
                visitor.visit_object(obj, &mut scan);
            });
            summary.references_marked += scan.references_marked;
            if !scan.contains_reference_to_target {
                removable.push(card);
            }
        }

        {
            let mut overflow = self.overflow.lock();
            let mut dirty = self.dirty_cards.lock();
            for card in &removable {
                dirty.remove(card);
            }
            summary.cards_merged = overflow.len();
            dirty.append(&mut overflow);
            self.scanning.store(false, Ordering::Release);
        }

        summary.cards_scanned = cards.len();
        summary.cards_removed = removable.len();
        summary.cards_retained = cards.len() - removable.len();

        let stats = heap.stats();
        stats.record_references_marked(summary.references_marked);
        stats.record_scan(summary.cards_scanned, summary.cards_retained, timer.stop());
        tracing::debug!(
            set = %self.name,
            collector = collector.name(),
            scanned = summary.cards_scanned,
            retained = summary.cards_retained,
            merged = summary.cards_merged,
            marked = summary.references_marked,
            "remembered set scanned"
        );
        summary
    }

    /// Forget tracked cards whose first address lies in `[start, end)`.
    /// Returns how many cards were dropped.
    pub fn drop_card_range(&self, start: usize, end: usize) -> usize {
        let keep = |card: &usize| {
            let addr = self.geometry.addr_from_card(*card);
            !(start..end).contains(&addr)
        };
        let mut overflow = self.overflow.lock();
        let mut dirty = self.dirty_cards.lock();
        let before = dirty.len() + overflow.len();
        dirty.retain(keep);
        overflow.retain(keep);
        let dropped = before - dirty.len() - overflow.len();
        if dropped > 0 {
            tracing::debug!(set = %self.name, dropped, "dropped card range");
        }
        dropped
    }

    /// Panic if any tracked card covers memory outside the owning space.
    pub fn assert_all_dirty_cards_within_space(&self, heap: &Heap) {
        let space = heap.space(self.space);
        let card_size = self.geometry.card_size();
        for card in self.dirty_cards() {
            let start = self.geometry.addr_from_card(card);
            assert!(
                space.begin() <= start && start + card_size <= space.limit(),
                "{}: card {card} [{start:#x}, {:#x}) outside {:?}",
                self.name,
                start + card_size,
                space
            );
        }
    }

    /// Number of tracked cards, overflow included.
    pub fn len(&self) -> usize {
        let overflow = self.overflow.lock().len();
        self.dirty_cards.lock().len() + overflow
    }

    /// Whether no card is tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the tracked cards in ascending order.
    pub fn dirty_cards(&self) -> Vec<usize> {
        let overflow = self.overflow.lock();
        let dirty = self.dirty_cards.lock();
        dirty.union(&overflow).copied().collect()
    }

    /// Whether `card` is tracked.
    pub fn contains(&self, card: usize) -> bool {
        let overflow = self.overflow.lock();
        self.dirty_cards.lock().contains(&card) || overflow.contains(&card)
    }
}

impl fmt::Display for RememberedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let card_size = self.geometry.card_size();
        write!(f, "{} dirty cards: [", self.name)?;
        for card in self.dirty_cards() {
            let start = self.geometry.addr_from_card(card);
            write!(f, " {start:#x}-{:#x}", start + card_size)?;
        }
        write!(f, " ]")
    }
}

impl fmt::Debug for RememberedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RememberedSet")
            .field("name", &self.name)
            .field("space", &self.space)
            .field("target", &self.target)
            .field("cards", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MarkingCollector;
    use crate::config::HeapConfig;
    use crate::heap::SpaceKind;

    struct Setup {
        heap: Heap,
        old: SpaceId,
        young: SpaceId,
    }

    fn setup() -> Setup {
        let mut heap = Heap::new(HeapConfig::small()).unwrap();
        let old = heap.add_default_space("old", SpaceKind::FreeList).unwrap();
        let young = heap.add_default_space("young", SpaceKind::BumpPointer).unwrap();
        heap.create_remembered_set(old, young).unwrap();
        Setup { heap, old, young }
    }

    #[test]
    fn test_add_dirty_card_is_idempotent() {
        let s = setup();
        let set = s.heap.remembered_set(s.old).unwrap();
        let card = s.heap.card_table().card_index(s.heap.space(s.old).begin()).unwrap();
        set.add_dirty_card(card);
        set.add_dirty_card(card);
        assert_eq!(set.len(), 1);
        assert!(set.contains(card));
    }

    #[test]
    fn test_clear_cards_collects_dirty_and_ages() {
        let s = setup();
        let holder = s.heap.alloc(s.old, 1, 0).unwrap();
        let young = s.heap.alloc(s.young, 0, 0).unwrap();
        s.heap.write_reference(holder, 0, young).unwrap();

        let set = s.heap.remembered_set(s.old).unwrap();
        assert_eq!(set.clear_cards(&s.heap), 1);
        let card = s.heap.card_table().card_index(holder).unwrap();
        assert_eq!(set.dirty_cards(), vec![card]);
        assert_eq!(s.heap.card_table().get(card), crate::barrier::CARD_AGED);

        // A second aging pass cleans the card without collecting it again.
        assert_eq!(set.clear_cards(&s.heap), 0);
        assert_eq!(s.heap.card_table().get(card), crate::barrier::CARD_CLEAN);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_scan_drops_cards_without_target_references() {
        let s = setup();
        let holder = s.heap.alloc(s.old, 1, 0).unwrap();
        let young = s.heap.alloc(s.young, 0, 0).unwrap();
        s.heap.write_reference(holder, 0, young).unwrap();
        let set = s.heap.remembered_set(s.old).unwrap();
        set.clear_cards(&s.heap);

        let mut collector = MarkingCollector::new();
        let summary = set.update_and_mark_references(&s.heap, s.young, &mut collector, None);
        assert_eq!(summary.cards_retained, 1);
        assert_eq!(summary.references_marked, 1);
        assert!(collector.is_marked(young));

        // Overwrite with null: the next scan forgets the card.
        s.heap.write_reference(holder, 0, 0).unwrap();
        let summary = set.update_and_mark_references(&s.heap, s.young, &mut collector, None);
        assert_eq!(summary.cards_removed, 1);
        assert!(set.is_empty());
    }

    #[test]
    fn test_custom_visitor_can_retain_cards() {
        struct KeepAll(usize);
        impl RememberedSetObjectVisitor for KeepAll {
            fn visit_object(&mut self, _obj: usize, scan: &mut CardScan<'_>) {
                self.0 += 1;
                scan.raise_contains_reference();
            }
        }

        let s = setup();
        let holder = s.heap.alloc(s.old, 1, 0).unwrap();
        let set = s.heap.remembered_set(s.old).unwrap();
        set.add_dirty_card(s.heap.card_table().card_index(holder).unwrap());

        let mut collector = MarkingCollector::new();
        let mut visitor = KeepAll(0);
        let summary = set.update_and_mark_references(&s.heap, s.young, &mut collector, Some(&mut visitor));
        assert_eq!(visitor.0, 1);
        assert_eq!(summary.cards_retained, 1);
        assert_eq!(summary.references_marked, 0);
    }

    #[test]
    fn test_drop_card_range() {
        let s = setup();
        let set = s.heap.remembered_set(s.old).unwrap();
        let begin = s.heap.space(s.old).begin();
        let card_size = s.heap.config().card_size;
        let table = s.heap.card_table();
        for i in 0..4 {
            set.add_dirty_card(table.card_index(begin + i * card_size).unwrap());
        }

        assert_eq!(set.drop_card_range(begin + card_size, begin + 3 * card_size), 2);
        let remaining: Vec<usize> = set
            .dirty_cards()
            .into_iter()
            .map(|card| table.addr_from_card(card))
            .collect();
        assert_eq!(remaining, vec![begin, begin + 3 * card_size]);
    }

    #[test]
    fn test_display_dump() {
        let s = setup();
        let set = s.heap.remembered_set(s.old).unwrap();
        let begin = s.heap.space(s.old).begin();
        set.add_dirty_card(s.heap.card_table().card_index(begin).unwrap());
        let dump = set.to_string();
        assert_eq!(
            dump,
            format!("old remembered set dirty cards: [ {:#x}-{:#x} ]", begin, begin + 512)
        );
    }

    #[test]
    fn test_assert_within_space_passes_for_own_cards() {
        let s = setup();
        let set = s.heap.remembered_set(s.old).unwrap();
        let last = s.heap.space(s.old).limit() - 1;
        set.add_dirty_card(s.heap.card_table().card_index(last).unwrap());
        set.assert_all_dirty_cards_within_space(&s.heap);
    }
}
