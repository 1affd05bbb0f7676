//! Non-moving marker.

use rustc_hash::{FxHashMap, FxHashSet};

use super::GarbageCollector;
use crate::heap::Heap;

/// Records every object reached through a marked slot.
///
/// Also counts how often each slot was handed over, which lets callers check
/// that a scan visits each slot exactly once.
#[derive(Debug, Default)]
pub struct MarkingCollector {
    marked: FxHashSet<usize>,
    slot_visits: FxHashMap<usize, usize>,
}

impl MarkingCollector {
    /// Create an empty marker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `obj` has been marked.
    #[inline]
    pub fn is_marked(&self, obj: usize) -> bool {
        self.marked.contains(&obj)
    }

    /// Number of distinct marked objects.
    pub fn marked_count(&self) -> usize {
        self.marked.len()
    }

    /// How many times `slot` was handed to this collector.
    pub fn visits_of(&self, slot: usize) -> usize {
        self.slot_visits.get(&slot).copied().unwrap_or(0)
    }

    /// Total slot visits.
    pub fn total_visits(&self) -> usize {
        self.slot_visits.values().sum()
    }

    /// Forget all marks and visit counts.
    pub fn reset(&mut self) {
        self.marked.clear();
        self.slot_visits.clear();
    }
}

impl GarbageCollector for MarkingCollector {
    fn mark_heap_reference(&mut self, heap: &Heap, slot: usize) {
        *self.slot_visits.entry(slot).or_insert(0) += 1;
        let referent = heap.load_word(slot);
        if referent != 0 {
            self.marked.insert(referent);
        }
    }

    fn name(&self) -> &str {
        "marking"
    }
}
