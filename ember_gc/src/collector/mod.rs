//! Collectors driven by remembered-set scans.
//!
//! A scan does not decide what happens to a reference it finds; it hands the
//! slot to a [`GarbageCollector`]. [`MarkingCollector`] only records what was
//! reached, [`Scavenger`] evacuates the referent and rewrites the slot.

mod marking;
mod scavenger;

pub use marking::MarkingCollector;
pub use scavenger::Scavenger;

use crate::heap::Heap;

/// Receiver of heap references discovered during a scan.
pub trait GarbageCollector {
    /// Process the reference stored at `slot`.
    ///
    /// The collector may rewrite the slot (for example after relocating the
    /// referent). `slot` always lies inside a heap space.
    fn mark_heap_reference(&mut self, heap: &Heap, slot: usize);

    /// Name used in logs.
    fn name(&self) -> &str;
}
