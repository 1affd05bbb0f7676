//! Evacuating collector for remembered-set roots.
//!
//! References found through a remembered set are treated as roots of a
//! from-space: each referent is copied once into the to-space and every slot
//! that pointed at it is rewritten to the copy.

use rustc_hash::FxHashMap;

use super::GarbageCollector;
use crate::heap::{Heap, SpaceId};

/// Copies referents out of `from` into `to`.
#[derive(Debug)]
pub struct Scavenger {
    from: SpaceId,
    to: SpaceId,
    /// Forwarding pointers: old address -> new address.
    forwarding: FxHashMap<usize, usize>,
    bytes_copied: usize,
    failed_evacuations: usize,
}

impl Scavenger {
    /// Create a scavenger evacuating `from` into `to`.
    pub fn new(from: SpaceId, to: SpaceId) -> Self {
        Self {
            from,
            to,
            forwarding: FxHashMap::default(),
            bytes_copied: 0,
            failed_evacuations: 0,
        }
    }

    /// New address of `obj`, if it was evacuated.
    #[inline]
    pub fn forwarded(&self, obj: usize) -> Option<usize> {
        self.forwarding.get(&obj).copied()
    }

    /// Number of objects evacuated.
    pub fn objects_copied(&self) -> usize {
        self.forwarding.len()
    }

    /// Bytes copied into the to-space.
    pub fn bytes_copied(&self) -> usize {
        self.bytes_copied
    }

    /// Referents left in place because the to-space was full.
    pub fn failed_evacuations(&self) -> usize {
        self.failed_evacuations
    }

    fn evacuate(&mut self, heap: &Heap, obj: usize) -> Option<usize> {
        if let Some(&copy) = self.forwarding.get(&obj) {
            return Some(copy);
        }
        match heap.copy_object(obj, self.to) {
            Ok(copy) => {
                if let Ok(header) = heap.header(copy) {
                    self.bytes_copied += header.size_bytes();
                }
                self.forwarding.insert(obj, copy);
                Some(copy)
            }
            Err(err) => {
                self.failed_evacuations += 1;
                tracing::warn!(obj = format_args!("{obj:#x}"), %err, "evacuation failed");
                None
            }
        }
    }
}

impl GarbageCollector for Scavenger {
    fn mark_heap_reference(&mut self, heap: &Heap, slot: usize) {
        let referent = heap.load_word(slot);
        if referent == 0 || !heap.space(self.from).has_address(referent) {
            return;
        }
        if let Some(copy) = self.evacuate(heap, referent) {
            heap.store_word(slot, copy);
        }
    }

    fn name(&self) -> &str {
        "scavenger"
    }
}
