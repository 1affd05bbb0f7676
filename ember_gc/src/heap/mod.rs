//! Heap memory management.
//!
//! The heap is a set of [`ContinuousSpace`]s laid out back to back inside one
//! reserved address range. A single [`CardTable`] covers the reservation, and
//! each space may own a [`RememberedSet`] recording its cards that point into
//! another space.

mod space;

pub use space::{ContinuousSpace, ObjectHeader, SpaceId, SpaceKind, WORD_SIZE};

use crate::barrier::{self, CardTable, RememberedSet};
use crate::config::{ConfigError, HeapConfig};
use crate::stats::GcStats;

use thiserror::Error;

/// Errors reported by heap setup and object access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    /// Rejected configuration.
    #[error("invalid heap configuration: {0}")]
    Config(#[from] ConfigError),
    /// The space has no room left for the requested object.
    #[error("space `{space}` exhausted allocating {requested} bytes")]
    SpaceExhausted {
        /// Name of the exhausted space.
        space: String,
        /// Requested size in bytes.
        requested: usize,
    },
    /// A new space does not fit in the remaining reservation.
    #[error("space of {requested} bytes exceeds the heap reservation ({available} bytes left)")]
    AddressSpaceOverflow {
        /// Requested size in bytes.
        requested: usize,
        /// Bytes still unreserved.
        available: usize,
    },
    /// No space with this id exists.
    #[error("unknown {0}")]
    UnknownSpace(SpaceId),
    /// The space already owns a remembered set.
    #[error("{0} already has a remembered set")]
    RememberedSetExists(SpaceId),
    /// The address is not the start of a live object.
    #[error("{0:#x} is not an object in this heap")]
    NotAnObject(usize),
    /// Reference slot index past the object's reference count.
    #[error("slot {slot} out of range for an object with {reference_count} references")]
    SlotOutOfRange {
        /// Requested slot.
        slot: usize,
        /// Reference slots the object has.
        reference_count: u32,
    },
}

/// Main heap structure managing all spaces.
pub struct Heap {
    /// Configuration parameters.
    config: HeapConfig,

    /// Spaces in address order; `SpaceId` indexes this vector.
    spaces: Vec<ContinuousSpace>,

    /// One optional remembered set per space, parallel to `spaces`.
    remembered_sets: Vec<Option<RememberedSet>>,

    /// Spaces targeted by at least one remembered set.
    remembered_targets: Vec<bool>,

    /// Covers the whole reservation.
    card_table: CardTable,

    /// First unreserved address.
    next_space_begin: usize,

    stats: GcStats,
}

impl Heap {
    /// Create an empty heap.
    pub fn new(config: HeapConfig) -> Result<Self, HeapError> {
        config.validate()?;
        let card_table = CardTable::new(config.heap_base, config.reserved_size, config.card_size);
        tracing::debug!(
            base = format_args!("{:#x}", config.heap_base),
            reserved = config.reserved_size,
            card_size = config.card_size,
            "heap created"
        );
        Ok(Self {
            next_space_begin: config.heap_base,
            config,
            spaces: Vec::new(),
            remembered_sets: Vec::new(),
            remembered_targets: Vec::new(),
            card_table,
            stats: GcStats::new(),
        })
    }

    // =========================================================================
    // Spaces
    // =========================================================================

    /// Reserve a new space of at least `size` bytes (rounded up to whole cards).
    pub fn add_space(&mut self, name: &str, kind: SpaceKind, size: usize) -> Result<SpaceId, HeapError> {
        let reservation_end = self.config.heap_base + self.config.reserved_size;
        let available = reservation_end - self.next_space_begin;
        let size = match size.max(1).checked_next_multiple_of(self.config.card_size) {
            Some(aligned) if aligned <= available => aligned,
            _ => {
                return Err(HeapError::AddressSpaceOverflow {
                    requested: size,
                    available,
                });
            }
        };

        let id = SpaceId(self.spaces.len() as u32);
        let space = ContinuousSpace::new(id, name, kind, self.next_space_begin, size);
        tracing::debug!(
            space = name,
            ?kind,
            begin = format_args!("{:#x}", space.begin()),
            limit = format_args!("{:#x}", space.limit()),
            "space added"
        );
        self.next_space_begin += size;
        self.spaces.push(space);
        self.remembered_sets.push(None);
        self.remembered_targets.push(false);
        Ok(id)
    }

    /// Reserve a space of `HeapConfig::default_space_size` bytes.
    pub fn add_default_space(&mut self, name: &str, kind: SpaceKind) -> Result<SpaceId, HeapError> {
        self.add_space(name, kind, self.config.default_space_size)
    }

    /// Space with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this heap.
    #[inline]
    pub fn space(&self, id: SpaceId) -> &ContinuousSpace {
        &self.spaces[id.index()]
    }

    /// Space with the given id, if it exists.
    pub fn try_space(&self, id: SpaceId) -> Result<&ContinuousSpace, HeapError> {
        self.spaces.get(id.index()).ok_or(HeapError::UnknownSpace(id))
    }

    /// Space containing `addr`.
    #[inline]
    pub fn space_of(&self, addr: usize) -> Option<&ContinuousSpace> {
        self.spaces.iter().find(|space| space.has_address(addr))
    }

    /// All spaces in address order.
    pub fn spaces(&self) -> impl Iterator<Item = &ContinuousSpace> {
        self.spaces.iter()
    }

    // =========================================================================
    // Cards and Remembered Sets
    // =========================================================================

    /// The card table covering every space.
    #[inline]
    pub fn card_table(&self) -> &CardTable {
        &self.card_table
    }

    /// Give `owner` a remembered set tracking its references into `target`.
    pub fn create_remembered_set(&mut self, owner: SpaceId, target: SpaceId) -> Result<&RememberedSet, HeapError> {
        let owner_space = self.try_space(owner)?;
        self.try_space(target)?;
        if self.remembered_sets[owner.index()].is_some() {
            return Err(HeapError::RememberedSetExists(owner));
        }

        let name = format!("{} remembered set", owner_space.name());
        let set = RememberedSet::new(name, owner_space, target, self.card_table.geometry());
        self.remembered_targets[target.index()] = true;
        Ok(self.remembered_sets[owner.index()].insert(set))
    }

    /// Remembered set owned by `id`.
    #[inline]
    pub fn remembered_set(&self, id: SpaceId) -> Option<&RememberedSet> {
        self.remembered_sets.get(id.index()).and_then(Option::as_ref)
    }

    /// Every remembered set in the heap.
    pub fn remembered_sets(&self) -> impl Iterator<Item = &RememberedSet> {
        self.remembered_sets.iter().flatten()
    }

    /// Whether some remembered set tracks references into `id`.
    #[inline]
    pub fn is_remembered_target(&self, id: SpaceId) -> bool {
        self.remembered_targets
            .get(id.index())
            .copied()
            .unwrap_or(false)
    }

    // =========================================================================
    // Objects
    // =========================================================================

    /// Allocate an object in `space`.
    pub fn alloc(&self, space: SpaceId, refs: u32, primitive_words: u32) -> Result<usize, HeapError> {
        let target = self.try_space(space)?;
        let size = ObjectHeader::requested_bytes(refs, primitive_words);
        let obj = target
            .alloc(refs, primitive_words)
            .ok_or_else(|| HeapError::SpaceExhausted {
                space: target.name().to_owned(),
                requested: size,
            })?;
        self.stats.record_allocation(size);
        Ok(obj)
    }

    /// Header of the object starting at `obj`.
    pub fn header(&self, obj: usize) -> Result<ObjectHeader, HeapError> {
        match self.space_of(obj) {
            Some(space) if space.is_object_start(obj) => Ok(space.header(obj)),
            _ => Err(HeapError::NotAnObject(obj)),
        }
    }

    /// Load the word at `addr`; unmapped addresses read as null.
    #[inline]
    pub fn load_word(&self, addr: usize) -> usize {
        self.space_of(addr).map_or(0, |space| space.load_word(addr))
    }

    /// Store `value` at `addr` without a write barrier.
    #[inline]
    pub fn store_word(&self, addr: usize, value: usize) {
        match self.space_of(addr) {
            Some(space) => space.store_word(addr, value),
            None => debug_assert!(false, "store to unmapped address {addr:#x}"),
        }
    }

    /// Store `value` into reference slot `slot` of `holder` and run the write
    /// barrier.
    pub fn write_reference(&self, holder: usize, slot: usize, value: usize) -> Result<(), HeapError> {
        let slot_addr = self.slot_address(holder, slot)?;
        self.store_word(slot_addr, value);
        barrier::write_barrier(self, holder, value);
        Ok(())
    }

    /// Read reference slot `slot` of `holder`.
    pub fn read_reference(&self, holder: usize, slot: usize) -> Result<usize, HeapError> {
        let slot_addr = self.slot_address(holder, slot)?;
        Ok(self.load_word(slot_addr))
    }

    /// Copy `obj` into space `to`, returning the new address.
    ///
    /// Reference slots are copied verbatim; the caller fixes up forwarding.
    pub fn copy_object(&self, obj: usize, to: SpaceId) -> Result<usize, HeapError> {
        let header = self.header(obj)?;
        let primitive_words = header.size_words - 1 - header.reference_count;
        let copy = self.alloc(to, header.reference_count, primitive_words)?;
        for offset in (WORD_SIZE..header.size_bytes()).step_by(WORD_SIZE) {
            self.store_word(copy + offset, self.load_word(obj + offset));
        }
        Ok(copy)
    }

    fn slot_address(&self, holder: usize, slot: usize) -> Result<usize, HeapError> {
        let header = self.header(holder)?;
        if slot >= header.reference_count as usize {
            return Err(HeapError::SlotOutOfRange {
                slot,
                reference_count: header.reference_count,
            });
        }
        Ok(holder + (1 + slot) * WORD_SIZE)
    }

    // =========================================================================
    // Reclamation
    // =========================================================================

    /// Forget card state for `[start, end)` after the range was freed.
    ///
    /// Tracked cards in every remembered set are dropped and the card bytes
    /// cleaned, so a later allocation in the range starts clean.
    pub fn release_range(&self, start: usize, end: usize) {
        let mut dropped = 0;
        for set in self.remembered_sets() {
            dropped += set.drop_card_range(start, end);
        }
        self.card_table.clear_card_range(start, end);
        self.stats.record_cards_dropped(dropped);
        tracing::debug!(
            start = format_args!("{start:#x}"),
            end = format_args!("{end:#x}"),
            dropped,
            "released heap range"
        );
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Heap statistics.
    #[inline]
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// Configuration the heap was created with.
    #[inline]
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap() -> Heap {
        Heap::new(HeapConfig::small()).unwrap()
    }

    #[test]
    fn test_spaces_are_contiguous() {
        let mut heap = heap();
        let a = heap.add_space("a", SpaceKind::FreeList, 4096).unwrap();
        let b = heap.add_space("b", SpaceKind::BumpPointer, 1000).unwrap();
        assert_eq!(heap.space(a).begin(), heap.config().heap_base);
        assert_eq!(heap.space(b).begin(), heap.space(a).limit());
        assert_eq!(heap.space(b).limit() - heap.space(b).begin(), 1024);
    }

    #[test]
    fn test_reservation_overflow() {
        let mut heap = heap();
        let err = heap
            .add_space("huge", SpaceKind::FreeList, 2 * 1024 * 1024)
            .unwrap_err();
        assert!(matches!(err, HeapError::AddressSpaceOverflow { .. }));
    }

    #[test]
    fn test_unalignable_space_size_rejected() {
        let mut heap = heap();
        let err = heap.add_space("x", SpaceKind::FreeList, usize::MAX).unwrap_err();
        assert!(matches!(
            err,
            HeapError::AddressSpaceOverflow { requested: usize::MAX, .. }
        ));
        // The failed request reserves nothing.
        assert!(heap.add_default_space("a", SpaceKind::FreeList).is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = HeapConfig {
            card_size: 3,
            ..HeapConfig::small()
        };
        assert!(matches!(Heap::new(config), Err(HeapError::Config(_))));
    }

    #[test]
    fn test_space_of() {
        let mut heap = heap();
        let a = heap.add_default_space("a", SpaceKind::FreeList).unwrap();
        let obj = heap.alloc(a, 1, 0).unwrap();
        assert_eq!(heap.space_of(obj).map(ContinuousSpace::id), Some(a));
        assert!(heap.space_of(0).is_none());
    }

    #[test]
    fn test_read_write_reference() {
        let mut heap = heap();
        let a = heap.add_default_space("a", SpaceKind::FreeList).unwrap();
        let holder = heap.alloc(a, 2, 1).unwrap();
        let value = heap.alloc(a, 0, 0).unwrap();

        heap.write_reference(holder, 1, value).unwrap();
        assert_eq!(heap.read_reference(holder, 1).unwrap(), value);
        assert_eq!(heap.read_reference(holder, 0).unwrap(), 0);
        assert!(matches!(
            heap.write_reference(holder, 2, value),
            Err(HeapError::SlotOutOfRange { slot: 2, reference_count: 2 })
        ));
        assert!(matches!(
            heap.read_reference(holder + WORD_SIZE, 0),
            Err(HeapError::NotAnObject(_))
        ));
    }

    #[test]
    fn test_alloc_exhaustion_error() {
        let mut heap = heap();
        let a = heap.add_space("tiny", SpaceKind::BumpPointer, 512).unwrap();
        while heap.alloc(a, 0, 7).is_ok() {}
        assert!(matches!(
            heap.alloc(a, 0, 7),
            Err(HeapError::SpaceExhausted { .. })
        ));
    }

    #[test]
    fn test_oversized_object_rejected() {
        let mut heap = heap();
        let a = heap.add_default_space("a", SpaceKind::FreeList).unwrap();
        let err = heap.alloc(a, u32::MAX, 1).unwrap_err();
        assert_eq!(
            err,
            HeapError::SpaceExhausted {
                space: "a".into(),
                requested: ObjectHeader::requested_bytes(u32::MAX, 1),
            }
        );
        assert!(heap.alloc(a, 1, 0).is_ok());
    }

    #[test]
    fn test_duplicate_remembered_set() {
        let mut heap = heap();
        let old = heap.add_default_space("old", SpaceKind::FreeList).unwrap();
        let young = heap.add_default_space("young", SpaceKind::BumpPointer).unwrap();
        heap.create_remembered_set(old, young).unwrap();
        assert!(heap.is_remembered_target(young));
        assert!(!heap.is_remembered_target(old));
        assert_eq!(
            heap.create_remembered_set(old, young).err(),
            Some(HeapError::RememberedSetExists(old))
        );
    }

    #[test]
    fn test_copy_object() {
        let mut heap = heap();
        let from = heap.add_default_space("from", SpaceKind::BumpPointer).unwrap();
        let to = heap.add_default_space("to", SpaceKind::FreeList).unwrap();
        let obj = heap.alloc(from, 1, 2).unwrap();
        heap.store_word(obj + 2 * WORD_SIZE, 42);
        let copy = heap.copy_object(obj, to).unwrap();
        assert!(heap.space(to).has_address(copy));
        assert_eq!(heap.header(copy).unwrap(), heap.header(obj).unwrap());
        assert_eq!(heap.load_word(copy + 2 * WORD_SIZE), 42);
    }
}
