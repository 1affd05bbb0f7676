//! Card table for cross-space reference tracking.
//!
//! The table divides the heap reservation into fixed-size cards. Each card has
//! one byte: the write barrier stores [`CARD_DIRTY`] into it, and the
//! collector ages cards with [`CardTable::modify_cards_atomic`] when it moves
//! them into a remembered set.

use std::sync::atomic::{AtomicU8, Ordering};

/// Card holds no interesting references.
pub const CARD_CLEAN: u8 = 0;
/// Card was written since it was last aged.
pub const CARD_DIRTY: u8 = 0x70;
/// Card was dirty at the last aging pass.
pub const CARD_AGED: u8 = CARD_DIRTY - 1;

/// Aging function used when cards are collected into a remembered set.
#[inline]
pub fn age_card(value: u8) -> u8 {
    if value == CARD_DIRTY { CARD_AGED } else { CARD_CLEAN }
}

/// Address-to-card mapping shared by the table and the remembered sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardGeometry {
    base: usize,
    card_shift: u32,
}

impl CardGeometry {
    /// Geometry for cards of `card_size` bytes (power of two) starting at `base`.
    pub fn new(base: usize, card_size: usize) -> Self {
        debug_assert!(card_size.is_power_of_two(), "card size must be power of 2");
        Self {
            base,
            card_shift: card_size.trailing_zeros(),
        }
    }

    /// Card index covering `addr`. `addr` must not be below the base.
    #[inline]
    pub fn card_index(&self, addr: usize) -> usize {
        debug_assert!(addr >= self.base, "address {addr:#x} below card table");
        (addr - self.base) >> self.card_shift
    }

    /// First address covered by `card`.
    #[inline]
    pub fn addr_from_card(&self, card: usize) -> usize {
        self.base + (card << self.card_shift)
    }

    /// Bytes per card.
    #[inline]
    pub fn card_size(&self) -> usize {
        1 << self.card_shift
    }
}

/// Card table for write barrier tracking.
pub struct CardTable {
    /// The card bytes.
    cards: Box<[AtomicU8]>,
    geometry: CardGeometry,
}

impl CardTable {
    /// Create a card table covering `[base, base + size)`.
    ///
    /// # Arguments
    ///
    /// * `base` - Start address of the covered region
    /// * `size` - Size of the covered region in bytes
    /// * `card_size` - Size of each card (must be power of 2)
    pub fn new(base: usize, size: usize, card_size: usize) -> Self {
        let geometry = CardGeometry::new(base, card_size);
        let num_cards = size.div_ceil(card_size);
        let cards: Vec<AtomicU8> = (0..num_cards).map(|_| AtomicU8::new(CARD_CLEAN)).collect();

        Self {
            cards: cards.into_boxed_slice(),
            geometry,
        }
    }

    /// Address-to-card mapping.
    #[inline]
    pub fn geometry(&self) -> CardGeometry {
        self.geometry
    }

    /// Card index for `addr`, or `None` when the table does not cover it.
    #[inline]
    pub fn card_index(&self, addr: usize) -> Option<usize> {
        if addr < self.geometry.base {
            return None;
        }
        let index = self.geometry.card_index(addr);
        (index < self.cards.len()).then_some(index)
    }

    /// First address covered by `card`.
    #[inline]
    pub fn addr_from_card(&self, card: usize) -> usize {
        self.geometry.addr_from_card(card)
    }

    /// Mark the card covering `addr` dirty. Addresses outside the table are
    /// ignored.
    #[inline]
    pub fn mark_card(&self, addr: usize) {
        if let Some(index) = self.card_index(addr) {
            self.cards[index].store(CARD_DIRTY, Ordering::Release);
        }
    }

    /// Check if the card covering `addr` is dirty.
    #[inline]
    pub fn is_dirty(&self, addr: usize) -> bool {
        self.card_index(addr)
            .is_some_and(|i| self.cards[i].load(Ordering::Acquire) == CARD_DIRTY)
    }

    /// Raw value of `card`.
    #[inline]
    pub fn get(&self, card: usize) -> u8 {
        self.cards[card].load(Ordering::Acquire)
    }

    /// Clean every card overlapping `[start, end)`.
    pub fn clear_card_range(&self, start: usize, end: usize) {
        for card in self.cards_in(start, end) {
            self.cards[card].store(CARD_CLEAN, Ordering::Relaxed);
        }
    }

    /// Atomically replace each card in `[start, end)` with `modify(old)`.
    ///
    /// `on_modified(card, old, new)` runs for every card whose value changed.
    /// A card re-dirtied by a mutator between the load and the CAS is retried,
    /// so a concurrent barrier store is never overwritten with a stale age.
    pub fn modify_cards_atomic<M, V>(&self, start: usize, end: usize, modify: M, mut on_modified: V)
    where
        M: Fn(u8) -> u8,
        V: FnMut(usize, u8, u8),
    {
        for card in self.cards_in(start, end) {
            let slot = &self.cards[card];
            let mut old = slot.load(Ordering::Relaxed);
            loop {
                let new = modify(old);
                if new == old {
                    break;
                }
                match slot.compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Relaxed) {
                    Ok(_) => {
                        on_modified(card, old, new);
                        break;
                    }
                    Err(actual) => old = actual,
                }
            }
        }
    }

    /// Iterate over dirty cards, calling the closure with `(card_start, card_end)`.
    pub fn for_each_dirty<F>(&self, mut f: F)
    where
        F: FnMut(usize, usize),
    {
        let card_size = self.geometry.card_size();
        for (i, card) in self.cards.iter().enumerate() {
            if card.load(Ordering::Relaxed) == CARD_DIRTY {
                let card_start = self.geometry.addr_from_card(i);
                f(card_start, card_start + card_size);
            }
        }
    }

    /// Count dirty cards.
    pub fn dirty_count(&self) -> usize {
        self.cards
            .iter()
            .filter(|c| c.load(Ordering::Relaxed) == CARD_DIRTY)
            .count()
    }

    /// Get total number of cards.
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Get card size.
    pub fn card_size(&self) -> usize {
        self.geometry.card_size()
    }

    /// Card indices overlapping `[start, end)`, clamped to the table.
    fn cards_in(&self, start: usize, end: usize) -> std::ops::Range<usize> {
        let base = self.geometry.base;
        let start = start.max(base);
        if end <= start {
            return 0..0;
        }
        let first = self.geometry.card_index(start);
        let last = self.geometry.card_index(end - 1) + 1;
        first.min(self.cards.len())..last.min(self.cards.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: usize = 0x10000;

    #[test]
    fn test_card_table_creation() {
        let table = CardTable::new(BASE, 4096, 512);
        assert_eq!(table.len(), 8);
        assert_eq!(table.card_size(), 512);
        assert_eq!(table.dirty_count(), 0);
    }

    #[test]
    fn test_mark_and_query() {
        let table = CardTable::new(BASE, 4096, 512);
        table.mark_card(BASE + 600);
        assert!(table.is_dirty(BASE + 512));
        assert!(table.is_dirty(BASE + 1023));
        assert!(!table.is_dirty(BASE));
        assert_eq!(table.get(1), CARD_DIRTY);
        assert_eq!(table.card_index(BASE + 600), Some(1));
        assert_eq!(table.addr_from_card(1), BASE + 512);
    }

    #[test]
    fn test_out_of_range_addresses_ignored() {
        let table = CardTable::new(BASE, 4096, 512);
        table.mark_card(BASE - 8);
        table.mark_card(BASE + 4096);
        assert_eq!(table.dirty_count(), 0);
        assert_eq!(table.card_index(BASE + 4096), None);
    }

    #[test]
    fn test_clear_card_range() {
        let table = CardTable::new(BASE, 4096, 512);
        for offset in (0..4096).step_by(512) {
            table.mark_card(BASE + offset);
        }
        table.clear_card_range(BASE + 512, BASE + 1536);
        assert_eq!(table.dirty_count(), 6);
        assert!(!table.is_dirty(BASE + 512));
        assert!(!table.is_dirty(BASE + 1024));
        assert!(table.is_dirty(BASE + 1536));
    }

    #[test]
    fn test_age_card_values() {
        assert_eq!(age_card(CARD_DIRTY), CARD_AGED);
        assert_eq!(age_card(CARD_AGED), CARD_CLEAN);
        assert_eq!(age_card(CARD_CLEAN), CARD_CLEAN);
    }

    #[test]
    fn test_modify_cards_atomic_reports_changes() {
        let table = CardTable::new(BASE, 4096, 512);
        table.mark_card(BASE);
        table.mark_card(BASE + 2048);

        let mut changed = Vec::new();
        table.modify_cards_atomic(BASE, BASE + 4096, age_card, |card, old, new| {
            changed.push((card, old, new));
        });
        assert_eq!(changed, vec![(0, CARD_DIRTY, CARD_AGED), (4, CARD_DIRTY, CARD_AGED)]);

        changed.clear();
        table.modify_cards_atomic(BASE, BASE + 4096, age_card, |card, old, new| {
            changed.push((card, old, new));
        });
        assert_eq!(changed, vec![(0, CARD_AGED, CARD_CLEAN), (4, CARD_AGED, CARD_CLEAN)]);
        assert_eq!(table.get(0), CARD_CLEAN);
    }

    #[test]
    fn test_for_each_dirty() {
        let table = CardTable::new(BASE, 4096, 512);
        table.mark_card(BASE + 1024);
        let mut ranges = Vec::new();
        table.for_each_dirty(|start, end| ranges.push((start, end)));
        assert_eq!(ranges, vec![(BASE + 1024, BASE + 1536)]);
    }
}
