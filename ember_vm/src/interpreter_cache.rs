//! Per-thread interpreter dispatch cache.
//!
//! A small direct-mapped table from instruction address to a dispatch value
//! (decoded handler, resolved field or method). Each mutator thread owns one
//! cache and is its only writer. Other threads (the collector, the
//! instrumentation layer) may read entries or invalidate the whole cache at
//! any time, so the table is built from [`AtomicPair`]s and invalidation is a
//! single atomic store.
//!
//! # Buffers
//!
//! ```text
//!   active ──► SharedEmpty ──► SHARED_EMPTY_TABLE   (static, never written)
//!          └─► Owned       ──► owned table          (lazily allocated)
//! ```
//!
//! [`InterpreterCache::clear`] switches the selector to the shared empty
//! table; writes are dropped until the owner calls
//! [`InterpreterCache::ensure_writable`], which wipes the owned table and
//! selects it again. Foreign threads therefore never write to memory the
//! owner may be writing.

use std::fmt;
use std::mem;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, ThreadId};

use ember_core::{AtomicPair, SEQ_MASK};

/// Number of entries per table. One table fills a 4 KiB page.
pub const INTERPRETER_CACHE_SIZE: usize = 256;

const ENTRY_SHIFT: u32 = mem::size_of::<AtomicPair>().trailing_zeros();

const _: () = assert!(INTERPRETER_CACHE_SIZE.is_power_of_two());
const _: () = assert!(mem::size_of::<CacheTable>() == 4096);

/// Direct-mapped table of `(key, value)` entries. Key `0` marks an empty
/// entry.
#[repr(C, align(4096))]
pub struct CacheTable {
    entries: [AtomicPair; INTERPRETER_CACHE_SIZE],
}

impl CacheTable {
    /// A table with every entry empty.
    pub const fn new() -> Self {
        Self {
            entries: [const { AtomicPair::new(0, 0) }; INTERPRETER_CACHE_SIZE],
        }
    }

    #[inline]
    fn get(&self, key: usize) -> Option<usize> {
        let (stored, value) = self.entries[index_of(key)].load();
        (stored == key as u64).then_some(value as usize)
    }

    #[inline]
    fn set(&self, key: usize, value: usize) {
        self.entries[index_of(key)].store(key as u64, value as u64);
    }

    fn wipe(&self) {
        for entry in &self.entries {
            entry.store(0, 0);
        }
    }

    fn occupied(&self) -> usize {
        self.entries.iter().filter(|entry| entry.load().0 != 0).count()
    }
}

impl Default for CacheTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Table selected by cleared caches. Never written.
pub static SHARED_EMPTY_TABLE: CacheTable = CacheTable::new();

/// Which table an [`InterpreterCache`] currently reads and writes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSlot {
    /// [`SHARED_EMPTY_TABLE`]: every lookup misses, writes are dropped.
    SharedEmpty = 0,
    /// The owner's private table.
    Owned = 1,
}

impl BufferSlot {
    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            1 => BufferSlot::Owned,
            _ => BufferSlot::SharedEmpty,
        }
    }
}

/// Slot of `key` in a table.
#[inline]
pub const fn index_of(key: usize) -> usize {
    (key >> ENTRY_SHIFT) & (INTERPRETER_CACHE_SIZE - 1)
}

/// A thread's dispatch cache.
pub struct InterpreterCache {
    owner: ThreadId,
    active: AtomicU8,
    owned: OnceLock<Box<CacheTable>>,
}

impl InterpreterCache {
    /// Cache owned by the calling thread. Starts cleared; no table is
    /// allocated until the first [`ensure_writable`](Self::ensure_writable).
    pub fn new() -> Self {
        Self::with_owner(thread::current().id())
    }

    /// Cache owned by `owner`.
    pub fn with_owner(owner: ThreadId) -> Self {
        Self {
            owner,
            active: AtomicU8::new(BufferSlot::SharedEmpty as u8),
            owned: OnceLock::new(),
        }
    }

    /// The owning thread.
    #[inline]
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Currently selected table.
    #[inline]
    pub fn active_slot(&self) -> BufferSlot {
        BufferSlot::from_u8(self.active.load(Ordering::Acquire))
    }

    /// Whether [`set`](Self::set) currently stores anything.
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.active_slot() == BufferSlot::Owned
    }

    /// Whether the owned table is allocated.
    pub fn has_owned_table(&self) -> bool {
        self.owned.get().is_some()
    }

    /// Cached value for `key`. Misses when the key was never stored, was
    /// evicted by a colliding key, or the cache was cleared since.
    ///
    /// Callable from any thread; never blocks on the owner.
    #[inline]
    pub fn get(&self, key: usize) -> Option<usize> {
        if key == 0 {
            return None;
        }
        self.table().get(key)
    }

    /// Store `value` for `key`, evicting whatever shared its slot.
    ///
    /// Owner only. Dropped while the cache is cleared.
    #[inline]
    pub fn set(&self, key: usize, value: usize) {
        self.debug_assert_owner();
        debug_assert_ne!(key, 0, "key 0 marks empty entries");
        debug_assert_eq!(key as u64 & SEQ_MASK, 0, "key does not fit an atomic pair");
        if let (BufferSlot::Owned, Some(table)) = (self.active_slot(), self.owned.get()) {
            table.set(key, value);
        }
    }

    /// Invalidate every entry. Callable from any thread.
    ///
    /// The owned table stays allocated; readers that raced with the clear
    /// may still finish a lookup in it.
    pub fn clear(&self) {
        self.active.store(BufferSlot::SharedEmpty as u8, Ordering::Release);
    }

    /// Invalidate every entry and free the owned table.
    ///
    /// Exclusive access guarantees no reader is inside the table.
    pub fn clear_and_release(&mut self) {
        *self.active.get_mut() = BufferSlot::SharedEmpty as u8;
        self.owned.take();
    }

    /// Make [`set`](Self::set) effective again after a clear. Owner only.
    ///
    /// Allocates the owned table on first use and wipes entries left from
    /// before the last clear.
    pub fn ensure_writable(&self) {
        self.debug_assert_owner();
        if self.is_writable() {
            return;
        }
        let table = self.owned.get_or_init(|| Box::new(CacheTable::new()));
        table.wipe();
        self.active.store(BufferSlot::Owned as u8, Ordering::Release);
    }

    /// Number of occupied entries in the active table.
    pub fn occupied(&self) -> usize {
        self.table().occupied()
    }

    #[inline]
    fn table(&self) -> &CacheTable {
        match (self.active_slot(), self.owned.get()) {
            (BufferSlot::Owned, Some(table)) => table,
            _ => &SHARED_EMPTY_TABLE,
        }
    }

    #[inline]
    fn debug_assert_owner(&self) {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "interpreter cache written by a thread that does not own it"
        );
    }
}

impl Default for InterpreterCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InterpreterCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpreterCache")
            .field("owner", &self.owner)
            .field("active", &self.active_slot())
            .field("allocated", &self.has_owned_table())
            .field("occupied", &self.occupied())
            .finish()
    }
}
