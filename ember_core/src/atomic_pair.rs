//! Atomic pairs of machine words.
//!
//! A 16-byte pair cannot be published with a single native store on every
//! target, so [`AtomicPair`] uses a seqlock: the top 16 bits of `first`
//! hold a lock bit and a version counter. Readers never write to the shared
//! cache line, which keeps hot read paths (interpreter caches, class status
//! words) free of cache-line ping-pong.
//!
//! ```text
//!  first:  | seq (15 bits) | L | payload (48 bits) |
//!  second: |             payload (64 bits)         |
//! ```
//!
//! The 8-byte pair ([`AtomicPair32`]) fits in one native atomic and needs no
//! seqlock.

use std::hint;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bits of `first` reserved for the lock bit and the sequence counter.
pub const SEQ_MASK: u64 = 0xFFFF << 48;
/// Lock bit, held by a writer while it publishes a new pair.
pub const SEQ_LOCK: u64 = 0x0001 << 48;
/// Sequence increment applied on every completed store.
pub const SEQ_INCR: u64 = 0x0002 << 48;

/// Two `u64` values read and written as one atomic unit.
///
/// The stored `first` value must leave the bits in [`SEQ_MASK`] clear; they
/// belong to the seqlock. Pointers and small indices satisfy this on every
/// 64-bit target with a 48-bit address space.
///
/// # Example
///
/// ```
/// use ember_core::AtomicPair;
///
/// let pair = AtomicPair::new(1, 2);
/// pair.store(3, 4);
/// assert_eq!(pair.load(), (3, 4));
/// ```
#[derive(Debug)]
#[repr(C, align(16))]
pub struct AtomicPair {
    first: AtomicU64,
    second: AtomicU64,
}

impl AtomicPair {
    /// Create a pair holding `(first, second)`.
    #[inline]
    pub const fn new(first: u64, second: u64) -> Self {
        debug_assert!(first & SEQ_MASK == 0, "first word overlaps the seqlock bits");
        Self {
            first: AtomicU64::new(first),
            second: AtomicU64::new(second),
        }
    }

    /// Take a consistent snapshot of both words.
    ///
    /// Wait-free when no writer is active; otherwise retries until it reads
    /// the same unlocked sequence before and after `second`.
    #[inline]
    pub fn load(&self) -> (u64, u64) {
        loop {
            let key0 = self.first.load(Ordering::Acquire);
            let value = self.second.load(Ordering::Acquire);
            let key1 = self.first.load(Ordering::Acquire);
            if key0 == key1 && key0 & SEQ_LOCK == 0 {
                return (key0 & !SEQ_MASK, value);
            }
            hint::spin_loop();
        }
    }

    /// Publish a new pair.
    ///
    /// Writers are expected to be serialized by a higher layer; concurrent
    /// writers are still correct, they just spin on the lock bit.
    #[inline]
    pub fn store(&self, first: u64, second: u64) {
        debug_assert_eq!(first & SEQ_MASK, 0, "first word overlaps the seqlock bits");
        let key = self.lock();
        self.second.store(second, Ordering::Release);
        self.first.store(Self::next_key(key, first), Ordering::Release);
    }

    /// Read-modify-write both words while holding the lock bit.
    ///
    /// `f` receives the current pair and returns the pair to publish. Used
    /// when two writers each own one half of the pair and must not clobber
    /// each other's half. Returns the published pair.
    pub fn update<F>(&self, f: F) -> (u64, u64)
    where
        F: FnOnce(u64, u64) -> (u64, u64),
    {
        let key = self.lock();
        // The lock bit excludes other writers, so relaxed reads see the last
        // published values.
        let current_second = self.second.load(Ordering::Relaxed);
        let (first, second) = f(key & !SEQ_MASK, current_second);
        debug_assert_eq!(first & SEQ_MASK, 0, "first word overlaps the seqlock bits");
        self.second.store(second, Ordering::Release);
        self.first.store(Self::next_key(key, first), Ordering::Release);
        (first, second)
    }

    /// Current sequence number (number of completed stores, modulo 2^15).
    #[inline]
    pub fn sequence(&self) -> u64 {
        (self.first.load(Ordering::Acquire) & SEQ_MASK) / SEQ_INCR
    }

    /// Spin until the lock bit is acquired; returns the unlocked key seen.
    #[inline]
    fn lock(&self) -> u64 {
        loop {
            let key = self.first.load(Ordering::Relaxed);
            if key & SEQ_LOCK != 0 {
                hint::spin_loop();
                continue;
            }
            if self
                .first
                .compare_exchange_weak(key, key | SEQ_LOCK, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return key;
            }
        }
    }

    #[inline]
    fn next_key(locked_key: u64, first: u64) -> u64 {
        let seq = (locked_key & SEQ_MASK).wrapping_add(SEQ_INCR) & SEQ_MASK;
        (first & !SEQ_MASK) | seq
    }
}

impl Default for AtomicPair {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Two `u32` values packed into one native 64-bit atomic.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct AtomicPair32 {
    packed: AtomicU64,
}

impl AtomicPair32 {
    /// Create a pair holding `(first, second)`.
    #[inline]
    pub const fn new(first: u32, second: u32) -> Self {
        Self {
            packed: AtomicU64::new(Self::pack(first, second)),
        }
    }

    /// Snapshot both halves.
    #[inline]
    pub fn load(&self) -> (u32, u32) {
        Self::unpack(self.packed.load(Ordering::Acquire))
    }

    /// Publish both halves.
    #[inline]
    pub fn store(&self, first: u32, second: u32) {
        self.packed
            .store(Self::pack(first, second), Ordering::Release);
    }

    #[inline]
    const fn pack(first: u32, second: u32) -> u64 {
        (first as u64) | ((second as u64) << 32)
    }

    #[inline]
    const fn unpack(packed: u64) -> (u32, u32) {
        (packed as u32, (packed >> 32) as u32)
    }
}
