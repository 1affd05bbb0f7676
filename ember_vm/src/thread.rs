//! Mutator threads and the registry the runtime uses to reach them.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::interpreter_cache::InterpreterCache;

// =============================================================================
// MutatorState
// =============================================================================

/// What a mutator thread is doing with respect to the managed heap.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutatorState {
    /// Executing managed code; may touch the heap at any time.
    Runnable = 0,
    /// Parked at a suspension point.
    Suspended = 1,
    /// Running native code that does not touch the heap.
    Native = 2,
}

impl MutatorState {
    /// Whether the collector may run while a thread is in this state.
    #[inline]
    pub fn is_safe_for_gc(self) -> bool {
        matches!(self, MutatorState::Suspended | MutatorState::Native)
    }

    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            1 => MutatorState::Suspended,
            2 => MutatorState::Native,
            _ => MutatorState::Runnable,
        }
    }
}

// =============================================================================
// Thread
// =============================================================================

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// A mutator thread known to the runtime.
pub struct Thread {
    id: u64,
    name: String,
    state: AtomicU8,
    interpreter_cache: InterpreterCache,
}

impl Thread {
    /// Attach the calling OS thread. Its interpreter cache is owned by the
    /// caller.
    pub fn attach_current(name: impl Into<String>) -> Self {
        let thread = Self {
            id: NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            state: AtomicU8::new(MutatorState::Runnable as u8),
            interpreter_cache: InterpreterCache::new(),
        };
        tracing::trace!(id = thread.id, name = %thread.name, "thread attached");
        thread
    }

    /// Runtime-assigned thread id (never reused).
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> MutatorState {
        MutatorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `state`.
    #[inline]
    pub fn set_state(&self, state: MutatorState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// The thread's dispatch cache.
    #[inline]
    pub fn interpreter_cache(&self) -> &InterpreterCache {
        &self.interpreter_cache
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

// =============================================================================
// ThreadList
// =============================================================================

/// Registry of attached threads.
#[derive(Default)]
pub struct ThreadList {
    threads: RwLock<Vec<Arc<Thread>>>,
}

impl ThreadList {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `thread`; returns the shared handle.
    pub fn register(&self, thread: Thread) -> Arc<Thread> {
        let thread = Arc::new(thread);
        self.threads.write().push(Arc::clone(&thread));
        thread
    }

    /// Remove the thread with `id`.
    ///
    /// When the registry held the last handle, the thread's cache memory is
    /// released immediately.
    pub fn unregister(&self, id: u64) -> bool {
        let removed = {
            let mut threads = self.threads.write();
            match threads.iter().position(|thread| thread.id == id) {
                Some(pos) => threads.swap_remove(pos),
                None => return false,
            }
        };
        if let Ok(mut thread) = Arc::try_unwrap(removed) {
            thread.interpreter_cache.clear_and_release();
        }
        tracing::trace!(id, "thread detached");
        true
    }

    /// Number of attached threads.
    pub fn len(&self) -> usize {
        self.threads.read().len()
    }

    /// No threads attached.
    pub fn is_empty(&self) -> bool {
        self.threads.read().is_empty()
    }

    /// Call `f` for every attached thread.
    pub fn for_each(&self, mut f: impl FnMut(&Thread)) {
        for thread in self.threads.read().iter() {
            f(thread);
        }
    }

    /// Invalidate every thread's interpreter cache.
    pub fn clear_all_interpreter_caches(&self) {
        let mut cleared = 0usize;
        self.for_each(|thread| {
            thread.interpreter_cache().clear();
            cleared += 1;
        });
        tracing::trace!(threads = cleared, "interpreter caches cleared");
    }

    /// Whether every attached thread is in a GC-safe state.
    pub fn all_safe_for_gc(&self) -> bool {
        self.threads.read().iter().all(|thread| thread.state().is_safe_for_gc())
    }
}

impl fmt::Debug for ThreadList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.threads.read().iter()).finish()
    }
}
