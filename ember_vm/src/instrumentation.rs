//! Breakpoints and the instrumentation epoch.
//!
//! Dispatch values cached before a breakpoint change are stale, so every
//! change bumps the epoch and clears all interpreter caches.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashSet;

use crate::thread::ThreadList;

/// Global instrumentation state.
pub struct Instrumentation {
    breakpoints: RwLock<FxHashSet<usize>>,
    epoch: AtomicU64,
    threads: Arc<ThreadList>,
}

impl Instrumentation {
    /// Instrumentation for the threads in `threads`.
    pub fn new(threads: Arc<ThreadList>) -> Self {
        Self {
            breakpoints: RwLock::new(FxHashSet::default()),
            epoch: AtomicU64::new(0),
            threads,
        }
    }

    /// Threads whose caches are invalidated on changes.
    pub fn threads(&self) -> &Arc<ThreadList> {
        &self.threads
    }

    /// Number of changes so far.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Whether a breakpoint is set at `insn_addr`.
    #[inline]
    pub fn has_breakpoint(&self, insn_addr: usize) -> bool {
        self.breakpoints.read().contains(&insn_addr)
    }

    /// Number of installed breakpoints.
    pub fn breakpoint_count(&self) -> usize {
        self.breakpoints.read().len()
    }

    /// Set a breakpoint. Returns `false` if one was already set there.
    pub fn install_breakpoint(&self, insn_addr: usize) -> bool {
        if !self.breakpoints.write().insert(insn_addr) {
            return false;
        }
        self.changed();
        tracing::info!(addr = insn_addr, "breakpoint installed");
        true
    }

    /// Remove a breakpoint. Returns `false` if none was set there.
    pub fn remove_breakpoint(&self, insn_addr: usize) -> bool {
        if !self.breakpoints.write().remove(&insn_addr) {
            return false;
        }
        self.changed();
        tracing::info!(addr = insn_addr, "breakpoint removed");
        true
    }

    fn changed(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.threads.clear_all_interpreter_caches();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::Thread;

    #[test]
    fn test_install_and_remove() {
        let threads = Arc::new(ThreadList::new());
        let instrumentation = Instrumentation::new(Arc::clone(&threads));

        assert!(instrumentation.install_breakpoint(0x40));
        assert!(!instrumentation.install_breakpoint(0x40));
        assert!(instrumentation.has_breakpoint(0x40));
        assert_eq!(instrumentation.epoch(), 1);

        assert!(instrumentation.remove_breakpoint(0x40));
        assert!(!instrumentation.remove_breakpoint(0x40));
        assert_eq!(instrumentation.breakpoint_count(), 0);
        assert_eq!(instrumentation.epoch(), 2);
    }

    #[test]
    fn test_changes_clear_caches() {
        let threads = Arc::new(ThreadList::new());
        let thread = threads.register(Thread::attach_current("main"));
        let instrumentation = Instrumentation::new(Arc::clone(&threads));

        let cache = thread.interpreter_cache();
        cache.ensure_writable();
        cache.set(0x50, 3);
        instrumentation.install_breakpoint(0x40);
        assert_eq!(cache.get(0x50), None);
        assert!(!cache.is_writable());
    }
}
