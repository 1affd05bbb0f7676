//! Interpreter dispatch fast path.
//!
//! 1. **Interpreter cache** - per thread, lock-free hit path
//! 2. **Resolver** - shared slow path, may itself memoize
//!    ([`CachingResolver`])
//!
//! Breakpoints take priority over the resolver so an instrumented
//! instruction always dispatches to [`BREAKPOINT_HANDLER`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::instrumentation::Instrumentation;
use crate::resolution_cache::NativePairArray;
use crate::thread::Thread;

/// Dispatch value of instructions with a breakpoint.
pub const BREAKPOINT_HANDLER: usize = usize::MAX >> 16;

/// Slow-path resolution of an instruction address to a dispatch value.
pub trait DispatchResolver: Send + Sync {
    /// Resolve `insn_addr`. The result must be non-zero.
    fn resolve(&self, insn_addr: usize) -> usize;
}

impl<F> DispatchResolver for F
where
    F: Fn(usize) -> usize + Send + Sync,
{
    #[inline]
    fn resolve(&self, insn_addr: usize) -> usize {
        self(insn_addr)
    }
}

/// Resolver that memoizes another resolver's answers in a
/// [`NativePairArray`] shared by all threads. Addresses above
/// [`MAX_INDEX`](crate::resolution_cache::MAX_INDEX) always go to the inner
/// resolver.
pub struct CachingResolver<R, const N: usize> {
    inner: R,
    cache: NativePairArray<N>,
}

impl<R: DispatchResolver, const N: usize> CachingResolver<R, N> {
    /// Wrap `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: NativePairArray::new(),
        }
    }

    /// The shared memo.
    pub fn cache(&self) -> &NativePairArray<N> {
        &self.cache
    }
}

impl<R: DispatchResolver, const N: usize> DispatchResolver for CachingResolver<R, N> {
    fn resolve(&self, insn_addr: usize) -> usize {
        if let Some(value) = self.cache.get(insn_addr) {
            return value;
        }
        let value = self.inner.resolve(insn_addr);
        if !self.cache.set(insn_addr, value) {
            tracing::trace!(addr = insn_addr, "address too wide to memoize");
        }
        value
    }
}

/// Dispatch hit/miss counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Lookups answered by the interpreter cache.
    pub hits: AtomicU64,
    /// Lookups that went to the resolver.
    pub misses: AtomicU64,
    /// Misses answered with [`BREAKPOINT_HANDLER`].
    pub breakpoint_hits: AtomicU64,
}

impl DispatchStats {
    /// Fraction of lookups answered by the cache, in `[0, 1]`.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 { 0.0 } else { hits as f64 / total as f64 }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.breakpoint_hits.store(0, Ordering::Relaxed);
    }
}

/// Maps instruction addresses to dispatch values for the calling thread.
pub struct Dispatcher<R> {
    resolver: R,
    instrumentation: Arc<Instrumentation>,
    stats: DispatchStats,
}

impl<R: DispatchResolver> Dispatcher<R> {
    /// Dispatcher resolving misses through `resolver`.
    pub fn new(resolver: R, instrumentation: Arc<Instrumentation>) -> Self {
        Self {
            resolver,
            instrumentation,
            stats: DispatchStats::default(),
        }
    }

    /// The slow-path resolver.
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Counters.
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Dispatch value of `insn_addr` for `thread`, the calling thread.
    pub fn dispatch(&self, thread: &Thread, insn_addr: usize) -> usize {
        let cache = thread.interpreter_cache();
        if let Some(value) = cache.get(insn_addr) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return value;
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        // Select the owned table before consulting breakpoints: a breakpoint
        // change after this point clears the cache, so the store below is
        // either dropped or wiped.
        cache.ensure_writable();
        let value = if self.instrumentation.has_breakpoint(insn_addr) {
            self.stats.breakpoint_hits.fetch_add(1, Ordering::Relaxed);
            BREAKPOINT_HANDLER
        } else {
            self.resolver.resolve(insn_addr)
        };
        cache.set(insn_addr, value);
        value
    }
}
