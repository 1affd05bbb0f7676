//! Ember VM
//!
//! Interpreter-side machinery that sits between mutator threads and the
//! rest of the runtime:
//!
//! - [`InterpreterCache`]: per-thread, direct-mapped dispatch cache that
//!   foreign threads can read and invalidate without locks.
//! - [`ThreadList`]: registry of attached [`Thread`]s, used for global
//!   cache invalidation and GC-safety queries.
//! - [`Instrumentation`]: breakpoints; every change invalidates all caches.
//! - [`Dispatcher`]: cache-first dispatch with a [`DispatchResolver`] slow
//!   path, optionally memoized across threads by [`CachingResolver`].
//!
//! ```
//! use std::sync::Arc;
//! use ember_vm::{Dispatcher, Instrumentation, Thread, ThreadList};
//!
//! let threads = Arc::new(ThreadList::new());
//! let instrumentation = Arc::new(Instrumentation::new(Arc::clone(&threads)));
//! let thread = threads.register(Thread::attach_current("main"));
//!
//! let dispatcher = Dispatcher::new(|addr: usize| addr + 1, instrumentation);
//! assert_eq!(dispatcher.dispatch(&thread, 0x40), 0x41);
//! assert_eq!(thread.interpreter_cache().get(0x40), Some(0x41));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dispatch;
pub mod instrumentation;
pub mod interpreter_cache;
pub mod resolution_cache;
pub mod thread;

pub use dispatch::{BREAKPOINT_HANDLER, CachingResolver, DispatchResolver, DispatchStats, Dispatcher};
pub use instrumentation::Instrumentation;
pub use interpreter_cache::{
    BufferSlot, CacheTable, INTERPRETER_CACHE_SIZE, InterpreterCache, SHARED_EMPTY_TABLE,
};
pub use resolution_cache::NativePairArray;
pub use thread::{MutatorState, Thread, ThreadList};
