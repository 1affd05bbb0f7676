//! Ember Core
//!
//! Low-level building blocks shared by the heap, the class linker and the
//! interpreter:
//!
//! - [`AtomicPair`]: a seqlock-protected pair of 64-bit words that readers
//!   can snapshot without ever observing a torn combination.
//! - [`AtomicPair32`]: two 32-bit values packed into a single native atomic.
//! - [`bit_utils`]: bit-field extraction/insertion helpers used by packed
//!   metadata words (subtype bitstrings, status words).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atomic_pair;
pub mod bit_utils;

pub use atomic_pair::{AtomicPair, AtomicPair32, SEQ_INCR, SEQ_LOCK, SEQ_MASK};
