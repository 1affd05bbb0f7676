//! Ember Garbage Collector
//!
//! Heap spaces, card marking and remembered sets for the Ember runtime.
//!
//! # Architecture
//!
//! - **Spaces**: [`ContinuousSpace`]s are laid out back to back inside one
//!   reserved address range. Objects are word arrays with a header recording
//!   their reference slots.
//!
//! - **Card table**: one byte per card across the whole reservation. The
//!   [`write_barrier`](barrier::write_barrier) dirties the card of a holder
//!   that stores a reference into a tracked space.
//!
//! - **Remembered sets**: each space may own a [`RememberedSet`] of cards
//!   that point into one target space. Collections age dirty cards into the
//!   set and then scan only those cards, handing every reference into the
//!   target to a [`GarbageCollector`].
//!
//! # Usage
//!
//! ```
//! use ember_gc::{Heap, HeapConfig, MarkingCollector, SpaceKind};
//!
//! let mut heap = Heap::new(HeapConfig::small()).unwrap();
//! let old = heap.add_default_space("old", SpaceKind::FreeList).unwrap();
//! let young = heap.add_default_space("young", SpaceKind::BumpPointer).unwrap();
//! heap.create_remembered_set(old, young).unwrap();
//!
//! let holder = heap.alloc(old, 1, 0).unwrap();
//! let target = heap.alloc(young, 0, 0).unwrap();
//! heap.write_reference(holder, 0, target).unwrap();
//!
//! let set = heap.remembered_set(old).unwrap();
//! set.clear_cards(&heap);
//! let mut marker = MarkingCollector::new();
//! set.update_and_mark_references(&heap, young, &mut marker, None);
//! assert!(marker.is_marked(target));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(not(target_pointer_width = "64"))]
compile_error!("ember_gc packs object headers into 64-bit words");

pub mod barrier;
pub mod collector;
pub mod config;
pub mod heap;

mod stats;

// Re-exports for convenient access
pub use barrier::{CardTable, RememberedSet, ScanSummary};
pub use collector::{GarbageCollector, MarkingCollector, Scavenger};
pub use config::{ConfigError, HeapConfig};
pub use heap::{ContinuousSpace, Heap, HeapError, SpaceId, SpaceKind};
pub use stats::{GcStats, GcTimer};
