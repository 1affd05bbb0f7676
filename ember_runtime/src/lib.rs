//! Ember Runtime
//!
//! Class metadata shared by the interpreter and the compilers.
//!
//! - [`subtype`]: path-to-root bitstrings that answer most
//!   `is_subclass_of` queries with one mask and compare.
//! - [`class`]: classes, their lifecycle [`ClassStatus`], and the
//!   [`ClassStatusWord`] that keeps status and subtype bits consistent for
//!   lock-free readers.
//! - [`ClassLinker`]: defines classes and keeps both halves up to date.
//!
//! ```
//! use ember_runtime::ClassLinker;
//!
//! let linker = ClassLinker::new();
//! let base = linker.define_class("Base", linker.object_class()).unwrap();
//! let derived = linker.define_class("Derived", &base).unwrap();
//! assert!(linker.instance_of_check(&derived, &base));
//! assert!(!linker.instance_of_check(&base, &derived));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod class;
pub mod config;
pub mod subtype;

pub use class::{Class, ClassFlags, ClassLinker, ClassStatus, ClassStatusWord, InstanceOfAndStatus, LinkError};
pub use config::{ConfigError, SubtypeCheckConfig};
pub use subtype::{
    BitstringState, SubtypeCheck, SubtypeCheckBits, SubtypeCheckInfo, SubtypeCheckNode, SubtypeCheckResult,
};
