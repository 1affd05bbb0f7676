//! O(1) subtype checks with path-to-root bitstrings.
//!
//! Every class stores the path from the root of the single-inheritance
//! hierarchy to itself as a [`BitString`]: one character per level, each
//! character unique among its siblings. `S` is a subclass of `T` exactly when
//! `T`'s path is a prefix of `S`'s, which is one mask and compare.
//!
//! The alphabet is small, so characters are handed out lazily:
//!
//! - a class that is only ever a *source* of checks keeps its parent's path
//!   (`Initialized`),
//! - a class used as a *target* gets its own character (`Assigned`), and so
//!   do all of its ancestors,
//! - a class that cannot get a character because its level is full, it is
//!   too deep, or an ancestor already overflowed is `Overflowed`. Checks
//!   against it report [`SubtypeCheckResult::Unknown`] and callers fall back
//!   to walking superclasses.
//!
//! ```text
//!            Object [Ø]                 depth 0
//!           /          \
//!     Base [1]        Other [2]         depth 1
//!        |
//!   Derived [1,1]                       depth 2
//! ```
//!
//! Assignment mutates both the class and its superclass (the superclass's
//! next counter), so all writers go through [`SubtypeCheck::lock`]. Readers
//! need no lock: each class's bits are read atomically from its status word.

mod bitstring;
mod check_bits;
mod info;

pub use bitstring::{
    BIT_STRING_BITS, BIT_STRING_CAPACITY, BIT_STRING_WIDTHS, BitChar, BitString,
    bit_length_total_at_position,
};
pub use check_bits::{BitstringState, SUBTYPE_CHECK_BITS_WIDTH, SubtypeCheckBits};
pub use info::{SubtypeCheckInfo, SubtypeCheckResult};

use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;

use crate::config::SubtypeCheckConfig;

/// A class as seen by the subtype-check engine.
pub trait SubtypeCheckNode {
    /// Distance from the root (the root is at depth 0).
    fn depth(&self) -> usize;

    /// Direct superclass; `None` only for the root.
    fn parent(&self) -> Option<&Self>;

    /// Atomically read the stored bits.
    fn read_bits(&self) -> SubtypeCheckBits;

    /// Atomically replace the stored bits.
    fn write_bits(&self, bits: SubtypeCheckBits);
}

/// Proof that the caller holds the subtype-check lock.
pub struct SubtypeCheckGuard<'a> {
    engine: &'a SubtypeCheck,
    _guard: MutexGuard<'a, ()>,
}

/// Assigns bitstrings and answers subtype queries for one hierarchy.
#[derive(Debug)]
pub struct SubtypeCheck {
    lock: Mutex<()>,
    config: SubtypeCheckConfig,
}

impl SubtypeCheck {
    /// Create an engine with a validated configuration.
    pub fn new(config: SubtypeCheckConfig) -> Self {
        debug_assert!(config.validate().is_ok());
        Self {
            lock: Mutex::new(()),
            config,
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &SubtypeCheckConfig {
        &self.config
    }

    /// Acquire the lock serializing bitstring writers.
    pub fn lock(&self) -> SubtypeCheckGuard<'_> {
        SubtypeCheckGuard {
            engine: self,
            _guard: self.lock.lock(),
        }
    }

    /// Current info of `node`.
    #[inline]
    pub fn info_of<N: SubtypeCheckNode>(&self, node: &N) -> SubtypeCheckInfo {
        SubtypeCheckInfo::from_bits(node.read_bits(), node.depth(), self.config.max_depth)
    }

    /// Make `node` at least `Initialized`; returns the resulting state.
    ///
    /// Every ancestor becomes `Assigned` or `Overflowed` first.
    pub fn ensure_initialized<N: SubtypeCheckNode>(&self, guard: &SubtypeCheckGuard<'_>, node: &N) -> BitstringState {
        self.check_guard(guard);
        self.initialize_or_assign(node, false).state()
    }

    /// Make `node` `Assigned` (or `Overflowed`); returns the resulting state.
    pub fn ensure_assigned<N: SubtypeCheckNode>(&self, guard: &SubtypeCheckGuard<'_>, node: &N) -> BitstringState {
        self.check_guard(guard);
        self.initialize_or_assign(node, true).state()
    }

    /// Lock-free fast check of `source <: target`.
    #[inline]
    pub fn is_subtype_of<N: SubtypeCheckNode>(&self, source: &N, target: &N) -> SubtypeCheckResult {
        self.info_of(source).is_subtype_of(&self.info_of(target))
    }

    fn check_guard(&self, guard: &SubtypeCheckGuard<'_>) {
        debug_assert!(
            std::ptr::eq(guard.engine, self),
            "subtype-check guard belongs to another engine"
        );
    }

    fn initialize_or_assign<N: SubtypeCheckNode>(&self, node: &N, assign: bool) -> SubtypeCheckInfo {
        let mut ancestors: SmallVec<[&N; BIT_STRING_CAPACITY + 2]> = SmallVec::new();
        let mut current = node.parent();
        while let Some(ancestor) = current {
            ancestors.push(ancestor);
            current = ancestor.parent();
        }
        // Root first, so each ancestor's parent is already Assigned|Overflowed.
        for ancestor in ancestors.iter().rev() {
            self.update(*ancestor, true);
        }
        self.update(node, assign)
    }

    fn update<N: SubtypeCheckNode>(&self, node: &N, assign: bool) -> SubtypeCheckInfo {
        let info = self.info_of(node);
        let state = info.state();

        let Some(parent) = node.parent() else {
            if state != BitstringState::Uninitialized {
                return info;
            }
            let root = SubtypeCheckInfo::create_root(self.config.max_depth);
            node.write_bits(root.bits());
            return root;
        };

        let needs_update = state == BitstringState::Uninitialized
            || (assign && state == BitstringState::Initialized);
        if !needs_update {
            return info;
        }

        let mut parent_info = self.info_of(parent);
        debug_assert!(
            matches!(
                parent_info.state(),
                BitstringState::Assigned | BitstringState::Overflowed
            ),
            "expected parent Assigned|Overflowed, was {}",
            parent_info.state()
        );
        let parent_before = parent_info.bits();
        let child = parent_info.create_child(assign);
        node.write_bits(child.bits());
        if parent_info.bits() != parent_before {
            parent.write_bits(parent_info.bits());
        }
        child
    }
}

impl Default for SubtypeCheck {
    fn default() -> Self {
        Self::new(SubtypeCheckConfig::default())
    }
}
