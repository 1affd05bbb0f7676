//! Subtype-check bits interpreted at a known class depth.

use std::fmt;

use super::bitstring::{BIT_STRING_CAPACITY, BitChar};
use super::check_bits::{BitstringState, SubtypeCheckBits, path_mask};

/// Outcome of a fast subtype check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubtypeCheckResult {
    /// The encoding cannot decide; fall back to walking superclasses.
    Unknown,
    /// The source is not a subtype of the target.
    NotSubtypeOf,
    /// The source is a subtype of the target.
    SubtypeOf,
}

/// [`SubtypeCheckBits`] of one class together with its depth in the
/// hierarchy (the root is at depth 0).
///
/// The position at `depth` in the bitstring is the class's "next" counter:
/// the character its next assigned subclass receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubtypeCheckInfo {
    bits: SubtypeCheckBits,
    depth: usize,
    max_depth: usize,
}

impl SubtypeCheckInfo {
    /// Interpret `bits` for a class at `depth`. Subclasses can only be
    /// assigned below `max_depth`.
    #[inline]
    pub fn from_bits(bits: SubtypeCheckBits, depth: usize, max_depth: usize) -> Self {
        debug_assert!((1..=BIT_STRING_CAPACITY).contains(&max_depth));
        Self { bits, depth, max_depth }
    }

    /// Info for the root class: depth 0, next counter 1, `Assigned`.
    pub fn create_root(max_depth: usize) -> Self {
        let bits = SubtypeCheckBits::initialize_bitstring(SubtypeCheckBits::default(), 0);
        let root = Self::from_bits(bits, 0, max_depth);
        debug_assert_eq!(root.state(), BitstringState::Assigned);
        root
    }

    /// Info for a new direct subclass of `self`.
    ///
    /// Without `assign` the child is `Initialized`: it shares this class's
    /// path. With `assign` it takes this class's next counter as its own
    /// path character and the counter is bumped. The child is `Overflowed`
    /// instead when this class is overflowed, sits at `max_depth`, or has
    /// used every character of the next position.
    pub fn create_child(&mut self, assign: bool) -> SubtypeCheckInfo {
        debug_assert!(
            matches!(self.state(), BitstringState::Assigned | BitstringState::Overflowed),
            "parent must be Assigned or Overflowed, was {}",
            self.state()
        );
        let child_depth = self.depth + 1;
        let mut child = Self::from_bits(
            SubtypeCheckBits::initialize_bitstring(self.bits, child_depth),
            child_depth,
            self.max_depth,
        );
        debug_assert_ne!(child.state(), BitstringState::Assigned);
        debug_assert_ne!(child.state(), BitstringState::Uninitialized);
        if !assign {
            return child;
        }

        match self.next() {
            Some(next) if !self.bits.is_overflowed() && next.data() != next.max_value() => {
                child.set_path_char(self.depth, next);
                self.set_next(next.incremented());
            }
            _ => {
                child.bits.mark_overflowed();
                tracing::trace!(depth = child_depth, parent = %self, "subtype bitstring overflowed");
            }
        }
        debug_assert!(matches!(
            child.state(),
            BitstringState::Assigned | BitstringState::Overflowed
        ));
        child
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> BitstringState {
        self.bits.state(self.depth)
    }

    /// Stored bits.
    #[inline]
    pub fn bits(&self) -> SubtypeCheckBits {
        self.bits
    }

    /// Depth in the hierarchy.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Path characters packed LSB-first, next counter excluded.
    #[inline]
    pub fn encoded_path_to_root(&self) -> u64 {
        self.bits.path_to_root(self.depth).raw()
    }

    /// Mask selecting the path characters in
    /// [`encoded_path_to_root`](Self::encoded_path_to_root).
    #[inline]
    pub fn encoded_path_to_root_mask(&self) -> u64 {
        path_mask(self.depth)
    }

    /// Fast subtype check of `self` against `target`.
    pub fn is_subtype_of(&self, target: &SubtypeCheckInfo) -> SubtypeCheckResult {
        if target.state() != BitstringState::Assigned || self.state() == BitstringState::Uninitialized {
            return SubtypeCheckResult::Unknown;
        }
        let source = self.encoded_path_to_root();
        if source & target.encoded_path_to_root_mask() == target.encoded_path_to_root() {
            debug_assert!(target.depth <= self.depth);
            SubtypeCheckResult::SubtypeOf
        } else {
            SubtypeCheckResult::NotSubtypeOf
        }
    }

    /// The next counter, if subclasses may still be assigned below this
    /// class.
    fn next(&self) -> Option<BitChar> {
        (self.depth < self.max_depth).then(|| self.bits.bitstring().get(self.depth))
    }

    fn set_next(&mut self, next: BitChar) {
        self.set_path_char(self.depth, next);
    }

    fn set_path_char(&mut self, position: usize, value: BitChar) {
        let mut bitstring = self.bits.bitstring();
        bitstring.set_at(position, value);
        self.bits = self.bits.with_bitstring(bitstring);
    }
}

impl fmt::Display for SubtypeCheckInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SubtypeCheckInfo{{{}, depth: {}, state: {}}}",
            self.bits.bitstring(),
            self.depth,
            self.state()
        )
    }
}
