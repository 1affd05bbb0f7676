//! Classes, their status words and the linker that builds the hierarchy.

mod linker;
mod status;
mod status_word;

pub use linker::{ClassLinker, LinkError, OBJECT_CLASS_NAME};
pub use status::ClassStatus;
pub use status_word::{ClassStatusWord, InstanceOfAndStatus};

use std::fmt;
use std::sync::Arc;

use crate::subtype::{SubtypeCheckBits, SubtypeCheckNode};

bitflags::bitflags! {
    /// Access flags relevant to linking.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClassFlags: u32 {
        /// Cannot be subclassed.
        const FINAL = 1 << 0;
        /// Cannot be instantiated.
        const ABSTRACT = 1 << 1;
        /// Interface type; never a superclass.
        const INTERFACE = 1 << 2;
    }
}

/// A class in the single-inheritance hierarchy.
pub struct Class {
    name: String,
    flags: ClassFlags,
    super_class: Option<Arc<Class>>,
    depth: usize,
    status: ClassStatusWord,
}

impl Class {
    /// The hierarchy root (no superclass, depth 0).
    pub fn new_root(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: ClassFlags::empty(),
            super_class: None,
            depth: 0,
            status: ClassStatusWord::new(),
        }
    }

    /// A direct subclass of `super_class`.
    pub fn new(name: impl Into<String>, flags: ClassFlags, super_class: Arc<Class>) -> Self {
        Self {
            name: name.into(),
            flags,
            depth: super_class.depth + 1,
            super_class: Some(super_class),
            status: ClassStatusWord::new(),
        }
    }

    /// Fully qualified name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Access flags.
    #[inline]
    pub fn flags(&self) -> ClassFlags {
        self.flags
    }

    /// Direct superclass.
    #[inline]
    pub fn super_class(&self) -> Option<&Arc<Class>> {
        self.super_class.as_ref()
    }

    /// Distance from the root.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Current lifecycle status.
    #[inline]
    pub fn status(&self) -> ClassStatus {
        self.status.status()
    }

    /// The composite status word.
    #[inline]
    pub fn status_word(&self) -> &ClassStatusWord {
        &self.status
    }

    /// Linking failed for this class.
    #[inline]
    pub fn is_erroneous(&self) -> bool {
        self.status().is_erroneous()
    }

    /// Whether `self` is `other` or descends from it, by walking superclasses.
    pub fn is_subclass_of_slow(&self, other: &Class) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if std::ptr::eq(class, other) {
                return true;
            }
            current = class.super_class.as_deref();
        }
        false
    }

    /// Superclasses from the direct superclass up to the root.
    pub fn superclasses(&self) -> impl Iterator<Item = &Class> {
        std::iter::successors(self.super_class.as_deref(), |class| class.super_class.as_deref())
    }
}

impl SubtypeCheckNode for Class {
    #[inline]
    fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    fn parent(&self) -> Option<&Self> {
        self.super_class.as_deref()
    }

    #[inline]
    fn read_bits(&self) -> SubtypeCheckBits {
        self.status.subtype_bits()
    }

    #[inline]
    fn write_bits(&self, bits: SubtypeCheckBits) {
        self.status.write_subtype_bits(bits);
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("depth", &self.depth)
            .field("super", &self.super_class.as_ref().map(|c| c.name()))
            .field("status", &self.status)
            .finish()
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
