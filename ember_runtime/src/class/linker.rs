//! Class linker: owns the class table and drives status and subtype-check
//! bitstrings as classes are defined and initialized.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::{Class, ClassFlags, ClassStatus};
use crate::config::{ConfigError, SubtypeCheckConfig};
use crate::subtype::{BitstringState, SubtypeCheck, SubtypeCheckResult};

/// Name of the hierarchy root every linker starts with.
pub const OBJECT_CLASS_NAME: &str = "java.lang.Object";

/// Errors raised while defining or initializing classes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// A class with this name is already defined.
    #[error("class `{0}` is already defined")]
    DuplicateClass(String),
    /// The superclass failed to link.
    #[error("superclass `{super_class}` of `{class}` is erroneous")]
    ErroneousSuperclass {
        /// Class being defined.
        class: String,
        /// Its erroneous superclass.
        super_class: String,
    },
    /// The superclass is final or an interface.
    #[error("`{class}` cannot extend `{super_class}`")]
    IllegalSuperclass {
        /// Class being defined.
        class: String,
        /// The rejected superclass.
        super_class: String,
    },
    /// The class itself is erroneous.
    #[error("class `{0}` is erroneous")]
    Erroneous(String),
    /// The class was retired and can no longer be initialized.
    #[error("class `{0}` is retired")]
    Retired(String),
    /// Rejected linker configuration.
    #[error("invalid linker configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Defines classes, tracks their status and answers subtype queries.
pub struct ClassLinker {
    object_class: Arc<Class>,
    classes: RwLock<FxHashMap<String, Arc<Class>>>,
    subtype_check: SubtypeCheck,
}

impl ClassLinker {
    /// Linker with the default subtype-check configuration.
    pub fn new() -> Self {
        Self::build(SubtypeCheckConfig::default())
    }

    /// Linker with a custom subtype-check configuration.
    pub fn with_config(config: SubtypeCheckConfig) -> Result<Self, LinkError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SubtypeCheckConfig) -> Self {
        let subtype_check = SubtypeCheck::new(config);
        let object_class = Arc::new(Class::new_root(OBJECT_CLASS_NAME));
        object_class.status_word().write_status(ClassStatus::Loaded);
        {
            let guard = subtype_check.lock();
            subtype_check.ensure_assigned(&guard, &*object_class);
        }
        object_class.status_word().write_status(ClassStatus::Resolved);

        let mut classes = FxHashMap::default();
        classes.insert(OBJECT_CLASS_NAME.to_owned(), Arc::clone(&object_class));
        Self {
            object_class,
            classes: RwLock::new(classes),
            subtype_check,
        }
    }

    /// The hierarchy root.
    #[inline]
    pub fn object_class(&self) -> &Arc<Class> {
        &self.object_class
    }

    /// The subtype-check engine.
    pub fn subtype_check(&self) -> &SubtypeCheck {
        &self.subtype_check
    }

    /// Define `name` as a direct subclass of `super_class`.
    ///
    /// The class moves `Loaded -> Resolved`, and its bitstring is initialized
    /// (which assigns every ancestor).
    pub fn define_class(&self, name: &str, super_class: &Arc<Class>) -> Result<Arc<Class>, LinkError> {
        self.define_class_with_flags(name, ClassFlags::empty(), super_class)
    }

    /// [`define_class`](Self::define_class) with explicit access flags.
    ///
    /// A superclass marked erroneous before the class is registered makes
    /// the definition fail; one marked afterwards does not affect it.
    pub fn define_class_with_flags(
        &self,
        name: &str,
        flags: ClassFlags,
        super_class: &Arc<Class>,
    ) -> Result<Arc<Class>, LinkError> {
        if super_class.is_erroneous() {
            return Err(Self::erroneous_superclass(name, super_class));
        }
        if super_class.flags().intersects(ClassFlags::FINAL | ClassFlags::INTERFACE) {
            return Err(LinkError::IllegalSuperclass {
                class: name.to_owned(),
                super_class: super_class.name().to_owned(),
            });
        }

        let mut classes = self.classes.write();
        if classes.contains_key(name) {
            return Err(LinkError::DuplicateClass(name.to_owned()));
        }

        let class = Arc::new(Class::new(name, flags, Arc::clone(super_class)));
        class.status_word().write_status(ClassStatus::Loaded);
        // Checked again under the table lock; the class is not visible yet.
        if super_class.is_erroneous() {
            class.status_word().mark_erroneous();
            return Err(Self::erroneous_superclass(name, super_class));
        }
        let state = {
            let guard = self.subtype_check.lock();
            self.subtype_check.ensure_initialized(&guard, &*class)
        };
        class.status_word().write_status(ClassStatus::Resolved);
        classes.insert(name.to_owned(), Arc::clone(&class));

        tracing::debug!(class = name, super_class = super_class.name(), depth = class.depth(), %state, "class defined");
        Ok(class)
    }

    fn erroneous_superclass(name: &str, super_class: &Class) -> LinkError {
        LinkError::ErroneousSuperclass {
            class: name.to_owned(),
            super_class: super_class.name().to_owned(),
        }
    }

    /// Look up a defined class.
    pub fn find_class(&self, name: &str) -> Option<Arc<Class>> {
        self.classes.read().get(name).cloned()
    }

    /// Number of defined classes, the root included.
    pub fn class_count(&self) -> usize {
        self.classes.read().len()
    }

    /// Verify and initialize `class` and its superclasses.
    ///
    /// Status moves through `Verifying -> Verified -> Initializing ->
    /// Initialized -> VisiblyInitialized`. Already initialized classes are
    /// left alone. A class marked erroneous part way through stays erroneous
    /// and the call fails.
    pub fn initialize_class(&self, class: &Class) -> Result<(), LinkError> {
        let status = class.status();
        if status.is_terminal() {
            return Err(Self::terminal_error(class, status));
        }
        if status.is_initialized() {
            return Ok(());
        }
        if let Some(super_class) = class.super_class() {
            self.initialize_class(super_class).map_err(|_| LinkError::ErroneousSuperclass {
                class: class.name().to_owned(),
                super_class: super_class.name().to_owned(),
            })?;
        }

        let word = class.status_word();
        for status in [
            ClassStatus::Verifying,
            ClassStatus::Verified,
            ClassStatus::Initializing,
            ClassStatus::Initialized,
            ClassStatus::VisiblyInitialized,
        ] {
            word.advance_status(status).map_err(|current| Self::terminal_error(class, current))?;
        }
        tracing::trace!(class = class.name(), "class initialized");
        Ok(())
    }

    fn terminal_error(class: &Class, status: ClassStatus) -> LinkError {
        if status == ClassStatus::Retired {
            LinkError::Retired(class.name().to_owned())
        } else {
            LinkError::Erroneous(class.name().to_owned())
        }
    }

    /// Record that linking `class` failed. An erroneous class keeps its
    /// first error status.
    pub fn mark_erroneous(&self, class: &Class) {
        let status = class.status_word().mark_erroneous();
        tracing::debug!(class = class.name(), %status, "class marked erroneous");
    }

    /// Give `class` its own path character so it can be a fast-check target.
    pub fn ensure_assigned(&self, class: &Class) -> BitstringState {
        let guard = self.subtype_check.lock();
        self.subtype_check.ensure_assigned(&guard, class)
    }

    /// Whether `class` is `target` or one of its subclasses.
    ///
    /// Uses the bitstrings when they decide the question and walks
    /// superclasses otherwise.
    pub fn is_subclass_of(&self, class: &Class, target: &Class) -> bool {
        // The two bit reads are not one snapshot; a class racing to become
        // Assigned would otherwise compare unequal to itself.
        if std::ptr::eq(class, target) {
            return true;
        }
        match self.subtype_check.is_subtype_of(class, target) {
            SubtypeCheckResult::SubtypeOf => true,
            SubtypeCheckResult::NotSubtypeOf => false,
            SubtypeCheckResult::Unknown => class.is_subclass_of_slow(target),
        }
    }

    /// `instanceof`-style check: assigns `target` (and initializes `class`)
    /// first so repeated checks take the fast path.
    pub fn instance_of_check(&self, class: &Class, target: &Class) -> bool {
        {
            let guard = self.subtype_check.lock();
            self.subtype_check.ensure_assigned(&guard, target);
            self.subtype_check.ensure_initialized(&guard, class);
        }
        self.is_subclass_of(class, target)
    }
}

impl Default for ClassLinker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_class_is_assigned_root() {
        let linker = ClassLinker::new();
        let object = linker.object_class();
        assert_eq!(object.status(), ClassStatus::Resolved);
        assert_eq!(
            linker.subtype_check().info_of(&**object).state(),
            BitstringState::Assigned
        );
        assert_eq!(linker.class_count(), 1);
    }

    #[test]
    fn test_define_and_find() {
        let linker = ClassLinker::new();
        let base = linker.define_class("Base", linker.object_class()).unwrap();
        assert_eq!(base.status(), ClassStatus::Resolved);
        assert_eq!(base.depth(), 1);
        assert!(Arc::ptr_eq(&linker.find_class("Base").unwrap(), &base));
        assert!(linker.find_class("Missing").is_none());
    }

    #[test]
    fn test_duplicate_class_rejected() {
        let linker = ClassLinker::new();
        linker.define_class("Base", linker.object_class()).unwrap();
        assert_eq!(
            linker.define_class("Base", linker.object_class()).unwrap_err(),
            LinkError::DuplicateClass("Base".into())
        );
    }

    #[test]
    fn test_final_superclass_rejected() {
        let linker = ClassLinker::new();
        let sealed = linker
            .define_class_with_flags("Sealed", ClassFlags::FINAL, linker.object_class())
            .unwrap();
        assert!(matches!(
            linker.define_class("Sub", &sealed),
            Err(LinkError::IllegalSuperclass { .. })
        ));
    }

    #[test]
    fn test_erroneous_superclass_rejected() {
        let linker = ClassLinker::new();
        let broken = linker.define_class("Broken", linker.object_class()).unwrap();
        linker.mark_erroneous(&broken);
        assert_eq!(broken.status(), ClassStatus::ErrorResolved);
        assert!(matches!(
            linker.define_class("Child", &broken),
            Err(LinkError::ErroneousSuperclass { .. })
        ));
        assert_eq!(
            linker.initialize_class(&broken),
            Err(LinkError::Erroneous("Broken".into()))
        );
    }

    #[test]
    fn test_initialize_races_mark_erroneous() {
        let linker = ClassLinker::new();
        for round in 0..200 {
            let class = linker
                .define_class(&format!("Racy{round}"), linker.object_class())
                .unwrap();
            let result = std::thread::scope(|s| {
                let init = s.spawn(|| linker.initialize_class(&class));
                s.spawn(|| linker.mark_erroneous(&class));
                init.join().unwrap()
            });
            assert_eq!(class.status(), ClassStatus::ErrorResolved);
            if let Err(err) = result {
                assert_eq!(err, LinkError::Erroneous(class.name().to_owned()));
            }
            assert!(linker.initialize_class(&class).is_err());
        }
    }

    #[test]
    fn test_define_racing_erroneous_superclass() {
        let linker = ClassLinker::new();
        let base = linker.define_class("Base", linker.object_class()).unwrap();
        let rejected = std::thread::scope(|s| {
            let definer = s.spawn(|| {
                (0usize..)
                    .map(|i| format!("Child{i}"))
                    .find(|name| linker.define_class(name, &base).is_err())
            });
            s.spawn(|| linker.mark_erroneous(&base));
            definer.join().unwrap()
        });
        let rejected = rejected.unwrap();
        assert!(linker.find_class(&rejected).is_none());
        assert!(matches!(
            linker.define_class("Late", &base),
            Err(LinkError::ErroneousSuperclass { .. })
        ));
    }

    #[test]
    fn test_initialize_class_initializes_superclasses() {
        let linker = ClassLinker::new();
        let base = linker.define_class("Base", linker.object_class()).unwrap();
        let derived = linker.define_class("Derived", &base).unwrap();

        linker.initialize_class(&derived).unwrap();
        assert_eq!(derived.status(), ClassStatus::VisiblyInitialized);
        assert_eq!(base.status(), ClassStatus::VisiblyInitialized);
        assert_eq!(linker.object_class().status(), ClassStatus::VisiblyInitialized);
        // Idempotent.
        linker.initialize_class(&derived).unwrap();
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            ClassLinker::with_config(SubtypeCheckConfig { max_depth: 0 }),
            Err(LinkError::Config(ConfigError::InvalidMaxDepth(0)))
        ));
    }
}
