use std::sync::Arc;

use ember_runtime::{
    BitstringState, Class, ClassLinker, ClassStatus, SubtypeCheckConfig, SubtypeCheckResult,
};
use proptest::prelude::*;

fn state_of(linker: &ClassLinker, class: &Class) -> BitstringState {
    linker.subtype_check().info_of(class).state()
}

#[test]
fn test_object_base_derived() {
    let linker = ClassLinker::new();
    let object = Arc::clone(linker.object_class());
    let base = linker.define_class("Base", &object).unwrap();
    let derived = linker.define_class("Derived", &base).unwrap();

    // Defining Derived assigned its ancestors but not Derived itself.
    assert_eq!(state_of(&linker, &object), BitstringState::Assigned);
    assert_eq!(state_of(&linker, &base), BitstringState::Assigned);
    assert_eq!(state_of(&linker, &derived), BitstringState::Initialized);

    let check = linker.subtype_check();
    assert_eq!(check.is_subtype_of(&*derived, &*base), SubtypeCheckResult::SubtypeOf);
    assert_eq!(check.is_subtype_of(&*derived, &*object), SubtypeCheckResult::SubtypeOf);
    assert_eq!(check.is_subtype_of(&*base, &*derived), SubtypeCheckResult::Unknown);

    assert!(linker.instance_of_check(&base, &base));
    assert!(!linker.instance_of_check(&base, &derived));
    assert_eq!(state_of(&linker, &derived), BitstringState::Assigned);
    assert_eq!(check.is_subtype_of(&*base, &*derived), SubtypeCheckResult::NotSubtypeOf);

    // Status half untouched by the bitstring writes.
    assert_eq!(derived.status(), ClassStatus::Resolved);
}

#[test]
fn test_shallow_max_depth_falls_back_to_slow_path() {
    let linker = ClassLinker::with_config(SubtypeCheckConfig { max_depth: 1 }).unwrap();
    let base = linker.define_class("Base", linker.object_class()).unwrap();
    let derived = linker.define_class("Derived", &base).unwrap();
    let other = linker.define_class("Other", &base).unwrap();

    assert_eq!(linker.ensure_assigned(&derived), BitstringState::Overflowed);
    assert_eq!(linker.ensure_assigned(&other), BitstringState::Overflowed);

    // Overflowed sources still check against assigned targets.
    let check = linker.subtype_check();
    assert_eq!(check.is_subtype_of(&*derived, &*base), SubtypeCheckResult::SubtypeOf);
    // Overflowed targets cannot be checked quickly.
    assert_eq!(check.is_subtype_of(&*other, &*derived), SubtypeCheckResult::Unknown);

    assert!(linker.is_subclass_of(&derived, &derived));
    assert!(!linker.is_subclass_of(&other, &derived));
    assert!(linker.instance_of_check(&derived, &base));

    // Descendants of an overflowed class inherit the overflow.
    let leaf = linker.define_class("Leaf", &derived).unwrap();
    assert_eq!(linker.ensure_assigned(&leaf), BitstringState::Overflowed);
    assert!(linker.is_subclass_of(&leaf, &derived));
    assert!(!linker.is_subclass_of(&leaf, &other));
}

#[test]
fn test_states_never_regress() {
    let linker = ClassLinker::new();
    let base = linker.define_class("Base", linker.object_class()).unwrap();
    linker.ensure_assigned(&base);
    let before = base.status_word().subtype_bits();

    for i in 0..20 {
        let child = linker.define_class(&format!("Child{i}"), &base).unwrap();
        if i % 2 == 0 {
            linker.ensure_assigned(&child);
        }
        assert_eq!(state_of(&linker, &base), BitstringState::Assigned);
    }
    // Base's own path is unchanged; only its next counter advanced.
    let after = base.status_word().subtype_bits();
    assert_eq!(after.path_to_root(1), before.path_to_root(1));
    assert_ne!(after, before);
}

#[test]
fn test_concurrent_readers_see_consistent_answers() {
    let linker = ClassLinker::new();
    let mut classes = vec![Arc::clone(linker.object_class())];
    for i in 0..32 {
        let parent = Arc::clone(&classes[i / 3]);
        classes.push(linker.define_class(&format!("C{i}"), &parent).unwrap());
    }

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..50 {
                    for a in &classes {
                        for b in &classes {
                            assert_eq!(linker.is_subclass_of(a, b), a.is_subclass_of_slow(b));
                        }
                    }
                }
            });
        }
        scope.spawn(|| {
            for class in &classes {
                linker.ensure_assigned(class);
                linker.initialize_class(class).unwrap();
            }
        });
    });

    for class in &classes {
        assert_eq!(class.status(), ClassStatus::VisiblyInitialized);
        assert_eq!(state_of(&linker, class), BitstringState::Assigned);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_fast_check_agrees_with_superclass_walk(
        parents in prop::collection::vec(any::<prop::sample::Index>(), 1..40),
        targets in prop::collection::vec(any::<bool>(), 40),
        max_depth in 1usize..=6,
    ) {
        let linker = ClassLinker::with_config(SubtypeCheckConfig { max_depth }).unwrap();
        let mut classes = vec![Arc::clone(linker.object_class())];
        for (i, parent) in parents.iter().enumerate() {
            let parent = Arc::clone(&classes[parent.index(classes.len())]);
            classes.push(linker.define_class(&format!("C{i}"), &parent).unwrap());
        }
        for (class, assign) in classes.iter().zip(&targets) {
            if *assign {
                linker.ensure_assigned(class);
            }
        }

        let check = linker.subtype_check();
        for a in &classes {
            for b in &classes {
                let expected = a.is_subclass_of_slow(b);
                match check.is_subtype_of(&**a, &**b) {
                    SubtypeCheckResult::SubtypeOf => prop_assert!(expected, "{a} <: {b}"),
                    SubtypeCheckResult::NotSubtypeOf => prop_assert!(!expected, "{a} !<: {b}"),
                    SubtypeCheckResult::Unknown => {}
                }
                prop_assert_eq!(linker.is_subclass_of(a, b), expected);
            }
        }
    }
}
