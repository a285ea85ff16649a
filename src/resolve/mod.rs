//! Capabilities the uninliner consumes from its environment.
//!
//! The core never reads class files or walks a classpath itself. It asks two narrow
//! traits for what it needs:
//!
//! - [`ConstantResolver`] - the compile-time value of a named constant field
//! - [`InheritanceChecker`] - the supertype structure of a class, from which
//!   assignability and common superclasses are derived
//!
//! Both traits are object safe and `Send + Sync`, so one backend can be shared across
//! the worker threads of [`crate::Uninliner::transform_classes`]. Backends that are
//! expensive to query can be wrapped in [`CachedConstantResolver`] and
//! [`CachedInheritanceChecker`].
//!
//! [`ClassRegistry`] is an in-memory backend implementing both traits, populated from
//! [`crate::bytecode::ClassNode`]s or by hand.

mod cache;
mod registry;

use std::{collections::BTreeMap, sync::Arc};

use rustc_hash::FxHashSet;

use crate::expression::{ConstValue, DataType};

pub use cache::{CachedConstantResolver, CachedInheritanceChecker};
pub use registry::ClassRegistry;

/// Internal name of the root of the class hierarchy.
pub const OBJECT: &str = "java/lang/Object";

/// A compile-time constant as reported by a [`ConstantResolver`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConstant {
    /// Declared type of the field
    pub data_type: DataType,
    /// The constant value
    pub value: ConstValue,
    /// `true` for static fields
    pub is_static: bool,
}

impl ResolvedConstant {
    /// Creates a constant whose declared type is the type of `value`.
    #[must_use]
    pub fn new(value: ConstValue, is_static: bool) -> Self {
        Self {
            data_type: value.data_type(),
            value,
            is_static,
        }
    }
}

/// The synthetic field through which an inner class reaches its enclosing instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OuterInstance {
    /// Name of the field, conventionally `this$N`
    pub field_name: String,
    /// Internal name of the enclosing class
    pub outer_class: String,
}

impl OuterInstance {
    /// Field descriptor of the outer instance field.
    #[must_use]
    pub fn descriptor(&self) -> String {
        format!("L{};", self.outer_class)
    }
}

/// Supertype information about one class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    /// Internal name
    pub name: String,
    /// Internal name of the superclass, `None` only for `java/lang/Object`
    pub super_name: Option<String>,
    /// Internal names of the directly implemented interfaces
    pub interfaces: Vec<String>,
    /// `true` for interfaces
    pub is_interface: bool,
    /// Captured enclosing instance of an inner class
    pub outer_instance: Option<OuterInstance>,
}

impl ClassInfo {
    /// Creates the info of a plain class without interfaces.
    #[must_use]
    pub fn new(name: impl Into<String>, super_name: Option<&str>) -> Self {
        Self {
            name: name.into(),
            super_name: super_name.map(str::to_string),
            interfaces: Vec::new(),
            is_interface: false,
            outer_instance: None,
        }
    }

    /// Iterates over the direct supertypes, superclass first.
    pub fn supertypes(&self) -> impl Iterator<Item = &str> {
        self.super_name
            .iter()
            .chain(self.interfaces.iter())
            .map(String::as_str)
    }
}

/// Looks up compile-time constants.
pub trait ConstantResolver: Send + Sync {
    /// Returns the constant `owner.name` if the field is declared directly in `owner`.
    ///
    /// Resolution through supertypes is done by the caller.
    fn resolve(&self, owner: &str, name: &str) -> Option<ResolvedConstant>;

    /// Returns all constants declared directly in `owner`, keyed by field name, or
    /// `None` if the class is unknown.
    fn all_constants(&self, owner: &str) -> Option<BTreeMap<String, ResolvedConstant>>;
}

/// Answers questions about the class hierarchy.
///
/// Only [`InheritanceChecker::class_info`] must be implemented; the other queries are
/// derived from it. Unknown classes are treated as direct subclasses of
/// `java/lang/Object`.
pub trait InheritanceChecker: Send + Sync {
    /// Returns the supertype information of the class `name`.
    fn class_info(&self, name: &str) -> Option<Arc<ClassInfo>>;

    /// Returns `true` if a value of type `source` can be assigned to `target`.
    ///
    /// Both arguments are internal names. Array types are not handled here.
    fn is_assignable_from(&self, target: &str, source: &str) -> bool {
        if target == source || target == OBJECT {
            return true;
        }

        let mut visited = FxHashSet::default();
        let mut pending = vec![source.to_string()];
        while let Some(current) = pending.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(info) = self.class_info(&current) else {
                continue;
            };
            for supertype in info.supertypes() {
                if supertype == target {
                    return true;
                }
                pending.push(supertype.to_string());
            }
        }
        false
    }

    /// Returns the most specific common superclass of `a` and `b`.
    ///
    /// Interfaces have no superclass besides `java/lang/Object`, so any pair involving
    /// an interface that is not assignable one way or the other resolves to it.
    fn common_superclass(&self, a: &str, b: &str) -> String {
        if self.is_assignable_from(a, b) {
            return a.to_string();
        }
        if self.is_assignable_from(b, a) {
            return b.to_string();
        }

        let a_is_interface = self.class_info(a).is_some_and(|info| info.is_interface);
        let b_is_interface = self.class_info(b).is_some_and(|info| info.is_interface);
        if a_is_interface || b_is_interface {
            return OBJECT.to_string();
        }

        let mut current = a.to_string();
        let mut visited = FxHashSet::default();
        loop {
            let Some(parent) = self
                .class_info(&current)
                .and_then(|info| info.super_name.clone())
            else {
                return OBJECT.to_string();
            };
            if !visited.insert(parent.clone()) {
                return OBJECT.to_string();
            }
            if self.is_assignable_from(&parent, b) {
                return parent;
            }
            current = parent;
        }
    }
}

impl<T: ConstantResolver + ?Sized> ConstantResolver for Arc<T> {
    fn resolve(&self, owner: &str, name: &str) -> Option<ResolvedConstant> {
        (**self).resolve(owner, name)
    }

    fn all_constants(&self, owner: &str) -> Option<BTreeMap<String, ResolvedConstant>> {
        (**self).all_constants(owner)
    }
}

impl<T: InheritanceChecker + ?Sized> InheritanceChecker for Arc<T> {
    fn class_info(&self, name: &str) -> Option<Arc<ClassInfo>> {
        (**self).class_info(name)
    }

    fn is_assignable_from(&self, target: &str, source: &str) -> bool {
        (**self).is_assignable_from(target, source)
    }

    fn common_superclass(&self, a: &str, b: &str) -> String {
        (**self).common_superclass(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> ClassRegistry {
        let mut registry = ClassRegistry::new();
        registry.add_class_info(ClassInfo::new("a/Animal", Some(OBJECT)));
        registry.add_class_info(ClassInfo::new("a/Dog", Some("a/Animal")));
        registry.add_class_info(ClassInfo::new("a/Cat", Some("a/Animal")));
        let mut pet = ClassInfo::new("a/Pet", Some(OBJECT));
        pet.is_interface = true;
        registry.add_class_info(pet);
        let mut puppy = ClassInfo::new("a/Puppy", Some("a/Dog"));
        puppy.interfaces.push("a/Pet".to_string());
        registry.add_class_info(puppy);
        registry
    }

    #[test]
    fn test_assignability() {
        let registry = hierarchy();
        assert!(registry.is_assignable_from("a/Animal", "a/Puppy"));
        assert!(registry.is_assignable_from("a/Pet", "a/Puppy"));
        assert!(registry.is_assignable_from(OBJECT, "a/Unknown"));
        assert!(!registry.is_assignable_from("a/Dog", "a/Cat"));
        assert!(!registry.is_assignable_from("a/Puppy", "a/Dog"));
    }

    #[test]
    fn test_common_superclass() {
        let registry = hierarchy();
        assert_eq!(registry.common_superclass("a/Dog", "a/Cat"), "a/Animal");
        assert_eq!(registry.common_superclass("a/Puppy", "a/Cat"), "a/Animal");
        assert_eq!(registry.common_superclass("a/Dog", "a/Puppy"), "a/Dog");
        assert_eq!(registry.common_superclass("a/Pet", "a/Cat"), OBJECT);
        assert_eq!(registry.common_superclass("a/Dog", "x/Other"), OBJECT);
    }
}
