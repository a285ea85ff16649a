//! In-memory resolution backend.

use std::{collections::BTreeMap, sync::Arc};

use rustc_hash::FxHashMap;

use crate::{
    bytecode::{ClassAccess, ClassNode, FieldAccess},
    expression::DataType,
    resolve::{ClassInfo, ConstantResolver, InheritanceChecker, OuterInstance, ResolvedConstant},
};

/// A [`ConstantResolver`] and [`InheritanceChecker`] backed by hash maps.
///
/// Populate it from parsed classes with [`ClassRegistry::add_class`] or by hand with
/// [`ClassRegistry::add_class_info`] and [`ClassRegistry::add_constant`]. Once built
/// the registry is only read, so it can be shared between threads behind an `Arc`.
///
/// # Examples
///
/// ```rust
/// use unpick::expression::ConstValue;
/// use unpick::resolve::{ClassRegistry, ConstantResolver, ResolvedConstant};
///
/// let mut registry = ClassRegistry::new();
/// registry.add_constant("p/Flags", "A", ResolvedConstant::new(ConstValue::Int(1), true));
///
/// let constant = registry.resolve("p/Flags", "A").unwrap();
/// assert_eq!(constant.value, ConstValue::Int(1));
/// ```
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: FxHashMap<String, Arc<ClassInfo>>,
    constants: FxHashMap<String, BTreeMap<String, ResolvedConstant>>,
}

impl ClassRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the hierarchy and constants of `classes`.
    pub fn from_classes<'a>(classes: impl IntoIterator<Item = &'a ClassNode>) -> Self {
        let mut registry = Self::new();
        for class in classes {
            registry.add_class(class);
        }
        registry
    }

    /// Registers the supertypes, outer instance field and constant fields of `class`.
    ///
    /// A field counts as a constant when it is `final` and carries a `ConstantValue`
    /// of a type a group can hold. `ConstantValue`s of sub-int fields are stored as
    /// `int` in the class file and are narrowed to the field's type here.
    pub fn add_class(&mut self, class: &ClassNode) {
        let outer_instance = class
            .fields
            .iter()
            .filter(|field| {
                field.name.starts_with("this$")
                    && field.access.contains(FieldAccess::SYNTHETIC)
                    && !field.access.contains(FieldAccess::STATIC)
            })
            .find_map(|field| {
                let outer_class = field.descriptor.strip_prefix('L')?.strip_suffix(';')?;
                Some(OuterInstance {
                    field_name: field.name.clone(),
                    outer_class: outer_class.to_string(),
                })
            });

        self.add_class_info(ClassInfo {
            name: class.name.clone(),
            super_name: class.super_name.clone(),
            interfaces: class.interfaces.clone(),
            is_interface: class.access.contains(ClassAccess::INTERFACE),
            outer_instance,
        });

        let constants = self.constants.entry(class.name.clone()).or_default();
        for field in &class.fields {
            if !field.access.contains(FieldAccess::FINAL) {
                continue;
            }
            let (Some(value), Some(data_type)) =
                (&field.value, DataType::from_descriptor(&field.descriptor))
            else {
                continue;
            };
            let Some(value) = value.cast_to(data_type) else {
                continue;
            };
            constants.insert(
                field.name.clone(),
                ResolvedConstant {
                    data_type,
                    value,
                    is_static: field.access.contains(FieldAccess::STATIC),
                },
            );
        }
    }

    /// Registers supertype information, replacing an existing entry of the same name.
    pub fn add_class_info(&mut self, info: ClassInfo) {
        self.classes.insert(info.name.clone(), Arc::new(info));
    }

    /// Registers a single constant.
    pub fn add_constant(
        &mut self,
        owner: impl Into<String>,
        name: impl Into<String>,
        constant: ResolvedConstant,
    ) {
        self.constants
            .entry(owner.into())
            .or_default()
            .insert(name.into(), constant);
    }

    /// Number of classes with supertype information.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if no class has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl ConstantResolver for ClassRegistry {
    fn resolve(&self, owner: &str, name: &str) -> Option<ResolvedConstant> {
        self.constants.get(owner)?.get(name).cloned()
    }

    fn all_constants(&self, owner: &str) -> Option<BTreeMap<String, ResolvedConstant>> {
        self.constants.get(owner).cloned()
    }
}

impl InheritanceChecker for ClassRegistry {
    fn class_info(&self, name: &str) -> Option<Arc<ClassInfo>> {
        self.classes.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{ClassNode, FieldNode},
        expression::ConstValue,
    };

    #[test]
    fn test_add_class() {
        let mut class = ClassNode::new("p/Outer$Inner", Some("java/lang/Object"));
        class.fields.push(FieldNode::new(
            FieldAccess::FINAL | FieldAccess::SYNTHETIC,
            "this$0",
            "Lp/Outer;",
        ));
        class.fields.push(
            FieldNode::new(
                FieldAccess::PUBLIC | FieldAccess::STATIC | FieldAccess::FINAL,
                "SMALL",
                "B",
            )
            .with_value(ConstValue::Int(7)),
        );
        class.fields.push(
            FieldNode::new(FieldAccess::PUBLIC | FieldAccess::STATIC, "MUTABLE", "I")
                .with_value(ConstValue::Int(1)),
        );

        let registry = ClassRegistry::from_classes([&class]);
        let info = registry.class_info("p/Outer$Inner").unwrap();
        assert_eq!(
            info.outer_instance,
            Some(OuterInstance {
                field_name: "this$0".to_string(),
                outer_class: "p/Outer".to_string(),
            })
        );

        let small = registry.resolve("p/Outer$Inner", "SMALL").unwrap();
        assert_eq!(small.data_type, DataType::Byte);
        assert_eq!(small.value, ConstValue::Byte(7));
        assert!(small.is_static);
        assert!(registry.resolve("p/Outer$Inner", "MUTABLE").is_none());
        assert_eq!(registry.all_constants("p/Outer$Inner").unwrap().len(), 1);
    }
}
