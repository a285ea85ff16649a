//! Bindings from fields and methods to groups.
//!
//! A target declaration says "values stored in this field belong to group `g`" or
//! "argument 2 of this method belongs to group `g`". Method bindings are inherited:
//! a call to `Sub.setFlags(I)V` uses the binding declared on `Base.setFlags(I)V` unless
//! `Sub` declares its own. The inheritance walk is memoized per call target in a
//! `DashMap`, so concurrent transformations share it.

use std::sync::Arc;

use dashmap::DashMap;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::resolve::InheritanceChecker;

type MemberKey = (String, String, String);

fn member_key(owner: &str, name: &str, descriptor: &str) -> MemberKey {
    (owner.to_string(), name.to_string(), descriptor.to_string())
}

/// Group bindings of one method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodTarget {
    params: FxHashMap<usize, String>,
    return_group: Option<String>,
}

impl MethodTarget {
    /// Returns the group of the zero-based parameter `index` (receiver excluded).
    #[must_use]
    pub fn param_group(&self, index: usize) -> Option<&str> {
        self.params.get(&index).map(String::as_str)
    }

    /// Returns the group of the return value.
    #[must_use]
    pub fn return_group(&self) -> Option<&str> {
        self.return_group.as_deref()
    }
}

/// Field and method group bindings.
#[derive(Debug, Default)]
pub struct TargetDeclarations {
    fields: FxHashMap<MemberKey, String>,
    methods: FxHashMap<MemberKey, Arc<MethodTarget>>,
    inherited: DashMap<MemberKey, Option<Arc<MethodTarget>>>,
}

impl TargetDeclarations {
    /// Creates an empty set of declarations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the field `owner.name : descriptor` to `group`.
    pub fn declare_field(&mut self, owner: &str, name: &str, descriptor: &str, group: &str) {
        self.fields
            .insert(member_key(owner, name, descriptor), group.to_string());
    }

    /// Binds parameter `index` of `owner.name descriptor` to `group`.
    pub fn declare_param(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        index: usize,
        group: &str,
    ) {
        self.method_mut(owner, name, descriptor)
            .params
            .insert(index, group.to_string());
    }

    /// Binds the return value of `owner.name descriptor` to `group`.
    pub fn declare_return(&mut self, owner: &str, name: &str, descriptor: &str, group: &str) {
        self.method_mut(owner, name, descriptor).return_group = Some(group.to_string());
    }

    /// Returns the group of the field `owner.name : descriptor`.
    #[must_use]
    pub fn field_group(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        if self.fields.is_empty() {
            return None;
        }
        self.fields
            .get(&member_key(owner, name, descriptor))
            .map(String::as_str)
    }

    /// Returns the bindings that apply to a call of `owner.name descriptor`.
    ///
    /// Declarations on `owner` win; otherwise the superclass chain and then the
    /// interfaces are searched depth-first. Results, including misses, are cached.
    pub fn method_target(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
        inheritance: &dyn InheritanceChecker,
    ) -> Option<Arc<MethodTarget>> {
        if self.methods.is_empty() {
            return None;
        }

        let key = member_key(owner, name, descriptor);
        if let Some(cached) = self.inherited.get(&key) {
            return cached.clone();
        }

        let mut visited = FxHashSet::default();
        let computed = self.find_declared(owner, name, descriptor, inheritance, &mut visited);
        self.inherited.entry(key).or_insert(computed).clone()
    }

    /// Returns the group of parameter `index` of a call to `owner.name descriptor`.
    #[must_use]
    pub fn param_group(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
        index: usize,
        inheritance: &dyn InheritanceChecker,
    ) -> Option<String> {
        self.method_target(owner, name, descriptor, inheritance)?
            .param_group(index)
            .map(str::to_string)
    }

    /// Returns the return group of a call to `owner.name descriptor`.
    #[must_use]
    pub fn return_group(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
        inheritance: &dyn InheritanceChecker,
    ) -> Option<String> {
        self.method_target(owner, name, descriptor, inheritance)?
            .return_group()
            .map(str::to_string)
    }

    fn find_declared(
        &self,
        owner: &str,
        name: &str,
        descriptor: &str,
        inheritance: &dyn InheritanceChecker,
        visited: &mut FxHashSet<String>,
    ) -> Option<Arc<MethodTarget>> {
        if !visited.insert(owner.to_string()) {
            return None;
        }
        if let Some(target) = self.methods.get(&member_key(owner, name, descriptor)) {
            return Some(Arc::clone(target));
        }

        let info = inheritance.class_info(owner)?;
        let found = info
            .supertypes()
            .find_map(|supertype| self.find_declared(supertype, name, descriptor, inheritance, visited));
        found
    }

    fn method_mut(&mut self, owner: &str, name: &str, descriptor: &str) -> &mut MethodTarget {
        self.inherited.clear();
        Arc::make_mut(
            self.methods
                .entry(member_key(owner, name, descriptor))
                .or_default(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{ClassInfo, ClassRegistry};

    fn hierarchy() -> ClassRegistry {
        let mut registry = ClassRegistry::new();
        registry.add_class_info(ClassInfo::new("p/Base", Some("java/lang/Object")));
        let mut sub = ClassInfo::new("p/Sub", Some("p/Base"));
        sub.interfaces.push("p/Api".to_string());
        registry.add_class_info(sub);
        registry.add_class_info(ClassInfo::new("p/Leaf", Some("p/Sub")));
        registry
    }

    #[test]
    fn test_inherited_method_targets() {
        let registry = hierarchy();
        let mut targets = TargetDeclarations::new();
        targets.declare_param("p/Base", "set", "(II)V", 1, "flags");
        targets.declare_return("p/Api", "get", "()I", "flags");
        targets.declare_return("p/Sub", "set", "(II)V", "other");

        assert_eq!(
            targets.param_group("p/Leaf", "set", "(II)V", 1, &registry),
            None,
            "p/Sub declares its own binding for set, which shadows p/Base"
        );
        assert_eq!(
            targets.param_group("p/Base", "set", "(II)V", 1, &registry).as_deref(),
            Some("flags")
        );
        assert_eq!(
            targets.return_group("p/Leaf", "get", "()I", &registry).as_deref(),
            Some("flags")
        );
        assert!(targets.method_target("p/Leaf", "nope", "()V", &registry).is_none());
        assert!(targets.inherited.contains_key(&member_key("p/Leaf", "nope", "()V")));
    }

    #[test]
    fn test_superclass_searched_before_interfaces() {
        let registry = hierarchy();
        let mut targets = TargetDeclarations::new();
        targets.declare_param("p/Api", "put", "(I)V", 0, "from_interface");
        targets.declare_param("p/Base", "put", "(I)V", 0, "from_superclass");

        assert_eq!(
            targets.param_group("p/Leaf", "put", "(I)V", 0, &registry).as_deref(),
            Some("from_superclass")
        );
        assert_eq!(
            targets.param_group("p/Api", "put", "(I)V", 0, &registry).as_deref(),
            Some("from_interface")
        );
    }

    #[test]
    fn test_field_targets() {
        let mut targets = TargetDeclarations::new();
        targets.declare_field("p/A", "mode", "I", "mode");
        assert_eq!(targets.field_group("p/A", "mode", "I"), Some("mode"));
        assert_eq!(targets.field_group("p/A", "mode", "J"), None);
    }
}
