//! Constant groups and where they apply.
//!
//! A [`Group`] collects the named constants that may stand in for a literal: all
//! `java.awt.Color` RGB values, all `Modifier` bits, all `Calendar` fields. Each group
//! has one [`DataType`] and optionally the flags bit, which allows values not mapped
//! verbatim to be rebuilt from several constants combined with `|`.
//!
//! Mappings are layered into four scopes. Lookup consults the most specific scope
//! first, so a method can override what a constant means globally:
//!
//! ```text
//! method (owner.name descriptor)  >  class (owner)  >  package  >  global
//! ```
//!
//! Besides the named groups, the [`GroupStore`] holds one unnamed default group per
//! data type, consulted for literals no named group claims.
//!
//! Which group applies to a literal is decided by what the literal flows into; those
//! bindings are kept in [`TargetDeclarations`].
//!
//! # Examples
//!
//! ```rust
//! use unpick::expression::{ConstValue, DataType, Expression};
//! use unpick::group::{GroupKey, GroupStore, Scope};
//! use unpick::resolve::{ClassRegistry, ResolvedConstant};
//!
//! let mut registry = ClassRegistry::new();
//! registry.add_constant("p/Color", "RED", ResolvedConstant::new(ConstValue::Int(0xFF0000), true));
//!
//! let mut store = GroupStore::new();
//! store
//!     .declare_group("color", DataType::Int, false)?
//!     .insert_expression(
//!         Scope::Global,
//!         false,
//!         Expression::static_field("p/Color", "RED", Some(DataType::Int)),
//!         &registry,
//!         &registry,
//!     )?;
//!
//! let key = GroupKey::Named("color".to_string());
//! let scopes = store.find_scopes(&key, "p/Paint", "fill", "()V");
//! assert!(scopes[0].contains(&ConstValue::Int(0xFF0000)));
//! # Ok::<(), unpick::Error>(())
//! ```

mod scope;
mod target;

use std::fmt;

use rustc_hash::FxHashMap;

use crate::{
    bytecode::package_of,
    expression::{ConstValue, DataType, Expression, ExpressionEvaluator, FieldExpression},
    resolve::{ConstantResolver, InheritanceChecker},
    Error, Result,
};

pub use scope::{Scope, ScopeEntry, ScopeTable};
pub use target::{MethodTarget, TargetDeclarations};

/// Identifies a group inside a [`GroupStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    /// A named group
    Named(String),
    /// The default group of a data type
    Default(DataType),
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Named(name) => f.write_str(name),
            GroupKey::Default(data_type) => write!(f, "<default {data_type}>"),
        }
    }
}

/// A set of constant values and their symbolic replacements.
#[derive(Debug, Clone)]
pub struct Group {
    key: GroupKey,
    data_type: DataType,
    flags: bool,
    global: ScopeTable,
    packages: FxHashMap<String, ScopeTable>,
    classes: FxHashMap<String, ScopeTable>,
    methods: FxHashMap<(String, String, String), ScopeTable>,
}

impl Group {
    fn new(key: GroupKey, data_type: DataType, flags: bool) -> Self {
        Self {
            key,
            data_type,
            flags,
            global: ScopeTable::new(),
            packages: FxHashMap::default(),
            classes: FxHashMap::default(),
            methods: FxHashMap::default(),
        }
    }

    /// Returns the key of this group.
    #[must_use]
    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    /// Returns the data type all values of this group share.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns `true` for flags groups.
    #[must_use]
    pub fn is_flags(&self) -> bool {
        self.flags
    }

    /// Registers `expression` as the replacement of `value` in `scope`.
    ///
    /// `value` is converted exactly to the group's data type first.
    ///
    /// # Errors
    ///
    /// - [`Error::ValueNotRepresentable`] if `value` does not convert exactly
    /// - [`Error::DuplicateScopeEntry`] if `scope` already maps the value
    pub fn insert(
        &mut self,
        scope: Scope,
        value: &ConstValue,
        strict: bool,
        expression: Expression,
    ) -> Result<()> {
        let key = value
            .convert_exact(self.data_type)
            .ok_or_else(|| Error::ValueNotRepresentable {
                value: value.to_string(),
                data_type: self.data_type,
            })?;

        let group = self.key.to_string();
        let description = scope.to_string();
        if !self.table_mut(scope).insert(key.clone(), ScopeEntry { strict, expression }) {
            return Err(Error::DuplicateScopeEntry {
                group,
                scope: description,
                value: key.to_string(),
            });
        }
        Ok(())
    }

    /// Evaluates `expression` and registers it under the resulting value.
    ///
    /// A lone wildcard field reference (`p.Constants.*`) is expanded to every constant
    /// of the class whose value converts exactly to the group's data type. Returns the
    /// number of entries added.
    ///
    /// # Errors
    ///
    /// Any evaluation error, plus the errors of [`Group::insert`]. A wildcard over an
    /// unknown class is [`Error::ConstantNotResolvable`]; an expanded constant whose
    /// value `scope` already maps is [`Error::DuplicateScopeEntry`].
    pub fn insert_expression(
        &mut self,
        scope: Scope,
        strict: bool,
        expression: Expression,
        constants: &dyn ConstantResolver,
        inheritance: &dyn InheritanceChecker,
    ) -> Result<usize> {
        if let Some(field) = expression.as_field().filter(|field| field.is_wildcard()) {
            return self.insert_wildcard(scope, strict, field, constants);
        }

        let value = ExpressionEvaluator::new(constants, inheritance).evaluate(&expression)?;
        self.insert(scope, &value, strict, expression)?;
        Ok(1)
    }

    fn insert_wildcard(
        &mut self,
        scope: Scope,
        strict: bool,
        wildcard: &FieldExpression,
        constants: &dyn ConstantResolver,
    ) -> Result<usize> {
        let all = constants
            .all_constants(&wildcard.class_name)
            .ok_or_else(|| Error::ConstantNotResolvable {
                owner: wildcard.class_name.clone(),
                name: "*".to_string(),
            })?;

        let data_type = self.data_type;
        let group = self.key.to_string();
        let description = scope.to_string();
        let table = self.table_mut(scope);
        let mut added = 0;
        for (name, constant) in all {
            if wildcard.is_static != constant.is_static {
                continue;
            }
            let Some(key) = constant.value.convert_exact(data_type) else {
                continue;
            };
            let expression = Expression::Field(FieldExpression {
                class_name: wildcard.class_name.clone(),
                field_name: Some(name),
                declared_type: Some(constant.data_type),
                is_static: constant.is_static,
            });
            let value = key.to_string();
            if !table.insert(key, ScopeEntry { strict, expression }) {
                return Err(Error::DuplicateScopeEntry {
                    group,
                    scope: description,
                    value,
                });
            }
            added += 1;
        }
        Ok(added)
    }

    /// Returns the scope tables applying inside `owner.name descriptor`, most specific
    /// first. The global table is always last.
    #[must_use]
    pub fn find_scopes(&self, owner: &str, name: &str, descriptor: &str) -> Vec<&ScopeTable> {
        let mut scopes = Vec::with_capacity(4);
        if !self.methods.is_empty() {
            let key = (owner.to_string(), name.to_string(), descriptor.to_string());
            if let Some(table) = self.methods.get(&key) {
                scopes.push(table);
            }
        }
        if let Some(table) = self.classes.get(owner) {
            scopes.push(table);
        }
        if let Some(table) = self.packages.get(package_of(owner)) {
            scopes.push(table);
        }
        scopes.push(&self.global);
        scopes
    }

    fn table_mut(&mut self, scope: Scope) -> &mut ScopeTable {
        match scope {
            Scope::Global => &mut self.global,
            Scope::Package(package) => self.packages.entry(package).or_default(),
            Scope::Class(class) => self.classes.entry(class).or_default(),
            Scope::Method {
                owner,
                name,
                descriptor,
            } => self.methods.entry((owner, name, descriptor)).or_default(),
        }
    }
}

/// All groups and target declarations of one mapping set.
///
/// Built once before transformation, then only read.
#[derive(Debug, Default)]
pub struct GroupStore {
    named: FxHashMap<String, Group>,
    defaults: FxHashMap<DataType, Group>,
    targets: TargetDeclarations,
}

impl GroupStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the named group `name`, or returns it if it already exists with the
    /// same data type and flags bit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GroupMismatch`] if the group exists with a different data type
    /// or flags bit.
    pub fn declare_group(
        &mut self,
        name: &str,
        data_type: DataType,
        flags: bool,
    ) -> Result<&mut Group> {
        let group = self
            .named
            .entry(name.to_string())
            .or_insert_with(|| Group::new(GroupKey::Named(name.to_string()), data_type, flags));
        if group.data_type != data_type || group.flags != flags {
            return Err(Error::GroupMismatch {
                name: name.to_string(),
                data_type,
                flags,
            });
        }
        Ok(group)
    }

    /// Returns the default group of `data_type`, creating it if necessary.
    pub fn default_group_mut(&mut self, data_type: DataType) -> &mut Group {
        self.defaults
            .entry(data_type)
            .or_insert_with(|| Group::new(GroupKey::Default(data_type), data_type, false))
    }

    /// Returns the group identified by `key`.
    #[must_use]
    pub fn group(&self, key: &GroupKey) -> Option<&Group> {
        match key {
            GroupKey::Named(name) => self.named.get(name),
            GroupKey::Default(data_type) => self.defaults.get(data_type),
        }
    }

    /// Returns `true` if a default group exists for `data_type`.
    #[must_use]
    pub fn has_default_group(&self, data_type: DataType) -> bool {
        self.defaults.contains_key(&data_type)
    }

    /// Returns the scope tables of the group `key` applying inside
    /// `owner.name descriptor`, most specific first, or an empty list for an unknown
    /// group.
    #[must_use]
    pub fn find_scopes(
        &self,
        key: &GroupKey,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Vec<&ScopeTable> {
        self.group(key)
            .map(|group| group.find_scopes(owner, name, descriptor))
            .unwrap_or_default()
    }

    /// Returns the target declarations.
    #[must_use]
    pub fn targets(&self) -> &TargetDeclarations {
        &self.targets
    }

    /// Returns the target declarations for building.
    pub fn targets_mut(&mut self) -> &mut TargetDeclarations {
        &mut self.targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{ClassRegistry, ResolvedConstant};

    fn registry() -> ClassRegistry {
        let mut registry = ClassRegistry::new();
        for (name, value) in [("ONE", 1), ("TWO", 2), ("BIG", 1000)] {
            registry.add_constant("p/K", name, ResolvedConstant::new(ConstValue::Int(value), true));
        }
        registry
    }

    #[test]
    fn test_scope_precedence_order() {
        let mut store = GroupStore::new();
        let group = store.declare_group("g", DataType::Int, false).unwrap();
        let one = ConstValue::Int(1);
        group
            .insert(Scope::Global, &one, false, Expression::int(1))
            .unwrap();
        group
            .insert(Scope::Package("p".to_string()), &one, false, Expression::int(2))
            .unwrap();
        group
            .insert(Scope::Class("p/A".to_string()), &one, false, Expression::int(3))
            .unwrap();
        group
            .insert(Scope::method("p/A", "m", "()V"), &one, false, Expression::int(4))
            .unwrap();

        let key = GroupKey::Named("g".to_string());
        let first = |owner: &str, name: &str| {
            store.find_scopes(&key, owner, name, "()V")[0]
                .get(&one)
                .map(|entry| entry.expression.clone())
        };
        assert_eq!(first("p/A", "m"), Some(Expression::int(4)));
        assert_eq!(first("p/A", "other"), Some(Expression::int(3)));
        assert_eq!(first("p/B", "m"), Some(Expression::int(2)));
        assert_eq!(first("q/A", "m"), Some(Expression::int(1)));
        assert_eq!(store.find_scopes(&key, "p/A", "m", "()V").len(), 4);
    }

    #[test]
    fn test_duplicates_and_mismatches() {
        let mut store = GroupStore::new();
        let group = store.declare_group("g", DataType::Byte, true).unwrap();
        group
            .insert(Scope::Global, &ConstValue::Int(4), false, Expression::int(4))
            .unwrap();
        assert!(matches!(
            group.insert(Scope::Global, &ConstValue::Byte(4), false, Expression::int(4)),
            Err(Error::DuplicateScopeEntry { .. })
        ));
        assert!(matches!(
            group.insert(Scope::Global, &ConstValue::Int(300), false, Expression::int(300)),
            Err(Error::ValueNotRepresentable { .. })
        ));

        assert!(store.declare_group("g", DataType::Byte, true).is_ok());
        assert!(matches!(
            store.declare_group("g", DataType::Int, true),
            Err(Error::GroupMismatch { .. })
        ));
        assert!(matches!(
            store.declare_group("g", DataType::Byte, false),
            Err(Error::GroupMismatch { .. })
        ));
    }

    #[test]
    fn test_wildcard_expansion() {
        let registry = registry();
        let mut store = GroupStore::new();
        let group = store.declare_group("small", DataType::Byte, false).unwrap();
        let wildcard = Expression::Field(FieldExpression {
            class_name: "p/K".to_string(),
            field_name: None,
            declared_type: None,
            is_static: true,
        });
        let added = group
            .insert_expression(Scope::Global, false, wildcard, &registry, &registry)
            .unwrap();
        // BIG does not fit in a byte
        assert_eq!(added, 2);

        let scopes = store.find_scopes(&GroupKey::Named("small".to_string()), "x/Y", "m", "()V");
        let entry = scopes[0].get(&ConstValue::Byte(2)).unwrap();
        assert_eq!(
            entry.expression,
            Expression::static_field("p/K", "TWO", Some(DataType::Int))
        );
    }

    #[test]
    fn test_wildcard_duplicates_rejected() {
        let mut registry = registry();
        let wildcard = || {
            Expression::Field(FieldExpression {
                class_name: "p/K".to_string(),
                field_name: None,
                declared_type: None,
                is_static: true,
            })
        };

        let mut store = GroupStore::new();
        let group = store.declare_group("g", DataType::Int, false).unwrap();
        group
            .insert(Scope::Global, &ConstValue::Int(2), false, Expression::int(2))
            .unwrap();
        assert!(matches!(
            group.insert_expression(Scope::Global, false, wildcard(), &registry, &registry),
            Err(Error::DuplicateScopeEntry { .. })
        ));
        // Another scope is a separate table.
        assert_eq!(
            group
                .insert_expression(Scope::Package("p".to_string()), false, wildcard(), &registry, &registry)
                .unwrap(),
            3
        );

        registry.add_constant("p/K", "UNO", ResolvedConstant::new(ConstValue::Int(1), true));
        let mut store = GroupStore::new();
        let group = store.declare_group("g", DataType::Int, false).unwrap();
        assert!(matches!(
            group.insert_expression(Scope::Global, false, wildcard(), &registry, &registry),
            Err(Error::DuplicateScopeEntry { .. })
        ));
    }

    #[test]
    fn test_insert_expression_evaluates() {
        let registry = registry();
        let mut store = GroupStore::new();
        let group = store.default_group_mut(DataType::Long);
        group
            .insert_expression(
                Scope::Global,
                true,
                Expression::static_field("p/K", "BIG", None),
                &registry,
                &registry,
            )
            .unwrap();
        assert!(store.has_default_group(DataType::Long));
        let scopes = store.find_scopes(&GroupKey::Default(DataType::Long), "a/B", "m", "()V");
        assert!(scopes[0].get(&ConstValue::Long(1000)).unwrap().strict);

        let missing = store.default_group_mut(DataType::Int).insert_expression(
            Scope::Global,
            false,
            Expression::static_field("p/K", "NOPE", None),
            &registry,
            &registry,
        );
        assert!(matches!(missing, Err(Error::ConstantNotResolvable { .. })));
    }
}
