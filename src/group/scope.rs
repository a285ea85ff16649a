//! Scope layers of a group.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::expression::{ConstValue, Expression};

/// Where a mapping applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Everywhere
    Global,
    /// Inside classes of one package (internal form, `""` for the default package)
    Package(String),
    /// Inside one class
    Class(String),
    /// Inside one method
    Method {
        /// Internal name of the declaring class
        owner: String,
        /// Method name
        name: String,
        /// Method descriptor
        descriptor: String,
    },
}

impl Scope {
    /// Creates a method scope.
    pub fn method(
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Scope::Method {
            owner: owner.into(),
            name: name.into(),
            descriptor: descriptor.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Package(package) => write!(f, "package {package}"),
            Scope::Class(class) => write!(f, "class {class}"),
            Scope::Method {
                owner,
                name,
                descriptor,
            } => write!(f, "method {owner}.{name}{descriptor}"),
        }
    }
}

/// The replacement registered for one value.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeEntry {
    /// Only usable when the literal's narrowed type equals the group type exactly
    pub strict: bool,
    /// The symbolic replacement
    pub expression: Expression,
}

/// Value to replacement map of one scope layer.
///
/// Keys are always of the owning group's data type.
#[derive(Debug, Clone, Default)]
pub struct ScopeTable {
    entries: FxHashMap<ConstValue, ScopeEntry>,
}

impl ScopeTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `value`.
    #[must_use]
    pub fn get(&self, value: &ConstValue) -> Option<&ScopeEntry> {
        self.entries.get(value)
    }

    /// Returns `true` if `value` has an entry.
    #[must_use]
    pub fn contains(&self, value: &ConstValue) -> bool {
        self.entries.contains_key(value)
    }

    /// Iterates over all entries in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&ConstValue, &ScopeEntry)> {
        self.entries.iter()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds an entry; returns `false` without changing anything if `value` is taken.
    pub(crate) fn insert(&mut self, value: ConstValue, entry: ScopeEntry) -> bool {
        match self.entries.entry(value) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
        }
    }
}
