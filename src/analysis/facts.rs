//! Backward facts about abstract values.
//!
//! Facts describe where a value goes: which instructions consume it, which parameters
//! it may come from, which call arguments it is passed as and which narrow types its
//! consumers imply. Values that meet at a control flow join are the same value from
//! then on, so their facts are kept per equivalence class in a union-find table. A
//! fact recorded on any member is visible through every member, including members
//! whose frames were computed earlier in the fixpoint iteration.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::{analysis::SourceId, expression::DataTypeSet};

/// Facts shared by one equivalence class of values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueFacts {
    /// Instructions consuming or producing the value
    pub usages: BTreeSet<usize>,
    /// Parameters of the enclosing method the value may come from
    pub param_sources: BTreeSet<usize>,
    /// `(call site, argument index)` pairs the value is passed as
    pub param_usages: BTreeSet<(usize, usize)>,
    /// Types implied by the value's consumers
    pub narrow_types: DataTypeSet,
}

impl ValueFacts {
    fn absorb(&mut self, other: ValueFacts) {
        self.usages.extend(other.usages);
        self.param_sources.extend(other.param_sources);
        self.param_usages.extend(other.param_usages);
        self.narrow_types.union_with(other.narrow_types);
    }
}

/// Union-find table of [`ValueFacts`].
#[derive(Debug, Default)]
pub struct FactTable {
    nodes: FxHashMap<SourceId, usize>,
    parent: Vec<usize>,
    size: Vec<usize>,
    facts: Vec<ValueFacts>,
}

impl FactTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the facts of the class `source` belongs to.
    #[must_use]
    pub fn facts(&self, source: SourceId) -> Option<&ValueFacts> {
        let root = self.root(source)?;
        Some(&self.facts[root])
    }

    /// Returns an identifier of the class `source` belongs to.
    ///
    /// Two sources have the same root exactly when they share their facts. Roots stay
    /// valid until the next union.
    #[must_use]
    pub fn root(&self, source: SourceId) -> Option<usize> {
        let mut node = *self.nodes.get(&source)?;
        while self.parent[node] != node {
            node = self.parent[node];
        }
        Some(node)
    }

    /// Number of equivalence classes.
    #[must_use]
    pub fn class_count(&self) -> usize {
        (0..self.parent.len())
            .filter(|&node| self.parent[node] == node)
            .count()
    }

    /// Returns the facts of the class of `source` for recording, creating the class if
    /// `source` was not seen before.
    pub(crate) fn facts_mut(&mut self, source: SourceId) -> &mut ValueFacts {
        let node = self.node(source);
        let root = self.find(node);
        &mut self.facts[root]
    }

    /// Merges the classes of all `sources`.
    pub(crate) fn union_all<'a>(&mut self, sources: impl IntoIterator<Item = &'a SourceId>) {
        let mut sources = sources.into_iter();
        let Some(first) = sources.next() else {
            return;
        };
        let first = self.node(*first);
        for source in sources {
            let other = self.node(*source);
            self.union(first, other);
        }
    }

    fn node(&mut self, source: SourceId) -> usize {
        if let Some(&node) = self.nodes.get(&source) {
            return node;
        }
        let node = self.parent.len();
        self.parent.push(node);
        self.size.push(1);
        self.facts.push(ValueFacts::default());
        self.nodes.insert(source, node);
        node
    }

    fn find(&mut self, node: usize) -> usize {
        let mut root = node;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = node;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a == b {
            return;
        }
        let (large, small) = if self.size[a] >= self.size[b] { (a, b) } else { (b, a) };
        self.parent[small] = large;
        self.size[large] += self.size[small];
        let moved = std::mem::take(&mut self.facts[small]);
        self.facts[large].absorb(moved);
    }
}
