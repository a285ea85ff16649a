//! Deferred rewriting of instruction lists.

use std::collections::BTreeMap;

use crate::bytecode::Instruction;

/// Replacements for individual instructions of one method, applied in a single pass.
///
/// Indices refer to the instruction list as it was analyzed. Because nothing is
/// rewritten until [`ReplacementSet::apply`], registering a replacement never shifts the
/// indices of later registrations.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReplacementSet {
    replacements: BTreeMap<usize, Vec<Instruction>>,
}

impl ReplacementSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `sequence` to stand in for the instruction at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` already has a replacement. Every instruction is owned by
    /// exactly one rewrite, so a second registration is a bug in the caller.
    pub fn replace(&mut self, index: usize, sequence: Vec<Instruction>) {
        let previous = self.replacements.insert(index, sequence);
        assert!(previous.is_none(), "instruction {index} replaced twice");
    }

    /// Registers the deletion of the instruction at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` already has a replacement.
    pub fn remove(&mut self, index: usize) {
        self.replace(index, Vec::new());
    }

    /// Returns `true` if the instruction at `index` has a replacement.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.replacements.contains_key(&index)
    }

    /// Number of replaced instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.replacements.len()
    }

    /// Returns `true` if nothing is replaced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    /// Rewrites `instructions`, consuming the set.
    pub fn apply(mut self, instructions: &mut Vec<Instruction>) {
        if self.replacements.is_empty() {
            return;
        }

        let added: usize = self.replacements.values().map(Vec::len).sum();
        let mut rewritten = Vec::with_capacity(instructions.len() + added);
        for (index, insn) in std::mem::take(instructions).into_iter().enumerate() {
            match self.replacements.remove(&index) {
                Some(sequence) => rewritten.extend(sequence),
                None => rewritten.push(insn),
            }
        }
        *instructions = rewritten;
    }
}
