//! Abstract execution frames.

use crate::{
    analysis::{FactTable, FrameValue, ValueType},
    resolve::InheritanceChecker,
    Result,
};

/// The abstract state before an instruction: local variables and operand stack.
///
/// Every stack entry is one value regardless of its category; `long` and `double`
/// locals occupy their slot plus a [`ValueType::Top`] slot after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    locals: Vec<FrameValue>,
    stack: Vec<FrameValue>,
}

impl Frame {
    /// Creates a frame with `max_locals` empty locals and an empty stack.
    #[must_use]
    pub fn new(max_locals: usize) -> Self {
        Self {
            locals: vec![FrameValue::top(); max_locals],
            stack: Vec::new(),
        }
    }

    /// Returns the local variables.
    #[must_use]
    pub fn locals(&self) -> &[FrameValue] {
        &self.locals
    }

    /// Returns the operand stack, bottom first.
    #[must_use]
    pub fn stack(&self) -> &[FrameValue] {
        &self.stack
    }

    /// Returns the value `depth` entries below the top of the stack.
    #[must_use]
    pub fn peek(&self, depth: usize) -> Option<&FrameValue> {
        self.stack.iter().rev().nth(depth)
    }

    pub(crate) fn push(&mut self, value: FrameValue) {
        self.stack.push(value);
    }

    pub(crate) fn pop(&mut self) -> Result<FrameValue> {
        self.stack
            .pop()
            .ok_or_else(|| malformed_error!("Operand stack underflow"))
    }

    pub(crate) fn clear_stack(&mut self) {
        self.stack.clear();
    }

    /// Pops values covering exactly `words` stack words, returned bottom first.
    pub(crate) fn pop_words(&mut self, words: usize) -> Result<Vec<FrameValue>> {
        let mut taken = Vec::new();
        let mut count = 0;
        while count < words {
            let value = self.pop()?;
            count += value.size();
            taken.push(value);
        }
        if count != words {
            return Err(malformed_error!("Stack operation splits a two-word value"));
        }
        taken.reverse();
        Ok(taken)
    }

    /// Duplicates the top `copy` words and inserts the copy below the `skip` words
    /// underneath them. Covers the whole `dup` family.
    pub(crate) fn dup_words(&mut self, copy: usize, skip: usize) -> Result<()> {
        let copied = self.pop_words(copy)?;
        let skipped = self.pop_words(skip)?;
        self.stack.extend(copied.iter().cloned());
        self.stack.extend(skipped);
        self.stack.extend(copied);
        Ok(())
    }

    pub(crate) fn local(&self, index: usize) -> Result<&FrameValue> {
        self.locals
            .get(index)
            .ok_or_else(|| malformed_error!("Local variable {} out of range", index))
    }

    pub(crate) fn set_local(&mut self, index: usize, value: FrameValue) -> Result<()> {
        let size = value.size();
        if index + size > self.locals.len() {
            return Err(malformed_error!("Local variable {} out of range", index));
        }
        // Overwriting the second half of a wide value invalidates the first half.
        if index > 0 && self.locals[index - 1].size() == 2 {
            self.locals[index - 1] = FrameValue::top();
        }
        self.locals[index] = value;
        if size == 2 {
            self.locals[index + 1] = FrameValue::top();
        }
        Ok(())
    }

    /// Merges `incoming` into this frame at a control flow join.
    ///
    /// Slot types are joined; source sets are unioned and, for slots that keep a usable
    /// type, the fact classes of all sources are unified. Returns `true` if this frame
    /// changed.
    pub(crate) fn merge(
        &mut self,
        incoming: &Frame,
        inheritance: &dyn InheritanceChecker,
        facts: &mut FactTable,
    ) -> Result<bool> {
        if self.stack.len() != incoming.stack.len() {
            return Err(malformed_error!(
                "Inconsistent stack heights {} and {} at join",
                self.stack.len(),
                incoming.stack.len()
            ));
        }
        if self.locals.len() != incoming.locals.len() {
            return Err(malformed_error!("Inconsistent local variable counts at join"));
        }

        let mut changed = false;
        for (slot, other) in self
            .locals
            .iter_mut()
            .chain(self.stack.iter_mut())
            .zip(incoming.locals.iter().chain(incoming.stack.iter()))
        {
            changed |= merge_value(slot, other, inheritance, facts);
        }
        Ok(changed)
    }
}

fn merge_value(
    slot: &mut FrameValue,
    other: &FrameValue,
    inheritance: &dyn InheritanceChecker,
    facts: &mut FactTable,
) -> bool {
    if slot == other {
        return false;
    }

    let value_type = slot.value_type.join(&other.value_type, inheritance);
    let before = slot.sources.len();
    let sources = slot.sources.clone().union(other.sources.clone());
    let changed = value_type != slot.value_type || sources.len() != before;

    if value_type != ValueType::Top {
        facts.union_all(sources.iter());
    }
    slot.value_type = value_type;
    slot.sources = sources;
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analysis::SourceId, resolve::ClassRegistry};

    #[test]
    fn test_merge_unifies_sources() {
        let registry = ClassRegistry::new();
        let mut facts = FactTable::new();
        let mut left = Frame::new(1);
        let mut right = Frame::new(1);
        left.push(FrameValue::new(ValueType::Int, SourceId::Instruction(1)));
        right.push(FrameValue::new(ValueType::Byte, SourceId::Instruction(2)));
        facts.facts_mut(SourceId::Instruction(2)).usages.insert(7);

        assert!(left.merge(&right, &registry, &mut facts).unwrap());
        assert!(!left.merge(&right, &registry, &mut facts).unwrap());

        let merged = left.peek(0).unwrap();
        assert_eq!(merged.value_type, ValueType::Int);
        assert_eq!(merged.sources.len(), 2);
        assert_eq!(
            facts.root(SourceId::Instruction(1)),
            facts.root(SourceId::Instruction(2))
        );
    }

    #[test]
    fn test_merge_to_top_keeps_classes_apart() {
        let registry = ClassRegistry::new();
        let mut facts = FactTable::new();
        let mut left = Frame::new(2);
        let mut right = Frame::new(2);
        left.set_local(0, FrameValue::new(ValueType::Int, SourceId::Instruction(1)))
            .unwrap();
        right
            .set_local(0, FrameValue::new(ValueType::Float, SourceId::Instruction(2)))
            .unwrap();
        facts.facts_mut(SourceId::Instruction(1));
        facts.facts_mut(SourceId::Instruction(2));

        assert!(left.merge(&right, &registry, &mut facts).unwrap());
        assert_eq!(left.locals()[0].value_type, ValueType::Top);
        assert_ne!(
            facts.root(SourceId::Instruction(1)),
            facts.root(SourceId::Instruction(2))
        );
    }

    #[test]
    fn test_stack_height_mismatch() {
        let registry = ClassRegistry::new();
        let mut facts = FactTable::new();
        let mut left = Frame::new(0);
        let mut right = Frame::new(0);
        right.push(FrameValue::top());
        assert!(left.merge(&right, &registry, &mut facts).is_err());
    }

    #[test]
    fn test_dup_family() {
        let int = |i| FrameValue::new(ValueType::Int, SourceId::Instruction(i));
        let long = |i| FrameValue::new(ValueType::Long, SourceId::Instruction(i));

        let mut frame = Frame::new(0);
        frame.push(int(1));
        frame.push(int(2));
        frame.dup_words(1, 1).unwrap();
        assert_eq!(frame.stack(), &[int(2), int(1), int(2)]);

        let mut frame = Frame::new(0);
        frame.push(int(1));
        frame.push(long(2));
        frame.dup_words(2, 1).unwrap();
        assert_eq!(frame.stack(), &[long(2), int(1), long(2)]);

        let mut frame = Frame::new(0);
        frame.push(long(1));
        assert!(frame.dup_words(1, 0).is_err());
    }

    #[test]
    fn test_wide_locals() {
        let mut frame = Frame::new(3);
        frame
            .set_local(0, FrameValue::new(ValueType::Long, SourceId::Parameter(0)))
            .unwrap();
        assert_eq!(frame.local(1).unwrap().value_type, ValueType::Top);
        frame
            .set_local(1, FrameValue::new(ValueType::Int, SourceId::Instruction(4)))
            .unwrap();
        assert_eq!(frame.local(0).unwrap().value_type, ValueType::Top);
        assert!(frame
            .set_local(2, FrameValue::new(ValueType::Double, SourceId::Instruction(5)))
            .is_err());
    }
}
