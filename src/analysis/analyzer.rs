//! Fixpoint driver of the dataflow analysis.

use std::collections::VecDeque;

use log::trace;

use crate::{
    analysis::{interpreter::Interpreter, FactTable, Frame, FrameValue, SourceId, ValueFacts, ValueType},
    bytecode::{Instruction, Label, MethodNode, TypeDescriptor},
    resolve::InheritanceChecker,
    Result,
};

const THROWABLE: &str = "java/lang/Throwable";

/// Default bound on the number of instructions executed per method.
pub const DEFAULT_MAX_ITERATIONS: usize = 100_000;

/// Abstract interpreter over one method at a time.
///
/// Runs a worklist over instruction indices until no frame changes, then hands out the
/// frames and the fact table. One analyzer can be shared by any number of threads.
///
/// # Examples
///
/// ```rust
/// use unpick::analysis::{Analyzer, SourceId};
/// use unpick::bytecode::{MethodAccess, MethodBuilder, Opcode};
/// use unpick::resolve::ClassRegistry;
///
/// let method = MethodBuilder::new(MethodAccess::STATIC, "f", "()I")
///     .push_int(4)
///     .op(Opcode::Ireturn)
///     .build()?;
///
/// let registry = ClassRegistry::new();
/// let analysis = Analyzer::new(&registry).analyze("p/A", &method)?;
/// let facts = analysis.literal_facts(0).unwrap();
/// assert!(facts.usages.contains(&1));
/// # Ok::<(), unpick::Error>(())
/// ```
pub struct Analyzer<'a> {
    inheritance: &'a dyn InheritanceChecker,
    max_iterations: usize,
}

impl<'a> Analyzer<'a> {
    /// Creates an analyzer with the default iteration bound.
    #[must_use]
    pub fn new(inheritance: &'a dyn InheritanceChecker) -> Self {
        Self {
            inheritance,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Sets the bound on executed instructions per method.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Analyzes `method`, declared in class `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the instruction stream cannot be
    /// interpreted: unknown labels, stack underflow or height mismatches, execution
    /// falling off the end, subroutines, or no fixpoint within the iteration bound.
    /// Returns [`crate::Error::InvalidDescriptor`] for unparsable descriptors.
    pub fn analyze(&self, owner: &str, method: &MethodNode) -> Result<Analysis> {
        let count = method.instructions.len();
        let mut facts = FactTable::new();
        if count == 0 {
            return Ok(Analysis {
                frames: Vec::new(),
                facts,
            });
        }

        let descriptor = method.parsed_descriptor()?;
        let labels = method.label_positions();
        let position = |label: &Label| {
            labels
                .get(label)
                .copied()
                .ok_or_else(|| malformed_error!("Unknown label {} in {}", label, method.name))
        };

        let handlers = method
            .try_catch_blocks
            .iter()
            .map(|block| {
                let catch_type = block.catch_type.as_deref().unwrap_or(THROWABLE);
                Ok(Handler {
                    start: position(&block.start)?,
                    end: position(&block.end)?,
                    entry: position(&block.handler)?,
                    catch_type: ValueType::Reference(catch_type.to_string()),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let interpreter = Interpreter::new(&descriptor.ret);
        let mut frames: Vec<Option<Frame>> = vec![None; count];
        frames[0] = Some(self.entry_frame(owner, method, &mut facts)?);

        let mut worklist = VecDeque::from([0]);
        let mut in_worklist = vec![false; count];
        in_worklist[0] = true;
        let mut iterations = 0;

        while let Some(index) = worklist.pop_front() {
            in_worklist[index] = false;
            iterations += 1;
            if iterations > self.max_iterations {
                return Err(malformed_error!(
                    "No fixpoint for {}{} after {} iterations",
                    method.name,
                    method.descriptor,
                    self.max_iterations
                ));
            }

            let Some(before) = frames[index].clone() else {
                continue;
            };
            let insn = &method.instructions[index];

            let mut after = before.clone();
            interpreter.execute(index, insn, &mut after, &mut facts)?;

            for handler in handlers.iter().filter(|h| h.start <= index && index < h.end) {
                let mut incoming = handler.frame(&before);
                self.flow(handler.entry, &incoming, &mut frames, &mut facts, &mut worklist, &mut in_worklist)?;
                if matches!(insn, Instruction::Var(..) | Instruction::Iinc { .. }) {
                    incoming = handler.frame(&after);
                    self.flow(handler.entry, &incoming, &mut frames, &mut facts, &mut worklist, &mut in_worklist)?;
                }
            }

            for target in insn.branch_targets() {
                let target = position(&target)?;
                self.flow(target, &after, &mut frames, &mut facts, &mut worklist, &mut in_worklist)?;
            }

            let falls_through = insn.opcode().map_or(true, |op| !op.ends_block());
            if falls_through {
                if index + 1 >= count {
                    return Err(malformed_error!(
                        "Execution falls off the end of {}{}",
                        method.name,
                        method.descriptor
                    ));
                }
                self.flow(index + 1, &after, &mut frames, &mut facts, &mut worklist, &mut in_worklist)?;
            }
        }

        trace!(
            "Analyzed {}.{}{}: {} iterations, {} fact classes",
            owner,
            method.name,
            method.descriptor,
            iterations,
            facts.class_count()
        );
        Ok(Analysis { frames, facts })
    }

    /// Builds the frame at method entry: receiver untracked, parameters tracked.
    fn entry_frame(&self, owner: &str, method: &MethodNode, facts: &mut FactTable) -> Result<Frame> {
        let descriptor = method.parsed_descriptor()?;
        let receiver = usize::from(!method.is_static());
        let max_locals = usize::from(method.max_locals).max(receiver + descriptor.argument_slots());
        let mut frame = Frame::new(max_locals);

        if receiver == 1 {
            frame.set_local(0, FrameValue::untracked(ValueType::Reference(owner.to_string())))?;
        }

        let mut slot = receiver;
        for (index, param) in descriptor.params.iter().enumerate() {
            let Some(value_type) = ValueType::from_descriptor(param) else {
                continue;
            };
            let source = SourceId::Parameter(index);
            facts.facts_mut(source).param_sources.insert(index);
            frame.set_local(slot, FrameValue::new(value_type, source))?;
            slot += TypeDescriptor::size(param);
        }
        Ok(frame)
    }

    /// Propagates `incoming` to the instruction at `target`.
    fn flow(
        &self,
        target: usize,
        incoming: &Frame,
        frames: &mut [Option<Frame>],
        facts: &mut FactTable,
        worklist: &mut VecDeque<usize>,
        in_worklist: &mut [bool],
    ) -> Result<()> {
        let changed = match &mut frames[target] {
            Some(existing) => existing.merge(incoming, self.inheritance, facts)?,
            slot @ None => {
                *slot = Some(incoming.clone());
                true
            }
        };
        if changed && !in_worklist[target] {
            in_worklist[target] = true;
            worklist.push_back(target);
        }
        Ok(())
    }
}

struct Handler {
    start: usize,
    end: usize,
    entry: usize,
    catch_type: ValueType,
}

impl Handler {
    /// The frame at handler entry: the locals of `frame` and the caught exception.
    fn frame(&self, frame: &Frame) -> Frame {
        let mut handler_frame = frame.clone();
        handler_frame.clear_stack();
        handler_frame.push(FrameValue::new(
            self.catch_type.clone(),
            SourceId::Instruction(self.entry),
        ));
        handler_frame
    }
}

/// Result of analyzing one method.
#[derive(Debug)]
pub struct Analysis {
    frames: Vec<Option<Frame>>,
    facts: FactTable,
}

impl Analysis {
    /// Returns the frame before the instruction at `index`, or `None` if the
    /// instruction is unreachable.
    #[must_use]
    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)?.as_ref()
    }

    /// Returns `true` if the instruction at `index` is reachable.
    #[must_use]
    pub fn is_reachable(&self, index: usize) -> bool {
        self.frame(index).is_some()
    }

    /// Returns the fact table.
    #[must_use]
    pub fn facts(&self) -> &FactTable {
        &self.facts
    }

    /// Returns the facts of the value pushed by the instruction at `index`.
    #[must_use]
    pub fn literal_facts(&self, index: usize) -> Option<&ValueFacts> {
        if !self.is_reachable(index) {
            return None;
        }
        self.facts.facts(SourceId::Instruction(index))
    }

    /// Returns the class identifier of the value pushed at `index`. Literals with the
    /// same root are one value and resolve to the same group.
    #[must_use]
    pub fn literal_root(&self, index: usize) -> Option<usize> {
        self.facts.root(SourceId::Instruction(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{MethodAccess, MethodBuilder, Opcode},
        expression::DataType,
        resolve::ClassRegistry,
    };

    #[test]
    fn test_join_merges_literals() {
        // return flag ? 4 : 8;
        let method = MethodBuilder::new(MethodAccess::STATIC, "pick", "(Z)I")
            .var(Opcode::Iload, 0)
            .jump(Opcode::Ifeq, "else")
            .push_int(4)
            .jump(Opcode::Goto, "end")
            .label("else")
            .push_int(8)
            .label("end")
            .op(Opcode::Ireturn)
            .build()
            .unwrap();
        let registry = ClassRegistry::new();
        let analysis = Analyzer::new(&registry).analyze("p/A", &method).unwrap();

        let four = method
            .instructions
            .iter()
            .position(|insn| insn == &Instruction::push_int(4))
            .unwrap();
        let eight = method
            .instructions
            .iter()
            .position(|insn| insn == &Instruction::push_int(8))
            .unwrap();
        let ret = method.instructions.len() - 1;

        assert_eq!(analysis.literal_root(four), analysis.literal_root(eight));
        assert!(analysis.literal_facts(four).unwrap().usages.contains(&ret));
        assert!(analysis.literal_facts(eight).unwrap().usages.contains(&ret));
    }

    #[test]
    fn test_loop_back_edge_reaches_earlier_values() {
        // int x = 1; while (c) { paint(x); x = 2; }
        let method = MethodBuilder::new(MethodAccess::STATIC, "f", "(Z)V")
            .push_int(1)
            .var(Opcode::Istore, 1)
            .label("head")
            .var(Opcode::Iload, 0)
            .jump(Opcode::Ifeq, "end")
            .var(Opcode::Iload, 1)
            .invoke(Opcode::Invokestatic, "p/Api", "paint", "(I)V")
            .push_int(2)
            .var(Opcode::Istore, 1)
            .jump(Opcode::Goto, "head")
            .label("end")
            .op(Opcode::Return)
            .build()
            .unwrap();
        let registry = ClassRegistry::new();
        let analysis = Analyzer::new(&registry).analyze("p/A", &method).unwrap();

        let position = |target: &Instruction| {
            method
                .instructions
                .iter()
                .position(|insn| insn == target)
                .unwrap()
        };
        let one = position(&Instruction::push_int(1));
        let two = position(&Instruction::push_int(2));
        let call = method
            .instructions
            .iter()
            .position(|insn| insn.opcode() == Some(Opcode::Invokestatic))
            .unwrap();

        assert_eq!(analysis.literal_root(one), analysis.literal_root(two));
        for literal in [one, two] {
            let facts = analysis.literal_facts(literal).unwrap();
            assert!(facts.param_usages.contains(&(call, 0)));
            assert!(facts.narrow_types.contains(DataType::Int));
        }
    }

    #[test]
    fn test_parameters_are_sources() {
        // return value != 0 ? value : 16;
        let method = MethodBuilder::new(MethodAccess::STATIC, "orDefault", "(JS)S")
            .var(Opcode::Iload, 2)
            .var(Opcode::Istore, 3)
            .var(Opcode::Iload, 3)
            .jump(Opcode::Ifne, "done")
            .push_int(16)
            .var(Opcode::Istore, 3)
            .label("done")
            .var(Opcode::Iload, 3)
            .op(Opcode::Ireturn)
            .build()
            .unwrap();
        let registry = ClassRegistry::new();
        let analysis = Analyzer::new(&registry).analyze("p/A", &method).unwrap();

        let literal = method
            .instructions
            .iter()
            .position(|insn| insn == &Instruction::push_int(16))
            .unwrap();
        let facts = analysis.literal_facts(literal).unwrap();
        assert!(facts.param_sources.contains(&1));
        assert!(facts.narrow_types.contains(DataType::Short));
    }

    #[test]
    fn test_unreachable_code_has_no_facts() {
        let method = MethodBuilder::new(MethodAccess::STATIC, "f", "()V")
            .op(Opcode::Return)
            .push_int(3)
            .op(Opcode::Pop)
            .op(Opcode::Return)
            .build()
            .unwrap();
        let registry = ClassRegistry::new();
        let analysis = Analyzer::new(&registry).analyze("p/A", &method).unwrap();
        assert!(!analysis.is_reachable(1));
        assert!(analysis.literal_facts(1).is_none());
    }

    #[test]
    fn test_exception_handlers() {
        let method = MethodBuilder::new(MethodAccess::STATIC, "f", "()I")
            .label("start")
            .push_int(5)
            .var(Opcode::Istore, 0)
            .invoke(Opcode::Invokestatic, "p/A", "g", "()V")
            .label("end")
            .var(Opcode::Iload, 0)
            .op(Opcode::Ireturn)
            .label("handler")
            .op(Opcode::Pop)
            .var(Opcode::Iload, 0)
            .op(Opcode::Ireturn)
            .try_catch("start", "end", "handler", Some("java/lang/Exception"))
            .build()
            .unwrap();
        let registry = ClassRegistry::new();
        let analysis = Analyzer::new(&registry).analyze("p/A", &method).unwrap();

        let positions = method.label_positions();
        let handler = positions[&Label(2)];
        let frame = analysis.frame(handler).unwrap();
        assert_eq!(
            frame.peek(0).unwrap().value_type,
            ValueType::Reference("java/lang/Exception".to_string())
        );
        // The store inside the protected range reaches the handler.
        assert!(frame.locals()[0].sources.contains(&SourceId::Instruction(1)));
    }

    #[test]
    fn test_malformed_methods() {
        let registry = ClassRegistry::new();

        let underflow = MethodBuilder::new(MethodAccess::STATIC, "f", "()V")
            .op(Opcode::Pop)
            .op(Opcode::Return)
            .build()
            .unwrap();
        assert!(Analyzer::new(&registry).analyze("p/A", &underflow).is_err());

        let falls_off = MethodBuilder::new(MethodAccess::STATIC, "f", "()V")
            .push_int(1)
            .op(Opcode::Pop)
            .build()
            .unwrap();
        assert!(Analyzer::new(&registry).analyze("p/A", &falls_off).is_err());

        let looping = MethodBuilder::new(MethodAccess::STATIC, "f", "()V")
            .label("top")
            .jump(Opcode::Goto, "top")
            .build()
            .unwrap();
        assert!(Analyzer::new(&registry)
            .with_max_iterations(10)
            .analyze("p/A", &looping)
            .is_ok());
        assert!(Analyzer::new(&registry)
            .with_max_iterations(1)
            .analyze("p/A", &looping)
            .is_err());

        let mismatch = MethodBuilder::new(MethodAccess::STATIC, "f", "(I)V")
            .label("top")
            .push_int(1)
            .var(Opcode::Iload, 0)
            .jump(Opcode::Ifne, "top")
            .op(Opcode::Return)
            .build()
            .unwrap();
        assert!(Analyzer::new(&registry).analyze("p/A", &mismatch).is_err());
    }
}
