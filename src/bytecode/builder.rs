//! Fluent assembly of method bodies.
//!
//! [`MethodBuilder`] turns a sequence of instructions with named labels into a
//! [`MethodNode`]. Labels may be referenced before they are placed; `build` checks that
//! every referenced label was placed exactly once.
//!
//! ```rust
//! use unpick::bytecode::{MethodAccess, MethodBuilder, Opcode};
//!
//! // static int clamp(int v) { return v < 0 ? 0 : v; }
//! let method = MethodBuilder::new(MethodAccess::STATIC, "clamp", "(I)I")
//!     .var(Opcode::Iload, 0)
//!     .jump(Opcode::Ifge, "positive")
//!     .push_int(0)
//!     .op(Opcode::Ireturn)
//!     .label("positive")
//!     .var(Opcode::Iload, 0)
//!     .op(Opcode::Ireturn)
//!     .build()?;
//!
//! assert_eq!(method.max_locals, 1);
//! # Ok::<(), unpick::Error>(())
//! ```

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    bytecode::{
        Constant, Instruction, InvokeDynamicInsn, Label, MethodAccess, MethodDescriptor,
        MethodNode, Opcode, TryCatchBlock,
    },
    expression::ConstValue,
    Result,
};

/// Builder for [`MethodNode`]s.
pub struct MethodBuilder {
    method: MethodNode,
    labels: FxHashMap<String, Label>,
    placed: FxHashSet<Label>,
    duplicate: Option<String>,
    max_locals: Option<u16>,
}

impl MethodBuilder {
    /// Starts a method with the given signature.
    pub fn new(access: MethodAccess, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            method: MethodNode::new(access, name, descriptor),
            labels: FxHashMap::default(),
            placed: FxHashSet::default(),
            duplicate: None,
            max_locals: None,
        }
    }

    /// Places the label `name` at the current position.
    #[must_use]
    pub fn label(mut self, name: &str) -> Self {
        let label = self.label_id(name);
        if !self.placed.insert(label) && self.duplicate.is_none() {
            self.duplicate = Some(name.to_string());
        }
        self.insn(Instruction::Label(label))
    }

    /// Appends an arbitrary instruction.
    #[must_use]
    pub fn insn(mut self, instruction: Instruction) -> Self {
        self.method.instructions.push(instruction);
        self
    }

    /// Appends an instruction without operands.
    #[must_use]
    pub fn op(self, opcode: Opcode) -> Self {
        self.insn(Instruction::Simple(opcode))
    }

    /// Appends the shortest push of an `int`.
    #[must_use]
    pub fn push_int(self, value: i32) -> Self {
        self.insn(Instruction::push_int(value))
    }

    /// Appends the shortest push of any constant.
    #[must_use]
    pub fn push(self, value: &ConstValue) -> Self {
        self.insn(Instruction::push(value))
    }

    /// Appends an `ldc`.
    #[must_use]
    pub fn ldc(self, constant: Constant) -> Self {
        self.insn(Instruction::Ldc(constant))
    }

    /// Appends a local variable instruction.
    #[must_use]
    pub fn var(self, opcode: Opcode, var: u16) -> Self {
        self.insn(Instruction::Var(opcode, var))
    }

    /// Appends an `iinc`.
    #[must_use]
    pub fn iinc(self, var: u16, increment: i16) -> Self {
        self.insn(Instruction::Iinc { var, increment })
    }

    /// Appends a type instruction such as `checkcast`.
    #[must_use]
    pub fn type_insn(self, opcode: Opcode, name: impl Into<String>) -> Self {
        self.insn(Instruction::Type(opcode, name.into()))
    }

    /// Appends a field access.
    #[must_use]
    pub fn field(self, opcode: Opcode, owner: &str, name: &str, descriptor: &str) -> Self {
        self.insn(Instruction::field(opcode, owner, name, descriptor))
    }

    /// Appends a method invocation.
    #[must_use]
    pub fn invoke(self, opcode: Opcode, owner: &str, name: &str, descriptor: &str) -> Self {
        self.insn(Instruction::method(opcode, owner, name, descriptor))
    }

    /// Appends an `invokedynamic`.
    #[must_use]
    pub fn invoke_dynamic(self, insn: InvokeDynamicInsn) -> Self {
        self.insn(Instruction::InvokeDynamic(insn))
    }

    /// Appends a branch to the label `target`.
    #[must_use]
    pub fn jump(mut self, opcode: Opcode, target: &str) -> Self {
        let label = self.label_id(target);
        self.insn(Instruction::Jump(opcode, label))
    }

    /// Appends a `tableswitch` over `low..=low + targets.len() - 1`.
    #[must_use]
    pub fn table_switch(mut self, low: i32, default: &str, targets: &[&str]) -> Self {
        let default = self.label_id(default);
        let targets: Vec<Label> = targets.iter().map(|name| self.label_id(name)).collect();
        let high = low.saturating_add(i32::try_from(targets.len()).unwrap_or(i32::MAX) - 1);
        self.insn(Instruction::TableSwitch {
            low,
            high,
            default,
            targets,
        })
    }

    /// Appends a `lookupswitch`.
    #[must_use]
    pub fn lookup_switch(mut self, default: &str, pairs: &[(i32, &str)]) -> Self {
        let default = self.label_id(default);
        let pairs = pairs
            .iter()
            .map(|(key, name)| (*key, self.label_id(name)))
            .collect();
        self.insn(Instruction::LookupSwitch { default, pairs })
    }

    /// Registers an exception handler over `start..end`.
    #[must_use]
    pub fn try_catch(mut self, start: &str, end: &str, handler: &str, catch_type: Option<&str>) -> Self {
        let block = TryCatchBlock {
            start: self.label_id(start),
            end: self.label_id(end),
            handler: self.label_id(handler),
            catch_type: catch_type.map(str::to_string),
        };
        self.method.try_catch_blocks.push(block);
        self
    }

    /// Overrides the computed local variable count.
    #[must_use]
    pub fn max_locals(mut self, max_locals: u16) -> Self {
        self.max_locals = Some(max_locals);
        self
    }

    /// Sets the maximum stack depth.
    #[must_use]
    pub fn max_stack(mut self, max_stack: u16) -> Self {
        self.method.max_stack = max_stack;
        self
    }

    /// Finishes the method.
    ///
    /// Unless overridden, `max_locals` is the larger of the parameter slots and the
    /// highest local variable the code touches.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if a label was referenced but never placed
    /// or placed twice, and [`crate::Error::InvalidDescriptor`] for a bad descriptor.
    pub fn build(mut self) -> Result<MethodNode> {
        if let Some(name) = &self.duplicate {
            return Err(malformed_error!("Label {} placed twice", name));
        }
        for (name, label) in &self.labels {
            if !self.placed.contains(label) {
                return Err(malformed_error!("Label {} referenced but never placed", name));
            }
        }

        let descriptor = MethodDescriptor::parse(&self.method.descriptor)?;
        let receiver = usize::from(!self.method.is_static());
        let mut locals = receiver + descriptor.argument_slots();
        for insn in &self.method.instructions {
            let touched = match insn {
                Instruction::Var(op, var) => {
                    let wide = matches!(
                        op,
                        Opcode::Lload | Opcode::Dload | Opcode::Lstore | Opcode::Dstore
                    );
                    usize::from(*var) + if wide { 2 } else { 1 }
                }
                Instruction::Iinc { var, .. } => usize::from(*var) + 1,
                _ => 0,
            };
            locals = locals.max(touched);
        }

        self.method.max_locals = match self.max_locals {
            Some(explicit) => explicit,
            None => u16::try_from(locals)
                .map_err(|_| malformed_error!("Method uses {} locals", locals))?,
        };
        Ok(self.method)
    }

    fn label_id(&mut self, name: &str) -> Label {
        let next = Label(u32::try_from(self.labels.len()).unwrap_or(u32::MAX));
        *self.labels.entry(name.to_string()).or_insert(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_labels() {
        let method = MethodBuilder::new(MethodAccess::empty(), "m", "(J)V")
            .jump(Opcode::Goto, "end")
            .var(Opcode::Istore, 5)
            .label("end")
            .op(Opcode::Return)
            .build()
            .unwrap();

        assert_eq!(method.instructions.len(), 4);
        assert_eq!(method.instructions[0], Instruction::Jump(Opcode::Goto, Label(0)));
        assert_eq!(method.instructions[2], Instruction::Label(Label(0)));
        assert_eq!(method.max_locals, 6);
    }

    #[test]
    fn test_unplaced_label() {
        let result = MethodBuilder::new(MethodAccess::STATIC, "m", "()V")
            .jump(Opcode::Goto, "nowhere")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_label() {
        let result = MethodBuilder::new(MethodAccess::STATIC, "m", "()V")
            .label("a")
            .label("a")
            .op(Opcode::Return)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_switch_and_handlers() {
        let method = MethodBuilder::new(MethodAccess::STATIC, "m", "(I)V")
            .label("start")
            .var(Opcode::Iload, 0)
            .table_switch(1, "out", &["one", "two"])
            .label("one")
            .label("two")
            .label("out")
            .op(Opcode::Return)
            .label("end")
            .label("handler")
            .op(Opcode::Athrow)
            .try_catch("start", "end", "handler", Some("java/lang/Exception"))
            .build()
            .unwrap();

        match &method.instructions[2] {
            Instruction::TableSwitch { low, high, targets, .. } => {
                assert_eq!((*low, *high), (1, 2));
                assert_eq!(targets.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(method.try_catch_blocks.len(), 1);
    }
}
