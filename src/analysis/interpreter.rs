//! Transfer function of the analyzer.
//!
//! [`Interpreter::execute`] applies one instruction to a frame. Besides the usual stack
//! and local effects it records backward facts: each consumer of a value notes itself
//! as a usage of the value's sources and tags them with the narrow type it implies.
//! Instructions that move a value unchanged (loads, stores, `dup*`, `swap`) keep its
//! sources, so facts recorded on the copy reach the original push.

use crate::{
    analysis::{FactTable, Frame, FrameValue, SourceId, ValueType},
    bytecode::{
        Constant, FieldInsn, Instruction, MethodDescriptor, Opcode, TypeDescriptor,
    },
    expression::DataType,
    Result,
};

const STRING: &str = "java/lang/String";
const CLASS: &str = "java/lang/Class";

/// Applies instructions of one method to abstract frames.
pub(crate) struct Interpreter {
    return_type: Option<DataType>,
}

impl Interpreter {
    /// Creates an interpreter for a method returning `return_type`.
    pub(crate) fn new(return_type: &TypeDescriptor) -> Self {
        Self {
            return_type: return_type.data_type(),
        }
    }

    /// Executes the instruction at `index` on `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] on stack underflow, bad local indices,
    /// malformed descriptors and subroutine instructions.
    pub(crate) fn execute(
        &self,
        index: usize,
        insn: &Instruction,
        frame: &mut Frame,
        facts: &mut FactTable,
    ) -> Result<()> {
        let produced = |value_type| FrameValue::new(value_type, SourceId::Instruction(index));

        if let Some(value) = insn.literal() {
            let data_type = value.data_type();
            facts
                .facts_mut(SourceId::Instruction(index))
                .narrow_types
                .insert(data_type);
            frame.push(produced(ValueType::from_data_type(data_type)));
            return Ok(());
        }

        match insn {
            Instruction::Label(_) | Instruction::LineNumber { .. } => {}
            Instruction::Simple(op) => self.execute_simple(index, *op, frame, facts)?,
            Instruction::Int(Opcode::Newarray, code) => {
                let count = frame.pop()?;
                consume(facts, &count, index, Some(DataType::Int));
                let element = primitive_array_element(*code)
                    .ok_or_else(|| malformed_error!("Invalid newarray type {}", code))?;
                frame.push(produced(ValueType::Reference(format!("[{element}"))));
            }
            Instruction::Int(op, _) => {
                return Err(malformed_error!("Unexpected operand for {}", op));
            }
            Instruction::Ldc(constant) => {
                let class = match constant {
                    Constant::MethodType(_) => "java/lang/invoke/MethodType",
                    Constant::Handle(_) => "java/lang/invoke/MethodHandle",
                    _ => return Err(malformed_error!("Unexpected constant {}", constant)),
                };
                frame.push(FrameValue::untracked(ValueType::Reference(class.to_string())));
            }
            Instruction::Var(op, var) => {
                let var = usize::from(*var);
                match op {
                    Opcode::Iload | Opcode::Lload | Opcode::Fload | Opcode::Dload | Opcode::Aload => {
                        let value = frame.local(var)?.clone();
                        if value.value_type == ValueType::Top {
                            frame.push(FrameValue::untracked(load_type(*op)));
                        } else {
                            frame.push(value);
                        }
                    }
                    Opcode::Istore
                    | Opcode::Lstore
                    | Opcode::Fstore
                    | Opcode::Dstore
                    | Opcode::Astore => {
                        let value = frame.pop()?;
                        frame.set_local(var, value)?;
                    }
                    _ => return Err(malformed_error!("Unsupported instruction {}", op)),
                }
            }
            Instruction::Iinc { var, .. } => {
                frame.set_local(usize::from(*var), produced(ValueType::Int))?;
            }
            Instruction::Type(op, type_name) => match op {
                Opcode::New => frame.push(produced(ValueType::Reference(type_name.clone()))),
                Opcode::Anewarray => {
                    let count = frame.pop()?;
                    consume(facts, &count, index, Some(DataType::Int));
                    let array = if type_name.starts_with('[') {
                        format!("[{type_name}")
                    } else {
                        format!("[L{type_name};")
                    };
                    frame.push(produced(ValueType::Reference(array)));
                }
                Opcode::Checkcast => {
                    let mut value = frame.pop()?;
                    consume(facts, &value, index, class_data_type(type_name));
                    value.value_type = ValueType::Reference(type_name.clone());
                    frame.push(value);
                }
                Opcode::Instanceof => {
                    frame.pop()?;
                    frame.push(produced(ValueType::Int));
                }
                _ => return Err(malformed_error!("Unexpected type operand for {}", op)),
            },
            Instruction::Field(op, field) => self.execute_field(index, *op, field, frame, facts)?,
            Instruction::Method(op, method) => {
                let descriptor = MethodDescriptor::parse(&method.descriptor)?;
                pop_arguments(index, &descriptor, frame, facts)?;
                if *op != Opcode::Invokestatic {
                    frame.pop()?;
                }
                push_result(index, &descriptor.ret, frame, facts);
            }
            Instruction::InvokeDynamic(indy) => {
                let descriptor = MethodDescriptor::parse(&indy.descriptor)?;
                pop_arguments(index, &descriptor, frame, facts)?;
                push_result(index, &descriptor.ret, frame, facts);
            }
            Instruction::Jump(op, _) => match op {
                Opcode::Goto => {}
                Opcode::Ifeq
                | Opcode::Ifne
                | Opcode::Iflt
                | Opcode::Ifge
                | Opcode::Ifgt
                | Opcode::Ifle => {
                    let value = frame.pop()?;
                    consume(facts, &value, index, Some(DataType::Int));
                }
                Opcode::IfIcmpeq
                | Opcode::IfIcmpne
                | Opcode::IfIcmplt
                | Opcode::IfIcmpge
                | Opcode::IfIcmpgt
                | Opcode::IfIcmple => {
                    let rhs = frame.pop()?;
                    let lhs = frame.pop()?;
                    unify(facts, &[&lhs, &rhs]);
                    consume(facts, &lhs, index, None);
                }
                Opcode::IfAcmpeq | Opcode::IfAcmpne => {
                    frame.pop()?;
                    frame.pop()?;
                }
                Opcode::Ifnull | Opcode::Ifnonnull => {
                    frame.pop()?;
                }
                _ => return Err(malformed_error!("Unsupported instruction {}", op)),
            },
            Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. } => {
                let key = frame.pop()?;
                consume(facts, &key, index, Some(DataType::Int));
            }
            Instruction::MultiANewArray { descriptor, dims } => {
                for _ in 0..*dims {
                    let count = frame.pop()?;
                    consume(facts, &count, index, Some(DataType::Int));
                }
                frame.push(produced(ValueType::Reference(descriptor.clone())));
            }
        }
        Ok(())
    }

    fn execute_simple(
        &self,
        index: usize,
        op: Opcode,
        frame: &mut Frame,
        facts: &mut FactTable,
    ) -> Result<()> {
        let produced = |value_type| FrameValue::new(value_type, SourceId::Instruction(index));

        match op {
            Opcode::Nop => {}
            Opcode::AconstNull => frame.push(FrameValue::untracked(ValueType::Null)),

            Opcode::Iaload
            | Opcode::Laload
            | Opcode::Faload
            | Opcode::Daload
            | Opcode::Aaload
            | Opcode::Baload
            | Opcode::Caload
            | Opcode::Saload => {
                let position = frame.pop()?;
                consume(facts, &position, index, Some(DataType::Int));
                let array = frame.pop()?;
                let element = match op {
                    Opcode::Iaload => ValueType::Int,
                    Opcode::Laload => ValueType::Long,
                    Opcode::Faload => ValueType::Float,
                    Opcode::Daload => ValueType::Double,
                    Opcode::Caload => ValueType::Char,
                    Opcode::Saload => ValueType::Short,
                    Opcode::Baload if array.value_type.array_element() == Some(ValueType::Boolean) => {
                        ValueType::Boolean
                    }
                    Opcode::Baload => ValueType::Byte,
                    _ => array
                        .value_type
                        .array_element()
                        .unwrap_or_else(|| ValueType::Reference(crate::resolve::OBJECT.to_string())),
                };
                frame.push(produced(element));
            }

            Opcode::Iastore
            | Opcode::Lastore
            | Opcode::Fastore
            | Opcode::Dastore
            | Opcode::Aastore
            | Opcode::Bastore
            | Opcode::Castore
            | Opcode::Sastore => {
                let value = frame.pop()?;
                let position = frame.pop()?;
                let array = frame.pop()?;
                consume(facts, &position, index, Some(DataType::Int));
                let boolean_array = array.value_type.array_element() == Some(ValueType::Boolean);
                if !(op == Opcode::Bastore && boolean_array) {
                    consume(facts, &value, index, op.array_store_type());
                }
            }

            Opcode::Pop => {
                frame.pop_words(1)?;
            }
            Opcode::Pop2 => {
                frame.pop_words(2)?;
            }
            Opcode::Dup => frame.dup_words(1, 0)?,
            Opcode::DupX1 => frame.dup_words(1, 1)?,
            Opcode::DupX2 => frame.dup_words(1, 2)?,
            Opcode::Dup2 => frame.dup_words(2, 0)?,
            Opcode::Dup2X1 => frame.dup_words(2, 1)?,
            Opcode::Dup2X2 => frame.dup_words(2, 2)?,
            Opcode::Swap => {
                let top = frame.pop_words(1)?;
                let below = frame.pop_words(1)?;
                for value in top.into_iter().chain(below) {
                    frame.push(value);
                }
            }

            Opcode::Iand
            | Opcode::Ior
            | Opcode::Ixor
            | Opcode::Land
            | Opcode::Lor
            | Opcode::Lxor => {
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                let result = produced(numeric_result(op));
                unify(facts, &[&lhs, &rhs, &result]);
                frame.push(result);
            }

            Opcode::Iadd
            | Opcode::Ladd
            | Opcode::Fadd
            | Opcode::Dadd
            | Opcode::Isub
            | Opcode::Lsub
            | Opcode::Fsub
            | Opcode::Dsub
            | Opcode::Imul
            | Opcode::Lmul
            | Opcode::Fmul
            | Opcode::Dmul
            | Opcode::Idiv
            | Opcode::Ldiv
            | Opcode::Fdiv
            | Opcode::Ddiv
            | Opcode::Irem
            | Opcode::Lrem
            | Opcode::Frem
            | Opcode::Drem
            | Opcode::Ishl
            | Opcode::Lshl
            | Opcode::Ishr
            | Opcode::Lshr
            | Opcode::Iushr
            | Opcode::Lushr => {
                frame.pop()?;
                frame.pop()?;
                frame.push(produced(numeric_result(op)));
            }

            Opcode::Ineg
            | Opcode::Lneg
            | Opcode::Fneg
            | Opcode::Dneg
            | Opcode::I2l
            | Opcode::I2f
            | Opcode::I2d
            | Opcode::L2i
            | Opcode::L2f
            | Opcode::L2d
            | Opcode::F2i
            | Opcode::F2l
            | Opcode::F2d
            | Opcode::D2i
            | Opcode::D2l
            | Opcode::D2f
            | Opcode::I2b
            | Opcode::I2c
            | Opcode::I2s => {
                let operand = frame.pop()?;
                let (input, output) = conversion(op);
                consume(facts, &operand, index, Some(input));
                frame.push(produced(output));
            }

            Opcode::Lcmp | Opcode::Fcmpl | Opcode::Fcmpg | Opcode::Dcmpl | Opcode::Dcmpg => {
                let rhs = frame.pop()?;
                let lhs = frame.pop()?;
                unify(facts, &[&lhs, &rhs]);
                frame.push(produced(ValueType::Int));
            }

            Opcode::Ireturn
            | Opcode::Lreturn
            | Opcode::Freturn
            | Opcode::Dreturn
            | Opcode::Areturn => {
                let value = frame.pop()?;
                consume(facts, &value, index, self.return_type);
            }
            Opcode::Return => {}

            Opcode::Arraylength => {
                frame.pop()?;
                frame.push(produced(ValueType::Int));
            }
            Opcode::Athrow | Opcode::Monitorenter | Opcode::Monitorexit => {
                frame.pop()?;
            }

            _ => return Err(malformed_error!("Unsupported instruction {}", op)),
        }
        Ok(())
    }

    fn execute_field(
        &self,
        index: usize,
        op: Opcode,
        field: &FieldInsn,
        frame: &mut Frame,
        facts: &mut FactTable,
    ) -> Result<()> {
        let descriptor = TypeDescriptor::parse(&field.descriptor)?;
        match op {
            Opcode::Getstatic | Opcode::Getfield => {
                if op == Opcode::Getfield {
                    frame.pop()?;
                }
                push_result(index, &descriptor, frame, facts);
            }
            Opcode::Putstatic | Opcode::Putfield => {
                let value = frame.pop()?;
                consume(facts, &value, index, descriptor.data_type());
                if op == Opcode::Putfield {
                    frame.pop()?;
                }
            }
            _ => return Err(malformed_error!("Unexpected field operand for {}", op)),
        }
        Ok(())
    }
}

/// Records `index` as a usage of `value` and tags it with `narrow`.
fn consume(facts: &mut FactTable, value: &FrameValue, index: usize, narrow: Option<DataType>) {
    for source in &value.sources {
        let recorded = facts.facts_mut(*source);
        recorded.usages.insert(index);
        if let Some(narrow) = narrow {
            recorded.narrow_types.insert(narrow);
        }
    }
}

/// Makes all `values` one value. Values of unusable type stay apart.
fn unify(facts: &mut FactTable, values: &[&FrameValue]) {
    let sources: Vec<SourceId> = values
        .iter()
        .filter(|value| value.value_type != ValueType::Top)
        .flat_map(|value| value.sources.iter().copied())
        .collect();
    facts.union_all(&sources);
}

/// Pops call arguments, recording each as passed to its parameter slot.
fn pop_arguments(
    index: usize,
    descriptor: &MethodDescriptor,
    frame: &mut Frame,
    facts: &mut FactTable,
) -> Result<()> {
    for (argument, param) in descriptor.params.iter().enumerate().rev() {
        let value = frame.pop()?;
        for source in &value.sources {
            facts.facts_mut(*source).param_usages.insert((index, argument));
        }
        consume(facts, &value, index, param.data_type());
    }
    Ok(())
}

/// Pushes the value an invocation or field load produces, consumed by the producer.
fn push_result(index: usize, ret: &TypeDescriptor, frame: &mut Frame, facts: &mut FactTable) {
    let Some(value_type) = ValueType::from_descriptor(ret) else {
        return;
    };
    let source = SourceId::Instruction(index);
    facts.facts_mut(source).usages.insert(index);
    frame.push(FrameValue::new(value_type, source));
}

fn load_type(op: Opcode) -> ValueType {
    match op {
        Opcode::Iload => ValueType::Int,
        Opcode::Lload => ValueType::Long,
        Opcode::Fload => ValueType::Float,
        Opcode::Dload => ValueType::Double,
        _ => ValueType::Reference(crate::resolve::OBJECT.to_string()),
    }
}

fn numeric_result(op: Opcode) -> ValueType {
    match op {
        Opcode::Ladd
        | Opcode::Lsub
        | Opcode::Lmul
        | Opcode::Ldiv
        | Opcode::Lrem
        | Opcode::Lshl
        | Opcode::Lshr
        | Opcode::Lushr
        | Opcode::Land
        | Opcode::Lor
        | Opcode::Lxor => ValueType::Long,
        Opcode::Fadd | Opcode::Fsub | Opcode::Fmul | Opcode::Fdiv | Opcode::Frem => {
            ValueType::Float
        }
        Opcode::Dadd | Opcode::Dsub | Opcode::Dmul | Opcode::Ddiv | Opcode::Drem => {
            ValueType::Double
        }
        _ => ValueType::Int,
    }
}

/// Operand narrow type and result type of negations and conversions.
fn conversion(op: Opcode) -> (DataType, ValueType) {
    match op {
        Opcode::Ineg => (DataType::Int, ValueType::Int),
        Opcode::Lneg => (DataType::Long, ValueType::Long),
        Opcode::Fneg => (DataType::Float, ValueType::Float),
        Opcode::Dneg => (DataType::Double, ValueType::Double),
        Opcode::I2l => (DataType::Int, ValueType::Long),
        Opcode::I2f => (DataType::Int, ValueType::Float),
        Opcode::I2d => (DataType::Int, ValueType::Double),
        Opcode::L2i => (DataType::Long, ValueType::Int),
        Opcode::L2f => (DataType::Long, ValueType::Float),
        Opcode::L2d => (DataType::Long, ValueType::Double),
        Opcode::F2i => (DataType::Float, ValueType::Int),
        Opcode::F2l => (DataType::Float, ValueType::Long),
        Opcode::F2d => (DataType::Float, ValueType::Double),
        Opcode::D2i => (DataType::Double, ValueType::Int),
        Opcode::D2l => (DataType::Double, ValueType::Long),
        Opcode::D2f => (DataType::Double, ValueType::Float),
        Opcode::I2b => (DataType::Byte, ValueType::Byte),
        Opcode::I2c => (DataType::Char, ValueType::Char),
        _ => (DataType::Short, ValueType::Short),
    }
}

fn class_data_type(type_name: &str) -> Option<DataType> {
    match type_name {
        STRING => Some(DataType::String),
        CLASS => Some(DataType::Class),
        _ => None,
    }
}

fn primitive_array_element(code: i32) -> Option<&'static str> {
    Some(match code {
        4 => "Z",
        5 => "C",
        6 => "F",
        7 => "D",
        8 => "B",
        9 => "S",
        10 => "I",
        11 => "J",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Label;

    fn run(insns: &[Instruction]) -> (Frame, FactTable) {
        let interpreter = Interpreter::new(&TypeDescriptor::Int);
        let mut frame = Frame::new(4);
        let mut facts = FactTable::new();
        for (index, insn) in insns.iter().enumerate() {
            interpreter.execute(index, insn, &mut frame, &mut facts).unwrap();
        }
        (frame, facts)
    }

    #[test]
    fn test_copies_keep_sources() {
        let (frame, facts) = run(&[
            Instruction::push_int(12),
            Instruction::Var(Opcode::Istore, 1),
            Instruction::Var(Opcode::Iload, 1),
            Instruction::Simple(Opcode::Dup),
            Instruction::Simple(Opcode::I2b),
        ]);
        assert_eq!(frame.stack().len(), 2);
        assert!(frame.peek(1).unwrap().sources.contains(&SourceId::Instruction(0)));

        let literal = facts.facts(SourceId::Instruction(0)).unwrap();
        assert!(literal.usages.contains(&4));
        assert!(literal.narrow_types.contains(DataType::Byte));
        assert!(literal.narrow_types.contains(DataType::Int));
    }

    #[test]
    fn test_call_arguments() {
        let (frame, facts) = run(&[
            Instruction::push_int(3),
            Instruction::Ldc(Constant::Long(7)),
            Instruction::method(Opcode::Invokestatic, "p/A", "set", "(SJ)I"),
        ]);
        assert_eq!(frame.stack().len(), 1);

        let short = facts.facts(SourceId::Instruction(0)).unwrap();
        assert!(short.param_usages.contains(&(2, 0)));
        assert!(short.narrow_types.contains(DataType::Short));
        let long = facts.facts(SourceId::Instruction(1)).unwrap();
        assert!(long.param_usages.contains(&(2, 1)));

        let result = facts.facts(SourceId::Instruction(2)).unwrap();
        assert!(result.usages.contains(&2));
    }

    #[test]
    fn test_bitwise_and_comparison_unify() {
        let (_, facts) = run(&[
            Instruction::push_int(1),
            Instruction::push_int(2),
            Instruction::Simple(Opcode::Ior),
            Instruction::push_int(4),
            Instruction::Jump(Opcode::IfIcmpeq, Label(0)),
        ]);
        let root = facts.root(SourceId::Instruction(0));
        assert_eq!(root, facts.root(SourceId::Instruction(1)));
        assert_eq!(root, facts.root(SourceId::Instruction(2)));
        assert_eq!(root, facts.root(SourceId::Instruction(3)));
    }

    #[test]
    fn test_arithmetic_separates() {
        let (_, facts) = run(&[
            Instruction::push_int(1),
            Instruction::push_int(2),
            Instruction::Simple(Opcode::Iadd),
            Instruction::Simple(Opcode::Ireturn),
        ]);
        assert!(facts.facts(SourceId::Instruction(0)).unwrap().usages.is_empty());
        assert!(facts.facts(SourceId::Instruction(2)).unwrap().usages.contains(&3));
    }

    #[test]
    fn test_boolean_array_store_untagged() {
        let (_, facts) = run(&[
            Instruction::push_int(2),
            Instruction::Int(Opcode::Newarray, 4),
            Instruction::push_int(0),
            Instruction::push_int(1),
            Instruction::Simple(Opcode::Bastore),
        ]);
        let count = facts.facts(SourceId::Instruction(0)).unwrap();
        assert!(count.usages.contains(&1));
        let stored = facts.facts(SourceId::Instruction(3)).unwrap();
        assert!(stored.usages.is_empty());
    }

    #[test]
    fn test_subroutines_rejected() {
        let interpreter = Interpreter::new(&TypeDescriptor::Void);
        let mut frame = Frame::new(1);
        let mut facts = FactTable::new();
        assert!(interpreter
            .execute(0, &Instruction::Var(Opcode::Ret, 0), &mut frame, &mut facts)
            .is_err());
        assert!(interpreter
            .execute(0, &Instruction::Jump(Opcode::Jsr, Label(1)), &mut frame, &mut facts)
            .is_err());
    }
}
