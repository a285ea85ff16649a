//! Instruction selection helpers.
//!
//! Small functions picking the opcode for a typed operation and the conversion
//! sequence between two data types:
//!
//! ```text
//! byte  -> int     (nothing, already an int on the stack)
//! int   -> byte    i2b
//! long  -> char    l2i, i2c
//! float -> double  f2d
//! ```

use crate::{
    bytecode::{Instruction, Opcode},
    expression::{BinaryOp, ConstValue, DataType, StackKind},
    Result,
};

/// Returns the instructions converting a value of type `from` on the stack to `to`.
///
/// # Errors
///
/// Returns [`crate::Error::Generation`] when Java has no primitive conversion
/// between the two types, such as `String` to `int`.
pub fn emit_conversion(from: DataType, to: DataType) -> Result<Vec<Instruction>> {
    if from == to {
        return Ok(Vec::new());
    }
    if !from.is_primitive() || !to.is_primitive() {
        return Err(generation_error!("No conversion from {} to {}", from, to));
    }

    let mut insns = Vec::new();
    if let Some(op) = stack_conversion(from.stack_kind(), to.stack_kind()) {
        insns.push(Instruction::Simple(op));
    }
    let narrowing = match to {
        DataType::Byte => Some(Opcode::I2b),
        DataType::Short => Some(Opcode::I2s),
        DataType::Char => Some(Opcode::I2c),
        _ => None,
    };
    if let Some(op) = narrowing {
        if !from.widens_to(to) {
            insns.push(Instruction::Simple(op));
        }
    }
    Ok(insns)
}

/// Like [`emit_conversion`], but skips the narrowing step when `value` already lies
/// within the range of `to`.
///
/// # Errors
///
/// See [`emit_conversion`].
pub fn emit_value_conversion(
    from: DataType,
    to: DataType,
    value: Option<&ConstValue>,
) -> Result<Vec<Instruction>> {
    let in_range = from.stack_kind() == StackKind::Int
        && to.stack_kind() == StackKind::Int
        && value.is_some_and(|value| value.convert_exact(to).is_some());
    if in_range {
        return Ok(Vec::new());
    }
    emit_conversion(from, to)
}

fn stack_conversion(from: StackKind, to: StackKind) -> Option<Opcode> {
    Some(match (from, to) {
        (StackKind::Int, StackKind::Long) => Opcode::I2l,
        (StackKind::Int, StackKind::Float) => Opcode::I2f,
        (StackKind::Int, StackKind::Double) => Opcode::I2d,
        (StackKind::Long, StackKind::Int) => Opcode::L2i,
        (StackKind::Long, StackKind::Float) => Opcode::L2f,
        (StackKind::Long, StackKind::Double) => Opcode::L2d,
        (StackKind::Float, StackKind::Int) => Opcode::F2i,
        (StackKind::Float, StackKind::Long) => Opcode::F2l,
        (StackKind::Float, StackKind::Double) => Opcode::F2d,
        (StackKind::Double, StackKind::Int) => Opcode::D2i,
        (StackKind::Double, StackKind::Long) => Opcode::D2l,
        (StackKind::Double, StackKind::Float) => Opcode::D2f,
        _ => return None,
    })
}

/// Returns the opcode of `op` applied to operands of the promoted type `operand_type`.
///
/// # Errors
///
/// Returns [`crate::Error::Generation`] for bitwise operators and shifts on
/// floating point operands and for any operator on references.
pub fn binary_opcode(op: BinaryOp, operand_type: DataType) -> Result<Opcode> {
    let kind = operand_type.stack_kind();
    let opcode = match (op, kind) {
        (BinaryOp::Add, StackKind::Int) => Opcode::Iadd,
        (BinaryOp::Add, StackKind::Long) => Opcode::Ladd,
        (BinaryOp::Add, StackKind::Float) => Opcode::Fadd,
        (BinaryOp::Add, StackKind::Double) => Opcode::Dadd,
        (BinaryOp::Sub, StackKind::Int) => Opcode::Isub,
        (BinaryOp::Sub, StackKind::Long) => Opcode::Lsub,
        (BinaryOp::Sub, StackKind::Float) => Opcode::Fsub,
        (BinaryOp::Sub, StackKind::Double) => Opcode::Dsub,
        (BinaryOp::Mul, StackKind::Int) => Opcode::Imul,
        (BinaryOp::Mul, StackKind::Long) => Opcode::Lmul,
        (BinaryOp::Mul, StackKind::Float) => Opcode::Fmul,
        (BinaryOp::Mul, StackKind::Double) => Opcode::Dmul,
        (BinaryOp::Div, StackKind::Int) => Opcode::Idiv,
        (BinaryOp::Div, StackKind::Long) => Opcode::Ldiv,
        (BinaryOp::Div, StackKind::Float) => Opcode::Fdiv,
        (BinaryOp::Div, StackKind::Double) => Opcode::Ddiv,
        (BinaryOp::Rem, StackKind::Int) => Opcode::Irem,
        (BinaryOp::Rem, StackKind::Long) => Opcode::Lrem,
        (BinaryOp::Rem, StackKind::Float) => Opcode::Frem,
        (BinaryOp::Rem, StackKind::Double) => Opcode::Drem,
        (BinaryOp::And, StackKind::Int) => Opcode::Iand,
        (BinaryOp::And, StackKind::Long) => Opcode::Land,
        (BinaryOp::Or, StackKind::Int) => Opcode::Ior,
        (BinaryOp::Or, StackKind::Long) => Opcode::Lor,
        (BinaryOp::Xor, StackKind::Int) => Opcode::Ixor,
        (BinaryOp::Xor, StackKind::Long) => Opcode::Lxor,
        (BinaryOp::Shl, StackKind::Int) => Opcode::Ishl,
        (BinaryOp::Shl, StackKind::Long) => Opcode::Lshl,
        (BinaryOp::Shr, StackKind::Int) => Opcode::Ishr,
        (BinaryOp::Shr, StackKind::Long) => Opcode::Lshr,
        (BinaryOp::Ushr, StackKind::Int) => Opcode::Iushr,
        (BinaryOp::Ushr, StackKind::Long) => Opcode::Lushr,
        _ => {
            return Err(generation_error!(
                "Operator {} is not defined for {}",
                op,
                operand_type
            ))
        }
    };
    Ok(opcode)
}

/// Returns the negation opcode for the promoted type `operand_type`.
///
/// # Errors
///
/// Returns [`crate::Error::Generation`] for references.
pub fn negate_opcode(operand_type: DataType) -> Result<Opcode> {
    match operand_type.stack_kind() {
        StackKind::Int => Ok(Opcode::Ineg),
        StackKind::Long => Ok(Opcode::Lneg),
        StackKind::Float => Ok(Opcode::Fneg),
        StackKind::Double => Ok(Opcode::Dneg),
        StackKind::Reference => Err(generation_error!("Cannot negate {}", operand_type)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(insns: &[Instruction]) -> Vec<Opcode> {
        insns.iter().filter_map(Instruction::opcode).collect()
    }

    #[test]
    fn test_conversions() {
        assert!(emit_conversion(DataType::Byte, DataType::Int).unwrap().is_empty());
        assert!(emit_conversion(DataType::Byte, DataType::Short).unwrap().is_empty());
        assert_eq!(
            ops(&emit_conversion(DataType::Int, DataType::Byte).unwrap()),
            vec![Opcode::I2b]
        );
        assert_eq!(
            ops(&emit_conversion(DataType::Char, DataType::Short).unwrap()),
            vec![Opcode::I2s]
        );
        assert_eq!(
            ops(&emit_conversion(DataType::Long, DataType::Char).unwrap()),
            vec![Opcode::L2i, Opcode::I2c]
        );
        assert_eq!(
            ops(&emit_conversion(DataType::Short, DataType::Double).unwrap()),
            vec![Opcode::I2d]
        );
        assert!(emit_conversion(DataType::String, DataType::Int).is_err());
        assert!(emit_conversion(DataType::String, DataType::String).unwrap().is_empty());
    }

    #[test]
    fn test_value_conversions() {
        let small = ConstValue::Int(100);
        let large = ConstValue::Int(200);
        assert!(emit_value_conversion(DataType::Int, DataType::Byte, Some(&small))
            .unwrap()
            .is_empty());
        assert_eq!(
            ops(&emit_value_conversion(DataType::Int, DataType::Byte, Some(&large)).unwrap()),
            vec![Opcode::I2b]
        );
        assert_eq!(
            ops(&emit_value_conversion(DataType::Int, DataType::Long, Some(&small)).unwrap()),
            vec![Opcode::I2l]
        );
    }

    #[test]
    fn test_operator_selection() {
        assert_eq!(binary_opcode(BinaryOp::Or, DataType::Long).unwrap(), Opcode::Lor);
        assert_eq!(binary_opcode(BinaryOp::Rem, DataType::Float).unwrap(), Opcode::Frem);
        assert!(binary_opcode(BinaryOp::Xor, DataType::Double).is_err());
        assert!(binary_opcode(BinaryOp::Add, DataType::String).is_err());
        assert_eq!(negate_opcode(DataType::Int).unwrap(), Opcode::Ineg);
    }
}
