//! Tree representation of JVM instructions.
//!
//! Instructions are stored as a flat list per method, with branch targets expressed as
//! [`Label`] pseudo-instructions placed in the list. Offsets, constant pool indices and
//! the short encodings are resolved by whatever reads and writes the class file; this
//! crate only sees the symbolic form.

use std::fmt;

use crate::{bytecode::Opcode, expression::ConstValue};

/// A branch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// The kind of a method handle constant.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::FromRepr)]
#[repr(u8)]
pub enum HandleKind {
    GetField = 1,
    GetStatic = 2,
    PutField = 3,
    PutStatic = 4,
    InvokeVirtual = 5,
    InvokeStatic = 6,
    InvokeSpecial = 7,
    NewInvokeSpecial = 8,
    InvokeInterface = 9,
}

impl HandleKind {
    /// Returns `true` if invoking the handle takes the receiver as first argument.
    #[must_use]
    pub const fn has_receiver(self) -> bool {
        matches!(
            self,
            HandleKind::InvokeVirtual | HandleKind::InvokeInterface | HandleKind::InvokeSpecial
        )
    }
}

/// A method handle constant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    /// What the handle does
    pub kind: HandleKind,
    /// Internal name of the owner
    pub owner: String,
    /// Member name
    pub name: String,
    /// Member descriptor
    pub descriptor: String,
    /// `true` if the owner is an interface
    pub is_interface: bool,
}

/// A loadable constant, as pushed by `ldc` or passed to a bootstrap method.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// `int` constant
    Int(i32),
    /// `float` constant
    Float(f32),
    /// `long` constant
    Long(i64),
    /// `double` constant
    Double(f64),
    /// `String` constant
    String(String),
    /// Class constant: internal name, or a descriptor for array classes
    Class(String),
    /// Method type constant
    MethodType(String),
    /// Method handle constant
    Handle(Handle),
}

/// A field reference operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldInsn {
    /// Internal name of the owner
    pub owner: String,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
}

/// A method reference operand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodInsn {
    /// Internal name of the owner
    pub owner: String,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// `true` if the owner is an interface
    pub is_interface: bool,
}

/// The operand of an `invokedynamic` instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeDynamicInsn {
    /// Name passed to the bootstrap method
    pub name: String,
    /// Call site descriptor
    pub descriptor: String,
    /// Bootstrap method
    pub bootstrap: Handle,
    /// Static bootstrap arguments
    pub bootstrap_args: Vec<Constant>,
}

/// A JVM instruction or pseudo-instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Branch target marker
    Label(Label),
    /// Instruction without operands
    Simple(Opcode),
    /// `bipush`, `sipush` or `newarray` (operand is the array type code)
    Int(Opcode, i32),
    /// `ldc`, `ldc_w` and `ldc2_w`
    Ldc(Constant),
    /// Local variable instruction: `*load`, `*store` or `ret`
    Var(Opcode, u16),
    /// `iinc`
    Iinc {
        /// Local variable index
        var: u16,
        /// Signed increment
        increment: i16,
    },
    /// `new`, `anewarray`, `checkcast` or `instanceof`
    Type(Opcode, String),
    /// Field access
    Field(Opcode, FieldInsn),
    /// `invokevirtual`, `invokespecial`, `invokestatic` or `invokeinterface`
    Method(Opcode, MethodInsn),
    /// `invokedynamic`
    InvokeDynamic(InvokeDynamicInsn),
    /// Conditional branch, `goto` or `jsr`
    Jump(Opcode, Label),
    /// `tableswitch`
    TableSwitch {
        /// Lowest key
        low: i32,
        /// Highest key
        high: i32,
        /// Target for keys out of range
        default: Label,
        /// Targets for `low..=high`
        targets: Vec<Label>,
    },
    /// `lookupswitch`
    LookupSwitch {
        /// Target for unmatched keys
        default: Label,
        /// Key to target pairs
        pairs: Vec<(i32, Label)>,
    },
    /// `multianewarray`
    MultiANewArray {
        /// Array descriptor
        descriptor: String,
        /// Number of dimensions to allocate
        dims: u8,
    },
    /// Line number debug information
    LineNumber {
        /// Source line
        line: u32,
        /// First instruction of the line
        start: Label,
    },
}

impl Instruction {
    /// Creates a field access instruction.
    pub fn field(
        opcode: Opcode,
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Instruction::Field(
            opcode,
            FieldInsn {
                owner: owner.into(),
                name: name.into(),
                descriptor: descriptor.into(),
            },
        )
    }

    /// Creates a method invocation on a class (not interface) owner.
    pub fn method(
        opcode: Opcode,
        owner: impl Into<String>,
        name: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Instruction::Method(
            opcode,
            MethodInsn {
                owner: owner.into(),
                name: name.into(),
                descriptor: descriptor.into(),
                is_interface: opcode == Opcode::Invokeinterface,
            },
        )
    }

    /// Returns the opcode, or `None` for pseudo-instructions.
    #[must_use]
    pub const fn opcode(&self) -> Option<Opcode> {
        match self {
            Instruction::Label(_) | Instruction::LineNumber { .. } => None,
            Instruction::Simple(op)
            | Instruction::Int(op, _)
            | Instruction::Var(op, _)
            | Instruction::Type(op, _)
            | Instruction::Field(op, _)
            | Instruction::Method(op, _)
            | Instruction::Jump(op, _) => Some(*op),
            Instruction::Ldc(_) => Some(Opcode::Ldc),
            Instruction::Iinc { .. } => Some(Opcode::Iinc),
            Instruction::InvokeDynamic(_) => Some(Opcode::Invokedynamic),
            Instruction::TableSwitch { .. } => Some(Opcode::Tableswitch),
            Instruction::LookupSwitch { .. } => Some(Opcode::Lookupswitch),
            Instruction::MultiANewArray { .. } => Some(Opcode::Multianewarray),
        }
    }

    /// Returns `true` for labels and debug information.
    #[must_use]
    pub const fn is_pseudo(&self) -> bool {
        self.opcode().is_none()
    }

    /// Returns the targets this instruction may branch to, in operand order.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<Label> {
        match self {
            Instruction::Jump(_, target) => vec![*target],
            Instruction::TableSwitch {
                default, targets, ..
            } => std::iter::once(*default).chain(targets.iter().copied()).collect(),
            Instruction::LookupSwitch { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, target)| *target))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Returns the constant this instruction pushes, if it is a literal push of a
    /// group-capable type.
    ///
    /// `aconst_null`, method types and method handles are not literals in this sense.
    #[must_use]
    pub fn literal(&self) -> Option<ConstValue> {
        match self {
            Instruction::Simple(op) => match op {
                Opcode::IconstM1 => Some(ConstValue::Int(-1)),
                Opcode::Iconst0 => Some(ConstValue::Int(0)),
                Opcode::Iconst1 => Some(ConstValue::Int(1)),
                Opcode::Iconst2 => Some(ConstValue::Int(2)),
                Opcode::Iconst3 => Some(ConstValue::Int(3)),
                Opcode::Iconst4 => Some(ConstValue::Int(4)),
                Opcode::Iconst5 => Some(ConstValue::Int(5)),
                Opcode::Lconst0 => Some(ConstValue::Long(0)),
                Opcode::Lconst1 => Some(ConstValue::Long(1)),
                Opcode::Fconst0 => Some(ConstValue::Float(0.0)),
                Opcode::Fconst1 => Some(ConstValue::Float(1.0)),
                Opcode::Fconst2 => Some(ConstValue::Float(2.0)),
                Opcode::Dconst0 => Some(ConstValue::Double(0.0)),
                Opcode::Dconst1 => Some(ConstValue::Double(1.0)),
                _ => None,
            },
            Instruction::Int(Opcode::Bipush | Opcode::Sipush, value) => {
                Some(ConstValue::Int(*value))
            }
            Instruction::Ldc(constant) => match constant {
                Constant::Int(v) => Some(ConstValue::Int(*v)),
                Constant::Float(v) => Some(ConstValue::Float(*v)),
                Constant::Long(v) => Some(ConstValue::Long(*v)),
                Constant::Double(v) => Some(ConstValue::Double(*v)),
                Constant::String(v) => Some(ConstValue::String(v.clone())),
                Constant::Class(v) => Some(ConstValue::Class(v.clone())),
                Constant::MethodType(_) | Constant::Handle(_) => None,
            },
            _ => None,
        }
    }

    /// Creates the shortest instruction pushing `value`.
    ///
    /// `byte`, `short` and `char` values are pushed as the `int` they widen to.
    #[must_use]
    pub fn push(value: &ConstValue) -> Instruction {
        match value {
            ConstValue::Byte(v) => Self::push_int(i32::from(*v)),
            ConstValue::Short(v) => Self::push_int(i32::from(*v)),
            ConstValue::Char(v) => Self::push_int(i32::from(*v)),
            ConstValue::Int(v) => Self::push_int(*v),
            ConstValue::Long(0) => Instruction::Simple(Opcode::Lconst0),
            ConstValue::Long(1) => Instruction::Simple(Opcode::Lconst1),
            ConstValue::Long(v) => Instruction::Ldc(Constant::Long(*v)),
            // Bit comparisons keep -0.0 out of the `*const_0` forms.
            ConstValue::Float(v) if v.to_bits() == 0.0f32.to_bits() => {
                Instruction::Simple(Opcode::Fconst0)
            }
            ConstValue::Float(v) if v.to_bits() == 1.0f32.to_bits() => {
                Instruction::Simple(Opcode::Fconst1)
            }
            ConstValue::Float(v) if v.to_bits() == 2.0f32.to_bits() => {
                Instruction::Simple(Opcode::Fconst2)
            }
            ConstValue::Float(v) => Instruction::Ldc(Constant::Float(*v)),
            ConstValue::Double(v) if v.to_bits() == 0.0f64.to_bits() => {
                Instruction::Simple(Opcode::Dconst0)
            }
            ConstValue::Double(v) if v.to_bits() == 1.0f64.to_bits() => {
                Instruction::Simple(Opcode::Dconst1)
            }
            ConstValue::Double(v) => Instruction::Ldc(Constant::Double(*v)),
            ConstValue::String(v) => Instruction::Ldc(Constant::String(v.clone())),
            ConstValue::Class(v) => Instruction::Ldc(Constant::Class(v.clone())),
        }
    }

    /// Creates the shortest instruction pushing the `int` `value`.
    #[must_use]
    pub fn push_int(value: i32) -> Instruction {
        match value {
            -1 => Instruction::Simple(Opcode::IconstM1),
            0 => Instruction::Simple(Opcode::Iconst0),
            1 => Instruction::Simple(Opcode::Iconst1),
            2 => Instruction::Simple(Opcode::Iconst2),
            3 => Instruction::Simple(Opcode::Iconst3),
            4 => Instruction::Simple(Opcode::Iconst4),
            5 => Instruction::Simple(Opcode::Iconst5),
            v if i8::try_from(v).is_ok() => Instruction::Int(Opcode::Bipush, v),
            v if i16::try_from(v).is_ok() => Instruction::Int(Opcode::Sipush, v),
            v => Instruction::Ldc(Constant::Int(v)),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Float(v) => write!(f, "{v}F"),
            Constant::Long(v) => write!(f, "{v}L"),
            Constant::Double(v) => write!(f, "{v}D"),
            Constant::String(v) => write!(f, "{v:?}"),
            Constant::Class(v) | Constant::MethodType(v) => f.write_str(v),
            Constant::Handle(handle) => write!(
                f,
                "{} {}.{}{}",
                handle.kind, handle.owner, handle.name, handle.descriptor
            ),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Label(label) => write!(f, "{label}:"),
            Instruction::LineNumber { line, start } => write!(f, "// line {line} at {start}"),
            Instruction::Simple(op) => write!(f, "{op}"),
            Instruction::Int(op, value) => write!(f, "{op} {value}"),
            Instruction::Ldc(constant) => write!(f, "ldc {constant}"),
            Instruction::Var(op, var) => write!(f, "{op} {var}"),
            Instruction::Iinc { var, increment } => write!(f, "iinc {var} {increment}"),
            Instruction::Type(op, name) => write!(f, "{op} {name}"),
            Instruction::Field(op, field) => {
                write!(f, "{op} {}.{} : {}", field.owner, field.name, field.descriptor)
            }
            Instruction::Method(op, method) => {
                write!(f, "{op} {}.{}{}", method.owner, method.name, method.descriptor)
            }
            Instruction::InvokeDynamic(indy) => {
                write!(f, "invokedynamic {}{}", indy.name, indy.descriptor)
            }
            Instruction::Jump(op, target) => write!(f, "{op} {target}"),
            Instruction::TableSwitch {
                low, high, default, ..
            } => write!(f, "tableswitch {low}..{high} default {default}"),
            Instruction::LookupSwitch { default, pairs } => {
                write!(f, "lookupswitch {} keys default {default}", pairs.len())
            }
            Instruction::MultiANewArray { descriptor, dims } => {
                write!(f, "multianewarray {descriptor} {dims}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_int_pushes() {
        assert_eq!(Instruction::push_int(-1), Instruction::Simple(Opcode::IconstM1));
        assert_eq!(Instruction::push_int(5), Instruction::Simple(Opcode::Iconst5));
        assert_eq!(Instruction::push_int(6), Instruction::Int(Opcode::Bipush, 6));
        assert_eq!(Instruction::push_int(-128), Instruction::Int(Opcode::Bipush, -128));
        assert_eq!(Instruction::push_int(128), Instruction::Int(Opcode::Sipush, 128));
        assert_eq!(Instruction::push_int(40000), Instruction::Ldc(Constant::Int(40000)));
    }

    #[test]
    fn test_minimal_wide_pushes() {
        assert_eq!(
            Instruction::push(&ConstValue::Long(1)),
            Instruction::Simple(Opcode::Lconst1)
        );
        assert_eq!(
            Instruction::push(&ConstValue::Float(2.0)),
            Instruction::Simple(Opcode::Fconst2)
        );
        assert_eq!(
            Instruction::push(&ConstValue::Float(-0.0)),
            Instruction::Ldc(Constant::Float(-0.0))
        );
        assert_eq!(
            Instruction::push(&ConstValue::Double(0.0)),
            Instruction::Simple(Opcode::Dconst0)
        );
        assert_eq!(
            Instruction::push(&ConstValue::Char(65)),
            Instruction::Int(Opcode::Bipush, 65)
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            Instruction::Simple(Opcode::Iconst3).literal(),
            Some(ConstValue::Int(3))
        );
        assert_eq!(
            Instruction::Ldc(Constant::Class("p/C".to_string())).literal(),
            Some(ConstValue::Class("p/C".to_string()))
        );
        assert_eq!(Instruction::Simple(Opcode::AconstNull).literal(), None);
        assert_eq!(Instruction::Int(Opcode::Newarray, 10).literal(), None);
    }

    #[test]
    fn test_branch_targets() {
        let switch = Instruction::LookupSwitch {
            default: Label(0),
            pairs: vec![(1, Label(1)), (5, Label(2))],
        };
        assert_eq!(switch.branch_targets(), vec![Label(0), Label(1), Label(2)]);
        assert!(Instruction::Label(Label(3)).is_pseudo());
    }
}
