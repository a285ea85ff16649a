//! JVM opcodes.
//!
//! Only the opcodes that survive in a tree representation are listed: the `_<n>`
//! shorthands of the local variable instructions, `ldc_w`/`ldc2_w` and `wide` are
//! encoding details that a class reader folds into [`Opcode::Iload`], [`Opcode::Ldc`]
//! and friends.

use strum::{Display, FromRepr, IntoStaticStr};

use crate::expression::DataType;

/// A JVM instruction opcode.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, IntoStaticStr, FromRepr)]
#[repr(u8)]
pub enum Opcode {
    // Constants
    #[strum(serialize = "nop")]
    Nop = 0x00,
    #[strum(serialize = "aconst_null")]
    AconstNull = 0x01,
    #[strum(serialize = "iconst_m1")]
    IconstM1 = 0x02,
    #[strum(serialize = "iconst_0")]
    Iconst0 = 0x03,
    #[strum(serialize = "iconst_1")]
    Iconst1 = 0x04,
    #[strum(serialize = "iconst_2")]
    Iconst2 = 0x05,
    #[strum(serialize = "iconst_3")]
    Iconst3 = 0x06,
    #[strum(serialize = "iconst_4")]
    Iconst4 = 0x07,
    #[strum(serialize = "iconst_5")]
    Iconst5 = 0x08,
    #[strum(serialize = "lconst_0")]
    Lconst0 = 0x09,
    #[strum(serialize = "lconst_1")]
    Lconst1 = 0x0A,
    #[strum(serialize = "fconst_0")]
    Fconst0 = 0x0B,
    #[strum(serialize = "fconst_1")]
    Fconst1 = 0x0C,
    #[strum(serialize = "fconst_2")]
    Fconst2 = 0x0D,
    #[strum(serialize = "dconst_0")]
    Dconst0 = 0x0E,
    #[strum(serialize = "dconst_1")]
    Dconst1 = 0x0F,
    #[strum(serialize = "bipush")]
    Bipush = 0x10,
    #[strum(serialize = "sipush")]
    Sipush = 0x11,
    #[strum(serialize = "ldc")]
    Ldc = 0x12,

    // Loads
    #[strum(serialize = "iload")]
    Iload = 0x15,
    #[strum(serialize = "lload")]
    Lload = 0x16,
    #[strum(serialize = "fload")]
    Fload = 0x17,
    #[strum(serialize = "dload")]
    Dload = 0x18,
    #[strum(serialize = "aload")]
    Aload = 0x19,
    #[strum(serialize = "iaload")]
    Iaload = 0x2E,
    #[strum(serialize = "laload")]
    Laload = 0x2F,
    #[strum(serialize = "faload")]
    Faload = 0x30,
    #[strum(serialize = "daload")]
    Daload = 0x31,
    #[strum(serialize = "aaload")]
    Aaload = 0x32,
    #[strum(serialize = "baload")]
    Baload = 0x33,
    #[strum(serialize = "caload")]
    Caload = 0x34,
    #[strum(serialize = "saload")]
    Saload = 0x35,

    // Stores
    #[strum(serialize = "istore")]
    Istore = 0x36,
    #[strum(serialize = "lstore")]
    Lstore = 0x37,
    #[strum(serialize = "fstore")]
    Fstore = 0x38,
    #[strum(serialize = "dstore")]
    Dstore = 0x39,
    #[strum(serialize = "astore")]
    Astore = 0x3A,
    #[strum(serialize = "iastore")]
    Iastore = 0x4F,
    #[strum(serialize = "lastore")]
    Lastore = 0x50,
    #[strum(serialize = "fastore")]
    Fastore = 0x51,
    #[strum(serialize = "dastore")]
    Dastore = 0x52,
    #[strum(serialize = "aastore")]
    Aastore = 0x53,
    #[strum(serialize = "bastore")]
    Bastore = 0x54,
    #[strum(serialize = "castore")]
    Castore = 0x55,
    #[strum(serialize = "sastore")]
    Sastore = 0x56,

    // Stack manipulation
    #[strum(serialize = "pop")]
    Pop = 0x57,
    #[strum(serialize = "pop2")]
    Pop2 = 0x58,
    #[strum(serialize = "dup")]
    Dup = 0x59,
    #[strum(serialize = "dup_x1")]
    DupX1 = 0x5A,
    #[strum(serialize = "dup_x2")]
    DupX2 = 0x5B,
    #[strum(serialize = "dup2")]
    Dup2 = 0x5C,
    #[strum(serialize = "dup2_x1")]
    Dup2X1 = 0x5D,
    #[strum(serialize = "dup2_x2")]
    Dup2X2 = 0x5E,
    #[strum(serialize = "swap")]
    Swap = 0x5F,

    // Arithmetic
    #[strum(serialize = "iadd")]
    Iadd = 0x60,
    #[strum(serialize = "ladd")]
    Ladd = 0x61,
    #[strum(serialize = "fadd")]
    Fadd = 0x62,
    #[strum(serialize = "dadd")]
    Dadd = 0x63,
    #[strum(serialize = "isub")]
    Isub = 0x64,
    #[strum(serialize = "lsub")]
    Lsub = 0x65,
    #[strum(serialize = "fsub")]
    Fsub = 0x66,
    #[strum(serialize = "dsub")]
    Dsub = 0x67,
    #[strum(serialize = "imul")]
    Imul = 0x68,
    #[strum(serialize = "lmul")]
    Lmul = 0x69,
    #[strum(serialize = "fmul")]
    Fmul = 0x6A,
    #[strum(serialize = "dmul")]
    Dmul = 0x6B,
    #[strum(serialize = "idiv")]
    Idiv = 0x6C,
    #[strum(serialize = "ldiv")]
    Ldiv = 0x6D,
    #[strum(serialize = "fdiv")]
    Fdiv = 0x6E,
    #[strum(serialize = "ddiv")]
    Ddiv = 0x6F,
    #[strum(serialize = "irem")]
    Irem = 0x70,
    #[strum(serialize = "lrem")]
    Lrem = 0x71,
    #[strum(serialize = "frem")]
    Frem = 0x72,
    #[strum(serialize = "drem")]
    Drem = 0x73,
    #[strum(serialize = "ineg")]
    Ineg = 0x74,
    #[strum(serialize = "lneg")]
    Lneg = 0x75,
    #[strum(serialize = "fneg")]
    Fneg = 0x76,
    #[strum(serialize = "dneg")]
    Dneg = 0x77,

    // Shifts and bitwise logic
    #[strum(serialize = "ishl")]
    Ishl = 0x78,
    #[strum(serialize = "lshl")]
    Lshl = 0x79,
    #[strum(serialize = "ishr")]
    Ishr = 0x7A,
    #[strum(serialize = "lshr")]
    Lshr = 0x7B,
    #[strum(serialize = "iushr")]
    Iushr = 0x7C,
    #[strum(serialize = "lushr")]
    Lushr = 0x7D,
    #[strum(serialize = "iand")]
    Iand = 0x7E,
    #[strum(serialize = "land")]
    Land = 0x7F,
    #[strum(serialize = "ior")]
    Ior = 0x80,
    #[strum(serialize = "lor")]
    Lor = 0x81,
    #[strum(serialize = "ixor")]
    Ixor = 0x82,
    #[strum(serialize = "lxor")]
    Lxor = 0x83,

    // Conversions
    #[strum(serialize = "iinc")]
    Iinc = 0x84,
    #[strum(serialize = "i2l")]
    I2l = 0x85,
    #[strum(serialize = "i2f")]
    I2f = 0x86,
    #[strum(serialize = "i2d")]
    I2d = 0x87,
    #[strum(serialize = "l2i")]
    L2i = 0x88,
    #[strum(serialize = "l2f")]
    L2f = 0x89,
    #[strum(serialize = "l2d")]
    L2d = 0x8A,
    #[strum(serialize = "f2i")]
    F2i = 0x8B,
    #[strum(serialize = "f2l")]
    F2l = 0x8C,
    #[strum(serialize = "f2d")]
    F2d = 0x8D,
    #[strum(serialize = "d2i")]
    D2i = 0x8E,
    #[strum(serialize = "d2l")]
    D2l = 0x8F,
    #[strum(serialize = "d2f")]
    D2f = 0x90,
    #[strum(serialize = "i2b")]
    I2b = 0x91,
    #[strum(serialize = "i2c")]
    I2c = 0x92,
    #[strum(serialize = "i2s")]
    I2s = 0x93,

    // Comparisons
    #[strum(serialize = "lcmp")]
    Lcmp = 0x94,
    #[strum(serialize = "fcmpl")]
    Fcmpl = 0x95,
    #[strum(serialize = "fcmpg")]
    Fcmpg = 0x96,
    #[strum(serialize = "dcmpl")]
    Dcmpl = 0x97,
    #[strum(serialize = "dcmpg")]
    Dcmpg = 0x98,

    // Branches
    #[strum(serialize = "ifeq")]
    Ifeq = 0x99,
    #[strum(serialize = "ifne")]
    Ifne = 0x9A,
    #[strum(serialize = "iflt")]
    Iflt = 0x9B,
    #[strum(serialize = "ifge")]
    Ifge = 0x9C,
    #[strum(serialize = "ifgt")]
    Ifgt = 0x9D,
    #[strum(serialize = "ifle")]
    Ifle = 0x9E,
    #[strum(serialize = "if_icmpeq")]
    IfIcmpeq = 0x9F,
    #[strum(serialize = "if_icmpne")]
    IfIcmpne = 0xA0,
    #[strum(serialize = "if_icmplt")]
    IfIcmplt = 0xA1,
    #[strum(serialize = "if_icmpge")]
    IfIcmpge = 0xA2,
    #[strum(serialize = "if_icmpgt")]
    IfIcmpgt = 0xA3,
    #[strum(serialize = "if_icmple")]
    IfIcmple = 0xA4,
    #[strum(serialize = "if_acmpeq")]
    IfAcmpeq = 0xA5,
    #[strum(serialize = "if_acmpne")]
    IfAcmpne = 0xA6,
    #[strum(serialize = "goto")]
    Goto = 0xA7,
    #[strum(serialize = "jsr")]
    Jsr = 0xA8,
    #[strum(serialize = "ret")]
    Ret = 0xA9,

    // Switches
    #[strum(serialize = "tableswitch")]
    Tableswitch = 0xAA,
    #[strum(serialize = "lookupswitch")]
    Lookupswitch = 0xAB,

    // Returns
    #[strum(serialize = "ireturn")]
    Ireturn = 0xAC,
    #[strum(serialize = "lreturn")]
    Lreturn = 0xAD,
    #[strum(serialize = "freturn")]
    Freturn = 0xAE,
    #[strum(serialize = "dreturn")]
    Dreturn = 0xAF,
    #[strum(serialize = "areturn")]
    Areturn = 0xB0,
    #[strum(serialize = "return")]
    Return = 0xB1,

    // Field access
    #[strum(serialize = "getstatic")]
    Getstatic = 0xB2,
    #[strum(serialize = "putstatic")]
    Putstatic = 0xB3,
    #[strum(serialize = "getfield")]
    Getfield = 0xB4,
    #[strum(serialize = "putfield")]
    Putfield = 0xB5,

    // Invocations
    #[strum(serialize = "invokevirtual")]
    Invokevirtual = 0xB6,
    #[strum(serialize = "invokespecial")]
    Invokespecial = 0xB7,
    #[strum(serialize = "invokestatic")]
    Invokestatic = 0xB8,
    #[strum(serialize = "invokeinterface")]
    Invokeinterface = 0xB9,
    #[strum(serialize = "invokedynamic")]
    Invokedynamic = 0xBA,

    // Objects and arrays
    #[strum(serialize = "new")]
    New = 0xBB,
    #[strum(serialize = "newarray")]
    Newarray = 0xBC,
    #[strum(serialize = "anewarray")]
    Anewarray = 0xBD,
    #[strum(serialize = "arraylength")]
    Arraylength = 0xBE,
    #[strum(serialize = "athrow")]
    Athrow = 0xBF,
    #[strum(serialize = "checkcast")]
    Checkcast = 0xC0,
    #[strum(serialize = "instanceof")]
    Instanceof = 0xC1,

    // Monitors
    #[strum(serialize = "monitorenter")]
    Monitorenter = 0xC2,
    #[strum(serialize = "monitorexit")]
    Monitorexit = 0xC3,

    // Objects and arrays (continued)
    #[strum(serialize = "multianewarray")]
    Multianewarray = 0xC5,

    // Null branches
    #[strum(serialize = "ifnull")]
    Ifnull = 0xC6,
    #[strum(serialize = "ifnonnull")]
    Ifnonnull = 0xC7,
}

impl Opcode {
    /// Returns the raw opcode byte.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Returns the mnemonic, as used in disassembly listings.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    /// Returns `true` for the `*return` family.
    #[must_use]
    pub const fn is_return(self) -> bool {
        matches!(self.code(), 0xAC..=0xB1)
    }

    /// Returns `true` for the four `invoke*` opcodes and `invokedynamic`.
    #[must_use]
    pub const fn is_invoke(self) -> bool {
        matches!(self.code(), 0xB6..=0xBA)
    }

    /// Returns `true` for conditional branches, including `ifnull`/`ifnonnull`.
    #[must_use]
    pub const fn is_conditional_branch(self) -> bool {
        matches!(self.code(), 0x99..=0xA6 | 0xC6 | 0xC7)
    }

    /// Returns `true` if execution never falls through to the next instruction.
    #[must_use]
    pub const fn ends_block(self) -> bool {
        self.is_return()
            || matches!(
                self,
                Opcode::Goto
                    | Opcode::Athrow
                    | Opcode::Ret
                    | Opcode::Tableswitch
                    | Opcode::Lookupswitch
            )
    }

    /// Returns the element type an array store tags its value with, or `None` for
    /// opcodes that are not array stores of a group-capable type.
    #[must_use]
    pub const fn array_store_type(self) -> Option<DataType> {
        match self {
            Opcode::Bastore => Some(DataType::Byte),
            Opcode::Castore => Some(DataType::Char),
            Opcode::Sastore => Some(DataType::Short),
            Opcode::Iastore => Some(DataType::Int),
            Opcode::Lastore => Some(DataType::Long),
            Opcode::Fastore => Some(DataType::Float),
            Opcode::Dastore => Some(DataType::Double),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mnemonics() {
        assert_eq!(Opcode::IconstM1.to_string(), "iconst_m1");
        assert_eq!(Opcode::IfIcmpeq.mnemonic(), "if_icmpeq");
        assert_eq!(Opcode::I2b.to_string(), "i2b");
        assert_eq!(Opcode::Dup2X1.to_string(), "dup2_x1");
    }

    #[test]
    fn test_raw_codes() {
        assert_eq!(Opcode::Bipush.code(), 0x10);
        assert_eq!(Opcode::from_repr(0xB8), Some(Opcode::Invokestatic));
        assert_eq!(Opcode::from_repr(0xC4), None);
    }

    #[test]
    fn test_classification() {
        assert!(Opcode::Areturn.is_return());
        assert!(!Opcode::Athrow.is_return());
        assert!(Opcode::Athrow.ends_block());
        assert!(Opcode::Invokedynamic.is_invoke());
        assert!(Opcode::Ifnonnull.is_conditional_branch());
        assert!(!Opcode::Goto.is_conditional_branch());
        assert_eq!(Opcode::Castore.array_store_type(), Some(DataType::Char));
        assert_eq!(Opcode::Aastore.array_store_type(), None);
    }
}
