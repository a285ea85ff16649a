//! Classes, fields and methods.

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::{
    bytecode::{Instruction, Label, MethodDescriptor},
    expression::ConstValue,
    Result,
};

/// Class file major version of Java 8.
pub const JAVA_8: u16 = 52;
/// Class file major version of Java 9, the first with indified string concatenation.
pub const JAVA_9: u16 = 53;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Access flags of a class
    pub struct ClassAccess: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared final
        const FINAL = 0x0010;
        /// Treat superclass methods specially in `invokespecial`
        const SUPER = 0x0020;
        /// Is an interface
        const INTERFACE = 0x0200;
        /// Declared abstract
        const ABSTRACT = 0x0400;
        /// Not present in source
        const SYNTHETIC = 0x1000;
        /// Is an annotation interface
        const ANNOTATION = 0x2000;
        /// Is an enum class
        const ENUM = 0x4000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Access flags of a field
    pub struct FieldAccess: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Declared final
        const FINAL = 0x0010;
        /// Declared volatile
        const VOLATILE = 0x0040;
        /// Declared transient
        const TRANSIENT = 0x0080;
        /// Not present in source
        const SYNTHETIC = 0x1000;
        /// Element of an enum class
        const ENUM = 0x4000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Access flags of a method
    pub struct MethodAccess: u16 {
        /// Declared public
        const PUBLIC = 0x0001;
        /// Declared private
        const PRIVATE = 0x0002;
        /// Declared protected
        const PROTECTED = 0x0004;
        /// Declared static
        const STATIC = 0x0008;
        /// Declared final
        const FINAL = 0x0010;
        /// Declared synchronized
        const SYNCHRONIZED = 0x0020;
        /// Compiler generated bridge method
        const BRIDGE = 0x0040;
        /// Declared with a variable number of arguments
        const VARARGS = 0x0080;
        /// Declared native
        const NATIVE = 0x0100;
        /// Declared abstract
        const ABSTRACT = 0x0400;
        /// Declared strictfp
        const STRICT = 0x0800;
        /// Not present in source
        const SYNTHETIC = 0x1000;
    }
}

/// An exception handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryCatchBlock {
    /// Start of the protected range (inclusive)
    pub start: Label,
    /// End of the protected range (exclusive)
    pub end: Label,
    /// Handler entry point
    pub handler: Label,
    /// Internal name of the caught type, `None` for `finally`
    pub catch_type: Option<String>,
}

/// A field declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    /// Access flags
    pub access: FieldAccess,
    /// Field name
    pub name: String,
    /// Field descriptor
    pub descriptor: String,
    /// `ConstantValue` attribute
    pub value: Option<ConstValue>,
}

impl FieldNode {
    /// Creates a field without a constant value.
    pub fn new(access: FieldAccess, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
            value: None,
        }
    }

    /// Sets the constant value.
    #[must_use]
    pub fn with_value(mut self, value: ConstValue) -> Self {
        self.value = Some(value);
        self
    }
}

/// A method declaration and its code.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodNode {
    /// Access flags
    pub access: MethodAccess,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// Instruction list, empty for abstract and native methods
    pub instructions: Vec<Instruction>,
    /// Exception handlers
    pub try_catch_blocks: Vec<TryCatchBlock>,
    /// Size of the local variable array
    pub max_locals: u16,
    /// Maximum operand stack depth
    pub max_stack: u16,
}

impl MethodNode {
    /// Creates a method without code.
    pub fn new(access: MethodAccess, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
            ..Self::default()
        }
    }

    /// Returns `true` for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.contains(MethodAccess::STATIC)
    }

    /// Returns `true` if the method has an instruction list.
    #[must_use]
    pub fn has_code(&self) -> bool {
        !self.instructions.is_empty()
    }

    /// Parses the method descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidDescriptor`] for malformed descriptors.
    pub fn parsed_descriptor(&self) -> Result<MethodDescriptor> {
        MethodDescriptor::parse(&self.descriptor)
    }

    /// Maps every label to the index of its pseudo-instruction.
    #[must_use]
    pub fn label_positions(&self) -> FxHashMap<Label, usize> {
        self.instructions
            .iter()
            .enumerate()
            .filter_map(|(index, insn)| match insn {
                Instruction::Label(label) => Some((*label, index)),
                _ => None,
            })
            .collect()
    }
}

/// A class declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassNode {
    /// Class file major version
    pub major_version: u16,
    /// Access flags
    pub access: ClassAccess,
    /// Internal name
    pub name: String,
    /// Internal name of the superclass, `None` only for `java/lang/Object`
    pub super_name: Option<String>,
    /// Internal names of the implemented interfaces
    pub interfaces: Vec<String>,
    /// Declared fields
    pub fields: Vec<FieldNode>,
    /// Declared methods
    pub methods: Vec<MethodNode>,
}

impl ClassNode {
    /// Creates an empty public Java 8 class.
    pub fn new(name: impl Into<String>, super_name: Option<&str>) -> Self {
        Self {
            major_version: JAVA_8,
            access: ClassAccess::PUBLIC | ClassAccess::SUPER,
            name: name.into(),
            super_name: super_name.map(str::to_string),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Returns the package part of the internal name, `""` for the default package.
    #[must_use]
    pub fn package(&self) -> &str {
        package_of(&self.name)
    }

    /// Finds a method by name and descriptor.
    #[must_use]
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodNode> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.descriptor == descriptor)
    }
}

/// Returns the package part of an internal class name, `""` for the default package.
#[must_use]
pub fn package_of(internal_name: &str) -> &str {
    internal_name
        .rfind('/')
        .map_or("", |slash| &internal_name[..slash])
}
