//! The class model the uninliner reads and rewrites.
//!
//! This is a tree representation in the spirit of an ASM `ClassNode`: classes own their
//! fields and methods, methods own a flat [`Instruction`] list in which branch targets
//! appear as [`Label`] pseudo-instructions. Reading and writing class files is left to
//! the embedding tool, which converts to and from these types.
//!
//! # Key Components
//!
//! - [`ClassNode`], [`FieldNode`], [`MethodNode`] - Declarations
//! - [`Instruction`] and [`Opcode`] - Method bodies
//! - [`TypeDescriptor`] and [`MethodDescriptor`] - Parsed descriptors
//! - [`MethodBuilder`] - Fluent construction of method bodies
//! - [`ReplacementSet`] - Deferred, single-pass rewriting

mod builder;
mod class;
mod descriptor;
mod instruction;
mod opcodes;
mod replace;

pub use builder::MethodBuilder;
pub use class::{
    package_of, ClassAccess, ClassNode, FieldAccess, FieldNode, MethodAccess, MethodNode,
    TryCatchBlock, JAVA_8, JAVA_9,
};
pub use descriptor::{internal_name, MethodDescriptor, TypeDescriptor};
pub use instruction::{
    Constant, FieldInsn, Handle, HandleKind, Instruction, InvokeDynamicInsn, Label, MethodInsn,
};
pub use opcodes::Opcode;
pub use replace::ReplacementSet;
