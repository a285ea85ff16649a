//! # unpick Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the unpick library. Import this module to get quick access to everything needed
//! to build mappings and transform classes.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all unpick operations
pub use crate::Error;

/// The result type used throughout unpick
pub use crate::Result;

// ================================================================================================
// Driver
// ================================================================================================

/// The uninlining driver, its configuration and statistics
pub use crate::uninline::{ConcatStrategy, TransformStats, UninlineConfig, Uninliner};

// ================================================================================================
// Mapping Data
// ================================================================================================

/// Constant expressions and values
pub use crate::expression::{BinaryOp, ConstValue, DataType, Expression, Literal, UnaryOp};

/// Groups, scopes and target declarations
pub use crate::group::{GroupKey, GroupStore, Scope, TargetDeclarations};

// ================================================================================================
// Class Model
// ================================================================================================

/// Classes, methods, fields and instructions
pub use crate::bytecode::{
    ClassNode, FieldAccess, FieldNode, Instruction, MethodAccess, MethodBuilder, MethodNode,
    Opcode,
};

// ================================================================================================
// Resolution Backends
// ================================================================================================

/// Traits the core consults and the in-memory backend implementing them
pub use crate::resolve::{
    CachedConstantResolver, CachedInheritanceChecker, ClassInfo, ClassRegistry,
    ConstantResolver, InheritanceChecker, ResolvedConstant,
};
