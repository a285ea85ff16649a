//! Dataflow analysis of method bodies.
//!
//! The analyzer abstractly interprets a method to find out, for every literal push,
//! where the pushed value goes. It tracks two things per value:
//!
//! - **Sources** - the set of instructions and parameters a stack slot or local may
//!   hold a value from. Copies (`dup`, loads, stores) keep the sources, so a literal
//!   stays identifiable however it is shuffled around.
//! - **Facts** - what the value's consumers reveal: field stores, call arguments,
//!   returns, and the narrow types they imply. Facts live in a union-find
//!   [`FactTable`]; values that meet at a join, or are combined by a bitwise operator
//!   or compared, share one class.
//!
//! # Architecture
//!
//! - [`Analyzer`] - worklist fixpoint over instruction indices, including exception
//!   handler edges
//! - [`Frame`] - locals and operand stack before an instruction, with the merge at
//!   control flow joins
//! - [`FactTable`] / [`ValueFacts`] - the union-find fact store
//! - [`ValueType`] / [`FrameValue`] - abstract values
//!
//! The transfer function is internal; its effects are observable through
//! [`Analysis::literal_facts`].
//!
//! # Usage
//!
//! ```rust
//! use unpick::analysis::Analyzer;
//! use unpick::bytecode::{MethodAccess, MethodBuilder, Opcode};
//! use unpick::resolve::ClassRegistry;
//!
//! // void f() { this.mode = 2; }
//! let method = MethodBuilder::new(MethodAccess::PUBLIC, "f", "()V")
//!     .var(Opcode::Aload, 0)
//!     .push_int(2)
//!     .field(Opcode::Putfield, "p/A", "mode", "I")
//!     .op(Opcode::Return)
//!     .build()?;
//!
//! let registry = ClassRegistry::new();
//! let analysis = Analyzer::new(&registry).analyze("p/A", &method)?;
//! assert!(analysis.literal_facts(1).unwrap().usages.contains(&2));
//! # Ok::<(), unpick::Error>(())
//! ```

mod analyzer;
mod facts;
mod frame;
mod interpreter;
mod value;

pub use analyzer::{Analysis, Analyzer, DEFAULT_MAX_ITERATIONS};
pub use facts::{FactTable, ValueFacts};
pub use frame::Frame;
pub use value::{FrameValue, SourceId, ValueType};
