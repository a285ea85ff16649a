// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![allow(clippy::too_many_arguments)]

//! # unpick
//!
//! Reverses compile-time constant inlining in JVM bytecode.
//!
//! `javac` folds every use of a `static final` primitive or string constant into a raw
//! literal: `open(Mode.READ | Mode.WRITE)` ends up as `iconst_3`. Given mapping data
//! saying which literals belong to which named constants, `unpick` finds every literal
//! whose value flows into a mapped field, parameter or return value and rewrites it
//! into an equivalent reference to the constants, rebuilding bitmask combinations
//! along the way. Every rewrite preserves the program's behavior bit for bit.
//!
//! ## Features
//!
//! - **Dataflow driven** - a fixpoint analysis of each method follows literals through
//!   locals, stack shuffles, joins, loops and exception handlers to their consumers
//! - **Scoped mappings** - global, package, class and method scopes, most specific first
//! - **Flag reconstruction** - bitmask values rebuilt as `A | B` or `~(A | B)`
//! - **Exact coercions** - replacements are emitted with `javac`'s promotion rules and
//!   the narrowing casts the original literal implied
//! - **Parallel** - classes are transformed concurrently with `rayon`
//!
//! ## Quick Start
//!
//! ```rust
//! use unpick::prelude::*;
//!
//! // class Mode { static final int READ = 1, WRITE = 2; }
//! let mut registry = ClassRegistry::new();
//! registry.add_constant("p/Mode", "READ", ResolvedConstant::new(ConstValue::Int(1), true));
//! registry.add_constant("p/Mode", "WRITE", ResolvedConstant::new(ConstValue::Int(2), true));
//!
//! // The first argument of Io.open(int) takes Mode flags.
//! let mut store = GroupStore::new();
//! let mode = store.declare_group("mode", DataType::Int, true)?;
//! for name in ["READ", "WRITE"] {
//!     let constant = Expression::static_field("p/Mode", name, None);
//!     mode.insert_expression(Scope::Global, false, constant, &registry, &registry)?;
//! }
//! store.targets_mut().declare_param("p/Io", "open", "(I)V", 0, "mode");
//!
//! // static void f() { Io.open(3); }
//! let mut class = ClassNode::new("p/A", Some("java/lang/Object"));
//! class.methods.push(
//!     MethodBuilder::new(MethodAccess::STATIC, "f", "()V")
//!         .push_int(3)
//!         .invoke(Opcode::Invokestatic, "p/Io", "open", "(I)V")
//!         .op(Opcode::Return)
//!         .build()?,
//! );
//!
//! let uninliner = Uninliner::new(&store, &registry, &registry, UninlineConfig::default());
//! let stats = uninliner.transform_class(&mut class);
//! assert_eq!(stats.replaced, 1);
//!
//! // Io.open(Mode.READ | Mode.WRITE)
//! let code: Vec<String> = class.methods[0].instructions.iter().map(|i| i.to_string()).collect();
//! assert_eq!(code[..3], ["getstatic p/Mode.READ : I", "getstatic p/Mode.WRITE : I", "ior"]);
//! # Ok::<(), unpick::Error>(())
//! ```
//!
//! ## Architecture
//!
//! Leaves first:
//!
//! - [`expression`] - constant expressions, data types, values and the evaluator
//! - [`resolve`] - the constant and class hierarchy backends the core consults
//! - [`bytecode`] - class, method and instruction model, descriptors, the
//!   [`MethodBuilder`](bytecode::MethodBuilder)
//! - [`group`] - groups, scopes and target declarations
//! - [`analysis`] - the dataflow analyzer
//! - [`codegen`] - replacement code generation and flag decomposition
//! - [`uninline`] - the driver tying the pipeline together
//! - [`prelude`] - convenient re-exports
//!
//! ## Error Handling
//!
//! Fallible operations return [`Result<T, Error>`](Result). Mapping data errors are
//! reported while building a [`group::GroupStore`]; failures during transformation
//! stay local to one method or one literal and are logged through the `log` facade.
//!
//! ```rust
//! use unpick::{Error, bytecode::TypeDescriptor};
//!
//! match TypeDescriptor::parse("Lp/Unterminated") {
//!     Ok(_) => panic!("accepted a broken descriptor"),
//!     Err(Error::InvalidDescriptor(descriptor)) => println!("bad descriptor: {descriptor}"),
//!     Err(e) => println!("other error: {e}"),
//! }
//! ```
//!
//! ## Logging
//!
//! Analysis failures and group conflicts are reported at `warn`, skipped literals and
//! per-method summaries at `debug`, individual replacements at `trace`. Installing a
//! logger is up to the embedding application.

#[macro_use]
pub(crate) mod error;

pub mod prelude;

pub mod analysis;
pub mod bytecode;
pub mod codegen;
pub mod expression;
pub mod group;
pub mod resolve;
pub mod uninline;

/// `unpick` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type defaults to
/// [`Error`]. This is used consistently throughout the crate for all fallible
/// operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// `unpick` Error type
///
/// The main error type for all operations in this crate, covering analysis, generation
/// and mapping data failures.
pub use error::Error;

pub use uninline::{TransformStats, UninlineConfig, Uninliner};
