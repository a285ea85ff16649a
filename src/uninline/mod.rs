//! The uninlining driver.
//!
//! [`Uninliner`] ties the pipeline together. For each method it runs the dataflow
//! analysis once, resolves the group of every reachable literal, looks the literal up
//! in that group's scopes (falling back to flag decomposition), generates the
//! replacement and finally applies all replacements in one pass.
//!
//! Failures stay local: a method the analysis rejects is left untouched, and a literal
//! whose replacement cannot be generated keeps its original instruction. Nothing in
//! here aborts a run over many classes.
//!
//! # Usage
//!
//! ```rust
//! use unpick::bytecode::{ClassNode, FieldAccess, FieldNode, MethodAccess, MethodBuilder, Opcode};
//! use unpick::expression::{ConstValue, DataType, Expression};
//! use unpick::group::{GroupStore, Scope};
//! use unpick::resolve::ClassRegistry;
//! use unpick::uninline::{UninlineConfig, Uninliner};
//!
//! // class Mode { static final int READ = 1; }
//! let mut mode = ClassNode::new("p/Mode", Some("java/lang/Object"));
//! mode.fields.push(
//!     FieldNode::new(FieldAccess::PUBLIC | FieldAccess::STATIC | FieldAccess::FINAL, "READ", "I")
//!         .with_value(ConstValue::Int(1)),
//! );
//! let registry = ClassRegistry::from_classes([&mode]);
//!
//! let mut store = GroupStore::new();
//! store.declare_group("mode", DataType::Int, false)?.insert_expression(
//!     Scope::Global,
//!     false,
//!     Expression::static_field("p/Mode", "READ", None),
//!     &registry,
//!     &registry,
//! )?;
//! store.targets_mut().declare_param("p/Io", "open", "(I)V", 0, "mode");
//!
//! // static void f() { Io.open(1); }
//! let mut class = ClassNode::new("p/A", Some("java/lang/Object"));
//! class.methods.push(
//!     MethodBuilder::new(MethodAccess::STATIC, "f", "()V")
//!         .push_int(1)
//!         .invoke(Opcode::Invokestatic, "p/Io", "open", "(I)V")
//!         .op(Opcode::Return)
//!         .build()?,
//! );
//!
//! let uninliner = Uninliner::new(&store, &registry, &registry, UninlineConfig::default());
//! let stats = uninliner.transform_class(&mut class);
//! assert_eq!(stats.replaced, 1);
//! assert_eq!(class.methods[0].instructions[0].to_string(), "getstatic p/Mode.READ : I");
//! # Ok::<(), unpick::Error>(())
//! ```

mod config;
mod resolver;

use std::ops::{Add, AddAssign};

use log::{debug, trace, warn};
use rayon::prelude::*;

use crate::{
    analysis::{Analysis, Analyzer, ValueFacts, ValueType},
    bytecode::{ClassNode, Instruction, MethodNode, Opcode, ReplacementSet},
    codegen::{emitter::emit_conversion, find_null_check, EmitContext, ExpressionGenerator, FlagDecomposer},
    expression::{ConstValue, DataType, Expression},
    group::{Group, GroupKey, GroupStore},
    resolve::{ConstantResolver, InheritanceChecker},
    Result,
};

pub use crate::codegen::ConcatStrategy;
pub use config::UninlineConfig;
pub use resolver::GroupResolver;

/// Counts of what a transformation did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransformStats {
    /// Literals rewritten into constant references
    pub replaced: usize,
    /// Literals left alone because their value flows into conflicting groups
    pub conflicts: usize,
    /// Literals in a group that has no replacement for them, or whose replacement
    /// could not be generated
    pub skipped: usize,
    /// Methods the analysis rejected, left untouched
    pub failed_methods: usize,
}

impl TransformStats {
    /// Returns `true` if nothing was rewritten.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.replaced == 0
    }
}

impl AddAssign for TransformStats {
    fn add_assign(&mut self, other: Self) {
        self.replaced += other.replaced;
        self.conflicts += other.conflicts;
        self.skipped += other.skipped;
        self.failed_methods += other.failed_methods;
    }
}

impl Add for TransformStats {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self += other;
        self
    }
}

/// One literal the driver decided to rewrite.
struct Rewrite {
    expression: Expression,
    /// Type the expression is emitted as before converting to the literal's type
    emit_type: DataType,
}

/// Rewrites inlined literals into references to the constants they came from.
pub struct Uninliner<'a> {
    store: &'a GroupStore,
    constants: &'a dyn ConstantResolver,
    inheritance: &'a dyn InheritanceChecker,
    config: UninlineConfig,
}

impl<'a> Uninliner<'a> {
    /// Creates a driver over a built group store and the resolution backends.
    #[must_use]
    pub fn new(
        store: &'a GroupStore,
        constants: &'a dyn ConstantResolver,
        inheritance: &'a dyn InheritanceChecker,
        config: UninlineConfig,
    ) -> Self {
        Self {
            store,
            constants,
            inheritance,
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &UninlineConfig {
        &self.config
    }

    /// Transforms every method of every class, classes in parallel.
    pub fn transform_classes(&self, classes: &mut [ClassNode]) -> TransformStats {
        classes
            .par_iter_mut()
            .map(|class| self.transform_class(class))
            .reduce(TransformStats::default, Add::add)
    }

    /// Transforms every method of `class`.
    pub fn transform_class(&self, class: &mut ClassNode) -> TransformStats {
        let mut methods = std::mem::take(&mut class.methods);
        let mut stats = TransformStats::default();
        for method in &mut methods {
            stats += self.transform_method(class, method);
        }
        class.methods = methods;
        stats
    }

    /// Transforms one method of `class` in place.
    ///
    /// `class` supplies the owner name and class file version; its `methods` list is
    /// not consulted, so the method may be detached from it.
    pub fn transform_method(&self, class: &ClassNode, method: &mut MethodNode) -> TransformStats {
        let mut stats = TransformStats::default();
        if !method.has_code() {
            return stats;
        }

        let analysis = match Analyzer::new(self.inheritance)
            .with_max_iterations(self.config.max_analysis_iterations)
            .analyze(&class.name, method)
        {
            Ok(analysis) => analysis,
            Err(error) => {
                warn!(
                    "{}.{}{}: analysis failed, method left unchanged: {}",
                    class.name, method.name, method.descriptor, error
                );
                stats.failed_methods = 1;
                return stats;
            }
        };

        let replacements = self.plan(class, method, &analysis, &mut stats);
        if !replacements.is_empty() {
            debug!(
                "{}.{}{}: {} literals replaced, {} skipped, {} conflicts",
                class.name,
                method.name,
                method.descriptor,
                stats.replaced,
                stats.skipped,
                stats.conflicts
            );
        }
        replacements.apply(&mut method.instructions);
        stats
    }

    /// Decides the replacement of every literal without touching the method.
    fn plan(
        &self,
        class: &ClassNode,
        method: &MethodNode,
        analysis: &Analysis,
        stats: &mut TransformStats,
    ) -> ReplacementSet {
        let generator = ExpressionGenerator::new(self.constants, self.inheritance)
            .with_concat_strategy(self.config.concat_strategy);
        let mut resolver = GroupResolver::new(self.store, self.inheritance, &class.name, method);
        let mut replacements = ReplacementSet::new();

        for (index, insn) in method.instructions.iter().enumerate() {
            let Some(value) = insn.literal() else {
                continue;
            };
            let (Some(facts), Some(root)) = (analysis.literal_facts(index), analysis.literal_root(index)) else {
                continue;
            };
            if is_complement_operand(&method.instructions, index, &value) {
                continue;
            }

            let literal_type = value.data_type();
            let Some(key) =
                resolver.resolve(root, facts, literal_type, self.config.enable_default_groups)
            else {
                if resolver.is_conflict(root) {
                    stats.conflicts += 1;
                }
                continue;
            };
            let Some(rewrite) = self.find_rewrite(class, method, &key, &value, facts) else {
                if matches!(key, GroupKey::Named(_)) {
                    stats.skipped += 1;
                }
                continue;
            };

            match self.generate(class, method, analysis, index, literal_type, &rewrite, &generator) {
                Ok((removed, insns)) => {
                    trace!(
                        "{}.{}{} @{}: {} -> {}",
                        class.name,
                        method.name,
                        method.descriptor,
                        index,
                        value,
                        rewrite.expression
                    );
                    for removed in removed {
                        replacements.remove(removed);
                    }
                    replacements.replace(index, insns);
                    stats.replaced += 1;
                }
                Err(error) => {
                    debug!(
                        "{}.{}{} @{}: cannot emit {}: {}",
                        class.name, method.name, method.descriptor, index, rewrite.expression, error
                    );
                    stats.skipped += 1;
                }
            }
        }
        replacements
    }

    /// Looks `value` up in the group `key`: a verbatim scope entry first, then a flag
    /// decomposition.
    fn find_rewrite(
        &self,
        class: &ClassNode,
        method: &MethodNode,
        key: &GroupKey,
        value: &ConstValue,
        facts: &ValueFacts,
    ) -> Option<Rewrite> {
        let group = self.store.group(key)?;
        let group_type = group.data_type();
        let narrow_type = narrow_type(facts, value.data_type());
        if narrow_type.stack_kind() != group_type.stack_kind() {
            return None;
        }
        let group_value = value.convert_exact(group_type)?;
        let scopes = group.find_scopes(&class.name, &method.name, &method.descriptor);

        if let Some(entry) = scopes.iter().find_map(|table| table.get(&group_value)) {
            let accepted = if entry.strict {
                narrow_type == group_type
            } else {
                narrow_type.widens_to(group_type)
            };
            return accepted.then(|| Rewrite {
                expression: entry.expression.clone(),
                emit_type: group_type,
            });
        }

        if !self.decomposes(group) {
            return None;
        }
        let width = if narrow_type.is_integral() {
            narrow_type
        } else {
            group_type
        };
        // The cover only matches within `width`, so the result is narrowed to it.
        let expression = FlagDecomposer::decompose(&scopes, &group_value, width)?;
        Some(Rewrite {
            expression,
            emit_type: width,
        })
    }

    fn decomposes(&self, group: &Group) -> bool {
        self.config.enable_flag_decomposition && group.is_flags()
    }

    /// Emits the replacement of the literal at `index`. Returns the indices of
    /// instructions to delete along with it and the new instructions.
    fn generate(
        &self,
        class: &ClassNode,
        method: &MethodNode,
        analysis: &Analysis,
        index: usize,
        literal_type: DataType,
        rewrite: &Rewrite,
        generator: &ExpressionGenerator<'_>,
    ) -> Result<(Vec<usize>, Vec<Instruction>)> {
        let context = EmitContext::new(&class.name, method.is_static(), class.major_version);

        if let Some([check, pop]) = self.null_check(method, analysis, index, &rewrite.expression) {
            let on_stack = context.with_receiver_on_stack();
            if let Ok(mut insns) = generator.emit(&on_stack, &rewrite.expression, rewrite.emit_type) {
                insns.extend(emit_conversion(rewrite.emit_type, literal_type)?);
                return Ok((vec![check, pop], insns));
            }
        }

        let mut insns = generator.emit(&context, &rewrite.expression, rewrite.emit_type)?;
        insns.extend(emit_conversion(rewrite.emit_type, literal_type)?);
        Ok((Vec::new(), insns))
    }

    /// Returns the null check guarding an instance constant's receiver, if the
    /// replacement is a lone instance constant and the checked object can receive it.
    fn null_check(
        &self,
        method: &MethodNode,
        analysis: &Analysis,
        index: usize,
        expression: &Expression,
    ) -> Option<[usize; 2]> {
        if !self.config.remove_null_checks {
            return None;
        }
        let field = expression.as_field().filter(|field| !field.is_static)?;
        let [check, pop] = find_null_check(&method.instructions, index)?;
        let receiver = analysis.frame(check)?.peek(0)?;
        let ValueType::Reference(receiver_type) = &receiver.value_type else {
            return None;
        };
        self.inheritance
            .is_assignable_from(&field.class_name, receiver_type)
            .then_some([check, pop])
    }
}

/// Resolves the type a literal stands for from the types its consumers imply.
///
/// A single implied type of the literal's stack kind other than its own wins, so an
/// `int` push stored into a `byte` field is a byte. Anything ambiguous keeps the
/// literal's own type.
fn narrow_type(facts: &ValueFacts, literal_type: DataType) -> DataType {
    let mut candidates = facts
        .narrow_types
        .iter()
        .filter(|&data_type| data_type != literal_type)
        .filter(|data_type| data_type.stack_kind() == literal_type.stack_kind());
    match (candidates.next(), candidates.next()) {
        (Some(narrow), None) => narrow,
        _ => literal_type,
    }
}

/// Returns `true` for the all-ones operand of `x ^ -1`, the compiled form of `~x`.
fn is_complement_operand(instructions: &[Instruction], index: usize, value: &ConstValue) -> bool {
    let xor = match value {
        ConstValue::Int(-1) => Opcode::Ixor,
        ConstValue::Long(-1) => Opcode::Lxor,
        _ => return false,
    };
    instructions[index + 1..]
        .iter()
        .find(|insn| !insn.is_pseudo())
        .is_some_and(|next| *next == Instruction::Simple(xor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{MethodAccess, MethodBuilder, JAVA_8},
        group::Scope,
        resolve::{ClassRegistry, ResolvedConstant},
    };

    fn registry() -> ClassRegistry {
        let mut registry = ClassRegistry::new();
        registry.add_constant("p/Mode", "READ", ResolvedConstant::new(ConstValue::Int(1), true));
        registry.add_constant("p/Mode", "WRITE", ResolvedConstant::new(ConstValue::Int(2), true));
        registry
    }

    fn store(registry: &ClassRegistry) -> GroupStore {
        let mut store = GroupStore::new();
        let group = store.declare_group("mode", DataType::Int, true).unwrap();
        for name in ["READ", "WRITE"] {
            group
                .insert_expression(
                    Scope::Global,
                    false,
                    Expression::static_field("p/Mode", name, None),
                    registry,
                    registry,
                )
                .unwrap();
        }
        store
            .targets_mut()
            .declare_param("p/Io", "open", "(I)V", 0, "mode");
        store
    }

    fn class_with(method: MethodNode) -> ClassNode {
        let mut class = ClassNode::new("p/A", Some("java/lang/Object"));
        class.major_version = JAVA_8;
        class.methods.push(method);
        class
    }

    fn open_call(value: i32) -> MethodNode {
        MethodBuilder::new(MethodAccess::STATIC, "f", "()V")
            .push_int(value)
            .invoke(Opcode::Invokestatic, "p/Io", "open", "(I)V")
            .op(Opcode::Return)
            .build()
            .unwrap()
    }

    #[test]
    fn test_verbatim_and_decomposed() {
        let registry = registry();
        let store = store(&registry);
        let uninliner = Uninliner::new(&store, &registry, &registry, UninlineConfig::default());

        let mut class = class_with(open_call(2));
        let stats = uninliner.transform_class(&mut class);
        assert_eq!(stats.replaced, 1);
        assert_eq!(
            class.methods[0].instructions[0],
            Instruction::field(Opcode::Getstatic, "p/Mode", "WRITE", "I")
        );

        let mut class = class_with(open_call(3));
        uninliner.transform_class(&mut class);
        let ops: Vec<_> = class.methods[0]
            .instructions
            .iter()
            .filter_map(Instruction::opcode)
            .collect();
        assert_eq!(
            ops,
            vec![Opcode::Getstatic, Opcode::Getstatic, Opcode::Ior, Opcode::Invokestatic, Opcode::Return]
        );
    }

    #[test]
    fn test_configuration_switches() {
        let registry = registry();
        let store = store(&registry);
        let config = UninlineConfig::default().with_flag_decomposition(false);
        let uninliner = Uninliner::new(&store, &registry, &registry, config);

        let mut class = class_with(open_call(3));
        let stats = uninliner.transform_class(&mut class);
        assert_eq!(stats.replaced, 0);
        assert_eq!(stats.skipped, 1);
        assert_eq!(class.methods[0].instructions[0], Instruction::push_int(3));
    }

    #[test]
    fn test_failed_analysis_leaves_method() {
        let registry = registry();
        let store = store(&registry);
        let uninliner = Uninliner::new(&store, &registry, &registry, UninlineConfig::default());

        let broken = MethodBuilder::new(MethodAccess::STATIC, "f", "()V")
            .push_int(2)
            .invoke(Opcode::Invokestatic, "p/Io", "open", "(I)V")
            .build()
            .unwrap();
        let mut class = class_with(broken.clone());
        let stats = uninliner.transform_class(&mut class);
        assert_eq!(stats.failed_methods, 1);
        assert_eq!(class.methods[0], broken);
    }

    #[test]
    fn test_narrow_type() {
        let mut facts = ValueFacts::default();
        facts.narrow_types.insert(DataType::Int);
        assert_eq!(narrow_type(&facts, DataType::Int), DataType::Int);
        facts.narrow_types.insert(DataType::Byte);
        assert_eq!(narrow_type(&facts, DataType::Int), DataType::Byte);
        facts.narrow_types.insert(DataType::Char);
        assert_eq!(narrow_type(&facts, DataType::Int), DataType::Int);

        let mut long = ValueFacts::default();
        long.narrow_types.insert(DataType::Byte);
        assert_eq!(narrow_type(&long, DataType::Long), DataType::Long);
    }

    #[test]
    fn test_stats_accumulate() {
        let mut total = TransformStats::default();
        total += TransformStats {
            replaced: 2,
            conflicts: 1,
            skipped: 0,
            failed_methods: 0,
        };
        let total = total
            + TransformStats {
                replaced: 1,
                conflicts: 0,
                skipped: 3,
                failed_methods: 1,
            };
        assert_eq!(total.replaced, 3);
        assert_eq!(total.conflicts, 1);
        assert_eq!(total.skipped, 3);
        assert_eq!(total.failed_methods, 1);
        assert!(!total.is_unchanged());
    }
}
