//! Finding the group a literal belongs to.
//!
//! The analysis tells where a value goes; the target declarations tell which group
//! each destination expects. Every destination of a value is a candidate, checked in
//! a fixed order:
//!
//! 1. parameters of the enclosing method the value flows from,
//! 2. call arguments the value is passed as, looking through lambda adapters,
//! 3. fields, call results and the enclosing method's return.
//!
//! All candidates must name the same group. Resolutions are cached per fact class, so
//! literals merged into one value are resolved once.

use log::warn;
use rustc_hash::FxHashMap;

use crate::{
    analysis::ValueFacts,
    bytecode::{Constant, Instruction, InvokeDynamicInsn, MethodNode, Opcode},
    expression::DataType,
    group::{GroupKey, GroupStore},
    resolve::InheritanceChecker,
};

const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";

/// Resolves the groups of literals in one method.
pub struct GroupResolver<'a> {
    store: &'a GroupStore,
    inheritance: &'a dyn InheritanceChecker,
    owner: &'a str,
    method: &'a MethodNode,
    resolved: FxHashMap<usize, Resolution>,
}

#[derive(Debug, Clone)]
enum Resolution {
    Named(String),
    Conflict,
    Unclaimed,
}

impl<'a> GroupResolver<'a> {
    /// Creates a resolver for literals of `owner.method`.
    #[must_use]
    pub fn new(
        store: &'a GroupStore,
        inheritance: &'a dyn InheritanceChecker,
        owner: &'a str,
        method: &'a MethodNode,
    ) -> Self {
        Self {
            store,
            inheritance,
            owner,
            method,
            resolved: FxHashMap::default(),
        }
    }

    /// Returns the named group implied by `facts`, the facts of the class `root`.
    ///
    /// `None` means no destination names a group, or two destinations name different
    /// groups; the latter is logged as a warning.
    pub fn resolve_named(&mut self, root: usize, facts: &ValueFacts) -> Option<String> {
        match self.resolution(root, facts) {
            Resolution::Named(name) => Some(name),
            Resolution::Conflict | Resolution::Unclaimed => None,
        }
    }

    /// Returns the group of a literal of type `literal_type` with the given facts:
    /// the named group, or the default group of `literal_type` when no destination
    /// names one and `use_default` is set.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use unpick::analysis::Analyzer;
    /// use unpick::bytecode::{MethodAccess, MethodBuilder, Opcode};
    /// use unpick::expression::DataType;
    /// use unpick::group::{GroupKey, GroupStore};
    /// use unpick::resolve::ClassRegistry;
    /// use unpick::uninline::GroupResolver;
    ///
    /// let mut store = GroupStore::new();
    /// store.declare_group("mode", DataType::Int, false)?;
    /// store.targets_mut().declare_param("p/Io", "open", "(I)V", 0, "mode");
    ///
    /// let method = MethodBuilder::new(MethodAccess::STATIC, "f", "()V")
    ///     .push_int(2)
    ///     .invoke(Opcode::Invokestatic, "p/Io", "open", "(I)V")
    ///     .op(Opcode::Return)
    ///     .build()?;
    ///
    /// let registry = ClassRegistry::new();
    /// let analysis = Analyzer::new(&registry).analyze("p/A", &method)?;
    /// let mut resolver = GroupResolver::new(&store, &registry, "p/A", &method);
    /// let group = resolver.resolve(
    ///     analysis.literal_root(0).unwrap(),
    ///     analysis.literal_facts(0).unwrap(),
    ///     DataType::Int,
    ///     true,
    /// );
    /// assert_eq!(group, Some(GroupKey::Named("mode".into())));
    /// # Ok::<(), unpick::Error>(())
    /// ```
    pub fn resolve(
        &mut self,
        root: usize,
        facts: &ValueFacts,
        literal_type: DataType,
        use_default: bool,
    ) -> Option<GroupKey> {
        match self.resolution(root, facts) {
            Resolution::Named(name) => Some(GroupKey::Named(name)),
            Resolution::Conflict => None,
            Resolution::Unclaimed => (use_default && self.store.has_default_group(literal_type))
                .then_some(GroupKey::Default(literal_type)),
        }
    }

    /// Returns `true` if the class `root` was resolved and its destinations disagree.
    #[must_use]
    pub fn is_conflict(&self, root: usize) -> bool {
        matches!(self.resolved.get(&root), Some(Resolution::Conflict))
    }

    fn resolution(&mut self, root: usize, facts: &ValueFacts) -> Resolution {
        if let Some(cached) = self.resolved.get(&root) {
            return cached.clone();
        }
        let resolution = self.compute(facts);
        self.resolved.insert(root, resolution.clone());
        resolution
    }

    fn compute(&self, facts: &ValueFacts) -> Resolution {
        let mut candidates = self.candidates(facts);
        let Some(first) = candidates.next() else {
            return Resolution::Unclaimed;
        };
        for other in candidates {
            if other != first {
                warn!(
                    "{}.{}{}: value flows into groups {} and {}, left as literal",
                    self.owner, self.method.name, self.method.descriptor, first, other
                );
                return Resolution::Conflict;
            }
        }
        Resolution::Named(first)
    }

    /// Groups of all destinations of a value, in precedence order.
    fn candidates<'f>(&'f self, facts: &'f ValueFacts) -> impl Iterator<Item = String> + 'f {
        let targets = self.store.targets();
        let method = self.method;

        let sources = facts.param_sources.iter().filter_map(move |&index| {
            targets.param_group(self.owner, &method.name, &method.descriptor, index, self.inheritance)
        });

        let arguments = facts
            .param_usages
            .iter()
            .filter_map(move |&(call, argument)| self.argument_group(call, argument));

        let usages = facts.usages.iter().filter_map(move |&usage| {
            let is_argument = facts
                .param_usages
                .range((usage, 0)..=(usage, usize::MAX))
                .next()
                .is_some();
            self.usage_group(usage, is_argument)
        });

        sources.chain(arguments).chain(usages)
    }

    /// Group of argument `argument` of the call at instruction `call`.
    fn argument_group(&self, call: usize, argument: usize) -> Option<String> {
        let targets = self.store.targets();
        match self.method.instructions.get(call)? {
            Instruction::Method(_, target) => targets.param_group(
                &target.owner,
                &target.name,
                &target.descriptor,
                argument,
                self.inheritance,
            ),
            Instruction::InvokeDynamic(indy) => {
                let Some(Constant::Handle(implementation)) = lambda_implementation(indy) else {
                    return None;
                };
                let index = if implementation.kind.has_receiver() {
                    argument.checked_sub(1)?
                } else {
                    argument
                };
                targets.param_group(
                    &implementation.owner,
                    &implementation.name,
                    &implementation.descriptor,
                    index,
                    self.inheritance,
                )
            }
            _ => None,
        }
    }

    /// Group of a consumer or producer of the value. Calls only count as producers;
    /// `is_argument` marks calls the value is passed to.
    fn usage_group(&self, usage: usize, is_argument: bool) -> Option<String> {
        let targets = self.store.targets();
        match self.method.instructions.get(usage)? {
            Instruction::Field(_, field) => targets
                .field_group(&field.owner, &field.name, &field.descriptor)
                .map(str::to_string),
            Instruction::Method(_, target) if !is_argument => targets.return_group(
                &target.owner,
                &target.name,
                &target.descriptor,
                self.inheritance,
            ),
            Instruction::Simple(
                Opcode::Ireturn
                | Opcode::Lreturn
                | Opcode::Freturn
                | Opcode::Dreturn
                | Opcode::Areturn,
            ) => targets.return_group(
                self.owner,
                &self.method.name,
                &self.method.descriptor,
                self.inheritance,
            ),
            _ => None,
        }
    }
}

/// Returns the implementation handle of a lambda adapter call site.
fn lambda_implementation(indy: &InvokeDynamicInsn) -> Option<&Constant> {
    let bootstrap = &indy.bootstrap;
    let is_lambda = bootstrap.owner == LAMBDA_METAFACTORY
        && (bootstrap.name == "metafactory" || bootstrap.name == "altMetafactory");
    if !is_lambda {
        return None;
    }
    indy.bootstrap_args.get(1)
}
