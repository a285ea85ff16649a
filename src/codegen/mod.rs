//! Turning replacement expressions back into instructions.
//!
//! The [`ExpressionGenerator`] emits an instruction sequence whose net stack effect is
//! exactly one push of the requested type. It picks operand types the way `javac`
//! does (binary numeric promotion, string concatenation wins for `+`), so the emitted
//! code evaluates to the same bits as the literal it replaces.
//!
//! # Architecture
//!
//! - [`ExpressionGenerator`] - expression trees, receivers of instance constants and
//!   the final coercion
//! - [`emitter`] - opcode selection and primitive conversions
//! - [`FlagDecomposer`] - OR / NOT-OR reconstruction of bitmasks
//! - string concatenation through `StringBuilder` or `makeConcatWithConstants`,
//!   chosen per class file version by [`ConcatStrategy`]
//!
//! # Usage
//!
//! ```rust
//! use unpick::codegen::{EmitContext, ExpressionGenerator};
//! use unpick::bytecode::{Instruction, Opcode};
//! use unpick::expression::{ConstValue, DataType, Expression};
//! use unpick::resolve::{ClassRegistry, ResolvedConstant};
//!
//! let mut registry = ClassRegistry::new();
//! registry.add_constant("p/Mode", "READ", ResolvedConstant::new(ConstValue::Int(1), true));
//!
//! let generator = ExpressionGenerator::new(&registry, &registry);
//! let context = EmitContext::new("p/A", true, 52);
//! let expr = Expression::static_field("p/Mode", "READ", Some(DataType::Int));
//!
//! let insns = generator.emit(&context, &expr, DataType::Long)?;
//! assert_eq!(insns, vec![
//!     Instruction::field(Opcode::Getstatic, "p/Mode", "READ", "I"),
//!     Instruction::Simple(Opcode::I2l),
//! ]);
//! # Ok::<(), unpick::Error>(())
//! ```

mod concat;
pub mod emitter;
mod flags;

use rustc_hash::FxHashSet;

use crate::{
    bytecode::{Instruction, Opcode},
    expression::{
        BinaryOp, ConstValue, DataType, Expression, ExpressionEvaluator, FieldExpression,
        UnaryOp,
    },
    resolve::{ConstantResolver, InheritanceChecker},
    Result,
};

pub use flags::FlagDecomposer;

use emitter::{binary_opcode, emit_conversion, emit_value_conversion, negate_opcode};

/// How string concatenations are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcatStrategy {
    /// `invokedynamic` for Java 9+ class files, `StringBuilder` before
    #[default]
    Auto,
    /// Always `StringBuilder.append` chains
    StringBuilder,
    /// Always `invokedynamic makeConcatWithConstants`
    InvokeDynamic,
}

/// Where the generated code will run.
#[derive(Debug, Clone, Copy)]
pub struct EmitContext<'a> {
    /// Internal name of the class containing the code
    pub owner: &'a str,
    /// `true` inside static methods, which have no `this`
    pub is_static: bool,
    /// Class file major version
    pub major_version: u16,
    /// `true` if the receiver of a lone instance constant is already on the stack,
    /// as left behind by a removed null check
    pub receiver_on_stack: bool,
}

impl<'a> EmitContext<'a> {
    /// Creates a context for code in `owner`.
    #[must_use]
    pub fn new(owner: &'a str, is_static: bool, major_version: u16) -> Self {
        Self {
            owner,
            is_static,
            major_version,
            receiver_on_stack: false,
        }
    }

    /// Marks the receiver of a lone instance constant as already pushed.
    #[must_use]
    pub fn with_receiver_on_stack(mut self) -> Self {
        self.receiver_on_stack = true;
        self
    }
}

/// Emits instruction sequences for expressions.
pub struct ExpressionGenerator<'a> {
    evaluator: ExpressionEvaluator<'a>,
    inheritance: &'a dyn InheritanceChecker,
    concat: ConcatStrategy,
}

impl<'a> ExpressionGenerator<'a> {
    /// Creates a generator resolving constants through the given backends.
    #[must_use]
    pub fn new(
        constants: &'a dyn ConstantResolver,
        inheritance: &'a dyn InheritanceChecker,
    ) -> Self {
        Self {
            evaluator: ExpressionEvaluator::new(constants, inheritance),
            inheritance,
            concat: ConcatStrategy::Auto,
        }
    }

    /// Sets the string concatenation strategy.
    #[must_use]
    pub fn with_concat_strategy(mut self, concat: ConcatStrategy) -> Self {
        self.concat = concat;
        self
    }

    /// Emits `expression` followed by the conversion to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Generation`] when the expression cannot be emitted in
    /// this context: an instance constant without a reachable receiver, an operator on
    /// operands it is not defined for, or a result that does not convert to `target`.
    /// Resolution errors of field references propagate unchanged.
    pub fn emit(
        &self,
        context: &EmitContext<'_>,
        expression: &Expression,
        target: DataType,
    ) -> Result<Vec<Instruction>> {
        let (mut insns, actual) = if context.receiver_on_stack {
            let field = expression.as_field().filter(|field| !field.is_static).ok_or_else(|| {
                generation_error!("Receiver on stack but {} is no instance constant", expression)
            })?;
            let (load, data_type) = self.field_access(field)?;
            (vec![load], data_type)
        } else {
            self.emit_expr(context, expression, Some(target))?
        };

        let value = self.evaluator.evaluate(expression).ok();
        insns.extend(emit_value_conversion(actual, target, value.as_ref())?);
        Ok(insns)
    }

    /// Returns the type `expression` evaluates to in Java.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Generation`] for operators on unsupported operand types;
    /// resolution errors of field references propagate unchanged.
    pub fn type_of(&self, expression: &Expression) -> Result<DataType> {
        match expression {
            Expression::Literal(literal) => Ok(literal.data_type()),
            Expression::Field(field) => Ok(self.evaluator.resolve_field(field)?.data_type),
            Expression::Cast(target, _) => Ok(*target),
            Expression::Unary(op, operand) => {
                let operand = self.type_of(operand)?;
                if !operand.is_primitive() {
                    return Err(generation_error!("Operator {} is not defined for {}", op, operand));
                }
                Ok(operand.promote())
            }
            Expression::Binary(op, lhs, rhs) => {
                let (lhs, rhs) = (self.type_of(lhs)?, self.type_of(rhs)?);
                if *op == BinaryOp::Add && (lhs == DataType::String || rhs == DataType::String) {
                    return Ok(DataType::String);
                }
                if op.is_shift() && lhs.is_primitive() && rhs.is_primitive() {
                    return Ok(lhs.promote());
                }
                DataType::promote_binary(lhs, rhs).ok_or_else(|| {
                    generation_error!("Operator {} is not defined for {} and {}", op, lhs, rhs)
                })
            }
        }
    }

    /// Emits `expression`, typing literals as `expected` where that is exact. Returns
    /// the instructions and the type they leave on the stack.
    fn emit_expr(
        &self,
        context: &EmitContext<'_>,
        expression: &Expression,
        expected: Option<DataType>,
    ) -> Result<(Vec<Instruction>, DataType)> {
        match expression {
            Expression::Literal(literal) => {
                let value = literal.value();
                let value = expected
                    .and_then(|expected| value.convert_exact(expected))
                    .unwrap_or(value);
                Ok((vec![Instruction::push(&value)], value.data_type()))
            }
            Expression::Field(field) => {
                let mut insns = if field.is_static {
                    Vec::new()
                } else {
                    self.receiver(context, &field.class_name)?
                };
                let (load, data_type) = self.field_access(field)?;
                insns.push(load);
                Ok((insns, data_type))
            }
            Expression::Cast(target, operand) => {
                let (mut insns, actual) = self.emit_expr(context, operand, Some(*target))?;
                insns.extend(emit_conversion(actual, *target)?);
                Ok((insns, *target))
            }
            Expression::Unary(op, operand) => {
                let operand_type = self.type_of(expression)?;
                let mut insns = self.emit_as(context, operand, operand_type)?;
                match op {
                    UnaryOp::Negate => {
                        insns.push(Instruction::Simple(negate_opcode(operand_type)?));
                    }
                    UnaryOp::BitNot => {
                        let all_ones = match operand_type {
                            DataType::Int => ConstValue::Int(-1),
                            DataType::Long => ConstValue::Long(-1),
                            other => {
                                return Err(generation_error!("Operator ~ is not defined for {}", other))
                            }
                        };
                        insns.push(Instruction::push(&all_ones));
                        insns.push(Instruction::Simple(binary_opcode(BinaryOp::Xor, operand_type)?));
                    }
                }
                Ok((insns, operand_type))
            }
            Expression::Binary(op, lhs, rhs) => {
                let result_type = self.type_of(expression)?;
                if result_type == DataType::String {
                    return Ok((self.emit_concat(context, expression)?, DataType::String));
                }

                let (lhs_type, rhs_type) = if op.is_shift() {
                    (result_type, DataType::Int)
                } else {
                    (result_type, result_type)
                };
                let mut insns = self.emit_as(context, lhs, lhs_type)?;
                insns.extend(self.emit_as(context, rhs, rhs_type)?);
                insns.push(Instruction::Simple(binary_opcode(*op, result_type)?));
                Ok((insns, result_type))
            }
        }
    }

    /// Emits `expression` converted to exactly `data_type`.
    fn emit_as(
        &self,
        context: &EmitContext<'_>,
        expression: &Expression,
        data_type: DataType,
    ) -> Result<Vec<Instruction>> {
        let (mut insns, actual) = self.emit_expr(context, expression, Some(data_type))?;
        insns.extend(emit_conversion(actual, data_type)?);
        Ok(insns)
    }

    /// Returns the load of a constant field and its type.
    fn field_access(&self, field: &FieldExpression) -> Result<(Instruction, DataType)> {
        let constant = self.evaluator.resolve_field(field)?;
        let Some(name) = &field.field_name else {
            return Err(generation_error!("Cannot emit wildcard {}.*", field.class_name));
        };
        let opcode = if field.is_static {
            Opcode::Getstatic
        } else {
            Opcode::Getfield
        };
        let load = Instruction::field(
            opcode,
            field.class_name.as_str(),
            name.as_str(),
            constant.data_type.descriptor(),
        );
        Ok((load, constant.data_type))
    }

    /// Pushes an instance of `field_owner`: `this`, or an enclosing instance reached
    /// through the captured `this$N` fields.
    fn receiver(&self, context: &EmitContext<'_>, field_owner: &str) -> Result<Vec<Instruction>> {
        if context.is_static {
            return Err(generation_error!(
                "Instance constant of {} used in a static context of {}",
                field_owner,
                context.owner
            ));
        }

        let mut insns = vec![Instruction::Var(Opcode::Aload, 0)];
        let mut current = context.owner.to_string();
        let mut visited = FxHashSet::default();
        loop {
            if self.inheritance.is_assignable_from(field_owner, &current) {
                return Ok(insns);
            }
            if !visited.insert(current.clone()) {
                break;
            }
            let Some(outer) = self
                .inheritance
                .class_info(&current)
                .and_then(|info| info.outer_instance.clone())
            else {
                break;
            };
            insns.push(Instruction::field(
                Opcode::Getfield,
                current.as_str(),
                outer.field_name.as_str(),
                outer.descriptor(),
            ));
            current = outer.outer_class;
        }
        Err(generation_error!(
            "No instance of {} reachable from {}",
            field_owner,
            context.owner
        ))
    }
}

/// Finds the null check `javac` emits before an inlined instance constant:
///
/// ```text
/// aload_1
/// invokestatic java/lang/Objects.requireNonNull(Ljava/lang/Object;)Ljava/lang/Object;
/// pop
/// bipush 42        <- literal_index
/// ```
///
/// `invokevirtual java/lang/Object.getClass()Ljava/lang/Class;` is the pre-Java 9 form.
/// Returns the indices of the check and of the `pop`. Line numbers may sit between
/// them, labels may not.
#[must_use]
pub fn find_null_check(instructions: &[Instruction], literal_index: usize) -> Option<[usize; 2]> {
    let mut previous = instructions[..literal_index]
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, insn)| !matches!(insn, Instruction::LineNumber { .. }));

    let (pop, pop_insn) = previous.next()?;
    if *pop_insn != Instruction::Simple(Opcode::Pop) {
        return None;
    }
    let (check, check_insn) = previous.next()?;
    let Instruction::Method(op, method) = check_insn else {
        return None;
    };
    let is_check = match op {
        Opcode::Invokestatic => {
            method.owner == "java/lang/Objects"
                && method.name == "requireNonNull"
                && method.descriptor == "(Ljava/lang/Object;)Ljava/lang/Object;"
        }
        Opcode::Invokevirtual => {
            method.owner == "java/lang/Object"
                && method.name == "getClass"
                && method.descriptor == "()Ljava/lang/Class;"
        }
        _ => false,
    };
    is_check.then_some([check, pop])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        expression::Literal,
        resolve::{ClassInfo, ClassRegistry, OuterInstance, ResolvedConstant},
    };

    fn registry() -> ClassRegistry {
        let mut registry = ClassRegistry::new();
        registry.add_class_info(ClassInfo::new("p/Outer", Some("java/lang/Object")));
        let mut inner = ClassInfo::new("p/Outer$Inner", Some("java/lang/Object"));
        inner.outer_instance = Some(OuterInstance {
            field_name: "this$0".to_string(),
            outer_class: "p/Outer".to_string(),
        });
        registry.add_class_info(inner);
        registry.add_constant("p/G", "A", ResolvedConstant::new(ConstValue::Byte(4), true));
        registry.add_constant("p/G", "B", ResolvedConstant::new(ConstValue::Byte(8), true));
        registry.add_constant("p/G", "BIG", ResolvedConstant::new(ConstValue::Int(200), true));
        registry.add_constant("p/G", "NAME", ResolvedConstant::new(ConstValue::String("x".into()), true));
        registry.add_constant("p/Outer", "SIZE", ResolvedConstant::new(ConstValue::Int(3), false));
        registry
    }

    fn field(name: &str) -> Expression {
        Expression::static_field("p/G", name, None)
    }

    fn ops(insns: &[Instruction]) -> Vec<Opcode> {
        insns.iter().filter_map(Instruction::opcode).collect()
    }

    #[test]
    fn test_promoted_operators() {
        let registry = registry();
        let generator = ExpressionGenerator::new(&registry, &registry);
        let context = EmitContext::new("p/A", true, 52);

        // byte | byte is an int; 12 fits a byte, so no narrowing is needed.
        let or = Expression::binary(BinaryOp::Or, field("A"), field("B"));
        let insns = generator.emit(&context, &or, DataType::Byte).unwrap();
        assert_eq!(ops(&insns), vec![Opcode::Getstatic, Opcode::Getstatic, Opcode::Ior]);

        // Long context: literal operands are emitted as longs directly.
        let shifted = Expression::binary(BinaryOp::Shl, Expression::long(1), Expression::int(40));
        let insns = generator.emit(&context, &shifted, DataType::Long).unwrap();
        assert_eq!(
            insns,
            vec![
                Instruction::Simple(Opcode::Lconst1),
                Instruction::push_int(40),
                Instruction::Simple(Opcode::Lshl),
            ]
        );
    }

    #[test]
    fn test_literals_follow_expected_type() {
        let registry = registry();
        let generator = ExpressionGenerator::new(&registry, &registry);
        let context = EmitContext::new("p/A", true, 52);

        let sum = Expression::binary(BinaryOp::Add, field("BIG"), Expression::int(2));
        let insns = generator.emit(&context, &sum, DataType::Double).unwrap();
        assert_eq!(ops(&insns), vec![Opcode::Getstatic, Opcode::Iconst2, Opcode::Iadd, Opcode::I2d]);

        let cast = Expression::cast(DataType::Byte, field("BIG"));
        let insns = generator.emit(&context, &cast, DataType::Int).unwrap();
        assert_eq!(ops(&insns), vec![Opcode::Getstatic, Opcode::I2b]);

        let float = Expression::binary(
            BinaryOp::Mul,
            Expression::Literal(Literal::Float(1.5)),
            Expression::int(2),
        );
        let insns = generator.emit(&context, &float, DataType::Float).unwrap();
        assert_eq!(ops(&insns), vec![Opcode::Ldc, Opcode::Fconst2, Opcode::Fmul]);
    }

    #[test]
    fn test_bit_not() {
        let registry = registry();
        let generator = ExpressionGenerator::new(&registry, &registry);
        let context = EmitContext::new("p/A", true, 52);

        let not = Expression::unary(UnaryOp::BitNot, field("A"));
        let insns = generator.emit(&context, &not, DataType::Int).unwrap();
        assert_eq!(ops(&insns), vec![Opcode::Getstatic, Opcode::IconstM1, Opcode::Ixor]);
    }

    #[test]
    fn test_instance_receivers() {
        let registry = registry();
        let generator = ExpressionGenerator::new(&registry, &registry);
        let size = Expression::instance_field("p/Outer", "SIZE", None);

        let own = generator
            .emit(&EmitContext::new("p/Outer", false, 52), &size, DataType::Int)
            .unwrap();
        assert_eq!(ops(&own), vec![Opcode::Aload, Opcode::Getfield]);

        let inner = generator
            .emit(&EmitContext::new("p/Outer$Inner", false, 52), &size, DataType::Int)
            .unwrap();
        assert_eq!(
            inner[1],
            Instruction::field(Opcode::Getfield, "p/Outer$Inner", "this$0", "Lp/Outer;")
        );
        assert_eq!(inner.len(), 3);

        assert!(generator
            .emit(&EmitContext::new("p/Outer", true, 52), &size, DataType::Int)
            .is_err());
        assert!(generator
            .emit(&EmitContext::new("p/Other", false, 52), &size, DataType::Int)
            .is_err());

        let on_stack = generator
            .emit(
                &EmitContext::new("p/Other", true, 52).with_receiver_on_stack(),
                &size,
                DataType::Int,
            )
            .unwrap();
        assert_eq!(on_stack, vec![Instruction::field(Opcode::Getfield, "p/Outer", "SIZE", "I")]);
    }

    #[test]
    fn test_type_errors() {
        let registry = registry();
        let generator = ExpressionGenerator::new(&registry, &registry);
        let context = EmitContext::new("p/A", true, 52);

        assert!(generator.emit(&context, &field("NAME"), DataType::Int).is_err());
        let bad = Expression::binary(BinaryOp::Sub, field("NAME"), Expression::int(1));
        assert!(generator.emit(&context, &bad, DataType::Int).is_err());
        assert!(generator
            .emit(&context, &Expression::static_field("p/G", "MISSING", None), DataType::Int)
            .is_err());
    }

    #[test]
    fn test_null_check_idiom() {
        let insns = vec![
            Instruction::Var(Opcode::Aload, 1),
            Instruction::method(
                Opcode::Invokestatic,
                "java/lang/Objects",
                "requireNonNull",
                "(Ljava/lang/Object;)Ljava/lang/Object;",
            ),
            Instruction::Simple(Opcode::Pop),
            Instruction::push_int(3),
        ];
        assert_eq!(find_null_check(&insns, 3), Some([1, 2]));
        assert_eq!(find_null_check(&insns, 1), None);

        let legacy = vec![
            Instruction::Var(Opcode::Aload, 1),
            Instruction::method(Opcode::Invokevirtual, "java/lang/Object", "getClass", "()Ljava/lang/Class;"),
            Instruction::Simple(Opcode::Pop),
            Instruction::push_int(3),
        ];
        assert_eq!(find_null_check(&legacy, 3), Some([1, 2]));

        let unrelated = vec![
            Instruction::method(Opcode::Invokestatic, "p/A", "g", "()Ljava/lang/Object;"),
            Instruction::Simple(Opcode::Pop),
            Instruction::push_int(3),
        ];
        assert_eq!(find_null_check(&unrelated, 2), None);
    }
}
