//! Constant folding of [`Expression`] trees.
//!
//! The evaluator reproduces what `javac` computes for a constant expression, so the
//! value a mapping's replacement folds to is exactly the literal the compiler would
//! have inlined for it. Group lookup keys are produced this way.

use rustc_hash::FxHashSet;

use crate::{
    expression::{BinaryOp, ConstValue, DataType, Expression, FieldExpression, UnaryOp},
    resolve::{ConstantResolver, InheritanceChecker, ResolvedConstant},
    Error, Result,
};

/// Folds expressions to [`ConstValue`]s.
///
/// Field references are resolved through a [`ConstantResolver`]; when the named class
/// does not declare the field, its superinterfaces and then its superclass chain are
/// searched, as field resolution in the JVM does.
pub struct ExpressionEvaluator<'a> {
    constants: &'a dyn ConstantResolver,
    inheritance: &'a dyn InheritanceChecker,
}

impl<'a> ExpressionEvaluator<'a> {
    /// Creates an evaluator over the given backends.
    pub fn new(
        constants: &'a dyn ConstantResolver,
        inheritance: &'a dyn InheritanceChecker,
    ) -> Self {
        Self {
            constants,
            inheritance,
        }
    }

    /// Evaluates `expression`.
    ///
    /// # Errors
    ///
    /// - [`Error::ConstantNotResolvable`] if a field reference names no constant
    /// - [`Error::ConstantTypeMismatch`] if a field reference declares a different type
    ///   or staticness than the constant has
    /// - [`Error::WildcardExpression`] for unexpanded wildcard references
    /// - [`Error::DivisionByZero`] for integer `/` or `%` by zero
    /// - [`Error::InvalidOperation`] for operators applied to unsupported operands
    pub fn evaluate(&self, expression: &Expression) -> Result<ConstValue> {
        match expression {
            Expression::Literal(literal) => Ok(literal.value()),
            Expression::Field(field) => Ok(self.resolve_field(field)?.value),
            Expression::Cast(target, operand) => {
                let value = self.evaluate(operand)?;
                value.cast_to(*target).ok_or_else(|| {
                    Error::InvalidOperation(format!("cannot cast {value} to {target}"))
                })
            }
            Expression::Unary(op, operand) => unary(*op, &self.evaluate(operand)?),
            Expression::Binary(op, lhs, rhs) => {
                binary(*op, &self.evaluate(lhs)?, &self.evaluate(rhs)?)
            }
        }
    }

    /// Resolves a field reference to the constant it names.
    ///
    /// # Errors
    ///
    /// See [`ExpressionEvaluator::evaluate`].
    pub fn resolve_field(&self, field: &FieldExpression) -> Result<ResolvedConstant> {
        let Some(name) = &field.field_name else {
            return Err(Error::WildcardExpression(field.class_name.clone()));
        };

        let constant = self
            .lookup(&field.class_name, name)
            .ok_or_else(|| Error::ConstantNotResolvable {
                owner: field.class_name.clone(),
                name: name.clone(),
            })?;

        if let Some(declared) = field.declared_type {
            if declared != constant.data_type {
                return Err(Error::ConstantTypeMismatch {
                    owner: field.class_name.clone(),
                    name: name.clone(),
                    reason: format!("declared {declared}, found {}", constant.data_type),
                });
            }
        }
        if field.is_static != constant.is_static {
            return Err(Error::ConstantTypeMismatch {
                owner: field.class_name.clone(),
                name: name.clone(),
                reason: if constant.is_static {
                    "referenced as instance field, declared static".to_string()
                } else {
                    "referenced as static field, declared as instance field".to_string()
                },
            });
        }

        Ok(constant)
    }

    fn lookup(&self, owner: &str, name: &str) -> Option<ResolvedConstant> {
        let mut visited = FxHashSet::default();
        self.lookup_in(owner, name, &mut visited)
    }

    fn lookup_in(
        &self,
        owner: &str,
        name: &str,
        visited: &mut FxHashSet<String>,
    ) -> Option<ResolvedConstant> {
        if !visited.insert(owner.to_string()) {
            return None;
        }
        if let Some(constant) = self.constants.resolve(owner, name) {
            return Some(constant);
        }

        let info = self.inheritance.class_info(owner)?;
        info.interfaces
            .iter()
            .find_map(|interface| self.lookup_in(interface, name, visited))
            .or_else(|| {
                info.super_name
                    .as_deref()
                    .and_then(|parent| self.lookup_in(parent, name, visited))
            })
    }
}

fn unary(op: UnaryOp, value: &ConstValue) -> Result<ConstValue> {
    let invalid = || Error::InvalidOperation(format!("{op}{value}"));
    let promoted = value
        .cast_to(value.data_type().promote())
        .filter(|promoted| promoted.data_type().is_primitive())
        .ok_or_else(invalid)?;

    match (op, promoted) {
        (UnaryOp::Negate, ConstValue::Int(v)) => Ok(ConstValue::Int(v.wrapping_neg())),
        (UnaryOp::Negate, ConstValue::Long(v)) => Ok(ConstValue::Long(v.wrapping_neg())),
        (UnaryOp::Negate, ConstValue::Float(v)) => Ok(ConstValue::Float(-v)),
        (UnaryOp::Negate, ConstValue::Double(v)) => Ok(ConstValue::Double(-v)),
        (UnaryOp::BitNot, ConstValue::Int(v)) => Ok(ConstValue::Int(!v)),
        (UnaryOp::BitNot, ConstValue::Long(v)) => Ok(ConstValue::Long(!v)),
        _ => Err(invalid()),
    }
}

fn binary(op: BinaryOp, lhs: &ConstValue, rhs: &ConstValue) -> Result<ConstValue> {
    let invalid = || Error::InvalidOperation(format!("{lhs} {op} {rhs}"));

    if op == BinaryOp::Add
        && (lhs.data_type() == DataType::String || rhs.data_type() == DataType::String)
    {
        return Ok(ConstValue::String(format!(
            "{}{}",
            lhs.to_java_string(),
            rhs.to_java_string()
        )));
    }

    if op.is_shift() {
        return shift(op, lhs, rhs).ok_or_else(invalid);
    }

    let promoted = DataType::promote_binary(lhs.data_type(), rhs.data_type()).ok_or_else(invalid)?;
    let (Some(a), Some(b)) = (lhs.cast_to(promoted), rhs.cast_to(promoted)) else {
        return Err(invalid());
    };

    if op.is_bitwise() {
        let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) else {
            return Err(invalid());
        };
        let result = match op {
            BinaryOp::And => a & b,
            BinaryOp::Or => a | b,
            _ => a ^ b,
        };
        #[allow(clippy::cast_sign_loss)]
        let bits = result as u64;
        return ConstValue::from_bits(bits, promoted).ok_or_else(invalid);
    }

    match (a, b) {
        (ConstValue::Int(a), ConstValue::Int(b)) => Ok(ConstValue::Int(match op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err(Error::DivisionByZero),
            BinaryOp::Div => a.wrapping_div(b),
            BinaryOp::Rem => a.wrapping_rem(b),
            _ => return Err(invalid()),
        })),
        (ConstValue::Long(a), ConstValue::Long(b)) => Ok(ConstValue::Long(match op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err(Error::DivisionByZero),
            BinaryOp::Div => a.wrapping_div(b),
            BinaryOp::Rem => a.wrapping_rem(b),
            _ => return Err(invalid()),
        })),
        // Rust's float `%` truncates like Java's `drem`/`frem`.
        (ConstValue::Float(a), ConstValue::Float(b)) => Ok(ConstValue::Float(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Rem => a % b,
            _ => return Err(invalid()),
        })),
        (ConstValue::Double(a), ConstValue::Double(b)) => Ok(ConstValue::Double(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Rem => a % b,
            _ => return Err(invalid()),
        })),
        _ => Err(invalid()),
    }
}

/// Shifts use unary promotion of the left operand only; the distance is masked to the
/// width of the promoted left type.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn shift(op: BinaryOp, lhs: &ConstValue, rhs: &ConstValue) -> Option<ConstValue> {
    if !rhs.data_type().is_integral() {
        return None;
    }
    let distance = rhs.as_i64()?;

    match lhs.cast_to(lhs.data_type().promote())? {
        ConstValue::Int(v) => {
            let distance = (distance & 31) as u32;
            Some(ConstValue::Int(match op {
                BinaryOp::Shl => v.wrapping_shl(distance),
                BinaryOp::Shr => v >> distance,
                _ => ((v as u32) >> distance) as i32,
            }))
        }
        ConstValue::Long(v) => {
            let distance = (distance & 63) as u32;
            Some(ConstValue::Long(match op {
                BinaryOp::Shl => v.wrapping_shl(distance),
                BinaryOp::Shr => v >> distance,
                _ => ((v as u64) >> distance) as i64,
            }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{ClassInfo, ClassRegistry};

    fn registry() -> ClassRegistry {
        let mut registry = ClassRegistry::new();
        registry.add_constant("p/Base", "BASE", ResolvedConstant::new(ConstValue::Int(8), true));
        registry.add_constant("p/Iface", "SHARED", ResolvedConstant::new(ConstValue::Int(3), true));
        registry.add_constant(
            "p/Base",
            "LABEL",
            ResolvedConstant::new(ConstValue::String("id".to_string()), true),
        );
        registry.add_constant(
            "p/Base",
            "SIZE",
            ResolvedConstant::new(ConstValue::Long(2), false),
        );
        registry.add_class_info(ClassInfo::new("p/Base", Some("java/lang/Object")));
        let mut derived = ClassInfo::new("p/Derived", Some("p/Base"));
        derived.interfaces.push("p/Iface".to_string());
        registry.add_class_info(derived);
        registry
    }

    fn eval(expression: &Expression) -> Result<ConstValue> {
        let registry = registry();
        ExpressionEvaluator::new(&registry, &registry).evaluate(expression)
    }

    #[test]
    fn test_field_resolution_through_supertypes() {
        let inherited = Expression::static_field("p/Derived", "BASE", Some(DataType::Int));
        assert_eq!(eval(&inherited).unwrap(), ConstValue::Int(8));

        let from_interface = Expression::static_field("p/Derived", "SHARED", None);
        assert_eq!(eval(&from_interface).unwrap(), ConstValue::Int(3));

        let missing = Expression::static_field("p/Derived", "NOPE", None);
        assert!(matches!(eval(&missing), Err(Error::ConstantNotResolvable { .. })));
    }

    #[test]
    fn test_field_mismatch() {
        let wrong_type = Expression::static_field("p/Base", "BASE", Some(DataType::Long));
        assert!(matches!(eval(&wrong_type), Err(Error::ConstantTypeMismatch { .. })));

        let wrong_staticness = Expression::static_field("p/Base", "SIZE", None);
        assert!(matches!(eval(&wrong_staticness), Err(Error::ConstantTypeMismatch { .. })));

        let instance = Expression::instance_field("p/Base", "SIZE", Some(DataType::Long));
        assert_eq!(eval(&instance).unwrap(), ConstValue::Long(2));
    }

    #[test]
    fn test_wildcard_rejected() {
        let wildcard = Expression::Field(FieldExpression {
            class_name: "p/Base".to_string(),
            field_name: None,
            declared_type: None,
            is_static: true,
        });
        assert!(matches!(eval(&wildcard), Err(Error::WildcardExpression(_))));
    }

    #[test]
    fn test_numeric_promotion() {
        let mixed = Expression::binary(BinaryOp::Add, Expression::int(1), Expression::long(2));
        assert_eq!(eval(&mixed).unwrap(), ConstValue::Long(3));

        let float = Expression::binary(
            BinaryOp::Div,
            Expression::int(1),
            Expression::Literal(crate::expression::Literal::Float(4.0)),
        );
        assert_eq!(eval(&float).unwrap(), ConstValue::Float(0.25));

        let overflow = Expression::binary(BinaryOp::Mul, Expression::int(i32::MAX), Expression::int(2));
        assert_eq!(eval(&overflow).unwrap(), ConstValue::Int(-2));

        let min_div = Expression::binary(BinaryOp::Div, Expression::int(i32::MIN), Expression::int(-1));
        assert_eq!(eval(&min_div).unwrap(), ConstValue::Int(i32::MIN));
    }

    #[test]
    fn test_division_by_zero() {
        let rem = Expression::binary(BinaryOp::Rem, Expression::long(5), Expression::int(0));
        assert!(matches!(eval(&rem), Err(Error::DivisionByZero)));

        let float = Expression::binary(
            BinaryOp::Div,
            Expression::Literal(crate::expression::Literal::Double(1.0)),
            Expression::int(0),
        );
        assert_eq!(eval(&float).unwrap(), ConstValue::Double(f64::INFINITY));
    }

    #[test]
    fn test_bitwise_and_shifts() {
        let or = Expression::binary(
            BinaryOp::Or,
            Expression::static_field("p/Base", "BASE", None),
            Expression::int(1),
        );
        assert_eq!(eval(&or).unwrap(), ConstValue::Int(9));

        let not = Expression::unary(UnaryOp::BitNot, Expression::int(0));
        assert_eq!(eval(&not).unwrap(), ConstValue::Int(-1));

        let shl = Expression::binary(BinaryOp::Shl, Expression::int(1), Expression::int(33));
        assert_eq!(eval(&shl).unwrap(), ConstValue::Int(2));

        let long_shift = Expression::binary(BinaryOp::Shl, Expression::int(1), Expression::long(4));
        assert_eq!(eval(&long_shift).unwrap(), ConstValue::Int(16));

        let ushr = Expression::binary(BinaryOp::Ushr, Expression::int(-1), Expression::int(28));
        assert_eq!(eval(&ushr).unwrap(), ConstValue::Int(15));

        let float_or = Expression::binary(
            BinaryOp::Or,
            Expression::Literal(crate::expression::Literal::Float(1.0)),
            Expression::int(1),
        );
        assert!(matches!(eval(&float_or), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_string_concatenation() {
        let concat = Expression::binary(
            BinaryOp::Add,
            Expression::binary(
                BinaryOp::Add,
                Expression::static_field("p/Base", "LABEL", None),
                Expression::string(":"),
            ),
            Expression::binary(BinaryOp::Add, Expression::int(1), Expression::int(2)),
        );
        assert_eq!(eval(&concat).unwrap(), ConstValue::String("id:3".to_string()));

        let with_float = Expression::binary(
            BinaryOp::Add,
            Expression::string("v"),
            Expression::Literal(crate::expression::Literal::Double(1.0)),
        );
        assert_eq!(eval(&with_float).unwrap(), ConstValue::String("v1.0".to_string()));

        let minus = Expression::binary(BinaryOp::Sub, Expression::string("a"), Expression::int(1));
        assert!(matches!(eval(&minus), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_casts() {
        let narrow = Expression::cast(DataType::Byte, Expression::int(200));
        assert_eq!(eval(&narrow).unwrap(), ConstValue::Byte(-56));

        let saturate = Expression::cast(
            DataType::Int,
            Expression::Literal(crate::expression::Literal::Double(1e20)),
        );
        assert_eq!(eval(&saturate).unwrap(), ConstValue::Int(i32::MAX));

        let nan = Expression::cast(
            DataType::Long,
            Expression::Literal(crate::expression::Literal::Float(f32::NAN)),
        );
        assert_eq!(eval(&nan).unwrap(), ConstValue::Long(0));

        let string = Expression::cast(DataType::Int, Expression::string("x"));
        assert!(matches!(eval(&string), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_negation_promotes() {
        let negated = Expression::unary(
            UnaryOp::Negate,
            Expression::cast(DataType::Byte, Expression::int(5)),
        );
        assert_eq!(eval(&negated).unwrap(), ConstValue::Int(-5));
    }
}
