//! Constant-valued expressions from mapping data.
//!
//! A mapping describes the symbolic replacement for a literal as an [`Expression`]: a
//! reference to a named constant, a literal, or an operator tree combining them. The
//! tree is immutable and reference counted, so a single expression can sit in a group
//! scope and be handed to the code generator any number of times without copying.
//!
//! # Key Components
//!
//! - [`Expression`] - The expression tree
//! - [`Literal`] - Literal leaf values
//! - [`FieldExpression`] - References to named constants
//! - [`DataType`] - The closed set of constant types
//! - [`ConstValue`] - Evaluated values, used as group lookup keys
//! - [`ExpressionEvaluator`] - Folds expressions to [`ConstValue`]s
//!
//! # Examples
//!
//! ```rust
//! use unpick::expression::{BinaryOp, DataType, Expression};
//!
//! // FLAG_A | FLAG_B
//! let expr = Expression::binary(
//!     BinaryOp::Or,
//!     Expression::static_field("com/example/Flags", "FLAG_A", Some(DataType::Int)),
//!     Expression::static_field("com/example/Flags", "FLAG_B", Some(DataType::Int)),
//! );
//! assert_eq!(expr.to_string(), "com.example.Flags.FLAG_A | com.example.Flags.FLAG_B");
//! ```

mod datatype;
mod evaluator;
mod value;

use std::{fmt, sync::Arc};

pub use datatype::{DataType, DataTypeSet, StackKind};
pub use evaluator::ExpressionEvaluator;
pub use value::ConstValue;

/// A literal leaf of an expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// An `int` literal
    Integer(i32),
    /// A `long` literal
    Long(i64),
    /// A `float` literal
    Float(f32),
    /// A `double` literal
    Double(f64),
    /// A `char` literal
    Character(u16),
    /// A `String` literal
    String(String),
    /// A class literal, holding the internal name or array descriptor
    Class(String),
}

impl Literal {
    /// Returns the value this literal denotes.
    #[must_use]
    pub fn value(&self) -> ConstValue {
        match self {
            Literal::Integer(v) => ConstValue::Int(*v),
            Literal::Long(v) => ConstValue::Long(*v),
            Literal::Float(v) => ConstValue::Float(*v),
            Literal::Double(v) => ConstValue::Double(*v),
            Literal::Character(v) => ConstValue::Char(*v),
            Literal::String(v) => ConstValue::String(v.clone()),
            Literal::Class(v) => ConstValue::Class(v.clone()),
        }
    }

    /// Returns the type of this literal.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            Literal::Integer(_) => DataType::Int,
            Literal::Long(_) => DataType::Long,
            Literal::Float(_) => DataType::Float,
            Literal::Double(_) => DataType::Double,
            Literal::Character(_) => DataType::Char,
            Literal::String(_) => DataType::String,
            Literal::Class(_) => DataType::Class,
        }
    }
}

/// A reference to a named constant field.
///
/// `field_name == None` is a wildcard standing for every constant of `class_name`.
/// Wildcards have to be expanded (see [`crate::group::Group::insert_expression`]) before
/// the evaluator or the code generator can use the reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldExpression {
    /// Internal name of the declaring class (`java/lang/Integer`)
    pub class_name: String,
    /// Field name, or `None` for a wildcard
    pub field_name: Option<String>,
    /// Declared type, if the mapping states one
    pub declared_type: Option<DataType>,
    /// `true` for static fields
    pub is_static: bool,
}

impl FieldExpression {
    /// Returns `true` if this reference is a wildcard.
    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        self.field_name.is_none()
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum UnaryOp {
    /// Arithmetic negation (`-x`)
    #[strum(serialize = "-")]
    Negate,
    /// Bitwise complement (`~x`)
    #[strum(serialize = "~")]
    BitNot,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum BinaryOp {
    /// `+` (numeric addition or string concatenation)
    #[strum(serialize = "+")]
    Add,
    /// `-`
    #[strum(serialize = "-")]
    Sub,
    /// `*`
    #[strum(serialize = "*")]
    Mul,
    /// `/`
    #[strum(serialize = "/")]
    Div,
    /// `%`
    #[strum(serialize = "%")]
    Rem,
    /// `&`
    #[strum(serialize = "&")]
    And,
    /// `|`
    #[strum(serialize = "|")]
    Or,
    /// `^`
    #[strum(serialize = "^")]
    Xor,
    /// `<<`
    #[strum(serialize = "<<")]
    Shl,
    /// `>>`
    #[strum(serialize = ">>")]
    Shr,
    /// `>>>`
    #[strum(serialize = ">>>")]
    Ushr,
}

impl BinaryOp {
    /// Returns `true` for the shift operators, whose right operand is promoted separately.
    #[must_use]
    pub const fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr)
    }

    /// Returns `true` for `&`, `|` and `^`.
    #[must_use]
    pub const fn is_bitwise(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor)
    }

    /// Java operator precedence, higher binds tighter.
    const fn precedence(self) -> u8 {
        match self {
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 10,
            BinaryOp::Add | BinaryOp::Sub => 9,
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr => 8,
            BinaryOp::And => 7,
            BinaryOp::Xor => 6,
            BinaryOp::Or => 5,
        }
    }
}

/// An immutable constant-valued expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A literal value
    Literal(Literal),
    /// A named constant
    Field(FieldExpression),
    /// A unary operation
    Unary(UnaryOp, Arc<Expression>),
    /// A binary operation
    Binary(BinaryOp, Arc<Expression>, Arc<Expression>),
    /// A primitive cast
    Cast(DataType, Arc<Expression>),
}

impl Expression {
    /// Creates an `int` literal.
    #[must_use]
    pub const fn int(value: i32) -> Self {
        Expression::Literal(Literal::Integer(value))
    }

    /// Creates a `long` literal.
    #[must_use]
    pub const fn long(value: i64) -> Self {
        Expression::Literal(Literal::Long(value))
    }

    /// Creates a `String` literal.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(value.into()))
    }

    /// Creates a reference to a static constant.
    #[must_use]
    pub fn static_field(
        class_name: impl Into<String>,
        field_name: impl Into<String>,
        declared_type: Option<DataType>,
    ) -> Self {
        Expression::Field(FieldExpression {
            class_name: class_name.into(),
            field_name: Some(field_name.into()),
            declared_type,
            is_static: true,
        })
    }

    /// Creates a reference to an instance constant (a `final` field with a constant
    /// initializer, which the compiler folds just like a static one).
    #[must_use]
    pub fn instance_field(
        class_name: impl Into<String>,
        field_name: impl Into<String>,
        declared_type: Option<DataType>,
    ) -> Self {
        Expression::Field(FieldExpression {
            class_name: class_name.into(),
            field_name: Some(field_name.into()),
            declared_type,
            is_static: false,
        })
    }

    /// Creates a unary operation.
    #[must_use]
    pub fn unary(op: UnaryOp, operand: Expression) -> Self {
        Expression::Unary(op, Arc::new(operand))
    }

    /// Creates a binary operation.
    #[must_use]
    pub fn binary(op: BinaryOp, lhs: Expression, rhs: Expression) -> Self {
        Expression::Binary(op, Arc::new(lhs), Arc::new(rhs))
    }

    /// Creates a cast.
    #[must_use]
    pub fn cast(target: DataType, operand: Expression) -> Self {
        Expression::Cast(target, Arc::new(operand))
    }

    /// Returns the field reference if this expression is nothing but one.
    #[must_use]
    pub const fn as_field(&self) -> Option<&FieldExpression> {
        match self {
            Expression::Field(field) => Some(field),
            _ => None,
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expression::Literal(_) | Expression::Field(_) => 13,
            Expression::Unary(..) | Expression::Cast(..) => 12,
            Expression::Binary(op, ..) => op.precedence(),
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, min_precedence: u8) -> fmt::Result {
        if self.precedence() < min_precedence {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(v) => write!(f, "{v}"),
            Literal::Character(v) => match char::from_u32(u32::from(*v)) {
                Some(c) if !c.is_control() => write!(f, "'{c}'"),
                _ => write!(f, "'\\u{v:04x}'"),
            },
            other => write!(f, "{}", other.value()),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(literal) => write!(f, "{literal}"),
            Expression::Field(field) => {
                let class = field.class_name.replace('/', ".");
                match &field.field_name {
                    Some(name) => write!(f, "{class}.{name}"),
                    None => write!(f, "{class}.*"),
                }
            }
            Expression::Unary(op, operand) => {
                write!(f, "{op}")?;
                operand.fmt_operand(f, 12)
            }
            Expression::Cast(target, operand) => {
                write!(f, "({target}) ")?;
                operand.fmt_operand(f, 12)
            }
            Expression::Binary(op, lhs, rhs) => {
                // Left-associative: equal precedence needs parentheses only on the right.
                lhs.fmt_operand(f, op.precedence())?;
                write!(f, " {op} ")?;
                rhs.fmt_operand(f, op.precedence() + 1)
            }
        }
    }
}
