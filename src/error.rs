use thiserror::Error;

use crate::expression::DataType;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! generation_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Generation($msg.to_string())
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Generation(format!($fmt, $($arg)*))
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into the four failure classes the uninliner distinguishes:
///
/// ## Analysis failures
/// - [`Error::Malformed`] - The instruction stream of a method could not be abstractly
///   interpreted. Scoped to one method; the method is left untouched.
/// - [`Error::InvalidDescriptor`] - A field or method descriptor could not be parsed.
///
/// ## Generation failures
/// - [`Error::Generation`] - A matched replacement cannot be emitted safely. Scoped to one
///   literal, which is left unmodified.
///
/// ## Mapping data failures (load time)
/// - [`Error::ConstantNotResolvable`] - A field reference names no known constant
/// - [`Error::ConstantTypeMismatch`] - A field reference disagrees with the resolved constant
/// - [`Error::DivisionByZero`] - Integer division or remainder by zero in a constant expression
/// - [`Error::InvalidOperation`] - An operator was applied to operands it is not defined for
/// - [`Error::WildcardExpression`] - A wildcard field reference reached the evaluator unexpanded
/// - [`Error::DuplicateScopeEntry`] - The same value was mapped twice in one scope
/// - [`Error::GroupMismatch`] - A group was re-declared with a different type or flags bit
/// - [`Error::ValueNotRepresentable`] - A constant value does not fit the group's data type
///
/// # Examples
///
/// ```rust
/// use unpick::{Error, expression::{Expression, ExpressionEvaluator, BinaryOp}};
/// use unpick::resolve::ClassRegistry;
///
/// let registry = ClassRegistry::new();
/// let evaluator = ExpressionEvaluator::new(&registry, &registry);
/// let expr = Expression::binary(BinaryOp::Div, Expression::int(1), Expression::int(0));
///
/// match evaluator.evaluate(&expr) {
///     Err(Error::DivisionByZero) => {}
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The method body is damaged and could not be interpreted.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A type descriptor could not be parsed.
    #[error("Invalid descriptor - {0}")]
    InvalidDescriptor(String),

    /// A replacement expression could not be turned into instructions.
    ///
    /// Generation is all-or-nothing per literal, so this error never leaves a partially
    /// rewritten instruction stream behind.
    #[error("Generation failed - {0}")]
    Generation(String),

    /// A field reference could not be resolved to a compile-time constant.
    #[error("Constant {owner}.{name} is not resolvable")]
    ConstantNotResolvable {
        /// Internal name of the class the reference points at
        owner: String,
        /// Name of the referenced field
        name: String,
    },

    /// A field reference declares a type or staticness that disagrees with the constant
    /// the resolver found.
    #[error("Constant {owner}.{name} does not match its declaration - {reason}")]
    ConstantTypeMismatch {
        /// Internal name of the class the reference points at
        owner: String,
        /// Name of the referenced field
        name: String,
        /// What disagreed
        reason: String,
    },

    /// Integer division or remainder by zero while folding a constant expression.
    #[error("Division by zero in constant expression")]
    DivisionByZero,

    /// An operator was applied to operand types it is not defined for.
    #[error("Invalid operation - {0}")]
    InvalidOperation(String),

    /// A wildcard field reference reached a component that needs a concrete field.
    #[error("Wildcard field reference on {0} must be expanded before use")]
    WildcardExpression(String),

    /// The same value was registered twice in one scope of a group.
    #[error("Duplicate value {value} in scope {scope} of group {group}")]
    DuplicateScopeEntry {
        /// Group name, or the data type for default groups
        group: String,
        /// Human readable scope description
        scope: String,
        /// The duplicated value
        value: String,
    },

    /// A group was declared twice with a different data type or flags bit.
    #[error("Group {name} re-declared as {data_type} (flags: {flags})")]
    GroupMismatch {
        /// Name of the group
        name: String,
        /// The conflicting data type
        data_type: DataType,
        /// The conflicting flags bit
        flags: bool,
    },

    /// A constant value cannot be represented exactly in the required data type.
    #[error("Value {value} is not representable as {data_type}")]
    ValueNotRepresentable {
        /// The value that was converted
        value: String,
        /// The required data type
        data_type: DataType,
    },
}
