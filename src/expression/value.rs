//! Evaluated constant values.
//!
//! A [`ConstValue`] is what the evaluator folds an expression down to and what the
//! group store uses as lookup key. Floating point variants compare and hash by bit
//! pattern, so `NaN` keys work and `0.0` and `-0.0` stay distinct, matching the way the
//! JVM constant pool distinguishes them.

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use crate::expression::DataType;

/// A concrete constant value of some [`DataType`].
#[derive(Debug, Clone)]
pub enum ConstValue {
    /// `byte` value
    Byte(i8),
    /// `short` value
    Short(i16),
    /// `char` value (UTF-16 code unit)
    Char(u16),
    /// `int` value
    Int(i32),
    /// `long` value
    Long(i64),
    /// `float` value
    Float(f32),
    /// `double` value
    Double(f64),
    /// `String` value
    String(String),
    /// `Class` value, holding the internal name or array descriptor of the class
    Class(String),
}

impl ConstValue {
    /// Returns the data type of this value.
    #[must_use]
    pub const fn data_type(&self) -> DataType {
        match self {
            ConstValue::Byte(_) => DataType::Byte,
            ConstValue::Short(_) => DataType::Short,
            ConstValue::Char(_) => DataType::Char,
            ConstValue::Int(_) => DataType::Int,
            ConstValue::Long(_) => DataType::Long,
            ConstValue::Float(_) => DataType::Float,
            ConstValue::Double(_) => DataType::Double,
            ConstValue::String(_) => DataType::String,
            ConstValue::Class(_) => DataType::Class,
        }
    }

    /// Returns an integral value widened to `i64` (`char` is zero-extended).
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            ConstValue::Byte(v) => Some(*v as i64),
            ConstValue::Short(v) => Some(*v as i64),
            ConstValue::Char(v) => Some(*v as i64),
            ConstValue::Int(v) => Some(*v as i64),
            ConstValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a numeric value widened to `f64`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConstValue::Float(v) => Some(f64::from(*v)),
            ConstValue::Double(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Returns the bit pattern of an integral value, masked to the width of its type.
    #[must_use]
    pub fn to_bits(&self) -> Option<u64> {
        #[allow(clippy::cast_sign_loss)]
        let bits = self.as_i64()? as u64;
        Some(bits & self.data_type().bit_mask()?)
    }

    /// Builds an integral value of `data_type` from a bit pattern.
    ///
    /// Bits above the width of the type are ignored; narrower signed types are
    /// sign-extended from their top bit.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub const fn from_bits(bits: u64, data_type: DataType) -> Option<ConstValue> {
        match data_type {
            DataType::Byte => Some(ConstValue::Byte(bits as u8 as i8)),
            DataType::Short => Some(ConstValue::Short(bits as u16 as i16)),
            DataType::Char => Some(ConstValue::Char(bits as u16)),
            DataType::Int => Some(ConstValue::Int(bits as u32 as i32)),
            DataType::Long => Some(ConstValue::Long(bits as i64)),
            _ => None,
        }
    }

    /// Converts this value to `target` following the JVM primitive conversion rules.
    ///
    /// Narrowing integral conversions truncate, floating point to integral conversions
    /// saturate and map `NaN` to zero. `String` and `Class` values only convert to their
    /// own type. Returns `None` for conversions Java does not allow.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn cast_to(&self, target: DataType) -> Option<ConstValue> {
        if self.data_type() == target {
            return Some(self.clone());
        }
        if !self.data_type().is_primitive() || !target.is_primitive() {
            return None;
        }

        if let Some(int) = self.as_i64() {
            return Some(match target {
                DataType::Byte => ConstValue::Byte(int as i8),
                DataType::Short => ConstValue::Short(int as i16),
                DataType::Char => ConstValue::Char(int as u16),
                DataType::Int => ConstValue::Int(int as i32),
                DataType::Long => ConstValue::Long(int),
                DataType::Float => ConstValue::Float(int as f32),
                DataType::Double => ConstValue::Double(int as f64),
                DataType::String | DataType::Class => return None,
            });
        }

        // Rust float-to-int casts saturate and map NaN to zero, which is exactly d2i/d2l.
        let float = self.as_f64()?;
        Some(match target {
            DataType::Byte => ConstValue::Byte(float as i32 as i8),
            DataType::Short => ConstValue::Short(float as i32 as i16),
            DataType::Char => ConstValue::Char(float as i32 as u16),
            DataType::Int => ConstValue::Int(float as i32),
            DataType::Long => ConstValue::Long(float as i64),
            DataType::Float => ConstValue::Float(float as f32),
            DataType::Double => ConstValue::Double(float),
            DataType::String | DataType::Class => return None,
        })
    }

    /// Converts this value to `target` only if the conversion loses nothing.
    ///
    /// The converted value must convert back to exactly this value, so a literal can
    /// be replaced by a `target`-typed constant without changing its bit pattern.
    #[must_use]
    pub fn convert_exact(&self, target: DataType) -> Option<ConstValue> {
        let converted = self.cast_to(target)?;
        let back = converted.cast_to(self.data_type())?;
        (back == *self).then_some(converted)
    }

    /// Renders the value the way Java string conversion does.
    ///
    /// This is the text `"" + value` produces, used when folding string concatenation.
    #[must_use]
    pub fn to_java_string(&self) -> String {
        match self {
            ConstValue::Byte(v) => v.to_string(),
            ConstValue::Short(v) => v.to_string(),
            ConstValue::Char(v) => char::from_u32(u32::from(*v))
                .map_or_else(|| char::REPLACEMENT_CHARACTER.to_string(), String::from),
            ConstValue::Int(v) => v.to_string(),
            ConstValue::Long(v) => v.to_string(),
            ConstValue::Float(v) => java_float_string(f64::from(*v), &v.to_string(), &format!("{v:e}")),
            ConstValue::Double(v) => java_float_string(*v, &v.to_string(), &format!("{v:e}")),
            ConstValue::String(v) => v.clone(),
            ConstValue::Class(v) => {
                let name = v.replace('/', ".");
                format!("class {name}")
            }
        }
    }
}

/// Formats a floating point value like `Float.toString` / `Double.toString`.
///
/// `plain` and `scientific` are the shortest round-trip renderings in the value's own
/// precision, as produced by Rust's `Display` and `LowerExp`.
fn java_float_string(value: f64, plain: &str, scientific: &str) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let magnitude = value.abs();
    if (1e-3..1e7).contains(&magnitude) {
        if plain.contains('.') {
            plain.to_string()
        } else {
            format!("{plain}.0")
        }
    } else {
        let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific, "0"));
        if mantissa.contains('.') {
            format!("{mantissa}E{exponent}")
        } else {
            format!("{mantissa}.0E{exponent}")
        }
    }
}

impl PartialEq for ConstValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstValue::Byte(a), ConstValue::Byte(b)) => a == b,
            (ConstValue::Short(a), ConstValue::Short(b)) => a == b,
            (ConstValue::Char(a), ConstValue::Char(b)) => a == b,
            (ConstValue::Int(a), ConstValue::Int(b)) => a == b,
            (ConstValue::Long(a), ConstValue::Long(b)) => a == b,
            (ConstValue::Float(a), ConstValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ConstValue::Double(a), ConstValue::Double(b)) => a.to_bits() == b.to_bits(),
            (ConstValue::String(a), ConstValue::String(b))
            | (ConstValue::Class(a), ConstValue::Class(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ConstValue {}

impl Hash for ConstValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ConstValue::Byte(v) => v.hash(state),
            ConstValue::Short(v) => v.hash(state),
            ConstValue::Char(v) => v.hash(state),
            ConstValue::Int(v) => v.hash(state),
            ConstValue::Long(v) => v.hash(state),
            ConstValue::Float(v) => v.to_bits().hash(state),
            ConstValue::Double(v) => v.to_bits().hash(state),
            ConstValue::String(v) | ConstValue::Class(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Byte(v) => write!(f, "(byte) {v}"),
            ConstValue::Short(v) => write!(f, "(short) {v}"),
            ConstValue::Char(v) => write!(f, "'\\u{v:04x}'"),
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Long(v) => write!(f, "{v}L"),
            ConstValue::Float(_) => write!(f, "{}F", self.to_java_string()),
            ConstValue::Double(_) => write!(f, "{}D", self.to_java_string()),
            ConstValue::String(v) => write!(f, "{v:?}"),
            ConstValue::Class(v) => write!(f, "{}.class", v.replace('/', ".")),
        }
    }
}
