//! Field and method descriptor parsing.
//!
//! Descriptors are kept as strings on the class model and parsed on demand, which
//! happens once per call site and field access during analysis.

use std::fmt;

use crate::{expression::DataType, Error, Result};

/// A parsed field descriptor, or a method return type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// `Z`
    Boolean,
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `S`
    Short,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `F`
    Float,
    /// `D`
    Double,
    /// `V`, only valid as a return type
    Void,
    /// `L<internal name>;`
    Object(String),
    /// An array type, holding the full descriptor (`[I`, `[[Ljava/lang/String;`)
    Array(String),
}

impl TypeDescriptor {
    /// Parses a complete field descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] if `descriptor` is not exactly one type.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let (parsed, rest) = Self::parse_prefix(descriptor)?;
        if !rest.is_empty() {
            return Err(Error::InvalidDescriptor(descriptor.to_string()));
        }
        Ok(parsed)
    }

    /// Parses one type from the start of `input` and returns the remainder.
    fn parse_prefix(input: &str) -> Result<(Self, &str)> {
        let invalid = || Error::InvalidDescriptor(input.to_string());
        let mut chars = input.chars();
        let parsed = match chars.next().ok_or_else(invalid)? {
            'Z' => TypeDescriptor::Boolean,
            'B' => TypeDescriptor::Byte,
            'C' => TypeDescriptor::Char,
            'S' => TypeDescriptor::Short,
            'I' => TypeDescriptor::Int,
            'J' => TypeDescriptor::Long,
            'F' => TypeDescriptor::Float,
            'D' => TypeDescriptor::Double,
            'V' => TypeDescriptor::Void,
            'L' => {
                let end = input.find(';').ok_or_else(invalid)?;
                if end == 1 {
                    return Err(invalid());
                }
                return Ok((
                    TypeDescriptor::Object(input[1..end].to_string()),
                    &input[end + 1..],
                ));
            }
            '[' => {
                let dims = input.chars().take_while(|c| *c == '[').count();
                let (element, rest) = Self::parse_prefix(&input[dims..])?;
                if element == TypeDescriptor::Void {
                    return Err(invalid());
                }
                let consumed = input.len() - rest.len();
                return Ok((TypeDescriptor::Array(input[..consumed].to_string()), rest));
            }
            _ => return Err(invalid()),
        };
        Ok((parsed, chars.as_str()))
    }

    /// Number of local variable / operand stack slots a value of this type occupies.
    #[must_use]
    pub const fn size(&self) -> usize {
        match self {
            TypeDescriptor::Void => 0,
            TypeDescriptor::Long | TypeDescriptor::Double => 2,
            _ => 1,
        }
    }

    /// Returns `true` for object and array types.
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self, TypeDescriptor::Object(_) | TypeDescriptor::Array(_))
    }

    /// Returns the group data type this descriptor maps to, if any.
    #[must_use]
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            TypeDescriptor::Byte => Some(DataType::Byte),
            TypeDescriptor::Char => Some(DataType::Char),
            TypeDescriptor::Short => Some(DataType::Short),
            TypeDescriptor::Int => Some(DataType::Int),
            TypeDescriptor::Long => Some(DataType::Long),
            TypeDescriptor::Float => Some(DataType::Float),
            TypeDescriptor::Double => Some(DataType::Double),
            TypeDescriptor::Object(name) if name == "java/lang/String" => Some(DataType::String),
            TypeDescriptor::Object(name) if name == "java/lang/Class" => Some(DataType::Class),
            _ => None,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Boolean => f.write_str("Z"),
            TypeDescriptor::Byte => f.write_str("B"),
            TypeDescriptor::Char => f.write_str("C"),
            TypeDescriptor::Short => f.write_str("S"),
            TypeDescriptor::Int => f.write_str("I"),
            TypeDescriptor::Long => f.write_str("J"),
            TypeDescriptor::Float => f.write_str("F"),
            TypeDescriptor::Double => f.write_str("D"),
            TypeDescriptor::Void => f.write_str("V"),
            TypeDescriptor::Object(name) => write!(f, "L{name};"),
            TypeDescriptor::Array(descriptor) => f.write_str(descriptor),
        }
    }
}

/// A parsed method descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub params: Vec<TypeDescriptor>,
    /// Return type, [`TypeDescriptor::Void`] for `void`
    pub ret: TypeDescriptor,
}

impl MethodDescriptor {
    /// Parses a method descriptor such as `(ILjava/lang/String;)V`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] on malformed input.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let invalid = || Error::InvalidDescriptor(descriptor.to_string());
        let mut rest = descriptor.strip_prefix('(').ok_or_else(invalid)?;

        let mut params = Vec::new();
        while !rest.starts_with(')') {
            let (param, remainder) =
                TypeDescriptor::parse_prefix(rest).map_err(|_| invalid())?;
            if param == TypeDescriptor::Void {
                return Err(invalid());
            }
            params.push(param);
            rest = remainder;
        }

        let ret = TypeDescriptor::parse(&rest[1..]).map_err(|_| invalid())?;
        Ok(Self { params, ret })
    }

    /// Total number of slots the parameters occupy, excluding any receiver.
    #[must_use]
    pub fn argument_slots(&self) -> usize {
        self.params.iter().map(TypeDescriptor::size).sum()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for param in &self.params {
            write!(f, "{param}")?;
        }
        write!(f, "){}", self.ret)
    }
}

/// Returns the internal name of the class `descriptor` refers to, for `ldc` class
/// constants and type instructions that use either form.
#[must_use]
pub fn internal_name(descriptor: &str) -> &str {
    descriptor
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .unwrap_or(descriptor)
}
