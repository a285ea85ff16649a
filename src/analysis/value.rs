//! Abstract values tracked by the analyzer.

use std::fmt;

use imbl::OrdSet;

use crate::{
    bytecode::TypeDescriptor,
    expression::DataType,
    resolve::{InheritanceChecker, OBJECT},
};

/// Where an abstract value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceId {
    /// Produced by the instruction at this index
    Instruction(usize),
    /// The value of the parameter with this zero-based index (receiver excluded)
    Parameter(usize),
}

/// JVM verification type of an abstract value.
///
/// Unlike the verifier, int-like values keep their declared width (`byte`, `short`,
/// `char`, `boolean`) where it is known, which is what narrow type inference builds on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Unusable: uninitialized, or merged from incompatible types
    Top,
    /// `boolean`
    Boolean,
    /// `byte`
    Byte,
    /// `char`
    Char,
    /// `short`
    Short,
    /// `int`
    Int,
    /// `float`
    Float,
    /// `long`
    Long,
    /// `double`
    Double,
    /// The `null` reference
    Null,
    /// A reference: internal name for classes, descriptor for arrays
    Reference(String),
    /// Return address pushed by `jsr`
    ReturnAddress,
}

impl ValueType {
    /// Returns the type of a value described by `descriptor`, or `None` for `void`.
    #[must_use]
    pub fn from_descriptor(descriptor: &TypeDescriptor) -> Option<ValueType> {
        Some(match descriptor {
            TypeDescriptor::Boolean => ValueType::Boolean,
            TypeDescriptor::Byte => ValueType::Byte,
            TypeDescriptor::Char => ValueType::Char,
            TypeDescriptor::Short => ValueType::Short,
            TypeDescriptor::Int => ValueType::Int,
            TypeDescriptor::Long => ValueType::Long,
            TypeDescriptor::Float => ValueType::Float,
            TypeDescriptor::Double => ValueType::Double,
            TypeDescriptor::Void => return None,
            TypeDescriptor::Object(name) => ValueType::Reference(name.clone()),
            TypeDescriptor::Array(descriptor) => ValueType::Reference(descriptor.clone()),
        })
    }

    /// Returns the type of a constant of `data_type`.
    #[must_use]
    pub fn from_data_type(data_type: DataType) -> ValueType {
        match data_type {
            DataType::Byte => ValueType::Byte,
            DataType::Short => ValueType::Short,
            DataType::Char => ValueType::Char,
            DataType::Int => ValueType::Int,
            DataType::Long => ValueType::Long,
            DataType::Float => ValueType::Float,
            DataType::Double => ValueType::Double,
            DataType::String => ValueType::Reference("java/lang/String".to_string()),
            DataType::Class => ValueType::Reference("java/lang/Class".to_string()),
        }
    }

    /// Number of stack words a value of this type occupies.
    #[must_use]
    pub const fn size(&self) -> usize {
        match self {
            ValueType::Long | ValueType::Double => 2,
            _ => 1,
        }
    }

    /// Returns `true` for the int-like types sharing the `int` stack kind.
    #[must_use]
    pub const fn is_int_like(&self) -> bool {
        matches!(
            self,
            ValueType::Boolean | ValueType::Byte | ValueType::Char | ValueType::Short | ValueType::Int
        )
    }

    /// Returns `true` for `null` and references.
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self, ValueType::Null | ValueType::Reference(_))
    }

    /// Returns the element type of an array reference.
    #[must_use]
    pub fn array_element(&self) -> Option<ValueType> {
        let ValueType::Reference(descriptor) = self else {
            return None;
        };
        let element = descriptor.strip_prefix('[')?;
        TypeDescriptor::parse(element)
            .ok()
            .and_then(|parsed| ValueType::from_descriptor(&parsed))
    }

    /// Computes the type of a slot where values of `self` and `other` meet.
    ///
    /// Int-like types widen (`char` with `byte` or `short` gives `int`), `null` merges
    /// into any reference, references merge to their nearest common superclass and
    /// everything else is [`ValueType::Top`].
    #[must_use]
    pub fn join(&self, other: &ValueType, inheritance: &dyn InheritanceChecker) -> ValueType {
        if self == other {
            return self.clone();
        }

        match (self, other) {
            (ValueType::Top, _) | (_, ValueType::Top) => ValueType::Top,
            (a, b) if a.is_int_like() && b.is_int_like() => join_int_like(a, b),
            (ValueType::Null, reference @ ValueType::Reference(_))
            | (reference @ ValueType::Reference(_), ValueType::Null) => reference.clone(),
            (ValueType::Reference(a), ValueType::Reference(b)) => {
                ValueType::Reference(join_references(a, b, inheritance))
            }
            _ => ValueType::Top,
        }
    }
}

fn join_int_like(a: &ValueType, b: &ValueType) -> ValueType {
    match (a, b) {
        (ValueType::Byte, ValueType::Short) | (ValueType::Short, ValueType::Byte) => {
            ValueType::Short
        }
        _ => ValueType::Int,
    }
}

/// Joins two distinct reference type names (internal names or array descriptors).
fn join_references(a: &str, b: &str, inheritance: &dyn InheritanceChecker) -> String {
    match (a.strip_prefix('['), b.strip_prefix('[')) {
        (None, None) => inheritance.common_superclass(a, b),
        (Some(a_element), Some(b_element)) => {
            // Arrays of references merge covariantly; primitive arrays only with themselves.
            let nested = |element: &str| {
                if element.starts_with('[') {
                    Some(element.to_string())
                } else {
                    element
                        .strip_prefix('L')
                        .and_then(|rest| rest.strip_suffix(';'))
                        .map(str::to_string)
                }
            };
            match (nested(a_element), nested(b_element)) {
                (Some(a_inner), Some(b_inner)) => {
                    let joined = join_references(&a_inner, &b_inner, inheritance);
                    if joined.starts_with('[') {
                        format!("[{joined}")
                    } else {
                        format!("[L{joined};")
                    }
                }
                _ => OBJECT.to_string(),
            }
        }
        _ => OBJECT.to_string(),
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Top => f.write_str("top"),
            ValueType::Boolean => f.write_str("boolean"),
            ValueType::Byte => f.write_str("byte"),
            ValueType::Char => f.write_str("char"),
            ValueType::Short => f.write_str("short"),
            ValueType::Int => f.write_str("int"),
            ValueType::Float => f.write_str("float"),
            ValueType::Long => f.write_str("long"),
            ValueType::Double => f.write_str("double"),
            ValueType::Null => f.write_str("null"),
            ValueType::Reference(name) => f.write_str(name),
            ValueType::ReturnAddress => f.write_str("returnAddress"),
        }
    }
}

/// A value in a frame slot: its type and the set of places it may come from.
///
/// Source sets are persistent, so copying a value between slots and frames shares
/// structure instead of cloning it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameValue {
    /// The verification type
    pub value_type: ValueType,
    /// Everything this value may have been produced by
    pub sources: OrdSet<SourceId>,
}

impl FrameValue {
    /// Creates a value with a single source.
    #[must_use]
    pub fn new(value_type: ValueType, source: SourceId) -> Self {
        Self {
            value_type,
            sources: OrdSet::unit(source),
        }
    }

    /// Creates a value without any source, such as the receiver or an empty slot.
    #[must_use]
    pub fn untracked(value_type: ValueType) -> Self {
        Self {
            value_type,
            sources: OrdSet::new(),
        }
    }

    /// An unusable slot.
    #[must_use]
    pub fn top() -> Self {
        Self::untracked(ValueType::Top)
    }

    /// Number of stack words this value occupies.
    #[must_use]
    pub fn size(&self) -> usize {
        self.value_type.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::{ClassInfo, ClassRegistry};

    fn registry() -> ClassRegistry {
        let mut registry = ClassRegistry::new();
        registry.add_class_info(ClassInfo::new("p/A", Some(OBJECT)));
        registry.add_class_info(ClassInfo::new("p/B", Some("p/A")));
        registry.add_class_info(ClassInfo::new("p/C", Some("p/A")));
        registry
    }

    #[test]
    fn test_int_like_joins() {
        let registry = registry();
        assert_eq!(ValueType::Byte.join(&ValueType::Short, &registry), ValueType::Short);
        assert_eq!(ValueType::Char.join(&ValueType::Byte, &registry), ValueType::Int);
        assert_eq!(ValueType::Boolean.join(&ValueType::Int, &registry), ValueType::Int);
        assert_eq!(ValueType::Int.join(&ValueType::Float, &registry), ValueType::Top);
        assert_eq!(ValueType::Long.join(&ValueType::Long, &registry), ValueType::Long);
    }

    #[test]
    fn test_reference_joins() {
        let registry = registry();
        let b = ValueType::Reference("p/B".to_string());
        let c = ValueType::Reference("p/C".to_string());
        assert_eq!(b.join(&c, &registry), ValueType::Reference("p/A".to_string()));
        assert_eq!(ValueType::Null.join(&b, &registry), b);

        let b_array = ValueType::Reference("[Lp/B;".to_string());
        let c_array = ValueType::Reference("[Lp/C;".to_string());
        assert_eq!(
            b_array.join(&c_array, &registry),
            ValueType::Reference("[Lp/A;".to_string())
        );
        let ints = ValueType::Reference("[I".to_string());
        assert_eq!(
            ints.join(&b_array, &registry),
            ValueType::Reference(OBJECT.to_string())
        );
        assert_eq!(b.join(&ints, &registry), ValueType::Reference(OBJECT.to_string()));
        assert_eq!(ValueType::Int.join(&b, &registry), ValueType::Top);
    }

    #[test]
    fn test_array_elements() {
        assert_eq!(
            ValueType::Reference("[Ljava/lang/String;".to_string()).array_element(),
            Some(ValueType::Reference("java/lang/String".to_string()))
        );
        assert_eq!(
            ValueType::Reference("[[I".to_string()).array_element(),
            Some(ValueType::Reference("[I".to_string()))
        );
        assert_eq!(ValueType::Reference("p/A".to_string()).array_element(), None);
    }
}
