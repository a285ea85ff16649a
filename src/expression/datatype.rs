//! The closed set of data types a constant group can carry.
//!
//! [`DataType`] mirrors the Java types a compile-time constant may have. Besides the
//! descriptor mapping it encodes the promotion and assignability rules of the Java
//! language, which the evaluator, the group lookup and the code generator all share.
//!
//! # Ordering
//!
//! Primitive types are partially ordered by widening conversion:
//!
//! ```text
//! byte < short < int < long < float < double
//!         char < int
//! ```
//!
//! `char` is incomparable with `byte` and `short`. `String` and `Class` only compare
//! equal to themselves.

use std::{cmp::Ordering, fmt};

use strum::{EnumIter, IntoEnumIterator};

/// The type of a constant value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, strum::Display, strum::IntoStaticStr)]
pub enum DataType {
    /// `byte` (8-bit signed)
    #[strum(serialize = "byte")]
    Byte,
    /// `short` (16-bit signed)
    #[strum(serialize = "short")]
    Short,
    /// `int` (32-bit signed)
    #[strum(serialize = "int")]
    Int,
    /// `long` (64-bit signed)
    #[strum(serialize = "long")]
    Long,
    /// `float` (IEEE 754 binary32)
    #[strum(serialize = "float")]
    Float,
    /// `double` (IEEE 754 binary64)
    #[strum(serialize = "double")]
    Double,
    /// `char` (16-bit unsigned)
    #[strum(serialize = "char")]
    Char,
    /// `java.lang.String`
    #[strum(serialize = "String")]
    String,
    /// `java.lang.Class`
    #[strum(serialize = "Class")]
    Class,
}

/// The operand stack category a value of some [`DataType`] occupies.
///
/// All int-like types (`byte`, `short`, `char`, `int`) share the `Int` kind because the
/// JVM widens them on the operand stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackKind {
    /// 32-bit integer slot
    Int,
    /// 64-bit integer slot (category 2)
    Long,
    /// 32-bit float slot
    Float,
    /// 64-bit float slot (category 2)
    Double,
    /// Object reference
    Reference,
}

impl DataType {
    /// Maps a JVM field descriptor to a data type.
    ///
    /// Returns `None` for descriptors that cannot carry a group constant, such as
    /// `Z`, arrays, or object types other than `String` and `Class`.
    #[must_use]
    pub fn from_descriptor(descriptor: &str) -> Option<DataType> {
        match descriptor {
            "B" => Some(DataType::Byte),
            "S" => Some(DataType::Short),
            "I" => Some(DataType::Int),
            "J" => Some(DataType::Long),
            "F" => Some(DataType::Float),
            "D" => Some(DataType::Double),
            "C" => Some(DataType::Char),
            "Ljava/lang/String;" => Some(DataType::String),
            "Ljava/lang/Class;" => Some(DataType::Class),
            _ => None,
        }
    }

    /// Returns the JVM field descriptor of this type.
    #[must_use]
    pub const fn descriptor(self) -> &'static str {
        match self {
            DataType::Byte => "B",
            DataType::Short => "S",
            DataType::Int => "I",
            DataType::Long => "J",
            DataType::Float => "F",
            DataType::Double => "D",
            DataType::Char => "C",
            DataType::String => "Ljava/lang/String;",
            DataType::Class => "Ljava/lang/Class;",
        }
    }

    /// Returns the operand stack category of this type.
    #[must_use]
    pub const fn stack_kind(self) -> StackKind {
        match self {
            DataType::Byte | DataType::Short | DataType::Char | DataType::Int => StackKind::Int,
            DataType::Long => StackKind::Long,
            DataType::Float => StackKind::Float,
            DataType::Double => StackKind::Double,
            DataType::String | DataType::Class => StackKind::Reference,
        }
    }

    /// Returns `true` for `byte`, `short`, `char`, `int` and `long`.
    #[must_use]
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            DataType::Byte | DataType::Short | DataType::Char | DataType::Int | DataType::Long
        )
    }

    /// Returns `true` for every primitive type.
    #[must_use]
    pub const fn is_primitive(self) -> bool {
        !matches!(self, DataType::String | DataType::Class)
    }

    /// Returns the width in bits of an integral type.
    #[must_use]
    pub const fn bit_width(self) -> Option<u32> {
        match self {
            DataType::Byte => Some(8),
            DataType::Short | DataType::Char => Some(16),
            DataType::Int => Some(32),
            DataType::Long => Some(64),
            _ => None,
        }
    }

    /// Returns a mask covering all bits of an integral type, or `None` for other types.
    #[must_use]
    pub const fn bit_mask(self) -> Option<u64> {
        match self.bit_width() {
            Some(64) => Some(u64::MAX),
            Some(width) => Some((1u64 << width) - 1),
            None => None,
        }
    }

    /// Returns `true` when a value of this type converts to `target` by identity or by a
    /// widening primitive conversion.
    #[must_use]
    pub fn widens_to(self, target: DataType) -> bool {
        if self == target {
            return true;
        }
        match self {
            DataType::Byte => matches!(
                target,
                DataType::Short | DataType::Int | DataType::Long | DataType::Float | DataType::Double
            ),
            DataType::Short | DataType::Char => matches!(
                target,
                DataType::Int | DataType::Long | DataType::Float | DataType::Double
            ),
            DataType::Int => matches!(target, DataType::Long | DataType::Float | DataType::Double),
            DataType::Long => matches!(target, DataType::Float | DataType::Double),
            DataType::Float => target == DataType::Double,
            DataType::Double | DataType::String | DataType::Class => false,
        }
    }

    /// Applies unary numeric promotion: `byte`, `short` and `char` become `int`.
    #[must_use]
    pub const fn promote(self) -> DataType {
        match self {
            DataType::Byte | DataType::Short | DataType::Char => DataType::Int,
            other => other,
        }
    }

    /// Applies binary numeric promotion to a pair of operand types.
    ///
    /// Returns `None` when either operand is not numeric.
    #[must_use]
    pub fn promote_binary(lhs: DataType, rhs: DataType) -> Option<DataType> {
        if !lhs.is_primitive() || !rhs.is_primitive() {
            return None;
        }
        let (lhs, rhs) = (lhs.promote(), rhs.promote());
        Some(if lhs == DataType::Double || rhs == DataType::Double {
            DataType::Double
        } else if lhs == DataType::Float || rhs == DataType::Float {
            DataType::Float
        } else if lhs == DataType::Long || rhs == DataType::Long {
            DataType::Long
        } else {
            DataType::Int
        })
    }

    /// Iterates over all data types.
    pub fn all() -> impl Iterator<Item = DataType> {
        DataType::iter()
    }

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl PartialOrd for DataType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            Some(Ordering::Equal)
        } else if self.widens_to(*other) {
            Some(Ordering::Less)
        } else if other.widens_to(*self) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }
}

/// A compact set of [`DataType`]s.
///
/// Used for the narrow type interpretations collected by the dataflow analyzer, where
/// the set is copied into every fact table entry and unioned on merges.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DataTypeSet(u16);

impl DataTypeSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Creates a set holding a single type.
    #[must_use]
    pub const fn single(data_type: DataType) -> Self {
        Self(data_type.bit())
    }

    /// Adds a type. Returns `true` if it was not present before.
    pub fn insert(&mut self, data_type: DataType) -> bool {
        let before = self.0;
        self.0 |= data_type.bit();
        before != self.0
    }

    /// Returns `true` if the type is a member.
    #[must_use]
    pub const fn contains(&self, data_type: DataType) -> bool {
        self.0 & data_type.bit() != 0
    }

    /// Adds all members of `other`. Returns `true` if this set changed.
    pub fn union_with(&mut self, other: DataTypeSet) -> bool {
        let before = self.0;
        self.0 |= other.0;
        before != self.0
    }

    /// Returns `true` if the set has no members.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Returns the number of members.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterates over the members in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = DataType> + '_ {
        DataType::iter().filter(|data_type| self.contains(*data_type))
    }
}

impl FromIterator<DataType> for DataTypeSet {
    fn from_iter<I: IntoIterator<Item = DataType>>(iter: I) -> Self {
        let mut set = DataTypeSet::new();
        for data_type in iter {
            set.insert(data_type);
        }
        set
    }
}

impl fmt::Debug for DataTypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widening_order() {
        assert!(DataType::Byte < DataType::Short);
        assert!(DataType::Short < DataType::Int);
        assert!(DataType::Int < DataType::Long);
        assert!(DataType::Long < DataType::Float);
        assert!(DataType::Float < DataType::Double);
        assert!(DataType::Char < DataType::Int);
        assert_eq!(DataType::Char.partial_cmp(&DataType::Short), None);
        assert_eq!(DataType::Byte.partial_cmp(&DataType::Char), None);
        assert_eq!(DataType::String.partial_cmp(&DataType::Int), None);
    }

    #[test]
    fn test_descriptor_roundtrip() {
        for data_type in DataType::all() {
            assert_eq!(DataType::from_descriptor(data_type.descriptor()), Some(data_type));
        }
        assert_eq!(DataType::from_descriptor("Z"), None);
        assert_eq!(DataType::from_descriptor("[I"), None);
    }

    #[test]
    fn test_binary_promotion() {
        assert_eq!(
            DataType::promote_binary(DataType::Byte, DataType::Char),
            Some(DataType::Int)
        );
        assert_eq!(
            DataType::promote_binary(DataType::Int, DataType::Long),
            Some(DataType::Long)
        );
        assert_eq!(
            DataType::promote_binary(DataType::Long, DataType::Float),
            Some(DataType::Float)
        );
        assert_eq!(DataType::promote_binary(DataType::String, DataType::Int), None);
    }

    #[test]
    fn test_type_set() {
        let mut set = DataTypeSet::single(DataType::Int);
        assert!(set.insert(DataType::Byte));
        assert!(!set.insert(DataType::Int));
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![DataType::Byte, DataType::Int]);

        let other: DataTypeSet = [DataType::Char].into_iter().collect();
        assert!(set.union_with(other));
        assert!(!set.union_with(other));
        assert!(set.contains(DataType::Char));
    }

    #[test]
    fn test_bit_masks() {
        assert_eq!(DataType::Byte.bit_mask(), Some(0xFF));
        assert_eq!(DataType::Char.bit_mask(), Some(0xFFFF));
        assert_eq!(DataType::Long.bit_mask(), Some(u64::MAX));
        assert_eq!(DataType::Float.bit_mask(), None);
    }
}
