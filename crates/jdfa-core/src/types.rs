//! Static types of the analyzed language.
//!
//! Provides the primitive types (boolean, byte, char, short, int, long,
//! float, double), class references resolved through the
//! [`TypeRegistry`](crate::type_id::TypeRegistry), the null type and void.
//!
//! Class identity is nominal via [`TypeId`]. Class definitions record their
//! kind, `final`/`abstract` flags and direct supertypes, which is everything
//! the type-constraint lattice needs to decide disjointness.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::type_id::TypeId;

/// Primitive (non-reference) types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveType {
    /// All primitive types in declaration order.
    pub const ALL: [PrimitiveType; 8] = [
        PrimitiveType::Boolean,
        PrimitiveType::Byte,
        PrimitiveType::Char,
        PrimitiveType::Short,
        PrimitiveType::Int,
        PrimitiveType::Long,
        PrimitiveType::Float,
        PrimitiveType::Double,
    ];

    /// Returns `true` for byte, char, short, int and long.
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            PrimitiveType::Byte
                | PrimitiveType::Char
                | PrimitiveType::Short
                | PrimitiveType::Int
                | PrimitiveType::Long
        )
    }

    /// Returns `true` for float and double.
    pub fn is_floating(self) -> bool {
        matches!(self, PrimitiveType::Float | PrimitiveType::Double)
    }

    /// Inclusive bounds of the values representable by an integral type.
    pub fn bounds(self) -> Option<(i64, i64)> {
        match self {
            PrimitiveType::Byte => Some((i8::MIN as i64, i8::MAX as i64)),
            PrimitiveType::Char => Some((0, u16::MAX as i64)),
            PrimitiveType::Short => Some((i16::MIN as i64, i16::MAX as i64)),
            PrimitiveType::Int => Some((i32::MIN as i64, i32::MAX as i64)),
            PrimitiveType::Long => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    /// Width in bits of an integral type.
    pub fn bits(self) -> Option<u32> {
        match self {
            PrimitiveType::Byte => Some(8),
            PrimitiveType::Char | PrimitiveType::Short => Some(16),
            PrimitiveType::Int => Some(32),
            PrimitiveType::Long => Some(64),
            _ => None,
        }
    }

    /// Two's-complement truncation of `value` to this integral type.
    ///
    /// Non-integral types return the value unchanged.
    pub fn wrap(self, value: i64) -> i64 {
        match self {
            PrimitiveType::Byte => value as i8 as i64,
            PrimitiveType::Char => value as u16 as i64,
            PrimitiveType::Short => value as i16 as i64,
            PrimitiveType::Int => value as i32 as i64,
            _ => value,
        }
    }

    /// Returns `true` if converting from `self` to `to` never loses
    /// information and keeps the numeric value (integral widening).
    pub fn is_lossless_widening_to(self, to: PrimitiveType) -> bool {
        if self == to {
            return true;
        }
        match (self.bounds(), to.bounds()) {
            (Some((lo, hi)), Some((to_lo, to_hi))) => to_lo <= lo && hi <= to_hi,
            _ => false,
        }
    }

    /// The wrapper class used when this primitive is boxed.
    pub fn box_class(self) -> TypeId {
        match self {
            PrimitiveType::Boolean => TypeId::BOOLEAN,
            PrimitiveType::Byte => TypeId::BYTE,
            PrimitiveType::Char => TypeId::CHARACTER,
            PrimitiveType::Short => TypeId::SHORT,
            PrimitiveType::Int => TypeId::INTEGER,
            PrimitiveType::Long => TypeId::LONG,
            PrimitiveType::Float => TypeId::FLOAT,
            PrimitiveType::Double => TypeId::DOUBLE,
        }
    }

    /// The primitive stored inside a wrapper class, if `class` is one.
    pub fn from_box_class(class: TypeId) -> Option<PrimitiveType> {
        PrimitiveType::ALL
            .into_iter()
            .find(|p| p.box_class() == class)
    }

    /// Source-level keyword of this type.
    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Char => "char",
            PrimitiveType::Short => "short",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
        }
    }

    /// Parses a primitive keyword.
    pub fn from_name(name: &str) -> Option<PrimitiveType> {
        PrimitiveType::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A static type as seen by the analysis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JType {
    Primitive(PrimitiveType),
    /// Class, interface or array type registered in the type registry.
    Class(TypeId),
    /// Type of the `null` literal.
    Null,
    Void,
}

impl JType {
    pub const BOOLEAN: JType = JType::Primitive(PrimitiveType::Boolean);
    pub const INT: JType = JType::Primitive(PrimitiveType::Int);
    pub const LONG: JType = JType::Primitive(PrimitiveType::Long);
    pub const OBJECT: JType = JType::Class(TypeId::OBJECT);
    pub const STRING: JType = JType::Class(TypeId::STRING);

    pub fn is_primitive(&self) -> bool {
        matches!(self, JType::Primitive(_))
    }

    /// Returns `true` for class types and the null type.
    pub fn is_reference(&self) -> bool {
        matches!(self, JType::Class(_) | JType::Null)
    }

    /// Returns `true` for `boolean` and `java.lang.Boolean`.
    pub fn is_boolean_like(&self) -> bool {
        matches!(
            self,
            JType::Primitive(PrimitiveType::Boolean) | JType::Class(TypeId::BOOLEAN)
        )
    }

    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            JType::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<TypeId> {
        match self {
            JType::Class(id) => Some(*id),
            _ => None,
        }
    }
}

/// Bit pattern of a floating-point constant.
///
/// Stored as raw `f64` bits so constants can be hashed and compared
/// structurally (NaN has one canonical pattern per source literal). Float
/// constants are widened to `f64` before being stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FloatBits(pub u64);

impl FloatBits {
    pub fn new(value: f64) -> Self {
        FloatBits(value.to_bits())
    }

    pub fn get(self) -> f64 {
        f64::from_bits(self.0)
    }
}

/// Literal values that can appear as constants.
///
/// Integral constants of every width (including `char`) are stored as `i64`;
/// the constant's [`JType`] recorded next to it in the value factory decides
/// the width.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(FloatBits),
    Str(String),
    /// A class literal such as `String.class`.
    Class(TypeId),
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Null => f.write_str("null"),
            ConstValue::Bool(b) => write!(f, "{}", b),
            ConstValue::Int(v) => write!(f, "{}", v),
            ConstValue::Float(bits) => write!(f, "{}", bits.get()),
            ConstValue::Str(s) => write!(f, "{:?}", s),
            ConstValue::Class(id) => write!(f, "class#{}", id.0),
        }
    }
}

/// Whether a class definition is a class or an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassKind {
    Class,
    Interface,
}

/// A class, interface or array type registered in the type registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDef {
    /// Fully qualified name, e.g. `java.util.List`.
    pub name: String,
    pub kind: ClassKind,
    pub is_final: bool,
    pub is_abstract: bool,
    /// Direct supertypes (superclass first, then interfaces).
    pub supertypes: Vec<TypeId>,
}

impl ClassDef {
    /// Creates a non-final, non-abstract class.
    pub fn class(name: &str, supertypes: Vec<TypeId>) -> Self {
        ClassDef {
            name: name.to_string(),
            kind: ClassKind::Class,
            is_final: false,
            is_abstract: false,
            supertypes,
        }
    }

    /// Creates a final class.
    pub fn final_class(name: &str, supertypes: Vec<TypeId>) -> Self {
        ClassDef {
            is_final: true,
            ..ClassDef::class(name, supertypes)
        }
    }

    /// Creates an interface.
    pub fn interface(name: &str, supertypes: Vec<TypeId>) -> Self {
        ClassDef {
            name: name.to_string(),
            kind: ClassKind::Interface,
            is_final: false,
            is_abstract: true,
            supertypes,
        }
    }

    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }

    /// Simple name (text after the last dot).
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_bounds() {
        assert_eq!(PrimitiveType::Byte.bounds(), Some((-128, 127)));
        assert_eq!(PrimitiveType::Char.bounds(), Some((0, 65535)));
        assert_eq!(PrimitiveType::Long.bounds(), Some((i64::MIN, i64::MAX)));
        assert_eq!(PrimitiveType::Double.bounds(), None);
    }

    #[test]
    fn wrap_truncates_like_twos_complement() {
        assert_eq!(PrimitiveType::Byte.wrap(300), 44);
        assert_eq!(PrimitiveType::Byte.wrap(-129), 127);
        assert_eq!(PrimitiveType::Char.wrap(-1), 65535);
        assert_eq!(PrimitiveType::Int.wrap(1 << 32), 0);
        assert_eq!(PrimitiveType::Long.wrap(i64::MAX), i64::MAX);
    }

    #[test]
    fn lossless_widening() {
        assert!(PrimitiveType::Int.is_lossless_widening_to(PrimitiveType::Long));
        assert!(PrimitiveType::Char.is_lossless_widening_to(PrimitiveType::Int));
        assert!(!PrimitiveType::Char.is_lossless_widening_to(PrimitiveType::Short));
        assert!(!PrimitiveType::Long.is_lossless_widening_to(PrimitiveType::Int));
        assert!(!PrimitiveType::Int.is_lossless_widening_to(PrimitiveType::Double));
    }

    #[test]
    fn box_class_roundtrip() {
        for p in PrimitiveType::ALL {
            assert_eq!(PrimitiveType::from_box_class(p.box_class()), Some(p));
        }
        assert_eq!(PrimitiveType::from_box_class(TypeId::STRING), None);
    }

    #[test]
    fn primitive_names() {
        assert_eq!(PrimitiveType::from_name("int"), Some(PrimitiveType::Int));
        assert_eq!(PrimitiveType::from_name("Integer"), None);
        assert_eq!(format!("{}", PrimitiveType::Boolean), "boolean");
    }

    #[test]
    fn boolean_like_types() {
        assert!(JType::BOOLEAN.is_boolean_like());
        assert!(JType::Class(TypeId::BOOLEAN).is_boolean_like());
        assert!(!JType::INT.is_boolean_like());
    }

    #[test]
    fn float_bits_roundtrip() {
        assert_eq!(FloatBits::new(2.5).get(), 2.5);
        assert_eq!(FloatBits::new(f64::NAN), FloatBits::new(f64::NAN));
    }

    #[test]
    fn class_def_simple_name() {
        let def = ClassDef::interface("java.util.List", vec![]);
        assert_eq!(def.simple_name(), "List");
        assert!(def.is_interface());
    }
}
