use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Scalar type tag for column values.
///
/// Closed registry: the engine's storage layer materializes exactly these types.
/// Boolean results of predicates surface as [`DataType::Int`]; there is no bool tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// The type of an untyped NULL literal.
    Null,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 32-bit floating point.
    Float,
    /// 64-bit floating point.
    Double,
    /// Variable-length string.
    String,
}

impl DataType {
    /// Returns whether the type is one of the numeric tags.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            DataType::Int | DataType::Long | DataType::Float | DataType::Double
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Null => "null",
            DataType::Int => "int",
            DataType::Long => "long",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::String => "string",
        };
        write!(f, "{name}")
    }
}

/// Physical column encoding tag.
///
/// Opaque at the plan layer: a label carried through from the catalog so that
/// calibration can enumerate encoding combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EncodingType {
    /// Plain, unencoded value segments.
    Unencoded,
    /// Dictionary encoding.
    Dictionary,
    /// Run-length encoding.
    RunLength,
    /// Frame-of-reference encoding.
    FrameOfReference,
    /// LZ4 block compression.
    Lz4,
    /// Dictionary encoding over fixed-width strings.
    FixedStringDictionary,
}

impl fmt::Display for EncodingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EncodingType::Unencoded => "Unencoded",
            EncodingType::Dictionary => "Dictionary",
            EncodingType::RunLength => "RunLength",
            EncodingType::FrameOfReference => "FrameOfReference",
            EncodingType::Lz4 => "LZ4",
            EncodingType::FixedStringDictionary => "FixedStringDictionary",
        };
        write!(f, "{name}")
    }
}

/// A typed constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Untyped NULL.
    Null,
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    Long(i64),
    /// 32-bit floating point.
    Float(f32),
    /// 64-bit floating point.
    Double(f64),
    /// Variable-length string.
    String(String),
}

impl Value {
    /// The type tag of this constant.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Int(_) => DataType::Int,
            Value::Long(_) => DataType::Long,
            Value::Float(_) => DataType::Float,
            Value::Double(_) => DataType::Double,
            Value::String(_) => DataType::String,
        }
    }

    /// Returns whether this is the NULL constant.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Feeds the value into a hasher, using bit patterns for floats so that
    /// hashing stays deterministic.
    pub fn hash_into<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Int(v) => v.hash(state),
            Value::Long(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Double(v) => v.to_bits().hash(state),
            Value::String(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "'{v}'"),
        }
    }
}

/// Fixed operand compatibility matrix for binary predicates and BETWEEN.
///
/// Numeric tags compare against each other, strings only against strings, and
/// NULL against everything.
pub fn data_types_compatible(a: DataType, b: DataType) -> bool {
    if a == DataType::Null || b == DataType::Null {
        return true;
    }
    if a.is_numeric() && b.is_numeric() {
        return true;
    }
    a == b
}
