//! Language-neutral values exchanged across the adapter boundary.
//!
//! Every method parameter and return value crossing a bridge is a
//! [`Value`]. The closed set keeps marshalling identical for all
//! bridges. Anything a language runtime cannot express in these
//! variants does not cross the boundary.
//!
//! # Variants
//!
//! | Variant | Carries |
//! |---------|---------|
//! | `Null` | nothing |
//! | `Bool` | `bool` |
//! | `Int32` / `Int64` | signed integers |
//! | `Uint32` / `Uint64` | unsigned integers |
//! | `Float32` / `Float64` | IEEE 754 floats |
//! | `Str` | owned UTF-8 string |
//! | `Bytes` | owned byte buffer |
//! | `Array` | ordered list of values |
//! | `ComponentRef` | [`ComponentId`] reference, no capabilities |
//!
//! A `ComponentRef` carries only the identifier. Whether the receiver
//! may invoke the referenced component is decided by the security
//! engine, never by possession of the value.
//!
//! # Type matching
//!
//! [`Value::matches`] implements the argument-screening rule: a value
//! satisfies a declared [`ValueType`] when the tags are equal, and
//! `Null` satisfies any declared type.
//!
//! ```
//! use enclave_types::{Value, ValueType};
//!
//! assert!(Value::Int64(7).matches(ValueType::Int64));
//! assert!(!Value::Int64(7).matches(ValueType::Uint64));
//! assert!(Value::Null.matches(ValueType::Str));
//! ```

use crate::ComponentId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A language-neutral value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Absence of a value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Unsigned 32-bit integer.
    Uint32(u32),
    /// Unsigned 64-bit integer.
    Uint64(u64),
    /// IEEE 754 single.
    Float32(f32),
    /// IEEE 754 double.
    Float64(f64),
    /// Owned UTF-8 string.
    Str(String),
    /// Owned byte buffer.
    Bytes(Vec<u8>),
    /// Ordered list of values.
    Array(Vec<Value>),
    /// Reference to another component by id.
    ComponentRef(ComponentId),
}

impl Value {
    /// Returns the type tag of this value.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Null => ValueType::Null,
            Self::Bool(_) => ValueType::Bool,
            Self::Int32(_) => ValueType::Int32,
            Self::Int64(_) => ValueType::Int64,
            Self::Uint32(_) => ValueType::Uint32,
            Self::Uint64(_) => ValueType::Uint64,
            Self::Float32(_) => ValueType::Float32,
            Self::Float64(_) => ValueType::Float64,
            Self::Str(_) => ValueType::Str,
            Self::Bytes(_) => ValueType::Bytes,
            Self::Array(_) => ValueType::Array,
            Self::ComponentRef(_) => ValueType::ComponentRef,
        }
    }

    /// Returns whether this value satisfies the declared type.
    ///
    /// `Null` satisfies any declared type; it stands in for an absent
    /// argument of any signature slot.
    #[must_use]
    pub fn matches(&self, expected: ValueType) -> bool {
        matches!(self, Self::Null) || self.value_type() == expected
    }

    /// Approximate in-memory size of the value payload in bytes.
    ///
    /// Used when charging an invocation against a memory ceiling.
    /// Scalars count their fixed width, strings and byte buffers
    /// their length, arrays the sum of their elements, a component
    /// reference the length of its id.
    #[must_use]
    pub fn approx_size(&self) -> usize {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int32(_) | Self::Uint32(_) | Self::Float32(_) => 4,
            Self::Int64(_) | Self::Uint64(_) | Self::Float64(_) => 8,
            Self::Str(s) => s.len(),
            Self::Bytes(b) => b.len(),
            Self::Array(items) => items.iter().map(Value::approx_size).sum(),
            Self::ComponentRef(id) => id.as_str().len(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Uint32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Uint64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<ComponentId> for Value {
    fn from(v: ComponentId) -> Self {
        Self::ComponentRef(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int32(i) => write!(f, "{i}"),
            Self::Int64(i) => write!(f, "{i}"),
            Self::Uint32(u) => write!(f, "{u}"),
            Self::Uint64(u) => write!(f, "{u}"),
            Self::Float32(x) => write!(f, "{x}"),
            Self::Float64(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => write!(f, "bytes({})", b.len()),
            Self::Array(items) => write!(f, "array({})", items.len()),
            Self::ComponentRef(id) => write!(f, "ref({id})"),
        }
    }
}

/// Type tag for a [`Value`], used in method signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Absence of a value.
    Null,
    /// Boolean.
    Bool,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 32-bit integer.
    Uint32,
    /// Unsigned 64-bit integer.
    Uint64,
    /// IEEE 754 single.
    Float32,
    /// IEEE 754 double.
    Float64,
    /// UTF-8 string.
    Str,
    /// Byte buffer.
    Bytes,
    /// Ordered list of values.
    Array,
    /// Component reference.
    ComponentRef,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Uint32 => "uint32",
            Self::Uint64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Str => "str",
            Self::Bytes => "bytes",
            Self::Array => "array",
            Self::ComponentRef => "component_ref",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_tags() {
        assert_eq!(Value::Null.value_type(), ValueType::Null);
        assert_eq!(Value::Bool(true).value_type(), ValueType::Bool);
        assert_eq!(Value::Int32(-3).value_type(), ValueType::Int32);
        assert_eq!(Value::Int64(-3).value_type(), ValueType::Int64);
        assert_eq!(Value::Uint32(3).value_type(), ValueType::Uint32);
        assert_eq!(Value::Uint64(3).value_type(), ValueType::Uint64);
        assert_eq!(Value::Float32(1.5).value_type(), ValueType::Float32);
        assert_eq!(Value::Float64(1.5).value_type(), ValueType::Float64);
        assert_eq!(Value::Str("x".into()).value_type(), ValueType::Str);
        assert_eq!(Value::Bytes(vec![1]).value_type(), ValueType::Bytes);
        assert_eq!(Value::Array(vec![]).value_type(), ValueType::Array);
    }

    #[test]
    fn null_matches_any_declared_type() {
        for expected in [
            ValueType::Bool,
            ValueType::Int64,
            ValueType::Str,
            ValueType::ComponentRef,
        ] {
            assert!(Value::Null.matches(expected));
        }
    }

    #[test]
    fn non_null_requires_exact_match() {
        assert!(Value::Int64(1).matches(ValueType::Int64));
        assert!(!Value::Int64(1).matches(ValueType::Int32));
        assert!(!Value::Int64(1).matches(ValueType::Uint64));
        assert!(!Value::Str("x".into()).matches(ValueType::Bytes));
    }

    #[test]
    fn approx_size() {
        assert_eq!(Value::Null.approx_size(), 0);
        assert_eq!(Value::Bool(true).approx_size(), 1);
        assert_eq!(Value::Int32(0).approx_size(), 4);
        assert_eq!(Value::Int64(0).approx_size(), 8);
        assert_eq!(Value::Str("hello".into()).approx_size(), 5);
        assert_eq!(Value::Bytes(vec![0; 100]).approx_size(), 100);

        let arr = Value::Array(vec![Value::Int64(0), Value::Bytes(vec![0; 10])]);
        assert_eq!(arr.approx_size(), 18);
    }

    #[test]
    fn from_impls() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(7i64), Value::Int64(7));
        assert_eq!(Value::from("hi"), Value::Str("hi".into()));
        assert_eq!(Value::from(vec![1u8, 2]), Value::Bytes(vec![1, 2]));
    }

    #[test]
    fn serde_tagged_representation() {
        let v = Value::Int64(42);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, r#"{"type":"int64","value":42}"#);

        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn serde_nested_array() {
        let v = Value::Array(vec![Value::Null, Value::Str("a".into())]);
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn display_compact() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Bytes(vec![0; 3]).to_string(), "bytes(3)");
        assert_eq!(Value::Str("a".into()).to_string(), "\"a\"");
        assert_eq!(Value::Array(vec![Value::Null]).to_string(), "array(1)");
    }
}
