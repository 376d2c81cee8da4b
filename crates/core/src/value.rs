//! Value types for stratadex
//!
//! This module defines:
//! - Value: Closed sum type for every document value the layer stores
//!
//! ## Value Model
//!
//! | Variant | Meaning |
//! |---------|---------|
//! | Null | absent/null |
//! | Bool, Int, Float, BigInt, String | primitives |
//! | Bytes | binary buffer (leaf, never merged) |
//! | Date | milliseconds since the Unix epoch (leaf) |
//! | Counter | unsigned 64-bit counter cell, target of atomic sum/min/max |
//! | Array | ordered list |
//! | Set | insertion-ordered list without duplicates |
//! | Map | insertion-ordered `(key, value)` pairs with unique keys |
//! | Object | string-keyed record, the only shape with indexable fields |
//!
//! ### Type Rules
//!
//! - Different types are never equal: `Int(1) != Float(1.0)`, `Int(1) != Counter(1)`
//! - Float equality is IEEE-754: `NaN != NaN`, `-0.0 == 0.0`
//! - Set and Map compare element-wise in insertion order

use crate::error::{Error, Result};
use crate::types::KeyPart;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical document value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point (IEEE-754)
    Float(f64),
    /// 128-bit signed integer
    BigInt(#[serde(with = "bigint_repr")] i128),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Milliseconds since the Unix epoch
    Date(i64),
    /// Unsigned 64-bit counter
    Counter(u64),
    /// Array of values
    Array(Vec<Value>),
    /// Set of unique values, insertion ordered
    Set(Vec<Value>),
    /// Map with arbitrary value keys, insertion ordered
    Map(Vec<(Value, Value)>),
    /// Object with string keys
    Object(BTreeMap<String, Value>),
}

mod bigint_repr {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &i128, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<i128, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // IEEE-754: NaN != NaN, -0.0 == 0.0
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Counter(a), Value::Counter(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Empty object
    pub fn object() -> Self {
        Value::Object(BTreeMap::new())
    }

    /// Build a set, dropping duplicates while keeping first-seen order
    pub fn set_of(values: impl IntoIterator<Item = Value>) -> Self {
        let mut out: Vec<Value> = Vec::new();
        for v in values {
            if !out.contains(&v) {
                out.push(v);
            }
        }
        Value::Set(out)
    }

    /// Build a map; a later pair overwrites an earlier one with the same key
    pub fn map_of(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let mut out: Vec<(Value, Value)> = Vec::new();
        for (k, v) in pairs {
            match out.iter_mut().find(|(existing, _)| *existing == k) {
                Some(slot) => slot.1 = v,
                None => out.push((k, v)),
            }
        }
        Value::Map(out)
    }

    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::BigInt(_) => "BigInt",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::Date(_) => "Date",
            Value::Counter(_) => "Counter",
            Value::Array(_) => "Array",
            Value::Set(_) => "Set",
            Value::Map(_) => "Map",
            Value::Object(_) => "Object",
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this is an object value
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Get as i64 if this is an Int value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as &str if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as u64 if this is a Counter value
    pub fn as_counter(&self) -> Option<u64> {
        match self {
            Value::Counter(c) => Some(*c),
            _ => None,
        }
    }

    /// Get as &[Value] if this is an Array value
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as &BTreeMap if this is an Object value
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Get as &mut BTreeMap if this is an Object value
    pub fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Top-level field of an object; `None` for non-objects and absent fields
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.as_object().and_then(|o| o.get(field))
    }

    /// Convert an indexed field value into a key part
    ///
    /// Two values map to the same key part exactly when they are equal, so
    /// `-0.0` is stored as `0.0` and `NaN` (never equal to itself) is
    /// rejected. Returns `Ok(None)` for `Null` (no index entry is written)
    /// and a validation error for shapes that cannot be ordered inside a key.
    pub fn to_key_part(&self) -> Result<Option<KeyPart>> {
        match self {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(KeyPart::Bool(*b))),
            Value::Int(i) => Ok(Some(KeyPart::Int(*i))),
            Value::Float(f) if f.is_nan() => Err(Error::validation("NaN cannot be indexed")),
            Value::Float(f) if *f == 0.0 => Ok(Some(KeyPart::Float(0.0))),
            Value::Float(f) => Ok(Some(KeyPart::Float(*f))),
            Value::String(s) => Ok(Some(KeyPart::String(s.clone()))),
            Value::Bytes(b) => Ok(Some(KeyPart::Bytes(b.clone()))),
            Value::Date(ms) => Ok(Some(KeyPart::Date(*ms))),
            Value::BigInt(i) => Ok(Some(KeyPart::BigInt(*i))),
            other => Err(Error::validation(format!(
                "{} values cannot be indexed",
                other.type_name()
            ))),
        }
    }
}

// ============================================================================
// From implementations for ergonomic API usage
// ============================================================================

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(o: BTreeMap<String, Value>) -> Self {
        Value::Object(o)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

// ============================================================================
// serde_json interop for ergonomic JSON construction
// ============================================================================

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::BigInt(u as i128)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(obj) => {
                Value::Object(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}
