//! Structured payload documents carried by nodes and edges.
//!
//! The engine never interprets payloads; they hold heterogeneous
//! configuration shapes. Maps use `BTreeMap` so serialization (and therefore
//! any canonical hash over a payload) is deterministic.
//!
//! Floats are held as JSON numbers, so NaN and infinities can never enter a
//! payload and every payload survives a JSON column unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::collections::BTreeMap;

/// A float that has no JSON representation.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("Non-finite float cannot be stored in a payload: {0}")]
pub struct NonFiniteFloat(pub f64);

/// A document tree of scalars, lists and string-keyed maps.
///
/// Serializes to plain JSON (no variant tags), so a payload stored in a
/// JSON column reads back as the same document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// Absent value.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Floating point scalar (always finite).
    Float(Number),
    /// String scalar.
    String(String),
    /// Ordered list of documents.
    List(Vec<Payload>),
    /// String-keyed map of documents.
    Map(BTreeMap<String, Payload>),
}

impl Payload {
    /// An empty map, the usual "no data" payload for edges.
    pub fn empty() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// Build a map payload from key/value pairs.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Payload>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Map(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Look up a key when this payload is a map.
    pub fn get(&self, key: &str) -> Option<&Payload> {
        match self {
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// String value, if this is a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value, if this is an integer scalar.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float value; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(n) => n.as_f64(),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Boolean value, if this is a boolean scalar.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether the payload is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<bool> for Payload {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Payload {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Payload {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl TryFrom<f64> for Payload {
    type Error = NonFiniteFloat;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Number::from_f64(value)
            .map(Self::Float)
            .ok_or(NonFiniteFloat(value))
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<Payload>> From<Vec<T>> for Payload {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                // u64 beyond i64 range and real floats
                None => Self::Float(n),
            },
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect()),
        }
    }
}

impl From<Payload> for serde_json::Value {
    fn from(payload: Payload) -> Self {
        use serde_json::Value;
        match payload {
            Payload::Null => Value::Null,
            Payload::Bool(b) => Value::Bool(b),
            Payload::Int(i) => Value::from(i),
            Payload::Float(n) => Value::Number(n),
            Payload::String(s) => Value::String(s),
            Payload::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Payload::Map(map) => Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        }
    }
}
