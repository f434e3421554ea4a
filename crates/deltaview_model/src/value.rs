//! Dynamic scalar value type.

use crate::id::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A dynamic scalar value.
///
/// This type represents any single-column value DeltaView tracks in a view
/// slot or binds into a statement. Floats are intentionally not supported:
/// scalar equality drives dirty detection and must be canonical.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ScalarValue {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer (supports full i64 range).
    Integer(i64),
    /// Text string (UTF-8).
    Text(String),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Object identifier.
    Id(ObjectId),
}

impl ScalarValue {
    /// Returns `true` if the value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Returns the integer content, if any.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ScalarValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text content, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the object ID content, if any.
    #[must_use]
    pub fn as_id(&self) -> Option<ObjectId> {
        match self {
            ScalarValue::Id(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns a short name for the value's shape, used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            ScalarValue::Null => "null",
            ScalarValue::Bool(_) => "bool",
            ScalarValue::Integer(_) => "integer",
            ScalarValue::Text(_) => "text",
            ScalarValue::Bytes(_) => "bytes",
            ScalarValue::Id(_) => "id",
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "null"),
            ScalarValue::Bool(v) => write!(f, "{v}"),
            ScalarValue::Integer(v) => write!(f, "{v}"),
            ScalarValue::Text(v) => write!(f, "{v:?}"),
            ScalarValue::Bytes(v) => write!(f, "bytes[{}]", v.len()),
            ScalarValue::Id(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Bool(v)
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Integer(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Text(v.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(v: String) -> Self {
        ScalarValue::Text(v)
    }
}

impl From<ObjectId> for ScalarValue {
    fn from(v: ObjectId) -> Self {
        ScalarValue::Id(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_total_across_kinds() {
        let values = [
            ScalarValue::Null,
            ScalarValue::Bool(false),
            ScalarValue::Integer(1),
            ScalarValue::Text("a".into()),
            ScalarValue::Bytes(vec![1]),
            ScalarValue::Id(ObjectId::from_bytes([1u8; 16])),
        ];
        for (i, a) in values.iter().enumerate() {
            for (j, b) in values.iter().enumerate() {
                assert_eq!(a.cmp(b), i.cmp(&j));
            }
        }
    }

    #[test]
    fn conversions() {
        assert_eq!(ScalarValue::from(42i64), ScalarValue::Integer(42));
        assert_eq!(ScalarValue::from("x"), ScalarValue::Text("x".into()));
        assert!(ScalarValue::Null.is_null());
    }

    #[test]
    fn serde_roundtrip() {
        let value = ScalarValue::Text("hello".into());
        let json = serde_json::to_string(&value).unwrap();
        let back: ScalarValue = serde_json::from_str(&json).unwrap();
        assert_eq!(value, back);
    }
}
