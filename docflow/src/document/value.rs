//! Conversions between Rust values and stored field values.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::Value;

use crate::utils::{format_instant, parse_instant, Timestamp};

/// A binary blob stored as a field value.
///
/// Blobs are kept as base64 strings in the document tree so the wire form
/// stays plain JSON.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Binary(pub Vec<u8>);

impl From<Vec<u8>> for Binary {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Binary {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// Types that can be stored in a document field.
pub trait IntoFieldValue {
    /// Converts `self` into its stored form.
    fn into_field_value(self) -> Value;
}

impl IntoFieldValue for Value {
    fn into_field_value(self) -> Value {
        self
    }
}

impl IntoFieldValue for &Value {
    fn into_field_value(self) -> Value {
        self.clone()
    }
}

impl IntoFieldValue for String {
    fn into_field_value(self) -> Value {
        Value::String(self)
    }
}

impl IntoFieldValue for &str {
    fn into_field_value(self) -> Value {
        Value::String(self.to_string())
    }
}

impl IntoFieldValue for &String {
    fn into_field_value(self) -> Value {
        Value::String(self.clone())
    }
}

impl IntoFieldValue for i32 {
    fn into_field_value(self) -> Value {
        Value::from(self)
    }
}

impl IntoFieldValue for i64 {
    fn into_field_value(self) -> Value {
        Value::from(self)
    }
}

impl IntoFieldValue for u64 {
    fn into_field_value(self) -> Value {
        Value::from(self)
    }
}

impl IntoFieldValue for f64 {
    fn into_field_value(self) -> Value {
        Value::from(self)
    }
}

impl IntoFieldValue for bool {
    fn into_field_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoFieldValue for Timestamp {
    fn into_field_value(self) -> Value {
        Value::String(format_instant(&self))
    }
}

impl IntoFieldValue for Binary {
    fn into_field_value(self) -> Value {
        Value::String(STANDARD.encode(self.0))
    }
}

pub(crate) fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

pub(crate) fn as_long(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn as_int(value: &Value) -> Option<i32> {
    as_long(value).and_then(|n| i32::try_from(n).ok())
}

pub(crate) fn as_double(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

pub(crate) fn as_instant(value: &Value) -> Option<Timestamp> {
    value.as_str().and_then(|s| parse_instant(s).ok())
}

pub(crate) fn as_bytes(value: &Value) -> Option<Vec<u8>> {
    value.as_str().and_then(|s| STANDARD.decode(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers_read_from_strings() {
        assert_eq!(as_long(&json!(" 42 ")), Some(42));
        assert_eq!(as_int(&json!(i64::MAX)), None);
        assert_eq!(as_double(&json!("1.5")), Some(1.5));
    }

    #[test]
    fn test_string_view_of_scalars() {
        assert_eq!(as_string(&json!(7)), Some("7".to_string()));
        assert_eq!(as_string(&json!(true)), Some("true".to_string()));
        assert_eq!(as_string(&Value::Null), None);
    }

    #[test]
    fn test_binary_is_base64() {
        let stored = Binary(vec![0, 1, 2, 255]).into_field_value();
        assert_eq!(stored, json!("AAEC/w=="));
        assert_eq!(as_bytes(&stored), Some(vec![0, 1, 2, 255]));
    }
}
