// src/models/document.rs

//! Free-form JSON documents attached to entities.
//!
//! `info` and `addition` payloads are resource-defined and keep evolving, so
//! they stay as dynamically typed JSON maps. This module holds the small set
//! of helpers used to read them, plus lenient serde adapters for upstream
//! values that arrive as either strings or numbers.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Ordered JSON object.
pub type Document = Map<String, Value>;

/// Read a value as a number, accepting numeric strings.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Render a scalar value as a display string.
pub fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Read `key` from a document as a number.
pub fn get_f64(doc: &Document, key: &str) -> Option<f64> {
    doc.get(key).and_then(value_as_f64)
}

/// Read `key` from a document as a string.
pub fn get_str<'a>(doc: &'a Document, key: &str) -> Option<&'a str> {
    doc.get(key).and_then(Value::as_str)
}

/// Read `key` from a document as a flag, treating absence as `false`.
pub fn get_flag(doc: &Document, key: &str) -> bool {
    match doc.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(s)) => matches!(s.as_str(), "true" | "1" | "yes"),
        _ => false,
    }
}

/// Shallow merge: every key of `source` overwrites the key in `target`.
///
/// Returns `true` when `target` changed.
pub fn merge_into(target: &mut Document, source: &Document) -> bool {
    let mut changed = false;
    for (key, value) in source {
        if target.get(key) != Some(value) {
            target.insert(key.clone(), value.clone());
            changed = true;
        }
    }
    changed
}

/// Serde adapters for upstream values with loose typing.
pub mod lenient {
    use super::*;

    /// String or number into `Option<String>`; empty strings become `None`.
    pub fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value
            .as_ref()
            .and_then(value_as_string)
            .filter(|s| !s.trim().is_empty()))
    }

    /// Number or numeric string into `Option<f64>`.
    pub fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(value_as_f64))
    }

    /// Number or numeric string into `f64`, defaulting to zero.
    pub fn f64_or_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(opt_f64(deserializer)?.unwrap_or(0.0))
    }
}
