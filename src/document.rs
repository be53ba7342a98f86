//! Intermediate Document
//!
//! Steps thread an ordered key/value map through a rule. Values are plain
//! `serde_json::Value`s; the map is insertion-ordered (`preserve_order`), which the
//! XML serializers rely on for deterministic element order.

use serde_json::{Map, Value};

/// Ordered mapping from field name to extracted value.
pub type Document = Map<String, Value>;

/// Replace every character outside `[A-Za-z0-9_-]` with `_` so the key can be used
/// as an element name.
pub fn sanitize_name(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Text of a scalar as it appears inside an element.
/// Containers fall back to their compact JSON form.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Text of a field where lists of extracted strings are common: non-empty list items
/// are joined line by line.
pub fn field_text(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(field_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        other => value_text(other),
    }
}

/// First non-empty string carried by a value (the value itself, or the first usable
/// list item).
pub fn first_text(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().find_map(first_text),
        Value::Object(_) | Value::Null => None,
        other => {
            let text = value_text(other);
            (!text.is_empty()).then_some(text)
        }
    }
}

/// Null, blank strings and containers holding nothing but empties.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.iter().all(is_empty_value),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Rebuild a value with `f` applied to every string leaf. Keys are left untouched.
pub fn map_strings<F>(value: Value, f: &F) -> Value
where
    F: Fn(&str) -> String,
{
    match value {
        Value::String(s) => Value::String(f(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| map_strings(v, f)).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, map_strings(v, f)))
                .collect(),
        ),
        other => other,
    }
}
