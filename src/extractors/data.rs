//! Generic data extraction
//!
//! Picks, filters and reshapes values out of arbitrary nested data (not HTML). The
//! first applicable option wins, in this order: `extract_keys`, `extract_paths`,
//! `extract_list`, `json_path`, `regex_patterns`. Options that do not fit the shape of
//! the input are skipped, and when nothing applies the input comes back unchanged.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Extraction options, usually deserialized from a request or a rule step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Keep only these top-level keys of a mapping, in this order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract_keys: Option<Vec<String>>,
    /// Output name -> dot-delimited path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract_paths: Option<IndexMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract_list: Option<ListExtraction>,
    /// `$.a.b.0` style path; anything without the `$.` prefix returns the input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,
    /// Output name -> regex, searched over a string input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex_patterns: Option<IndexMap<String, String>>,
}

/// List selection. Only the first present option is used: `indices`, `first`, `last`,
/// then `filter`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListExtraction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<ListFilter>,
}

/// Filter clauses; every present clause must hold for an item to be kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_equals: Option<FieldEquals>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldEquals {
    pub field: String,
    pub value: Value,
}

/// Runtime type names understood by the `value_type` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    /// Integer or floating point
    Number,
    Integer,
    Float,
    Boolean,
    Dict,
    List,
}

impl ValueType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "float" => Some(Self::Float),
            "boolean" => Some(Self::Boolean),
            "dict" => Some(Self::Dict),
            "list" => Some(Self::List),
            _ => None,
        }
    }

    pub fn matches(self, value: &Value) -> bool {
        match (self, value) {
            (Self::String, Value::String(_)) => true,
            (Self::Number, Value::Number(_)) => true,
            (Self::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (Self::Float, Value::Number(n)) => n.is_f64(),
            (Self::Boolean, Value::Bool(_)) => true,
            (Self::Dict, Value::Object(_)) => true,
            (Self::List, Value::Array(_)) => true,
            _ => false,
        }
    }
}

/// Apply `config` to `data`.
pub fn extract_from_data(data: Value, config: &ExtractConfig) -> Value {
    if let (Value::Object(map), Some(keys)) = (&data, &config.extract_keys) {
        if !keys.is_empty() {
            return Value::Object(extract_keys(map, keys));
        }
    }
    if let (Value::Object(_), Some(paths)) = (&data, &config.extract_paths) {
        if !paths.is_empty() {
            return Value::Object(extract_paths(&data, paths));
        }
    }
    if let (Value::Array(items), Some(list)) = (&data, &config.extract_list) {
        return extract_list(items, list);
    }
    if let Some(path) = config.json_path.as_deref().filter(|p| !p.is_empty()) {
        return extract_json_path(data, path);
    }
    if let (Value::String(text), Some(patterns)) = (&data, &config.regex_patterns) {
        if !patterns.is_empty() {
            return Value::Object(extract_regex_patterns(text, patterns));
        }
    }
    data
}

pub fn extract_keys(map: &Map<String, Value>, keys: &[String]) -> Map<String, Value> {
    keys.iter()
        .filter_map(|k| map.get(k).map(|v| (k.clone(), v.clone())))
        .collect()
}

/// Named path lookups; names whose path does not resolve (or resolves to null) are
/// left out.
pub fn extract_paths(data: &Value, paths: &IndexMap<String, String>) -> Map<String, Value> {
    paths
        .iter()
        .filter_map(|(name, path)| match get_nested_value(data, path) {
            Some(Value::Null) | None => None,
            Some(value) => Some((name.clone(), value.clone())),
        })
        .collect()
}

/// A list block without any option leaves the list as is.
fn extract_list(items: &[Value], list: &ListExtraction) -> Value {
    if let Some(indices) = &list.indices {
        let picked = indices
            .iter()
            .filter_map(|&i| usize::try_from(i).ok())
            .filter_map(|i| items.get(i).cloned())
            .collect();
        return Value::Array(picked);
    }
    if let Some(n) = list.first {
        return Value::Array(items.iter().take(n).cloned().collect());
    }
    if let Some(n) = list.last {
        // `last: 0` keeps the whole list
        let start = if n == 0 { 0 } else { items.len().saturating_sub(n) };
        return Value::Array(items[start..].to_vec());
    }
    if let Some(filter) = &list.filter {
        return Value::Array(filter_list(items, filter));
    }
    Value::Array(items.to_vec())
}

/// Keep the items that satisfy every clause of `filter`, in their original order.
/// Items that are not mappings are not excluded by the field clauses.
pub fn filter_list(items: &[Value], filter: &ListFilter) -> Vec<Value> {
    let value_type = filter.value_type.as_deref().and_then(ValueType::from_name);

    items
        .iter()
        .filter(|item| {
            if let (Some(eq), Value::Object(map)) = (&filter.field_equals, item) {
                if map.get(&eq.field) != Some(&eq.value) {
                    return false;
                }
            }
            if let (Some(field), Value::Object(map)) = (&filter.has_field, item) {
                if !map.contains_key(field) {
                    return false;
                }
            }
            if let Some(ty) = value_type {
                if !ty.matches(item) {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect()
}

/// Minimal JSONPath: only `$.`-prefixed plain dot paths are resolved. Any other syntax
/// returns the input unchanged; an unresolved path yields null.
pub fn extract_json_path(data: Value, json_path: &str) -> Value {
    match json_path.strip_prefix("$.") {
        Some(path) => get_nested_value(&data, path).cloned().unwrap_or(Value::Null),
        None => data,
    }
}

/// Follow a dot-delimited path. Numeric segments index into lists.
pub fn get_nested_value<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = data;
    for key in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(key)?,
            Value::Array(items) if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) => {
                items.get(key.parse::<usize>().ok()?)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Every named pattern yields the list of its non-overlapping matches, or null when it
/// does not match. A pattern with one capture group yields that group's text; with
/// several, a list of group texts per match. A pattern that does not compile yields
/// null without affecting its siblings.
pub fn extract_regex_patterns(text: &str, patterns: &IndexMap<String, String>) -> Map<String, Value> {
    let mut result = Map::new();

    for (name, pattern) in patterns {
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Invalid regex pattern");
                result.insert(name.clone(), Value::Null);
                continue;
            }
        };

        let matches: Vec<Value> = re
            .captures_iter(text)
            .map(|caps| match caps.len() {
                1 => Value::String(caps[0].to_string()),
                2 => Value::String(group_text(&caps, 1)),
                n => Value::Array((1..n).map(|i| Value::String(group_text(&caps, i))).collect()),
            })
            .collect();

        let value = if matches.is_empty() {
            Value::Null
        } else {
            Value::Array(matches)
        };
        result.insert(name.clone(), value);
    }

    result
}

fn group_text(caps: &regex::Captures<'_>, index: usize) -> String {
    caps.get(index)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
