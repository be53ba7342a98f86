//! Value rules
//!
//! Type-directed transformations of a single value, driven by a flat rule object such
//! as `{"uppercase": true, "prefix": "ID-"}`. Which group applies depends on the value:
//! strings, numbers, mappings and lists each have their own options. The general
//! options (`to_json`, `from_json`) run last for every type.
//!
//! Operations are switched on by a flag and parameterized by a sibling field
//! (`multiply` + `multiply_by`, `limit` + `limit_size`, ...), matching the rule format
//! hosts already store.

use chrono::{Local, NaiveDateTime};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::warn;

use crate::error::TransformError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueRules {
    // strings
    pub uppercase: bool,
    pub lowercase: bool,
    pub title_case: bool,
    pub capitalize: bool,
    pub strip: bool,
    pub replace: Option<Replace>,
    pub regex_replace: Option<RegexReplace>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,

    // numbers
    pub multiply: bool,
    pub multiply_by: Number,
    pub add: bool,
    pub add_value: Number,
    pub subtract: bool,
    pub subtract_value: Number,
    pub divide: bool,
    pub divide_by: Number,
    pub round: bool,
    pub decimal_places: i32,
    pub absolute: bool,

    // mappings
    pub filter_keys: bool,
    pub allowed_keys: Vec<String>,
    pub exclude_keys: bool,
    pub excluded_keys: Vec<String>,
    pub rename_keys: bool,
    pub key_mapping: IndexMap<String, String>,
    pub add_timestamp: bool,
    pub flatten: bool,

    // lists
    pub sort: bool,
    pub sort_reverse: bool,
    pub limit: bool,
    pub limit_size: Option<usize>,
    pub unique: bool,
    pub filter_values: bool,
    pub allowed_values: Vec<Value>,

    // any type
    pub to_json: bool,
    pub from_json: bool,
}

impl Default for ValueRules {
    fn default() -> Self {
        Self {
            uppercase: false,
            lowercase: false,
            title_case: false,
            capitalize: false,
            strip: false,
            replace: None,
            regex_replace: None,
            prefix: None,
            suffix: None,
            multiply: false,
            multiply_by: Number::from(1),
            add: false,
            add_value: Number::from(0),
            subtract: false,
            subtract_value: Number::from(0),
            divide: false,
            divide_by: Number::from(1),
            round: false,
            decimal_places: 0,
            absolute: false,
            filter_keys: false,
            allowed_keys: Vec::new(),
            exclude_keys: false,
            excluded_keys: Vec::new(),
            rename_keys: false,
            key_mapping: IndexMap::new(),
            add_timestamp: false,
            flatten: false,
            sort: false,
            sort_reverse: false,
            limit: false,
            limit_size: None,
            unique: false,
            filter_values: false,
            allowed_values: Vec::new(),
            to_json: false,
            from_json: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Replace {
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegexReplace {
    pub pattern: String,
    pub replacement: String,
}

pub fn apply(value: Value, rules: &ValueRules) -> Result<Value, TransformError> {
    apply_at(value, rules, Local::now().naive_local())
}

/// Like [`apply`], with `now` used for `add_timestamp`.
pub fn apply_at(value: Value, rules: &ValueRules, now: NaiveDateTime) -> Result<Value, TransformError> {
    let value = match value {
        Value::String(s) => Value::String(transform_string(s, rules)?),
        Value::Number(n) => transform_number(&n, rules),
        Value::Object(map) => Value::Object(transform_map(map, rules, now)),
        Value::Array(items) => Value::Array(transform_list(items, rules)),
        other => other,
    };
    Ok(transform_general(value, rules))
}

fn transform_string(mut s: String, rules: &ValueRules) -> Result<String, TransformError> {
    if rules.uppercase {
        s = s.to_uppercase();
    } else if rules.lowercase {
        s = s.to_lowercase();
    } else if rules.title_case {
        s = title_case(&s);
    } else if rules.capitalize {
        s = capitalize(&s);
    }

    if rules.strip {
        s = s.trim().to_string();
    }
    if let Some(replace) = rules.replace.as_ref().filter(|r| !r.old.is_empty()) {
        s = s.replace(&replace.old, &replace.new);
    }
    if let Some(rr) = &rules.regex_replace {
        let re = Regex::new(&rr.pattern)?;
        s = re.replace_all(&s, rr.replacement.as_str()).into_owned();
    }
    if let Some(prefix) = &rules.prefix {
        s.insert_str(0, prefix);
    }
    if let Some(suffix) = &rules.suffix {
        s.push_str(suffix);
    }
    Ok(s)
}

/// Upper-case the first letter of every run of letters, lower-case the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Integers stay integers as long as every operand applied is an integer, the
/// arithmetic fits in `i64` and nothing was divided. A number no rule touches is
/// returned as is.
fn transform_number(n: &Number, rules: &ValueRules) -> Value {
    let touched = rules.multiply || rules.add || rules.subtract || rules.divide || rules.round || rules.absolute;
    let Some(mut result) = Arith::of(n).filter(|_| touched) else {
        return Value::Number(n.clone());
    };

    if rules.multiply {
        result = result.combine(&rules.multiply_by, i64::checked_mul, |a, b| a * b);
    }
    if rules.add {
        result = result.combine(&rules.add_value, i64::checked_add, |a, b| a + b);
    }
    if rules.subtract {
        result = result.combine(&rules.subtract_value, i64::checked_sub, |a, b| a - b);
    }
    if rules.divide {
        let divisor = rules.divide_by.as_f64().unwrap_or_default();
        if divisor != 0.0 {
            result = Arith::Float(result.as_f64() / divisor);
        }
    }
    if rules.round {
        result = result.round(rules.decimal_places);
    }
    if rules.absolute {
        result = match result {
            Arith::Int(i) => i.checked_abs().map_or(Arith::Float((i as f64).abs()), Arith::Int),
            Arith::Float(f) => Arith::Float(f.abs()),
        };
    }

    match result {
        Arith::Int(i) => Value::Number(Number::from(i)),
        Arith::Float(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Arith {
    Int(i64),
    Float(f64),
}

impl Arith {
    fn of(n: &Number) -> Option<Self> {
        n.as_i64().map(Arith::Int).or_else(|| n.as_f64().map(Arith::Float))
    }

    fn as_f64(self) -> f64 {
        match self {
            Arith::Int(i) => i as f64,
            Arith::Float(f) => f,
        }
    }

    /// Exact integer arithmetic when both sides are integers, `f64` otherwise or
    /// on overflow.
    fn combine(self, operand: &Number, int_op: fn(i64, i64) -> Option<i64>, float_op: fn(f64, f64) -> f64) -> Self {
        let operand = Arith::of(operand).unwrap_or(Arith::Float(0.0));
        match (self, operand) {
            (Arith::Int(a), Arith::Int(b)) => int_op(a, b).map_or_else(|| Arith::Float(float_op(a as f64, b as f64)), Arith::Int),
            (a, b) => Arith::Float(float_op(a.as_f64(), b.as_f64())),
        }
    }

    fn round(self, decimal_places: i32) -> Self {
        match self {
            Arith::Int(_) if decimal_places >= 0 => self,
            Arith::Int(i) => {
                let factor = 10f64.powi(-decimal_places);
                let rounded = (i as f64 / factor).round() * factor;
                if rounded.abs() < i64::MAX as f64 {
                    Arith::Int(rounded as i64)
                } else {
                    Arith::Float(rounded)
                }
            }
            Arith::Float(f) => {
                let factor = 10f64.powi(decimal_places);
                Arith::Float((f * factor).round() / factor)
            }
        }
    }
}

fn transform_map(mut map: Map<String, Value>, rules: &ValueRules, now: NaiveDateTime) -> Map<String, Value> {
    if rules.filter_keys && !rules.allowed_keys.is_empty() {
        map.retain(|k, _| rules.allowed_keys.contains(k));
    }
    if rules.exclude_keys && !rules.excluded_keys.is_empty() {
        map.retain(|k, _| !rules.excluded_keys.contains(k));
    }
    if rules.rename_keys {
        for (old, new) in &rules.key_mapping {
            // renamed keys move to the end
            if let Some(value) = map.shift_remove(old) {
                map.insert(new.clone(), value);
            }
        }
    }
    if rules.add_timestamp {
        map.insert(
            "timestamp".to_string(),
            Value::String(now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()),
        );
    }
    if rules.flatten {
        let mut flat = Map::new();
        flatten_into(map, "", &mut flat);
        map = flat;
    }
    map
}

fn flatten_into(map: Map<String, Value>, parent: &str, out: &mut Map<String, Value>) {
    for (key, value) in map {
        let key = if parent.is_empty() { key } else { format!("{parent}.{key}") };
        match value {
            Value::Object(nested) => flatten_into(nested, &key, out),
            other => {
                out.insert(key, other);
            }
        }
    }
}

fn transform_list(mut items: Vec<Value>, rules: &ValueRules) -> Vec<Value> {
    if rules.sort {
        sort_values(&mut items, rules.sort_reverse);
    }
    if rules.limit {
        if let Some(size) = rules.limit_size {
            items.truncate(size);
        }
    }
    if rules.unique {
        let mut seen: Vec<Value> = Vec::with_capacity(items.len());
        items.retain(|item| {
            if seen.contains(item) {
                false
            } else {
                seen.push(item.clone());
                true
            }
        });
    }
    if rules.filter_values && !rules.allowed_values.is_empty() {
        items.retain(|item| rules.allowed_values.contains(item));
    }
    items
}

/// Sorts all-number or all-string lists; anything mixed is left alone.
fn sort_values(items: &mut [Value], reverse: bool) {
    if items.iter().all(Value::is_number) {
        items.sort_by(|a, b| {
            let (a, b) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
            a.total_cmp(&b)
        });
    } else if items.iter().all(Value::is_string) {
        items.sort_by(|a, b| a.as_str().cmp(&b.as_str()));
    } else {
        warn!("Cannot sort list with mixed types");
        return;
    }
    if reverse {
        items.reverse();
    }
}

fn transform_general(value: Value, rules: &ValueRules) -> Value {
    let mut value = value;
    if rules.to_json {
        value = Value::String(value.to_string());
    }
    if rules.from_json {
        if let Value::String(s) = &value {
            match serde_json::from_str(s) {
                Ok(parsed) => value = parsed,
                Err(e) => warn!(error = %e, "Cannot parse JSON"),
            }
        }
    }
    value
}
