//! Field mapper
//!
//! Renames extracted fields to target-schema field names. Two source fields get
//! composite parsing instead of a plain copy: `location_address` is split into street,
//! zip and city, `appointment_time` into a from/to time pair.

use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{first_text, is_empty_value, Document};

pub const ADDRESS_FIELD: &str = "location_address";
pub const TIME_RANGE_FIELD: &str = "appointment_time";

static ZIP_CITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{5})\s+(.+)").unwrap());
static CLOCK_TIME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{1,2}):(\d{2})").unwrap());

/// One target field name or several, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldTarget {
    One(String),
    Many(Vec<String>),
}

/// Apply `mapping` to `document`. Mapped sources that are absent or empty produce
/// nothing; unmapped keys pass through under their own name. Document order is kept.
pub fn map_to_target_fields(document: Document, mapping: &IndexMap<String, FieldTarget>) -> Document {
    let mut result = Document::new();

    for (key, value) in document {
        let Some(target) = mapping.get(&key) else {
            result.insert(key, value);
            continue;
        };
        if is_empty_value(&value) {
            continue;
        }

        match target {
            FieldTarget::One(name) => {
                result.insert(name.clone(), value);
            }
            FieldTarget::Many(names) if key == ADDRESS_FIELD => {
                let text = first_text(&value).unwrap_or_default();
                map_address(&text, names, &mut result);
            }
            FieldTarget::Many(names) if key == TIME_RANGE_FIELD => {
                let text = first_text(&value).unwrap_or_default();
                map_time_range(&text, names, &mut result);
            }
            FieldTarget::Many(names) => {
                for name in names {
                    result.insert(name.clone(), value.clone());
                }
            }
        }
    }

    result
}

/// `"<street>, <zip> <city>"`: the first segment goes to the first target; zip and city
/// come from the last segment and are left unset when it does not look like one.
fn map_address(text: &str, targets: &[String], out: &mut Document) {
    let segments: Vec<&str> = text.split(',').map(str::trim).collect();

    if let (Some(street_target), Some(street)) = (targets.first(), segments.first()) {
        if !street.is_empty() {
            out.insert(street_target.clone(), Value::String(street.to_string()));
        }
    }

    let Some(caps) = segments.last().and_then(|last| ZIP_CITY.captures(last)) else {
        return;
    };
    if let Some(zip_target) = targets.get(1) {
        out.insert(zip_target.clone(), Value::String(caps[1].to_string()));
    }
    if let Some(city_target) = targets.get(2) {
        out.insert(city_target.clone(), Value::String(caps[2].trim().to_string()));
    }
}

/// Two `H:MM` tokens become `HH:MM:00` from/to values. Anything else is kept verbatim
/// in the from target alone.
fn map_time_range(text: &str, targets: &[String], out: &mut Document) {
    let times: Vec<String> = CLOCK_TIME
        .captures_iter(text)
        .take(2)
        .map(|caps| format!("{:0>2}:{}:00", &caps[1], &caps[2]))
        .collect();

    match (times.as_slice(), targets) {
        ([from, to], [from_target, rest @ ..]) => {
            out.insert(from_target.clone(), Value::String(from.clone()));
            if let Some(to_target) = rest.first() {
                out.insert(to_target.clone(), Value::String(to.clone()));
            }
        }
        (_, [from_target, ..]) => {
            out.insert(from_target.clone(), Value::String(text.to_string()));
        }
        (_, []) => {}
    }
}
