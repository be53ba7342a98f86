//! Structural checks for populated work-order XML.

use serde::{Deserialize, Serialize};

use crate::config::TaifunSettings;
use crate::xml::tree;

/// Outcome of [`validate`]. Warnings never make a document invalid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn error(&mut self, message: String) {
        self.valid = false;
        self.errors.push(message);
    }
}

pub fn validate(xml: &str, settings: &TaifunSettings) -> ValidationResult {
    let root = match tree::parse(xml) {
        Ok(root) => root,
        Err(e) => {
            return ValidationResult {
                valid: false,
                errors: vec![format!("XML parse error: {e}")],
                warnings: vec![],
            }
        }
    };

    let mut result = ValidationResult {
        valid: true,
        ..ValidationResult::default()
    };

    if root.local_name() != settings.collection_tag {
        result.error(format!("root element should be '{}'", settings.collection_tag));
    }

    // raw substring check, the namespace may be declared anywhere
    if !xml.contains(&settings.namespace) {
        result.warnings.push("Taifun namespace is missing".to_string());
    }

    let record_tag = settings.record_tag.as_str();
    match root.find(|el| el.local_name() == record_tag) {
        None => result.error(format!("no <{record_tag}> record element found")),
        Some(record) => {
            for field in &settings.required_fields {
                if record.child(field).is_none() {
                    result.warnings.push(format!("field '{field}' is missing"));
                }
            }
        }
    }

    result
}
