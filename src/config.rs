//! Transformation settings
//!
//! Every limit and fixed name the primitives rely on lives here, so hosts can tune them
//! from a TOML file without touching rule definitions. Defaults reproduce the stock
//! behavior exactly.

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings handed to the interpreter by its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformSettings {
    /// Cap for the `links` key of `extract_elements`
    pub max_links: usize,
    /// Cap for every other `extract_elements` key
    pub max_texts: usize,
    /// Marker appended when `extract_text` truncates
    pub ellipsis: String,
    /// Key `extract_text` writes to when a step names none
    pub default_output_key: String,
    pub taifun: TaifunSettings,
}

/// Names of the work-order target schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaifunSettings {
    pub namespace: String,
    pub collection_tag: String,
    pub record_tag: String,
    pub required_fields: Vec<String>,
    pub declaration: String,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            max_links: 10,
            max_texts: 20,
            ellipsis: "...".to_string(),
            default_output_key: "content".to_string(),
            taifun: TaifunSettings::default(),
        }
    }
}

impl Default for TaifunSettings {
    fn default() -> Self {
        Self {
            namespace: "urn:taifun-software.de:schema:TAIFUN".to_string(),
            collection_tag: "AhList".to_string(),
            record_tag: "Ah".to_string(),
            required_fields: vec!["Nr".to_string(), "Date".to_string(), "Info".to_string()],
            declaration: r#"<?xml version="1.0" encoding="windows-1252"?>"#.to_string(),
        }
    }
}

impl TransformSettings {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load settings from a TOML file, then apply environment overrides.
    /// A missing file is not an error; defaults are used instead.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml_str(&content)?
        } else {
            Self::default()
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Settings for hosts without their own configuration: the file named by
    /// `RULE_TRANSFORM_CONFIG` if set, then environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var("RULE_TRANSFORM_CONFIG") {
            Ok(path) => Self::from_path(Path::new(&path)),
            Err(_) => {
                let mut settings = Self::default();
                settings.apply_env_overrides();
                Ok(settings)
            }
        }
    }

    /// Environment variables take precedence over file values.
    pub fn apply_env_overrides(&mut self) {
        if let Some(max_links) = env_usize("RULE_TRANSFORM_MAX_LINKS") {
            self.max_links = max_links;
        }
        if let Some(max_texts) = env_usize("RULE_TRANSFORM_MAX_TEXTS") {
            self.max_texts = max_texts;
        }
        if let Ok(ellipsis) = env::var("RULE_TRANSFORM_ELLIPSIS") {
            self.ellipsis = ellipsis;
        }
    }
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok()?.trim().parse().ok()
}
