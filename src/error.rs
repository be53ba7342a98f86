//! Error taxonomy
//!
//! Extraction misses never show up here: a selector that matches nothing or a path
//! that runs off the end of the data resolves to an empty value instead. These types
//! cover the conditions a caller can act on.

use thiserror::Error;

/// Missing or unusable configuration: unknown rule names, absent arguments.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("transform rule '{name}' not found")]
    RuleNotFound { name: String },

    #[error("{argument} required for {context}")]
    MissingArgument { argument: String, context: String },

    #[error("invalid '{action}' step: {source}")]
    InvalidStep {
        action: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid rule definition '{name}': {source}")]
    InvalidRule {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Low-level XML reading/writing failures.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Syntax(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("XML write error: {0}")]
    Write(#[from] std::io::Error),

    #[error("XML is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("closing tag </{found}> does not match <{expected}>")]
    UnbalancedTag { expected: String, found: String },

    #[error("element <{0}> is never closed")]
    UnclosedTag(String),

    #[error("element <{0}> follows the root element")]
    MultipleRoots(String),

    #[error("document has no root element")]
    NoRootElement,
}

/// Template population failures. A template without a record element is fatal.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("no <{tag}> record element found in template")]
    MissingRecord { tag: String },

    #[error(transparent)]
    Parse(#[from] XmlError),
}

/// Anything that can abort a rule run.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("build_xml_tree structure has no root element")]
    EmptyStructure,

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid regex: {0}")]
    Regex(#[from] regex::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = TransformError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_not_found_names_the_rule() {
        let err = ConfigError::RuleNotFound {
            name: "html_to_missing".to_string(),
        };
        assert_eq!(err.to_string(), "transform rule 'html_to_missing' not found");
    }

    #[test]
    fn test_missing_argument_message() {
        let err = ConfigError::MissingArgument {
            argument: "rule_json".to_string(),
            context: "rt_transform_html".to_string(),
        };
        assert_eq!(err.to_string(), "rule_json required for rt_transform_html");
    }

    #[test]
    fn test_template_error_is_transparent_in_transform_error() {
        let err: TransformError = TemplateError::MissingRecord {
            tag: "Ah".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "no <Ah> record element found in template");
    }
}
