//! Rule-driven HTML to XML transformation
//!
//! Interprets stored transform rules against HTML pages:
//! - HTML text and element extraction (CSS selectors)
//! - Whitespace and markup normalization
//! - Generic data extraction (paths, list filters, regex)
//! - Field mapping onto the Taifun work-order schema
//! - XML building, template population and validation
//!
//! Hosts can link the static library and call the `rt_*` functions in [`ffi`].

pub mod config;
pub mod document;
pub mod error;
pub mod extractors;
pub mod ffi;
pub mod interpreter;
pub mod mapping;
pub mod normalize;
pub mod rules;
pub mod value_rules;
pub mod xml;

pub use config::{TaifunSettings, TransformSettings};
pub use document::Document;
pub use error::{ConfigError, Result, TemplateError, TransformError, XmlError};
pub use interpreter::{Interpreter, Outcome};
pub use rules::{MemoryRuleStore, OutputFormat, RuleDefinition, RuleStore, Step};
pub use xml::ValidationResult;
