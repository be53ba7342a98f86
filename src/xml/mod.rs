//! XML output: generic serialization, rule-driven builders and the work-order
//! template round trip.

pub mod builder;
pub mod template;
pub mod tree;
pub mod validate;

pub use builder::{build_taifun_xml, build_xml_tree, document_to_xml, wrap_xml};
pub use template::{decode_template, encode_output, populate, populate_at};
pub use tree::Element;
pub use validate::{validate, ValidationResult};
