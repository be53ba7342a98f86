//! Extraction primitives
//!
//! `html` pulls text and elements out of a parsed page; `data` reshapes arbitrary
//! nested values.

pub mod data;
pub mod html;

pub use data::{extract_from_data, ExtractConfig, ListExtraction, ListFilter};
pub use html::{extract_elements, extract_text};
