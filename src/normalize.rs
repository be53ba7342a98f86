//! Text normalization steps
//!
//! Both walk the whole document and rewrite string leaves only; numbers, booleans and
//! the document's keys pass through untouched.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::document::{map_strings, Document};

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static BLOCK_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</(p|div|br)>").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Trim every string; with `normalize` also collapse inner whitespace runs to one space.
pub fn clean_whitespace(document: Document, normalize: bool) -> Document {
    rewrite(document, |text| clean_text(text, normalize))
}

/// Strip `<...>` markup from every string. With `preserve_structure`, closing
/// `p`/`div`/`br` tags become line breaks first.
pub fn remove_html_tags(document: Document, preserve_structure: bool) -> Document {
    rewrite(document, |text| strip_tags(text, preserve_structure))
}

pub fn clean_text(text: &str, normalize: bool) -> String {
    let trimmed = text.trim();
    if normalize {
        WHITESPACE_RUN.replace_all(trimmed, " ").into_owned()
    } else {
        trimmed.to_string()
    }
}

pub fn strip_tags(text: &str, preserve_structure: bool) -> String {
    if preserve_structure {
        let broken = BLOCK_CLOSE.replace_all(text, "\n");
        TAG.replace_all(&broken, "").into_owned()
    } else {
        TAG.replace_all(text, "").into_owned()
    }
}

fn rewrite<F>(document: Document, f: F) -> Document
where
    F: Fn(&str) -> String,
{
    match map_strings(Value::Object(document), &f) {
        Value::Object(map) => map,
        // map_strings never changes a value's shape
        _ => Document::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_clean_whitespace_normalize() {
        let input = doc(json!({
            "content": "  Hello \n\t  World  ",
            "items": ["  a  b ", 3],
            "nested": {"x": "\u{a0}y  z"}
        }));

        let cleaned = clean_whitespace(input, true);
        assert_eq!(
            Value::Object(cleaned),
            json!({"content": "Hello World", "items": ["a b", 3], "nested": {"x": "y z"}})
        );
    }

    #[test]
    fn test_clean_whitespace_trim_only() {
        let cleaned = clean_whitespace(doc(json!({"content": "  a \n b  "})), false);
        assert_eq!(cleaned["content"], "a \n b");
    }

    #[test]
    fn test_clean_whitespace_idempotent() {
        let input = doc(json!({
            "a": " one   two ",
            "b": [" \tthree\n", {"c": "four    five "}],
            "d": null
        }));
        let once = clean_whitespace(input, true);
        let twice = clean_whitespace(once.clone(), true);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_remove_html_tags() {
        let input = doc(json!({"content": "<p>Hello</p><div><b>World</b></div>"}));
        let stripped = remove_html_tags(input, false);
        assert_eq!(stripped["content"], "HelloWorld");
    }

    #[test]
    fn test_remove_html_tags_preserve_structure() {
        let input = doc(json!({"content": ["<p>Hello</p><div>World</div>", 7]}));
        let stripped = remove_html_tags(input, true);
        assert_eq!(stripped["content"], json!(["Hello\nWorld\n", 7]));

        let input = doc(json!({"content": "line one</br>line <i>two</i>"}));
        let stripped = remove_html_tags(input, true);
        assert_eq!(stripped["content"], "line one\nline two");
    }
}
