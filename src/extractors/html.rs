//! HTML extraction primitives
//!
//! Uses the scraper crate to pull visible text and selected elements out of a parsed
//! page. A selector that matches nothing (or does not parse) yields an empty value.

use indexmap::IndexMap;
use scraper::{ElementRef, Html, Node, Selector};
use serde_json::{json, Value};
use tracing::warn;

use crate::document::Document;

/// Elements whose text is never shown to a reader.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Selector key that collects `{text, href}` records instead of plain text.
pub const LINKS_KEY: &str = "links";

/// Visible text of the whole page (`target` absent or `"body"`) or of the first
/// element matching `target`, truncated to `max_length` characters plus `ellipsis`.
pub fn extract_text(
    document: &Html,
    target: Option<&str>,
    max_length: Option<usize>,
    ellipsis: &str,
) -> String {
    let text = match target {
        None | Some("body") => visible_text(document.root_element()),
        Some(target) => match parse_selector(target) {
            Some(selector) => document
                .select(&selector)
                .next()
                .map(visible_text)
                .unwrap_or_default(),
            None => String::new(),
        },
    };

    match max_length {
        Some(max) if max > 0 && text.chars().count() > max => {
            let mut truncated: String = text.chars().take(max).collect();
            truncated.push_str(ellipsis);
            truncated
        }
        _ => text,
    }
}

/// Collect matches for each named selector. The `links` key gets `{text, href}`
/// records capped at `max_links`; every other key gets text values capped at
/// `max_texts`.
pub fn extract_elements(
    document: &Html,
    selectors: &IndexMap<String, String>,
    max_links: usize,
    max_texts: usize,
) -> Document {
    let mut result = Document::new();

    for (key, selector_str) in selectors {
        let Some(selector) = parse_selector(selector_str) else {
            result.insert(key.clone(), Value::Array(vec![]));
            continue;
        };

        let values: Vec<Value> = if key == LINKS_KEY {
            document
                .select(&selector)
                .take(max_links)
                .map(|el| {
                    json!({
                        "text": visible_text(el),
                        "href": el.value().attr("href").unwrap_or(""),
                    })
                })
                .collect()
        } else {
            document
                .select(&selector)
                .take(max_texts)
                .map(|el| Value::String(visible_text(el)))
                .collect()
        };

        result.insert(key.clone(), Value::Array(values));
    }

    result
}

/// Trimmed, non-empty text nodes under `element` joined by single spaces, skipping
/// script and style content.
pub fn visible_text(element: ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for node in element.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| HIDDEN_ELEMENTS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }

    parts.join(" ")
}

fn parse_selector(selector_str: &str) -> Option<Selector> {
    match Selector::parse(selector_str) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!(selector = selector_str, error = %e, "Ignoring unparsable CSS selector");
            None
        }
    }
}
