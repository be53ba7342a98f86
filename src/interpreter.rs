//! Rule interpreter
//!
//! Runs a rule's steps in order over one HTML page. Each step reads the current
//! Intermediate Document and replaces it with its own output. The first terminal
//! step (`wrap_xml`, `build_xml_tree`, `build_taifun_xml`) returns the final XML and
//! anything after it is never looked at, not even parsed.
//!
//! An interpreter holds only its settings; every run owns a fresh document, so a
//! single instance can be shared between threads.

use std::fmt::Display;
use std::mem;

use chrono::{Local, NaiveDateTime};
use scraper::Html;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::TransformSettings;
use crate::document::{field_text, value_text, Document};
use crate::error::Result;
use crate::extractors::data::extract_from_data;
use crate::extractors::html::{extract_elements, extract_text};
use crate::mapping::map_to_target_fields;
use crate::normalize::{clean_whitespace, remove_html_tags};
use crate::rules::{BuildTaifunXmlStep, ExtractDataStep, OutputFormat, RuleDefinition, RuleStore, Step};
use crate::xml::builder::{self, CONTACT_PERSON_KEY, CONTACT_PHONE_KEY, TAIFUN_FIELDS};
use crate::xml::tree::Element;

/// Root element of the default serialization.
pub const DEFAULT_ROOT: &str = "document";

/// Key an `extract_data` result is stored under when it cannot replace the document.
pub const DEFAULT_DATA_KEY: &str = "data";

/// Where a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// A terminal step produced the final XML
    Xml(String),
    /// The steps ran out without a terminal step
    Document(Document),
}

#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    settings: TransformSettings,
}

impl Interpreter {
    pub fn new(settings: TransformSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TransformSettings {
        &self.settings
    }

    pub fn run(&self, html: &str, steps: &[Value]) -> Result<Outcome> {
        self.run_at(html, steps, Local::now().naive_local())
    }

    /// Run `steps` with `now` as the clock for generated timestamps.
    pub fn run_at(&self, html: &str, steps: &[Value], now: NaiveDateTime) -> Result<Outcome> {
        let page = Html::parse_document(html);
        let mut document = Document::new();

        for (index, raw) in steps.iter().enumerate() {
            let step = Step::from_value(raw)?;
            debug!(index, action = step.action(), "Executing step");

            match &step {
                Step::ExtractText(s) => {
                    let key = s.output.clone().unwrap_or_else(|| self.settings.default_output_key.clone());
                    let text = extract_text(&page, s.target.as_deref(), s.max_length, &self.settings.ellipsis);
                    document.insert(key, Value::String(text));
                }
                Step::ExtractElements(s) => {
                    let found = extract_elements(&page, &s.selectors, self.settings.max_links, self.settings.max_texts);
                    document.extend(found);
                }
                Step::CleanWhitespace(s) => {
                    document = clean_whitespace(mem::take(&mut document), s.normalize);
                }
                Step::RemoveHtmlTags(s) => {
                    document = remove_html_tags(mem::take(&mut document), s.preserve_structure);
                }
                Step::ExtractData(s) => {
                    document = apply_extract_data(mem::take(&mut document), s);
                }
                Step::MapToTaifunFields(s) => {
                    document = map_to_target_fields(mem::take(&mut document), &s.field_mapping);
                }
                Step::WrapXml(s) => {
                    let xml = builder::wrap_xml(&document, &s.root_element, &s.content_element, &s.add_metadata, now)?;
                    return Ok(Outcome::Xml(xml));
                }
                Step::BuildXmlTree(s) => {
                    return Ok(Outcome::Xml(builder::build_xml_tree(&document, &s.structure)?));
                }
                Step::BuildTaifunXml(s) => {
                    return Ok(Outcome::Xml(self.build_taifun(document, s)?));
                }
                Step::Unknown => {
                    debug!(index, "Skipping unknown action");
                }
            }
        }

        Ok(Outcome::Document(document))
    }

    /// XML for `html` under `steps`. Never fails: a run that errors yields an
    /// `<error>` document instead.
    pub fn transform_html_to_xml(&self, html: &str, steps: &[Value]) -> String {
        let result = self.run(html, steps).and_then(|outcome| match outcome {
            Outcome::Xml(xml) => Ok(xml),
            Outcome::Document(document) => Ok(builder::document_to_xml(&document, DEFAULT_ROOT)?),
        });

        result.unwrap_or_else(|e| {
            error!(error = %e, "HTML to XML transformation failed");
            error_xml(&e)
        })
    }

    /// Run a stored rule and render the result in its output format. Only XML output
    /// is covered by the error-XML fallback; other formats return the error.
    pub fn execute_rule(&self, rule: &RuleDefinition, html: &str) -> Result<String> {
        info!(rule = %rule.name, steps = rule.steps.len(), "Applying transform rule");

        let output = match rule.output_format {
            OutputFormat::Xml | OutputFormat::Html => self.transform_html_to_xml(html, &rule.steps),
            OutputFormat::Json => match self.run(html, &rule.steps)? {
                Outcome::Xml(xml) => xml,
                Outcome::Document(document) => serde_json::to_string_pretty(&document)?,
            },
            OutputFormat::Text => match self.run(html, &rule.steps)? {
                Outcome::Xml(xml) => xml,
                Outcome::Document(document) => document_text(&document),
            },
        };

        info!(rule = %rule.name, bytes = output.len(), "Transform rule finished");
        Ok(output)
    }

    /// Look up `name` in `store` and apply it to `input`. A string input is the page
    /// itself; a mapping with an `html` key supplies the page under that key; anything
    /// else is rendered to text first.
    pub fn transform_with_rule<S>(&self, store: &S, input: &Value, name: &str) -> Result<String>
    where
        S: RuleStore + ?Sized,
    {
        let rule = store.require(name)?;
        if !rule.description.is_empty() {
            debug!(rule = %rule.name, description = %rule.description, "Resolved transform rule");
        }

        let html = match input {
            Value::String(html) => html.clone(),
            Value::Object(map) if map.contains_key("html") => map.get("html").map(value_text).unwrap_or_default(),
            other => other.to_string(),
        };

        self.execute_rule(&rule, &html)
    }

    fn build_taifun(&self, mut document: Document, step: &BuildTaifunXmlStep) -> Result<String> {
        if !step.preserve_customer_data {
            document.retain(|key, _| {
                TAIFUN_FIELDS.contains(&key.as_str()) || key == CONTACT_PERSON_KEY || key == CONTACT_PHONE_KEY
            });
        }
        Ok(builder::build_taifun_xml(
            &document,
            &self.settings.taifun.record_tag,
            &step.template_type,
        )?)
    }
}

/// Mapping results replace the document unless an output key is named; everything
/// else lands under the output key.
fn apply_extract_data(document: Document, step: &ExtractDataStep) -> Document {
    let result = extract_from_data(Value::Object(document.clone()), &step.config);

    match (&step.output, result) {
        (None, Value::Object(map)) => map,
        (output, value) => {
            let mut document = document;
            let key = output.clone().unwrap_or_else(|| DEFAULT_DATA_KEY.to_string());
            document.insert(key, value);
            document
        }
    }
}

/// Non-empty field texts, one per line.
fn document_text(document: &Document) -> String {
    document
        .values()
        .map(field_text)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// `<error><message>Transformation failed: …</message></error>`, message escaped.
pub fn error_xml(error: &dyn Display) -> String {
    let mut root = Element::new("error");
    root.push_element(Element::new("message").with_text(format!("Transformation failed: {error}")));
    root.to_compact_string(None)
        .unwrap_or_else(|_| "<error><message>Transformation failed</message></error>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::MemoryRuleStore;
    use chrono::NaiveDate;
    use serde_json::json;

    fn steps(value: Value) -> Vec<Value> {
        value.as_array().cloned().unwrap()
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, 29).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    #[test]
    fn test_no_terminal_step_returns_document() {
        let interpreter = Interpreter::default();
        let outcome = interpreter
            .run_at(
                "<p>  a   b </p><h1>T</h1>",
                &steps(json!([
                    {"action": "extract_text", "target": "p"},
                    {"action": "extract_elements", "selectors": {"titles": "h1"}},
                    {"action": "clean_whitespace"}
                ])),
                now(),
            )
            .unwrap();

        let Outcome::Document(document) = outcome else {
            panic!("expected a document");
        };
        assert_eq!(Value::Object(document), json!({"content": "a b", "titles": ["T"]}));
    }

    #[test]
    fn test_default_serialization() {
        let interpreter = Interpreter::default();
        let xml = interpreter.transform_html_to_xml(
            "<h1>Title</h1>",
            &steps(json!([{"action": "extract_elements", "selectors": {"page title": "h1"}}])),
        );
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<document>\n<page_title>\n<item>Title</item>\n</page_title>\n</document>"
        );
    }

    #[test]
    fn test_unknown_actions_are_skipped() {
        let interpreter = Interpreter::default();
        let outcome = interpreter
            .run_at(
                "<p>x</p>",
                &steps(json!([
                    {"action": "describe", "note": "scraped by hand"},
                    {"action": "extract_text", "target": "p"}
                ])),
                now(),
            )
            .unwrap();
        assert_eq!(outcome, Outcome::Document(json!({"content": "x"}).as_object().cloned().unwrap()));
    }

    #[test]
    fn test_failure_becomes_error_xml() {
        let interpreter = Interpreter::default();
        let xml = interpreter.transform_html_to_xml(
            "<p>x</p>",
            &steps(json!([{"action": "build_xml_tree", "structure": {}}])),
        );
        assert_eq!(
            xml,
            "<error><message>Transformation failed: build_xml_tree structure has no root element</message></error>"
        );
    }

    #[test]
    fn test_malformed_step_after_terminal_step_is_never_parsed() {
        let interpreter = Interpreter::default();
        let xml = interpreter.transform_html_to_xml(
            "<p>kept</p>",
            &steps(json!([
                {"action": "extract_text", "target": "p"},
                {"action": "wrap_xml"},
                {"action": "extract_text", "max_length": "later"}
            ])),
        );
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<document>\n<content>kept</content>\n</document>"
        );
    }

    #[test]
    fn test_malformed_reachable_step_becomes_error_xml() {
        let interpreter = Interpreter::default();
        let xml = interpreter.transform_html_to_xml(
            "<p>x</p>",
            &steps(json!([
                {"note": "no action, skipped"},
                {"action": "extract_text", "max_length": "later"},
                {"action": "wrap_xml"}
            ])),
        );
        assert!(xml.starts_with("<error><message>Transformation failed: invalid 'extract_text' step: "));
    }

    #[test]
    fn test_error_xml_escapes_message() {
        assert_eq!(
            error_xml(&"bad <tag> & more"),
            "<error><message>Transformation failed: bad &lt;tag&gt; &amp; more</message></error>"
        );
    }

    #[test]
    fn test_extract_data_step() {
        let interpreter = Interpreter::default();
        let html = "<h1>A</h1><p>one</p><p>two</p>";

        let outcome = interpreter
            .run_at(
                html,
                &steps(json!([
                    {"action": "extract_elements", "selectors": {"title": "h1", "paragraphs": "p"}},
                    {"action": "extract_data", "extract_keys": ["paragraphs"]}
                ])),
                now(),
            )
            .unwrap();
        assert_eq!(outcome, Outcome::Document(json!({"paragraphs": ["one", "two"]}).as_object().cloned().unwrap()));

        let outcome = interpreter
            .run_at(
                html,
                &steps(json!([
                    {"action": "extract_elements", "selectors": {"paragraphs": "p"}},
                    {"action": "extract_data", "json_path": "$.paragraphs.1", "output": "second"}
                ])),
                now(),
            )
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Document(json!({"paragraphs": ["one", "two"], "second": "two"}).as_object().cloned().unwrap())
        );
    }

    #[test]
    fn test_taifun_without_customer_data() {
        let interpreter = Interpreter::default();
        let outcome = interpreter
            .run_at(
                "<div class=\"order-nr\">B-1</div><p>extra</p>",
                &steps(json!([
                    {"action": "extract_elements", "selectors": {"order_number": ".order-nr", "paragraphs": "p"}},
                    {"action": "map_to_taifun_fields", "field_mapping": {"order_number": "BestellNr"}},
                    {"action": "build_taifun_xml", "preserve_customer_data": false}
                ])),
                now(),
            )
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Xml(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Ah type=\"work_order\">\n<BestellNr>B-1</BestellNr>\n</Ah>"
                    .to_string()
            )
        );
    }

    #[test]
    fn test_output_formats() {
        let interpreter = Interpreter::default();
        let rule = |format: &str| {
            RuleDefinition::from_value(json!({
                "name": "r",
                "steps": [{"action": "extract_elements", "selectors": {"items": "li"}}],
                "output_format": format
            }))
            .unwrap()
        };
        let html = "<ul><li>a</li><li>b</li></ul>";

        assert_eq!(
            interpreter.execute_rule(&rule("json"), html).unwrap(),
            "{\n  \"items\": [\n    \"a\",\n    \"b\"\n  ]\n}"
        );
        assert_eq!(interpreter.execute_rule(&rule("text"), html).unwrap(), "a\nb");
        assert!(interpreter
            .execute_rule(&rule("html"), html)
            .unwrap()
            .starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<document>"));
    }

    #[test]
    fn test_transform_with_rule_input_shapes() {
        let interpreter = Interpreter::default();
        let mut store = MemoryRuleStore::new();
        store.insert(
            RuleDefinition::from_value(json!({
                "name": "first_p",
                "steps": [
                    {"action": "extract_text", "target": "p"},
                    {"action": "wrap_xml"}
                ]
            }))
            .unwrap(),
        );

        let expected = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<document>\n<content>hi</content>\n</document>";
        let from_string = interpreter.transform_with_rule(&store, &json!("<p>hi</p>"), "first_p").unwrap();
        let from_object = interpreter
            .transform_with_rule(&store, &json!({"html": "<p>hi</p>", "url": "x"}), "first_p")
            .unwrap();
        assert_eq!(from_string, expected);
        assert_eq!(from_object, expected);
    }

    #[test]
    fn test_unknown_rule_is_config_error() {
        let interpreter = Interpreter::default();
        let store = MemoryRuleStore::new();
        let err = interpreter.transform_with_rule(&store, &json!("<p/>"), "nope").unwrap_err();
        assert_eq!(err.to_string(), "transform rule 'nope' not found");
    }
}
