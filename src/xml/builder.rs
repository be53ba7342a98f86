//! XML builders
//!
//! Turn an Intermediate Document into an XML string. Output always starts with a
//! UTF-8 declaration and puts every element on its own line by breaking between each
//! adjacent `><` pair. This is deliberately not a pretty-printer: callers compare the
//! exact bytes.

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::document::{field_text, is_empty_value, sanitize_name, value_text, Document};
use crate::error::{TransformError, XmlError};
use crate::xml::tree::Element;

/// Format of `timestamp: auto` metadata.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Element used for each entry of a list.
pub const ITEM_ELEMENT: &str = "item";

/// Work-order fields emitted by `build_taifun_xml`, in output order.
pub const TAIFUN_FIELDS: &[&str] = &[
    "Nr",
    "BestellNr",
    "Info",
    "VortextTxt",
    "DateTermin",
    "TimeVon",
    "TimeBis",
    "MtName1",
    "MtAnschriftStr",
    "MtAnschriftPLZ",
    "MtAnschriftOrt",
    "MaMatch",
];

pub const CONTACT_PERSON_KEY: &str = "contact_person";
pub const CONTACT_PHONE_KEY: &str = "contact_phone";

/// Declaration plus one element per line.
pub fn to_xml_string(root: &Element) -> Result<String, XmlError> {
    let compact = root.to_compact_string(Some("UTF-8"))?;
    Ok(compact.replace("><", ">\n<"))
}

/// Generic serialization of a whole document under `root_name`.
pub fn document_to_xml(document: &Document, root_name: &str) -> Result<String, XmlError> {
    let mut root = Element::new(sanitize_name(root_name));
    append_document(&mut root, document);
    to_xml_string(&root)
}

/// One child per key (sanitized), filled recursively from the value.
pub fn append_document(parent: &mut Element, document: &Map<String, Value>) {
    for (key, value) in document {
        let child = parent.push_element(Element::new(sanitize_name(key)));
        append_value(child, value);
    }
}

/// Mappings become child elements, lists become repeated `<item>` children, scalars
/// become text.
pub fn append_value(element: &mut Element, value: &Value) {
    match value {
        Value::Object(map) => append_document(element, map),
        Value::Array(items) => {
            for item in items {
                let child = element.push_element(Element::new(ITEM_ELEMENT));
                append_value(child, item);
            }
        }
        scalar => element.set_text(value_text(scalar)),
    }
}

/// `wrap_xml`: optional `<metadata>` block, then either the single content element or
/// the whole document.
pub fn wrap_xml(
    document: &Document,
    root_element: &str,
    content_element: &str,
    add_metadata: &IndexMap<String, Value>,
    now: NaiveDateTime,
) -> Result<String, XmlError> {
    let mut root = Element::new(sanitize_name(root_element));

    if !add_metadata.is_empty() {
        let metadata = root.push_element(Element::new("metadata"));
        for (key, value) in add_metadata {
            let text = match (key.as_str(), value.as_str()) {
                ("timestamp", Some("auto")) => now.format(TIMESTAMP_FORMAT).to_string(),
                ("length", Some("auto")) => document
                    .get("content")
                    .map(|content| value_text(content).chars().count())
                    .unwrap_or(0)
                    .to_string(),
                _ => value_text(value),
            };
            metadata.push_element(Element::new(sanitize_name(key)).with_text(text));
        }
    }

    match document.get(content_element) {
        Some(content) if document.len() == 1 => {
            root.push_element(Element::new(sanitize_name(content_element)).with_text(value_text(content)));
        }
        _ => append_document(&mut root, document),
    }

    to_xml_string(&root)
}

/// `build_xml_tree`: the first key of `structure` names the root; string leaves copy
/// the document field of that name, nested mappings become nested elements.
pub fn build_xml_tree(document: &Document, structure: &Map<String, Value>) -> Result<String, TransformError> {
    let (root_key, root_spec) = structure.iter().next().ok_or(TransformError::EmptyStructure)?;

    let mut root = Element::new(sanitize_name(root_key));
    if let Value::Object(spec) = root_spec {
        build_from_structure(&mut root, spec, document);
    }

    Ok(to_xml_string(&root)?)
}

fn build_from_structure(parent: &mut Element, spec: &Map<String, Value>, document: &Document) {
    for (key, value) in spec {
        let child = parent.push_element(Element::new(sanitize_name(key)));
        match value {
            Value::Object(nested) => build_from_structure(child, nested, document),
            Value::String(field) => {
                if let Some(content) = document.get(field) {
                    append_value(child, content);
                }
            }
            _ => {}
        }
    }
}

/// `build_taifun_xml`: work-order fields first (only non-empty ones), then every key
/// not consumed as `<AdditionalData>`. Contact person and phone are folded into the
/// detail text when a description is present.
pub fn build_taifun_xml(
    document: &Document,
    record_tag: &str,
    template_type: &str,
) -> Result<String, XmlError> {
    let mut root = Element::new(sanitize_name(record_tag)).with_attribute("type", template_type);

    let non_empty = |key: &str| document.get(key).filter(|v| !is_empty_value(v));
    let detail = non_empty("VortextTxt").or_else(|| non_empty("Info")).map(field_text);
    let contact = contact_lines(document);
    let fold_contact = detail.is_some() && !contact.is_empty();

    for &field in TAIFUN_FIELDS {
        let text = match field {
            "VortextTxt" if fold_contact => detail.as_ref().map(|d| format!("{d}{contact}")),
            _ => non_empty(field).map(field_text),
        };
        if let Some(text) = text {
            root.push_element(Element::new(field).with_text(text));
        }
    }

    let remaining: Vec<(&String, &Value)> = document
        .iter()
        .filter(|(key, _)| !TAIFUN_FIELDS.contains(&key.as_str()))
        .filter(|(key, _)| {
            !(fold_contact && matches!(key.as_str(), CONTACT_PERSON_KEY | CONTACT_PHONE_KEY))
        })
        .collect();

    if !remaining.is_empty() {
        let additional = root.push_element(Element::new("AdditionalData"));
        for (key, value) in remaining {
            let child = additional.push_element(Element::new(sanitize_name(key)));
            append_value(child, value);
        }
    }

    to_xml_string(&root)
}

/// `\nMeldender: …` / `\nTelefon: …` lines for whatever contact data is present.
pub fn contact_lines(document: &Document) -> String {
    let mut lines = String::new();
    let fields = [(CONTACT_PERSON_KEY, "Meldender"), (CONTACT_PHONE_KEY, "Telefon")];
    for (key, label) in fields {
        if let Some(value) = document.get(key).filter(|v| !is_empty_value(v)) {
            lines.push_str(&format!("\n{label}: {}", field_text(value)));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_micro_opt(14, 7, 9, 120000)
            .unwrap()
    }

    #[test]
    fn test_document_to_xml_nested() {
        let document = doc(json!({
            "title": "T",
            "links": [{"text": "A", "href": "/a"}],
            "tags": ["x", 2],
            "meta data": {"n": 1}
        }));

        assert_eq!(
            document_to_xml(&document, "document").unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<document>\n<title>T</title>\n\
             <links>\n<item>\n<text>A</text>\n<href>/a</href>\n</item>\n</links>\n\
             <tags>\n<item>x</item>\n<item>2</item>\n</tags>\n\
             <meta_data>\n<n>1</n>\n</meta_data>\n</document>"
        );
    }

    #[test]
    fn test_document_to_xml_escapes_and_empties() {
        let document = doc(json!({"a": "x < y & z", "b": "", "c": null}));
        assert_eq!(
            document_to_xml(&document, "document").unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<document>\n<a>x &lt; y &amp; z</a>\n<b/>\n<c/>\n</document>"
        );
    }

    #[test]
    fn test_wrap_xml_single_content() {
        let document = doc(json!({"content": "Hello World"}));
        let xml = wrap_xml(&document, "document", "content", &IndexMap::new(), fixed_now()).unwrap();
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<document>\n<content>Hello World</content>\n</document>"
        );
    }

    #[test]
    fn test_wrap_xml_metadata() {
        let document = doc(json!({"content": "Hello World"}));
        let metadata: IndexMap<String, Value> = [
            ("timestamp".to_string(), json!("auto")),
            ("length".to_string(), json!("auto")),
            ("source".to_string(), json!("auto")),
        ]
        .into_iter()
        .collect();

        let xml = wrap_xml(&document, "doc", "content", &metadata, fixed_now()).unwrap();
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<doc>\n<metadata>\n\
             <timestamp>2024-03-05T14:07:09.120000</timestamp>\n<length>11</length>\n\
             <source>auto</source>\n</metadata>\n<content>Hello World</content>\n</doc>"
        );
    }

    #[test]
    fn test_wrap_xml_literal_metadata() {
        let document = doc(json!({"content": "Hello World"}));
        let metadata: IndexMap<String, Value> = [
            ("timestamp".to_string(), json!("2021-01-01T00:00:00")),
            ("length".to_string(), json!("auto")),
        ]
        .into_iter()
        .collect();

        assert_eq!(
            wrap_xml(&document, "doc", "content", &metadata, fixed_now()).unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<doc>\n<metadata>\n<timestamp>2021-01-01T00:00:00</timestamp>\n\
             <length>11</length>\n</metadata>\n<content>Hello World</content>\n</doc>"
        );
    }

    #[test]
    fn test_wrap_xml_falls_back_to_whole_document() {
        let document = doc(json!({"content": "Body", "title": "T"}));
        let xml = wrap_xml(&document, "summary", "content", &IndexMap::new(), fixed_now()).unwrap();
        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<summary>\n<content>Body</content>\n<title>T</title>\n</summary>"
        );
    }

    #[test]
    fn test_build_xml_tree() {
        let document = doc(json!({
            "title": ["Heading"],
            "paragraphs": ["p1", "p2"],
            "links": [{"text": "A", "href": "/a"}],
            "meta": {"lang": "de"}
        }));
        let structure = doc(json!({
            "document": {
                "title": "title",
                "sections": {"content": "paragraphs", "references": "links", "missing": "nope"},
                "meta": "meta"
            }
        }));

        assert_eq!(
            build_xml_tree(&document, &structure).unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<document>\n<title>\n<item>Heading</item>\n</title>\n\
             <sections>\n<content>\n<item>p1</item>\n<item>p2</item>\n</content>\n\
             <references>\n<item>\n<text>A</text>\n<href>/a</href>\n</item>\n</references>\n<missing/>\n</sections>\n\
             <meta>\n<lang>de</lang>\n</meta>\n</document>"
        );
    }

    #[test]
    fn test_build_xml_tree_empty_structure() {
        let err = build_xml_tree(&Document::new(), &Map::new()).unwrap_err();
        assert!(matches!(err, TransformError::EmptyStructure));
    }

    #[test]
    fn test_build_taifun_xml_folds_contact_into_detail() {
        let document = doc(json!({
            "Info": ["Heizung defekt"],
            "VortextTxt": ["Heizung defekt"],
            "BestellNr": ["B-77"],
            "TimeVon": "13:00:00",
            "TimeBis": "",
            "contact_person": ["Frau Muster"],
            "contact_phone": ["0301234"],
            "page title": "Portal"
        }));

        assert_eq!(
            build_taifun_xml(&document, "Ah", "work_order").unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Ah type=\"work_order\">\n<BestellNr>B-77</BestellNr>\n\
             <Info>Heizung defekt</Info>\n<VortextTxt>Heizung defekt\nMeldender: Frau Muster\nTelefon: 0301234</VortextTxt>\n\
             <TimeVon>13:00:00</TimeVon>\n<AdditionalData>\n<page_title>Portal</page_title>\n</AdditionalData>\n</Ah>"
        );
    }

    #[test]
    fn test_build_taifun_xml_without_description_keeps_contact_as_data() {
        let document = doc(json!({"contact_person": "Herr X", "all_links": [{"text": "a", "href": "/"}]}));

        assert_eq!(
            build_taifun_xml(&document, "Ah", "flexible_extraction").unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Ah type=\"flexible_extraction\">\n<AdditionalData>\n\
             <contact_person>Herr X</contact_person>\n<all_links>\n<item>\n<text>a</text>\n<href>/</href>\n</item>\n\
             </all_links>\n</AdditionalData>\n</Ah>"
        );
    }

    #[test]
    fn test_build_taifun_xml_detail_falls_back_to_info() {
        let document = doc(json!({"Info": "Kurz", "contact_phone": "0171"}));
        let xml = build_taifun_xml(&document, "Ah", "work_order").unwrap();
        assert!(xml.contains("<Info>Kurz</Info>\n<VortextTxt>Kurz\nTelefon: 0171</VortextTxt>"));
        assert!(!xml.contains("AdditionalData"));
    }
}
