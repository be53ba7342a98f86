//! Rule definitions
//!
//! A rule is a named, ordered list of steps. Each step is tagged by its `action`; the
//! set of actions is closed, and any tag this crate does not know deserializes to
//! [`Step::Unknown`] so rules can carry descriptive no-op entries.
//!
//! Rules keep their steps as raw JSON. A step's payload is only checked when the
//! interpreter reaches it, so nothing after a terminal step can reject a rule.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ConfigError;
use crate::extractors::data::ExtractConfig;
use crate::mapping::FieldTarget;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    ExtractText(ExtractTextStep),
    ExtractElements(ExtractElementsStep),
    CleanWhitespace(CleanWhitespaceStep),
    RemoveHtmlTags(RemoveHtmlTagsStep),
    ExtractData(ExtractDataStep),
    MapToTaifunFields(MapFieldsStep),
    WrapXml(WrapXmlStep),
    BuildXmlTree(BuildXmlTreeStep),
    BuildTaifunXml(BuildTaifunXmlStep),
    #[serde(other)]
    Unknown,
}

impl Step {
    /// Typed step for one raw rule entry. An entry without a string `action` is an
    /// unknown no-op; a known action with a bad payload is an error.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let Some(action) = value.get("action").and_then(Value::as_str) else {
            return Ok(Step::Unknown);
        };
        Step::deserialize(value).map_err(|source| ConfigError::InvalidStep {
            action: action.to_string(),
            source,
        })
    }

    /// Action name as written in rule definitions.
    pub fn action(&self) -> &'static str {
        match self {
            Step::ExtractText(_) => "extract_text",
            Step::ExtractElements(_) => "extract_elements",
            Step::CleanWhitespace(_) => "clean_whitespace",
            Step::RemoveHtmlTags(_) => "remove_html_tags",
            Step::ExtractData(_) => "extract_data",
            Step::MapToTaifunFields(_) => "map_to_taifun_fields",
            Step::WrapXml(_) => "wrap_xml",
            Step::BuildXmlTree(_) => "build_xml_tree",
            Step::BuildTaifunXml(_) => "build_taifun_xml",
            Step::Unknown => "unknown",
        }
    }

    /// Terminal steps produce the final XML and end the rule.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Step::WrapXml(_) | Step::BuildXmlTree(_) | Step::BuildTaifunXml(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractTextStep {
    /// CSS selector; absent or `"body"` means the whole page
    pub target: Option<String>,
    pub output: Option<String>,
    pub max_length: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractElementsStep {
    pub selectors: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanWhitespaceStep {
    pub normalize: bool,
}

impl Default for CleanWhitespaceStep {
    fn default() -> Self {
        Self { normalize: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoveHtmlTagsStep {
    pub preserve_structure: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractDataStep {
    #[serde(flatten)]
    pub config: ExtractConfig,
    /// Key the result is stored under. Without it a mapping result replaces the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapFieldsStep {
    pub field_mapping: IndexMap<String, FieldTarget>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapXmlStep {
    pub root_element: String,
    pub content_element: String,
    pub add_metadata: IndexMap<String, Value>,
}

impl Default for WrapXmlStep {
    fn default() -> Self {
        Self {
            root_element: "document".to_string(),
            content_element: "content".to_string(),
            add_metadata: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildXmlTreeStep {
    pub structure: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildTaifunXmlStep {
    pub template_type: String,
    /// Keep fields outside the work-order schema in `<AdditionalData>`
    pub preserve_customer_data: bool,
}

impl Default for BuildTaifunXmlStep {
    fn default() -> Self {
        Self {
            template_type: "work_order".to_string(),
            preserve_customer_data: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Xml,
    Json,
    Html,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    #[serde(alias = "rule_name")]
    pub name: String,
    #[serde(alias = "rules")]
    pub steps: Vec<Value>,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub description: String,
}

impl RuleDefinition {
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let name = value
            .get("rule_name")
            .or_else(|| value.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        serde_json::from_value(value).map_err(|source| ConfigError::InvalidRule { name, source })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(json).map_err(|source| ConfigError::InvalidRule {
            name: String::new(),
            source,
        })?;
        Self::from_value(value)
    }
}

/// Read access to stored rules. The interpreter only ever reads.
pub trait RuleStore {
    fn rule(&self, name: &str) -> Option<RuleDefinition>;

    fn rule_names(&self) -> Vec<String>;

    fn require(&self, name: &str) -> Result<RuleDefinition, ConfigError> {
        self.rule(name).ok_or_else(|| ConfigError::RuleNotFound {
            name: name.to_string(),
        })
    }
}

/// Rules kept in memory, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryRuleStore {
    rules: IndexMap<String, RuleDefinition>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the stock HTML-to-XML and work-order rules.
    pub fn with_builtin_rules() -> Result<Self, ConfigError> {
        let mut store = Self::new();
        for value in builtin_rules() {
            store.insert(RuleDefinition::from_value(value)?);
        }
        Ok(store)
    }

    /// Insert or replace a rule under its name.
    pub fn insert(&mut self, rule: RuleDefinition) -> Option<RuleDefinition> {
        self.rules.insert(rule.name.clone(), rule)
    }

    pub fn remove(&mut self, name: &str) -> Option<RuleDefinition> {
        self.rules.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RuleStore for MemoryRuleStore {
    fn rule(&self, name: &str) -> Option<RuleDefinition> {
        self.rules.get(name).cloned()
    }

    fn rule_names(&self) -> Vec<String> {
        self.rules.keys().cloned().collect()
    }
}

fn builtin_rules() -> Vec<Value> {
    vec![
        json!({
            "rule_name": "html_to_xml_basic",
            "rules": [
                {"action": "extract_text", "target": "body", "output": "content"},
                {"action": "wrap_xml", "root_element": "document", "content_element": "content"},
                {"action": "remove_html_tags", "preserve_structure": false}
            ],
            "output_format": "xml",
            "description": "Basic HTML to XML conversion - extracts text content and wraps in simple XML structure"
        }),
        json!({
            "rule_name": "html_to_xml_structured",
            "rules": [
                {
                    "action": "extract_elements",
                    "selectors": {
                        "title": "title, h1",
                        "headings": "h2, h3, h4",
                        "paragraphs": "p",
                        "links": "a[href]"
                    }
                },
                {
                    "action": "build_xml_tree",
                    "structure": {
                        "document": {
                            "title": "title",
                            "sections": {
                                "headings": "headings",
                                "content": "paragraphs",
                                "references": "links"
                            }
                        }
                    }
                }
            ],
            "output_format": "xml",
            "description": "Structured HTML to XML - preserves document hierarchy and extracts semantic elements"
        }),
        json!({
            "rule_name": "html_to_xml_compact",
            "rules": [
                {"action": "extract_text", "target": "body", "max_length": 500},
                {"action": "clean_whitespace", "normalize": true},
                {
                    "action": "wrap_xml",
                    "root_element": "summary",
                    "add_metadata": {"timestamp": "auto", "length": "auto"}
                }
            ],
            "output_format": "xml",
            "description": "Compact HTML to XML - creates short XML summary with metadata"
        }),
        json!({
            "rule_name": "html_to_taifun_xml",
            "rules": [
                {
                    "action": "extract_elements",
                    "selectors": {
                        "problem_description": ".problem-info, .description, .meldung, .schadensbeschreibung",
                        "order_number": ".order-nr, .bestellnummer, .auftragsnummer, .referenz",
                        "technician": ".technician, .mitarbeiter, .handwerker, .zuständig",
                        "appointment_date": ".termin-datum, .date, .datum, .termin",
                        "appointment_time": ".termin-zeit, .time, .zeit, .uhrzeit",
                        "location_name": ".objekt-name, .location, .standort, .objekt",
                        "location_address": ".adresse, .address, .anschrift",
                        "contact_person": ".ansprechpartner, .contact, .kontakt, .meldender",
                        "phone": ".telefon, .phone, .tel, .handy"
                    }
                },
                {"action": "clean_whitespace", "normalize": true},
                {
                    "action": "map_to_taifun_fields",
                    "field_mapping": {
                        "problem_description": ["Info", "VortextTxt"],
                        "order_number": "BestellNr",
                        "technician": "MaMatch",
                        "appointment_date": "DateTermin",
                        "appointment_time": ["TimeVon", "TimeBis"],
                        "location_name": "MtName1",
                        "location_address": ["MtAnschriftStr", "MtAnschriftPLZ", "MtAnschriftOrt"],
                        "contact_person": "contact_person",
                        "phone": "contact_phone"
                    }
                },
                {"action": "build_taifun_xml", "template_type": "work_order", "preserve_customer_data": true}
            ],
            "output_format": "xml",
            "description": "Converts HTML order data into Taifun work-order XML"
        }),
        json!({
            "rule_name": "html_to_taifun_flexible",
            "rules": [
                {"action": "extract_text", "target": "body", "output": "full_content"},
                {
                    "action": "extract_elements",
                    "selectors": {
                        "all_headings": "h1, h2, h3, h4, h5, h6",
                        "all_paragraphs": "p",
                        "all_lists": "ul li, ol li",
                        "all_tables": "table td, table th",
                        "all_forms": "input, textarea, select",
                        "all_links": "a[href]"
                    }
                },
                {"action": "clean_whitespace", "normalize": true},
                {"action": "build_taifun_xml", "template_type": "flexible_extraction", "preserve_customer_data": true}
            ],
            "output_format": "xml",
            "description": "Flexible extraction for unknown sites - keeps every extracted field"
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_deserialization() {
        let step: Step = serde_json::from_value(json!({"action": "extract_text", "target": "p", "max_length": 5})).unwrap();
        assert_eq!(
            step,
            Step::ExtractText(ExtractTextStep {
                target: Some("p".to_string()),
                output: None,
                max_length: Some(5),
            })
        );

        let step: Step = serde_json::from_value(json!({"action": "clean_whitespace"})).unwrap();
        assert_eq!(step, Step::CleanWhitespace(CleanWhitespaceStep { normalize: true }));

        let step: Step = serde_json::from_value(json!({"action": "wrap_xml"})).unwrap();
        assert_eq!(step, Step::WrapXml(WrapXmlStep::default()));
        assert!(step.is_terminal());
    }

    #[test]
    fn test_unknown_action_is_kept_as_no_op() {
        let step: Step = serde_json::from_value(json!({"action": "send_fax", "number": "123"})).unwrap();
        assert_eq!(step, Step::Unknown);
        assert!(!step.is_terminal());
    }

    #[test]
    fn test_extract_data_step_flattens_config() {
        let step: Step = serde_json::from_value(json!({
            "action": "extract_data",
            "extract_keys": ["a"],
            "output": "picked"
        }))
        .unwrap();
        let Step::ExtractData(step) = step else {
            panic!("expected extract_data");
        };
        assert_eq!(step.config.extract_keys, Some(vec!["a".to_string()]));
        assert_eq!(step.output.as_deref(), Some("picked"));
    }

    #[test]
    fn test_rule_definition_aliases() {
        let rule = RuleDefinition::from_json(
            r#"{"rule_name": "r", "rules": [{"action": "extract_text"}], "output_format": "json"}"#,
        )
        .unwrap();
        assert_eq!(rule.name, "r");
        assert_eq!(rule.steps.len(), 1);
        assert_eq!(rule.output_format, OutputFormat::Json);

        let rule = RuleDefinition::from_json(r#"{"name": "s", "steps": []}"#).unwrap();
        assert_eq!(rule.output_format, OutputFormat::Xml);
        assert!(rule.description.is_empty());
    }

    #[test]
    fn test_invalid_rule_names_the_rule() {
        let err = RuleDefinition::from_json(r#"{"rule_name": "bad", "rules": {"action": "extract_text"}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRule { ref name, .. } if name == "bad"));
    }

    #[test]
    fn test_step_payloads_are_checked_lazily() {
        let rule = RuleDefinition::from_json(
            r#"{"rule_name": "r", "rules": [{"action": "wrap_xml"}, {"action": "extract_text", "max_length": "later"}, {"note": "no action"}]}"#,
        )
        .unwrap();
        assert_eq!(rule.steps.len(), 3);

        assert!(Step::from_value(&rule.steps[0]).unwrap().is_terminal());
        let err = Step::from_value(&rule.steps[1]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStep { ref action, .. } if action == "extract_text"));
        assert_eq!(Step::from_value(&rule.steps[2]).unwrap(), Step::Unknown);
        assert_eq!(Step::from_value(&json!({"action": 7})).unwrap(), Step::Unknown);
    }

    #[test]
    fn test_builtin_rules() {
        let store = MemoryRuleStore::with_builtin_rules().unwrap();
        assert_eq!(
            store.rule_names(),
            vec![
                "html_to_xml_basic",
                "html_to_xml_structured",
                "html_to_xml_compact",
                "html_to_taifun_xml",
                "html_to_taifun_flexible"
            ]
        );

        let taifun = store.rule("html_to_taifun_xml").unwrap();
        let actions: Vec<_> = taifun
            .steps
            .iter()
            .map(|step| Step::from_value(step).unwrap().action())
            .collect();
        assert_eq!(
            actions,
            vec!["extract_elements", "clean_whitespace", "map_to_taifun_fields", "build_taifun_xml"]
        );
    }

    #[test]
    fn test_store_insert_remove_require() {
        let mut store = MemoryRuleStore::new();
        assert!(store.is_empty());
        store.insert(RuleDefinition::from_json(r#"{"name": "x", "steps": []}"#).unwrap());
        assert_eq!(store.len(), 1);
        assert!(store.require("x").is_ok());

        store.remove("x");
        let err = store.require("x").unwrap_err();
        assert_eq!(err.to_string(), "transform rule 'x' not found");
    }
}
