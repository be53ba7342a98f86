//! Work-order template populator
//!
//! Fills the single record element of a Taifun `AhList` template from an Intermediate
//! Document. Templates arrive as windows-1252 bytes; [`decode_template`] and
//! [`encode_output`] handle the conversion at the edges so everything in between
//! works on `&str`.

use chrono::{Local, NaiveDateTime, Timelike};
use encoding_rs::WINDOWS_1252;
use tracing::{debug, warn};

use crate::config::TaifunSettings;
use crate::document::{field_text, Document};
use crate::error::TemplateError;
use crate::xml::builder::contact_lines;
use crate::xml::tree::{self, Element};

/// Document key → template fields it is copied into, applied in order.
const FIELD_COPIES: &[(&str, &[&str])] = &[
    ("problem_description", &["Info"]),
    ("order_number", &["BestellNr"]),
    ("appointment_date", &["DateTermin", "Date2"]),
    ("appointment_time_from", &["TimeVon"]),
    ("appointment_time_to", &["TimeBis"]),
    ("location_name", &["MtName1"]),
    ("location_street", &["MtAnschriftStr", "MtStr"]),
    ("location_zip", &["MtAnschriftPLZ"]),
    ("location_city", &["MtAnschriftOrt"]),
    ("technician", &["MaMatch"]),
];

const STATUS_FLAGS: &[(&str, &str)] = &[("AhOffen", "true"), ("Erledigt", "false"), ("AhMobile", "true")];

/// Populate `template` using the current local time.
pub fn populate(
    template: &str,
    document: &Document,
    record_id: Option<&str>,
    settings: &TaifunSettings,
) -> Result<String, TemplateError> {
    populate_at(template, document, record_id, settings, Local::now().naive_local())
}

/// Populate `template` with `now` as the creation time.
pub fn populate_at(
    template: &str,
    document: &Document,
    record_id: Option<&str>,
    settings: &TaifunSettings,
    now: NaiveDateTime,
) -> Result<String, TemplateError> {
    let mut root = tree::parse(template)?;

    let path = record_path(&root, settings).ok_or_else(|| TemplateError::MissingRecord {
        tag: settings.record_tag.clone(),
    })?;
    let record = root
        .at_path_mut(&path)
        .ok_or_else(|| TemplateError::MissingRecord {
            tag: settings.record_tag.clone(),
        })?;

    let date = now.format("%Y-%m-%d").to_string();
    let time = format!("{}.{:02}", now.format("%H:%M:%S"), (now.nanosecond() / 10_000_000).min(99));
    let minute = now.format("%H:%M:00").to_string();
    let stamps = [
        ("DateAdd", &date),
        ("TimeAdd", &time),
        ("DatePut", &date),
        ("TimePut", &time),
        ("Date", &date),
        ("DateDesc", &date),
        ("Time", &minute),
    ];
    for (field, value) in stamps {
        set_element_text(record, field, value);
    }

    let number = match record_id.filter(|id| !id.is_empty()) {
        Some(id) => id.to_string(),
        None => now.format("A%y%m%d%H%M").to_string(),
    };
    set_element_text(record, "Nr", &number);
    set_element_text(record, "NrDesc", &number);

    fill_record(record, document);

    let body = root.to_indented_string(2)?;
    debug!(record = %number, "Populated work-order template");
    Ok(format!("{}{}\n", settings.declaration, body))
}

/// Set the text of the first direct child named `tag`, creating it when absent.
pub fn set_element_text(record: &mut Element, tag: &str, value: &str) {
    match record.child_mut(tag) {
        Some(el) => el.set_text(value),
        None => {
            // new fields carry the record's prefix so they land in its namespace
            let name = match record.name.split_once(':') {
                Some((prefix, _)) => format!("{prefix}:{tag}"),
                None => tag.to_string(),
            };
            record.push_element(Element::new(name).with_text(value));
        }
    }
}

/// Record element inside the Taifun namespace, falling back to an unqualified tag.
fn record_path(root: &Element, settings: &TaifunSettings) -> Option<Vec<usize>> {
    let tag = settings.record_tag.as_str();
    let namespace = settings.namespace.as_str();

    root.find_path(|el| el.local_name() == tag && el.namespace.as_deref() == Some(namespace))
        .or_else(|| {
            warn!(tag, namespace, "No namespaced record element, trying bare tag");
            root.find_path(|el| el.name == tag && el.namespace.is_none())
        })
}

fn fill_record(record: &mut Element, document: &Document) {
    let text_of = |key: &str| document.get(key).map(field_text);

    for (key, fields) in FIELD_COPIES {
        if let Some(text) = text_of(key) {
            for field in *fields {
                set_element_text(record, field, &text);
            }
        }
    }

    if let Some(detail) = text_of("detailed_description").or_else(|| text_of("problem_description")) {
        set_element_text(record, "VortextTxt", &detail);
    }

    if let Some(city) = text_of("location_city") {
        let zip = text_of("location_zip").unwrap_or_default();
        set_element_text(record, "MtOrt", format!("{zip} {city}").trim());
    }

    let contact = contact_lines(document);
    if !contact.is_empty() {
        let current = record.child("VortextTxt").map(Element::text).unwrap_or_default();
        set_element_text(record, "VortextTxt", &format!("{current}{contact}"));
    }

    for (flag, value) in STATUS_FLAGS {
        set_element_text(record, flag, value);
    }
}

/// Decode template bytes from windows-1252.
pub fn decode_template(bytes: &[u8]) -> String {
    let (text, _, had_errors) = WINDOWS_1252.decode(bytes);
    if had_errors {
        warn!("Template contained bytes that are not valid windows-1252");
    }
    text.into_owned()
}

/// Encode populated output as windows-1252. Characters outside the code page become
/// numeric character references.
pub fn encode_output(xml: &str) -> Vec<u8> {
    let (bytes, _, _) = WINDOWS_1252.encode(xml);
    bytes.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    const TEMPLATE: &str = r#"<?xml version="1.0" encoding="windows-1252"?>
<AhList xmlns="urn:taifun-software.de:schema:TAIFUN">
  <Ah>
    <Nr></Nr>
    <Info>old</Info>
    <VortextTxt/>
    <Date/>
  </Ah>
</AhList>"#;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_milli_opt(9, 4, 33, 457)
            .unwrap()
    }

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_populate_full_output() {
        let document = doc(json!({
            "problem_description": "Heizung defekt",
            "location_zip": "10115",
            "location_city": "Berlin",
            "contact_person": "Frau Muster",
        }));

        let xml = populate_at(TEMPLATE, &document, None, &TaifunSettings::default(), now()).unwrap();
        let expected = "<?xml version=\"1.0\" encoding=\"windows-1252\"?>\
<AhList xmlns=\"urn:taifun-software.de:schema:TAIFUN\">
  <Ah>
    <Nr>A2405170904</Nr>
    <Info>Heizung defekt</Info>
    <VortextTxt>Heizung defekt
Meldender: Frau Muster</VortextTxt>
    <Date>2024-05-17</Date>
    <DateAdd>2024-05-17</DateAdd>
    <TimeAdd>09:04:33.45</TimeAdd>
    <DatePut>2024-05-17</DatePut>
    <TimePut>09:04:33.45</TimePut>
    <DateDesc>2024-05-17</DateDesc>
    <Time>09:04:00</Time>
    <NrDesc>A2405170904</NrDesc>
    <MtAnschriftPLZ>10115</MtAnschriftPLZ>
    <MtAnschriftOrt>Berlin</MtAnschriftOrt>
    <MtOrt>10115 Berlin</MtOrt>
    <AhOffen>true</AhOffen>
    <Erledigt>false</Erledigt>
    <AhMobile>true</AhMobile>
  </Ah>
</AhList>
";
        assert_eq!(xml, expected);
    }

    #[test]
    fn test_explicit_record_id_and_detail_text() {
        let document = doc(json!({
            "problem_description": "Kurz",
            "detailed_description": "Lang und breit",
            "appointment_date": "2024-06-01",
            "contact_phone": "030 1234",
        }));

        let xml = populate_at(TEMPLATE, &document, Some("A-42"), &TaifunSettings::default(), now()).unwrap();
        let root = tree::parse(&xml).unwrap();
        let record = root.child("Ah").unwrap();

        assert_eq!(record.child("Nr").unwrap().text(), "A-42");
        assert_eq!(record.child("NrDesc").unwrap().text(), "A-42");
        assert_eq!(record.child("Info").unwrap().text(), "Kurz");
        assert_eq!(record.child("VortextTxt").unwrap().text(), "Lang und breit\nTelefon: 030 1234");
        assert_eq!(record.child("DateTermin").unwrap().text(), "2024-06-01");
        assert_eq!(record.child("Date2").unwrap().text(), "2024-06-01");
    }

    #[test]
    fn test_schedule_and_location_copies() {
        let document = doc(json!({
            "appointment_time_from": "08:00:00",
            "appointment_time_to": "10:30:00",
            "location_name": "Schule Nord",
            "location_street": "Hauptstr. 5",
        }));

        let xml = populate_at(TEMPLATE, &document, Some("A1"), &TaifunSettings::default(), now()).unwrap();
        let root = tree::parse(&xml).unwrap();
        let record = root.child("Ah").unwrap();

        assert_eq!(record.child("TimeVon").unwrap().text(), "08:00:00");
        assert_eq!(record.child("TimeBis").unwrap().text(), "10:30:00");
        assert_eq!(record.child("MtName1").unwrap().text(), "Schule Nord");
        assert_eq!(record.child("MtAnschriftStr").unwrap().text(), "Hauptstr. 5");
        assert_eq!(record.child("MtStr").unwrap().text(), "Hauptstr. 5");
        assert!(record.child("MtOrt").is_none());
    }

    #[test]
    fn test_declaration_is_followed_directly_by_root() {
        let xml = populate_at("<AhList><Ah/></AhList>", &Document::new(), Some("A1"), &TaifunSettings::default(), now())
            .unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"windows-1252\"?><AhList>\n  <Ah>"));
        assert!(xml.ends_with("</AhList>\n"));
    }

    #[test]
    fn test_bare_record_fallback() {
        let template = "<AhList><Ah><Nr/></Ah></AhList>";
        let document = doc(json!({"technician": "MM"}));

        let xml = populate_at(template, &document, None, &TaifunSettings::default(), now()).unwrap();
        assert!(xml.contains("<MaMatch>MM</MaMatch>"));
    }

    #[test]
    fn test_prefixed_record_gets_prefixed_fields() {
        let template = r#"<t:AhList xmlns:t="urn:taifun-software.de:schema:TAIFUN"><t:Ah><t:Nr/></t:Ah></t:AhList>"#;
        let xml = populate_at(template, &Document::new(), Some("X1"), &TaifunSettings::default(), now()).unwrap();

        assert!(xml.contains("<t:Nr>X1</t:Nr>"));
        assert!(xml.contains("<t:AhOffen>true</t:AhOffen>"));
    }

    #[test]
    fn test_missing_record_is_fatal() {
        let err = populate_at("<AhList><Other/></AhList>", &Document::new(), None, &TaifunSettings::default(), now())
            .unwrap_err();
        assert!(matches!(err, TemplateError::MissingRecord { ref tag } if tag == "Ah"));
    }

    #[test]
    fn test_set_element_text_overwrites_first_match() {
        let mut record = Element::new("Ah");
        record.push_element(Element::new("Info").with_text("one"));
        record.push_element(Element::new("Info").with_text("two"));

        set_element_text(&mut record, "Info", "new");
        let texts: Vec<String> = record.elements().map(Element::text).collect();
        assert_eq!(texts, vec!["new", "two"]);
    }
}

#[test]
fn test_windows_1252_round_trip() {
    let bytes = b"<Info>Stra\xdfe \x80 5</Info>";
    let text = decode_template(bytes);
    assert_eq!(text, "<Info>Straße € 5</Info>");
    assert_eq!(encode_output(&text), bytes.to_vec());
}

#[test]
fn test_encode_output_unmappable_becomes_reference() {
    assert_eq!(encode_output("a\u{4e2d}b"), b"a&#20013;b".to_vec());
}
