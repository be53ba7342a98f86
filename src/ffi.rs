//! FFI interface for host applications
//!
//! C-compatible entry points for running transform rules, extracting data and
//! round-tripping work-order templates. Structured arguments and results are passed
//! as JSON strings.

use std::ffi::{c_char, CStr, CString};
use std::ptr;

use serde::Serialize;
use serde_json::Value;

use crate::config::TransformSettings;
use crate::error::ConfigError;
use crate::extractors::data::{extract_from_data, ExtractConfig};
use crate::interpreter::Interpreter;
use crate::rules::{MemoryRuleStore, RuleDefinition};
use crate::value_rules::{self, ValueRules};
use crate::xml::template::{decode_template, encode_output, populate};
use crate::xml::validate::validate;

/// Result struct returned to the host
/// Both pointers are owned by Rust and must be freed via rt_free_result
#[repr(C)]
pub struct TransformResultFFI {
    /// Output text (null-terminated), or null on failure
    pub data_ptr: *mut c_char,
    /// Error message if the call failed (null-terminated), or null on success
    pub error_ptr: *mut c_char,
}

/// Run a rule definition over an HTML page.
///
/// # Arguments
/// * `html_ptr` - Pointer to HTML content (UTF-8, not necessarily null-terminated)
/// * `html_len` - Length of HTML content in bytes
/// * `rule_json` - JSON-serialized rule definition (null-terminated)
///
/// # Returns
/// The rule's output (XML, JSON or text depending on its `output_format`) in
/// `data_ptr`, or `error_ptr` on failure. XML-format rules never fail once the rule
/// parses; internal errors come back as an `<error>` document.
///
/// # Safety
/// - `html_ptr` must point to valid memory of at least `html_len` bytes
/// - `rule_json` must be a valid null-terminated C string
/// - Caller must free the result via `rt_free_result`
#[no_mangle]
pub unsafe extern "C" fn rt_transform_html(
    html_ptr: *const c_char,
    html_len: usize,
    rule_json: *const c_char,
) -> TransformResultFFI {
    let html = match read_bytes_utf8(html_ptr, html_len, "HTML content") {
        Ok(html) => html,
        Err(result) => return result,
    };
    if rule_json.is_null() {
        return missing_argument("rule_json", "rt_transform_html");
    }
    let rule_str = match read_c_str(rule_json, "Rule JSON") {
        Ok(s) => s,
        Err(result) => return result,
    };

    let rule = match RuleDefinition::from_json(rule_str) {
        Ok(rule) => rule,
        Err(e) => return make_error_result(&e.to_string()),
    };

    match interpreter() {
        Ok(interpreter) => match interpreter.execute_rule(&rule, &html) {
            Ok(output) => make_text_result(output.into_bytes()),
            Err(e) => make_error_result(&e.to_string()),
        },
        Err(result) => result,
    }
}

/// Run one of the built-in rules by name.
///
/// # Safety
/// Same as rt_transform_html; `rule_name` must be a valid null-terminated C string
#[no_mangle]
pub unsafe extern "C" fn rt_transform_named(
    html_ptr: *const c_char,
    html_len: usize,
    rule_name: *const c_char,
) -> TransformResultFFI {
    let html = match read_bytes_utf8(html_ptr, html_len, "HTML content") {
        Ok(html) => html,
        Err(result) => return result,
    };
    if rule_name.is_null() {
        return missing_argument("rule_name", "rt_transform_named");
    }
    let name = match read_c_str(rule_name, "Rule name") {
        Ok(s) => s,
        Err(result) => return result,
    };

    let store = match MemoryRuleStore::with_builtin_rules() {
        Ok(store) => store,
        Err(e) => return make_error_result(&e.to_string()),
    };

    match interpreter() {
        Ok(interpreter) => match interpreter.transform_with_rule(&store, &Value::String(html), name) {
            Ok(output) => make_text_result(output.into_bytes()),
            Err(e) => make_error_result(&e.to_string()),
        },
        Err(result) => result,
    }
}

/// Generic data extraction over a JSON value.
///
/// # Safety
/// - `data_json` and `config_json` must be valid null-terminated C strings
/// - Caller must free the result via `rt_free_result`
#[no_mangle]
pub unsafe extern "C" fn rt_extract_data(
    data_json: *const c_char,
    config_json: *const c_char,
) -> TransformResultFFI {
    let data: Value = match read_json(data_json, "Data JSON") {
        Ok(v) => v,
        Err(result) => return result,
    };
    let config: ExtractConfig = match read_json(config_json, "Config JSON") {
        Ok(v) => v,
        Err(result) => return result,
    };

    make_json_result(&extract_from_data(data, &config))
}

/// Apply value rules to a JSON value.
///
/// # Safety
/// Same as rt_extract_data
#[no_mangle]
pub unsafe extern "C" fn rt_apply_value_rules(
    value_json: *const c_char,
    rules_json: *const c_char,
) -> TransformResultFFI {
    let value: Value = match read_json(value_json, "Value JSON") {
        Ok(v) => v,
        Err(result) => return result,
    };
    let rules: ValueRules = match read_json(rules_json, "Rules JSON") {
        Ok(v) => v,
        Err(result) => return result,
    };

    match value_rules::apply(value, &rules) {
        Ok(value) => make_json_result(&value),
        Err(e) => make_error_result(&e.to_string()),
    }
}

/// Populate a work-order template.
///
/// # Arguments
/// * `template_ptr` / `template_len` - Template bytes, windows-1252 encoded
/// * `document_json` - JSON object with the extracted fields (null-terminated)
/// * `record_id` - Order number to use, or null to generate one
///
/// # Returns
/// The populated document in `data_ptr`, windows-1252 encoded.
///
/// # Safety
/// - `template_ptr` must point to valid memory of at least `template_len` bytes
/// - `document_json` must be a valid null-terminated C string
/// - `record_id` must be null or a valid null-terminated C string
/// - Caller must free the result via `rt_free_result`
#[no_mangle]
pub unsafe extern "C" fn rt_populate_template(
    template_ptr: *const c_char,
    template_len: usize,
    document_json: *const c_char,
    record_id: *const c_char,
) -> TransformResultFFI {
    let template = decode_template(read_bytes(template_ptr, template_len));
    let document: serde_json::Map<String, Value> = match read_json(document_json, "Document JSON") {
        Ok(v) => v,
        Err(result) => return result,
    };
    let record_id = if record_id.is_null() {
        None
    } else {
        match read_c_str(record_id, "Record id") {
            Ok(s) => Some(s),
            Err(result) => return result,
        }
    };

    let settings = match TransformSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => return make_error_result(&e.to_string()),
    };

    match populate(&template, &document, record_id, &settings.taifun) {
        Ok(xml) => make_text_result(encode_output(&xml)),
        Err(e) => make_error_result(&format!("Failed to populate template: {}", e)),
    }
}

/// Validate work-order XML. The validation result itself is the JSON output; only
/// unreadable input produces an error.
///
/// # Safety
/// - `xml_ptr` must point to valid memory of at least `xml_len` bytes (UTF-8)
/// - Caller must free the result via `rt_free_result`
#[no_mangle]
pub unsafe extern "C" fn rt_validate_taifun(xml_ptr: *const c_char, xml_len: usize) -> TransformResultFFI {
    let xml = match read_bytes_utf8(xml_ptr, xml_len, "XML content") {
        Ok(xml) => xml,
        Err(result) => return result,
    };
    let settings = match TransformSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => return make_error_result(&e.to_string()),
    };

    make_json_result(&validate(&xml, &settings.taifun))
}

/// Free a TransformResultFFI returned by any rt_* function
///
/// # Safety
/// - `result` must have been returned by an rt_* function
/// - Must only be called once per result
#[no_mangle]
pub unsafe extern "C" fn rt_free_result(result: TransformResultFFI) {
    if !result.data_ptr.is_null() {
        drop(CString::from_raw(result.data_ptr));
    }
    if !result.error_ptr.is_null() {
        drop(CString::from_raw(result.error_ptr));
    }
}

fn interpreter() -> Result<Interpreter, TransformResultFFI> {
    TransformSettings::from_env()
        .map(Interpreter::new)
        .map_err(|e| make_error_result(&e.to_string()))
}

unsafe fn read_bytes<'a>(ptr: *const c_char, len: usize) -> &'a [u8] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        std::slice::from_raw_parts(ptr as *const u8, len)
    }
}

unsafe fn read_bytes_utf8(ptr: *const c_char, len: usize, what: &str) -> Result<String, TransformResultFFI> {
    std::str::from_utf8(read_bytes(ptr, len))
        .map(str::to_string)
        .map_err(|_| make_error_result(&format!("Invalid UTF-8 in {}", what)))
}

unsafe fn read_c_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, TransformResultFFI> {
    if ptr.is_null() {
        return Err(make_error_result(&format!("{} is null", what)));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| make_error_result(&format!("Invalid UTF-8 in {}", what)))
}

unsafe fn read_json<T: serde::de::DeserializeOwned>(ptr: *const c_char, what: &str) -> Result<T, TransformResultFFI> {
    let s = read_c_str(ptr, what)?;
    serde_json::from_str(s).map_err(|e| make_error_result(&format!("Failed to parse {}: {}", what, e)))
}

fn make_json_result<T: Serialize>(value: &T) -> TransformResultFFI {
    match serde_json::to_string(value) {
        Ok(json) => make_text_result(json.into_bytes()),
        Err(e) => make_error_result(&format!("Failed to serialize result: {}", e)),
    }
}

fn make_text_result(bytes: Vec<u8>) -> TransformResultFFI {
    match CString::new(bytes) {
        Ok(cstr) => TransformResultFFI {
            data_ptr: cstr.into_raw(),
            error_ptr: ptr::null_mut(),
        },
        Err(_) => make_error_result("Result contains null bytes"),
    }
}

fn missing_argument(argument: &str, context: &str) -> TransformResultFFI {
    let error = ConfigError::MissingArgument {
        argument: argument.to_string(),
        context: context.to_string(),
    };
    make_error_result(&error.to_string())
}

// Helper to create error result
fn make_error_result(msg: &str) -> TransformResultFFI {
    let error_cstr = CString::new(msg.replace('\0', " ")).unwrap_or_default();
    TransformResultFFI {
        data_ptr: ptr::null_mut(),
        error_ptr: error_cstr.into_raw(),
    }
}
