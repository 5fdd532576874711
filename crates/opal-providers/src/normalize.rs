//! Best-effort structured extraction from free-form model responses.
//!
//! Models are asked for structured output but do not reliably produce it.
//! This scanner pulls out whatever it can find: a fenced JSON block,
//! key/value lines, monetary amounts, and dates. The raw text is always
//! preserved under `extracted_text` so nothing is lost.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value, json};

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*\n(.*?)\n```").unwrap());
static FENCED_ANY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```\s*\n(.*?)\n```").unwrap());
// Key length bounded to filter out prose that happens to contain a colon.
static KEY_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^([A-Za-z][A-Za-z ]{0,48}):[ \t]*(\S.*)$").unwrap());
static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:R\$|\$|€|£|USD|EUR|BRL)\s*([\d][\d.,]*(?:\s*[KkMmBb])?)").unwrap()
});
static DATE_DMY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})\b").unwrap());
static DATE_YMD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4}[/-]\d{1,2}[/-]\d{1,2})\b").unwrap());

/// Scan a model response for structured content.
///
/// Always returns an object containing at least `extracted_text`. Optional
/// keys when found: `json_data`, `key_values`, `amounts_found`,
/// `dates_found`. Malformed JSON inside a fence is ignored rather than
/// failing the scan.
pub fn parse_structured_response(text: &str) -> Value {
    let mut structured = Map::new();
    structured.insert("extracted_text".to_string(), json!(text));

    if let Some(data) = fenced_json(text) {
        structured.insert("json_data".to_string(), data);
    }

    let mut key_values = Map::new();
    for caps in KEY_VALUE.captures_iter(text) {
        key_values.insert(caps[1].trim().to_string(), json!(caps[2].trim()));
    }
    if !key_values.is_empty() {
        structured.insert("key_values".to_string(), Value::Object(key_values));
    }

    let amounts: Vec<Value> = AMOUNT
        .captures_iter(text)
        .map(|caps| json!(caps[1].trim()))
        .collect();
    if !amounts.is_empty() {
        structured.insert("amounts_found".to_string(), Value::Array(amounts));
    }

    let mut dates: Vec<Value> = Vec::new();
    for caps in DATE_DMY.captures_iter(text).chain(DATE_YMD.captures_iter(text)) {
        let date = json!(&caps[1]);
        if !dates.contains(&date) {
            dates.push(date);
        }
    }
    if !dates.is_empty() {
        structured.insert("dates_found".to_string(), Value::Array(dates));
    }

    Value::Object(structured)
}

fn fenced_json(text: &str) -> Option<Value> {
    // Prefer an explicitly tagged block, then any fence that parses.
    for re in [&*FENCED_JSON, &*FENCED_ANY] {
        if let Some(caps) = re.captures(text)
            && let Ok(value) = serde_json::from_str::<Value>(&caps[1])
        {
            return Some(value);
        }
    }
    None
}

/// Summary reported inside the structured block, if any.
pub fn summary_from(structured: &Value) -> Option<String> {
    structured
        .get("json_data")?
        .get("summary")?
        .as_str()
        .map(str::to_string)
}

/// Confidence reported inside the structured block, if any.
pub fn confidence_from(structured: &Value) -> Option<f32> {
    structured
        .get("json_data")?
        .get("confidence")?
        .as_f64()
        .map(|c| c as f32)
}
