//! Lenient extraction of JSON objects from model output.
//!
//! Models wrap JSON in prose or code fences often enough that every parser
//! here first tries the whole text, then the span from the first `{` to the
//! last `}`.

use serde_json::{Map, Value};

/// Extract the first JSON object from `text`, if any.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text.trim()) {
        return Some(map);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Read an integer leniently: JSON integers, floats (rounded half away from
/// zero) and numeric strings are accepted. Booleans are rejected.
#[must_use]
pub fn lenient_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64().filter(|f| f.is_finite()).map(|f| {
                #[allow(clippy::cast_possible_truncation)]
                let rounded = f.round() as i64;
                rounded
            })
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Non-blank strings from a JSON array, trimmed. Non-string items are skipped.
#[must_use]
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// A string field, trimmed; empty when missing or not a string.
#[must_use]
pub fn string_field(map: &Map<String, Value>, key: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}
