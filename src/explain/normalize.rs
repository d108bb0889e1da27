//! Response normalizer: raw model text to [`ExplanationRecord`].
//!
//! Model output is unreliable. The widest `{ ... }` span (first `{` to
//! last `}`) is parsed as a JSON object; if that fails the raw text becomes
//! the description. Each field is defaulted on its own when missing, empty
//! or of the wrong type. `originText` is always the submitted text; the
//! model's echo is ignored.

use super::record::{ExplanationRecord, UNKNOWN_PART_OF_SPEECH};
use crate::error::MeanAiError;
use serde_json::{Map, Value};

/// Normalize `raw` model output for a request that submitted `origin_text`.
///
/// Never fails.
pub fn normalize(raw: &str, origin_text: &str) -> ExplanationRecord {
    match extract_object(raw) {
        Ok(object) => from_object(&object, raw, origin_text),
        Err(e) => {
            tracing::debug!(error = %e, "model output is not JSON; using raw text");
            degraded(raw, origin_text)
        }
    }
}

fn extract_object(raw: &str) -> Result<Map<String, Value>, MeanAiError> {
    let candidate = match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => raw,
    };
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(MeanAiError::ParseFailed(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
        Err(e) => Err(MeanAiError::ParseFailed(e.to_string())),
    }
}

fn from_object(object: &Map<String, Value>, raw: &str, origin_text: &str) -> ExplanationRecord {
    let description = match text_field(object, "description") {
        Some(description) => description,
        None => {
            tracing::debug!("model output has no description; using raw text");
            raw.to_owned()
        }
    };

    ExplanationRecord {
        origin_text: origin_text.to_owned(),
        part_of_speech: text_field(object, "partOfSpeech")
            .unwrap_or_else(|| UNKNOWN_PART_OF_SPEECH.to_owned()),
        description,
        similar: similar_fields(object),
        error_code: None,
    }
}

/// `similar1..similar3`, or the first three strings of a `similar` array
/// when none of the numbered fields is usable.
fn similar_fields(object: &Map<String, Value>) -> [String; 3] {
    let numbered = ["similar1", "similar2", "similar3"].map(|key| text_field(object, key));
    if numbered.iter().any(Option::is_some) {
        return numbered.map(Option::unwrap_or_default);
    }

    let mut similar: [String; 3] = Default::default();
    if let Some(Value::Array(items)) = object.get("similar") {
        let strings = items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty());
        for (slot, value) in similar.iter_mut().zip(strings) {
            *slot = value.to_owned();
        }
    }
    similar
}

/// A string field, trimmed, or `None` if missing, empty or not a string.
fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn degraded(raw: &str, origin_text: &str) -> ExplanationRecord {
    ExplanationRecord {
        origin_text: origin_text.to_owned(),
        part_of_speech: UNKNOWN_PART_OF_SPEECH.to_owned(),
        description: raw.to_owned(),
        similar: Default::default(),
        error_code: None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
