//! The explanation record delivered to the content side.

use crate::error::MeanAiError;
use serde::{Deserialize, Serialize};

/// Part of speech used when the model gives none.
pub const UNKNOWN_PART_OF_SPEECH: &str = "Unknown";

/// A structured explanation of the selected text.
///
/// On the wire the synonyms are flattened to `similar1..similar3` and the
/// keys are camelCase. `errorCode` is present only on error records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RecordWire", into = "RecordWire")]
pub struct ExplanationRecord {
    /// The text the user submitted, never the model's echo.
    pub origin_text: String,
    pub part_of_speech: String,
    pub description: String,
    /// Up to three synonyms; empty strings for missing ones.
    pub similar: [String; 3],
    /// Stable error code when this record reports a failure.
    pub error_code: Option<String>,
}

impl ExplanationRecord {
    /// Record for a failed explain cycle. Keeps `origin_text` and puts a
    /// readable explanation of the failure in `description`.
    pub fn from_error(origin_text: &str, err: &MeanAiError) -> Self {
        Self {
            origin_text: origin_text.to_owned(),
            part_of_speech: String::new(),
            description: format!("Error: {}. {}", err.message(), hint_for(err)),
            similar: Default::default(),
            error_code: Some(err.code().to_owned()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_code.is_some()
    }

    /// Non-empty synonyms, in order.
    pub fn synonyms(&self) -> impl Iterator<Item = &str> {
        self.similar
            .iter()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

fn hint_for(err: &MeanAiError) -> &'static str {
    match err {
        MeanAiError::ModelDownloading(_) => "Please wait for the download to finish and try again.",
        MeanAiError::ModelUnavailable(_) | MeanAiError::SessionCreateFailed { .. } => {
            "Please make sure the local model runtime is running and the model is enabled."
        }
        MeanAiError::PromptFailed(_) => "Please try again.",
        _ => "Please try again later.",
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordWire {
    #[serde(default)]
    origin_text: String,
    #[serde(default)]
    part_of_speech: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    similar1: String,
    #[serde(default)]
    similar2: String,
    #[serde(default)]
    similar3: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_code: Option<String>,
}

impl From<RecordWire> for ExplanationRecord {
    fn from(wire: RecordWire) -> Self {
        Self {
            origin_text: wire.origin_text,
            part_of_speech: wire.part_of_speech,
            description: wire.description,
            similar: [wire.similar1, wire.similar2, wire.similar3],
            error_code: wire.error_code,
        }
    }
}

impl From<ExplanationRecord> for RecordWire {
    fn from(record: ExplanationRecord) -> Self {
        let [similar1, similar2, similar3] = record.similar;
        Self {
            origin_text: record.origin_text,
            part_of_speech: record.part_of_speech,
            description: record.description,
            similar1,
            similar2,
            similar3,
            error_code: record.error_code,
        }
    }
}
