//! Prompt construction.

/// Instructions fixed into every session at creation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful dictionary assistant. \
You explain English words simply for learners. \
You MUST return only valid JSON. Do not include any other text.";

/// Build the user prompt for `text`.
///
/// The text is embedded as a JSON string literal so quotes and newlines
/// in the selection cannot break the requested format.
pub fn build_prompt(text: &str) -> String {
    let quoted = serde_json::Value::String(text.to_owned()).to_string();
    format!(
        "Word: {quoted}\n\n\
         Return a JSON object with this format:\n\
         {{\n  \
           \"originText\": {quoted},\n  \
           \"partOfSpeech\": \"noun/verb/etc\",\n  \
           \"description\": \"simple definition\",\n  \
           \"similar1\": \"synonym1\",\n  \
           \"similar2\": \"synonym2\",\n  \
           \"similar3\": \"synonym3\"\n\
         }}\n"
    )
}
