//! HTTP adapter for a local Ollama-compatible model runtime.
//!
//! Maps the runtime boundary onto the Ollama REST API:
//!
//! | Boundary          | HTTP                                   |
//! |-------------------|----------------------------------------|
//! | `availability()`  | `GET /api/tags`                        |
//! | `create()`        | `POST /api/pull` (streamed) if missing |
//! | `prompt()`        | `POST /api/chat` (non-streaming, JSON) |
//! | `destroy()`       | local only                             |
//!
//! The runtime keeps no per-session state, so a session is the system
//! prompt plus an HTTP client. Connection refused means the runtime is not
//! installed or not running, which is reported as `unavailable`.

use super::{LanguageModel, ModelAvailability, ModelSession, RuntimeError, SessionConfig};
use crate::config::ModelConfig;
use crate::progress::{ProgressCallback, ProgressEvent};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

// ── Configuration ──────────────────────────────────────────────

/// Connection settings for the local runtime.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Base URL, e.g. `http://localhost:11434`.
    pub endpoint_url: String,
    /// Model tag, e.g. `gemma3:1b`.
    pub model: String,
    /// Timeout for availability probes.
    pub request_timeout: Duration,
}

impl OllamaConfig {
    pub fn new(endpoint_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            model: model.into(),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn base(&self) -> &str {
        self.endpoint_url.trim_end_matches('/')
    }
}

impl From<&ModelConfig> for OllamaConfig {
    fn from(config: &ModelConfig) -> Self {
        Self::new(&config.endpoint_url, &config.model_name)
            .with_request_timeout(config.request_timeout())
    }
}

// ── Model ──────────────────────────────────────────────────────

/// [`LanguageModel`] backed by a local Ollama server.
pub struct OllamaModel {
    config: OllamaConfig,
    client: reqwest::Client,
    pulling: Arc<AtomicBool>,
}

impl OllamaModel {
    pub fn new(config: OllamaConfig) -> Self {
        // No client-wide timeout: pulls and prompts are bounded by callers.
        let client = reqwest::Client::builder().build().unwrap_or_default();
        Self {
            config,
            client,
            pulling: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Whether the configured model is listed by `/api/tags`.
    async fn model_listed(&self) -> Result<bool, RuntimeError> {
        let url = format!("{}/api/tags", self.config.base());
        let response = self
            .client
            .get(&url)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(RuntimeError::Http {
                status: status.as_u16(),
                message: body.chars().take(500).collect(),
            });
        }

        let names = parse_tags_response(&body).ok_or_else(|| {
            RuntimeError::Incompatible("/api/tags did not return a model list".to_owned())
        })?;
        Ok(names.iter().any(|name| model_matches(name, &self.config.model)))
    }

    /// Pull the model, streaming progress to `progress`.
    async fn pull(&self, progress: Option<&ProgressCallback>) -> Result<(), RuntimeError> {
        let _pulling = PullingGuard::set(&self.pulling);
        let model = self.config.model.clone();
        let emit = |event: ProgressEvent| {
            if let Some(callback) = progress {
                callback(event);
            }
        };

        let url = format!("{}/api/pull", self.config.base());
        let response = self
            .client
            .post(&url)
            .json(&json!({ "model": model, "stream": true }))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RuntimeError::Http {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        emit(ProgressEvent::DownloadStarted {
            model: model.clone(),
        });

        let mut byte_stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut finished = false;

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(|e| classify_reqwest_error(&e))?;
            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                finished |= handle_pull_line(&line, &model, &emit)?;
            }
        }
        if !buffer.is_empty() {
            finished |= handle_pull_line(&buffer, &model, &emit)?;
        }

        if !finished {
            let message = "pull stream ended before success".to_owned();
            emit(ProgressEvent::Error {
                message: message.clone(),
            });
            return Err(RuntimeError::Incompatible(message));
        }
        emit(ProgressEvent::DownloadComplete { model });
        Ok(())
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn availability(&self) -> Result<ModelAvailability, RuntimeError> {
        match self.model_listed().await {
            Ok(true) => Ok(ModelAvailability::Available),
            Ok(false) if self.pulling.load(Ordering::SeqCst) => Ok(ModelAvailability::Downloading),
            Ok(false) => Ok(ModelAvailability::Downloadable),
            Err(RuntimeError::Unreachable(detail)) => {
                tracing::debug!(detail = %detail, "model runtime not reachable");
                Ok(ModelAvailability::Unavailable)
            }
            Err(e) => Err(e),
        }
    }

    async fn create(&self, config: SessionConfig) -> Result<Box<dyn ModelSession>, RuntimeError> {
        if !self.model_listed().await? {
            tracing::info!(model = %self.config.model, "model not present locally; pulling");
            self.pull(config.progress.as_ref()).await?;
        }
        Ok(Box::new(OllamaSession {
            client: self.client.clone(),
            chat_url: format!("{}/api/chat", self.config.base()),
            model: self.config.model.clone(),
            system_prompt: config.system_prompt,
            destroyed: false,
        }))
    }
}

/// Clears the pulling flag when a pull ends or is abandoned.
struct PullingGuard<'a>(&'a AtomicBool);

impl<'a> PullingGuard<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for PullingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ── Session ────────────────────────────────────────────────────

struct OllamaSession {
    client: reqwest::Client,
    chat_url: String,
    model: String,
    system_prompt: String,
    destroyed: bool,
}

#[async_trait]
impl ModelSession for OllamaSession {
    async fn prompt(&mut self, text: &str) -> Result<String, RuntimeError> {
        if self.destroyed {
            return Err(RuntimeError::Disposed);
        }
        let body = json!({
            "model": self.model,
            "stream": false,
            "format": "json",
            "messages": [
                { "role": "system", "content": self.system_prompt },
                { "role": "user", "content": text },
            ],
        });

        let response = self
            .client
            .post(&self.chat_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(RuntimeError::Http {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }
        parse_chat_response(&body)
    }

    async fn destroy(&mut self) -> Result<(), RuntimeError> {
        self.destroyed = true;
        Ok(())
    }
}

// ── Helpers ────────────────────────────────────────────────────

fn classify_reqwest_error(err: &reqwest::Error) -> RuntimeError {
    if err.is_timeout() {
        RuntimeError::Timeout(err.to_string())
    } else if err.is_connect() {
        RuntimeError::Unreachable(err.to_string())
    } else {
        RuntimeError::Incompatible(format!("transport error: {err}"))
    }
}

/// `gemma3` and `gemma3:latest` name the same model.
fn model_matches(listed: &str, wanted: &str) -> bool {
    listed == wanted
        || (!wanted.contains(':') && listed.strip_suffix(":latest") == Some(wanted))
}

/// Parse an `/api/tags` response into model names.
///
/// Expected format: `{"models": [{"name": "gemma3:1b", ...}, ...]}`
fn parse_tags_response(body: &str) -> Option<Vec<String>> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let models = json.get("models")?.as_array()?;
    Some(
        models
            .iter()
            .filter_map(|entry| {
                entry
                    .get("name")
                    .or_else(|| entry.get("model"))
                    .and_then(|n| n.as_str())
                    .map(str::to_owned)
            })
            .collect(),
    )
}

#[derive(Debug, Deserialize)]
struct PullLine {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    completed: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

/// Handle one NDJSON line of a pull stream. Returns whether the line
/// reported success.
fn handle_pull_line(
    line: &[u8],
    model: &str,
    emit: &impl Fn(ProgressEvent),
) -> Result<bool, RuntimeError> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return Ok(false);
    }
    let parsed: PullLine = serde_json::from_str(text)
        .map_err(|e| RuntimeError::Incompatible(format!("bad pull progress line: {e}")))?;

    if let Some(message) = parsed.error {
        emit(ProgressEvent::Error {
            message: message.clone(),
        });
        return Err(RuntimeError::Incompatible(format!("pull failed: {message}")));
    }
    if let Some(completed) = parsed.completed {
        emit(ProgressEvent::DownloadProgress {
            model: model.to_owned(),
            bytes_downloaded: completed,
            total_bytes: parsed.total,
        });
    }
    Ok(parsed.status.as_deref() == Some("success"))
}

/// Extract `message.content` from a non-streaming `/api/chat` response.
fn parse_chat_response(body: &str) -> Result<String, RuntimeError> {
    let json: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| RuntimeError::Incompatible(format!("chat response is not JSON: {e}")))?;
    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_owned)
        .ok_or_else(|| RuntimeError::Incompatible("chat response has no message.content".to_owned()))
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| body.chars().take(500).collect())
}
