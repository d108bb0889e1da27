//! Configuration for the background host and the content side.
//!
//! Loaded from `config.toml` (see [`crate::paths::config_file`]). Every
//! section uses `#[serde(default)]`, so a partial or missing file yields
//! working defaults.

use crate::error::{MeanAiError, Result};
use crate::explain::prompt::DEFAULT_SYSTEM_PROMPT;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeanAiConfig {
    /// Model runtime settings.
    pub model: ModelConfig,
    /// Session pool settings.
    pub sessions: SessionsConfig,
    /// Per-tab mailbox settings.
    pub mailbox: MailboxConfig,
    /// Router channel sizing.
    pub host: HostConfig,
    /// Content-side layout and timing.
    pub content: ContentConfig,
}

/// Local model runtime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of the local model runtime.
    pub endpoint_url: String,
    /// Model identifier within the runtime.
    pub model_name: String,
    /// Instructions baked into every session at creation.
    pub system_prompt: String,
    /// Upper bound on session creation for explain cycles and prefetches.
    /// The readiness warm-up download is not bounded by it.
    pub create_timeout_secs: u64,
    /// Upper bound on a single prompt.
    pub prompt_timeout_secs: u64,
    /// HTTP timeout for availability probes.
    pub request_timeout_secs: u64,
    /// Start the model download on content readiness when the model is
    /// `downloadable`, by creating and immediately disposing one session.
    pub warm_download_on_ready: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://localhost:11434".to_owned(),
            model_name: "gemma3:1b".to_owned(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_owned(),
            create_timeout_secs: 120,
            prompt_timeout_secs: 60,
            request_timeout_secs: 10,
            warm_download_on_ready: true,
        }
    }
}

impl ModelConfig {
    pub fn create_timeout(&self) -> Duration {
        Duration::from_secs(self.create_timeout_secs)
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Session pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Honour `PREFETCH_SESSION` by warming a session per tab.
    ///
    /// When disabled, prefetch requests are acknowledged and ignored and
    /// every explain cycle creates a fresh session.
    pub prefetch: bool,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self { prefetch: true }
    }
}

/// Per-tab mailbox settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// Maximum queued results per tab; the oldest is dropped beyond this.
    pub max_pending_per_tab: usize,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            max_pending_per_tab: 16,
        }
    }
}

/// Router channel sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Inbound request channel capacity.
    pub request_capacity: usize,
    /// Router event broadcast capacity.
    pub event_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            request_capacity: 64,
            event_capacity: 128,
        }
    }
}

/// Content-side layout and timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Horizontal offset of the icon from the selection's bottom-right corner, in px.
    pub icon_offset_x: f64,
    /// Vertical offset of the icon from the selection's bottom-right corner, in px.
    pub icon_offset_y: f64,
    /// Gap between the selection's bottom edge and the dialog, in px.
    pub dialog_gap: f64,
    /// How long a loading dialog waits for a result before resolving to an
    /// error record.
    pub result_timeout_secs: u64,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            icon_offset_x: 4.0,
            icon_offset_y: 4.0,
            dialog_gap: 10.0,
            result_timeout_secs: 90,
        }
    }
}

impl ContentConfig {
    pub fn result_timeout(&self) -> Duration {
        Duration::from_secs(self.result_timeout_secs)
    }
}

impl MeanAiConfig {
    /// Check invariants that serde defaults cannot express.
    ///
    /// # Errors
    /// Returns `MeanAiError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.model.endpoint_url.trim().is_empty() {
            return Err(MeanAiError::Config(
                "model.endpoint_url cannot be empty".to_owned(),
            ));
        }
        if self.model.model_name.trim().is_empty() {
            return Err(MeanAiError::Config(
                "model.model_name cannot be empty".to_owned(),
            ));
        }
        if self.model.system_prompt.trim().is_empty() {
            return Err(MeanAiError::Config(
                "model.system_prompt cannot be empty".to_owned(),
            ));
        }
        let timeouts = [
            ("model.create_timeout_secs", self.model.create_timeout_secs),
            ("model.prompt_timeout_secs", self.model.prompt_timeout_secs),
            ("model.request_timeout_secs", self.model.request_timeout_secs),
            (
                "content.result_timeout_secs",
                self.content.result_timeout_secs,
            ),
        ];
        if let Some((field, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(MeanAiError::Config(format!("{field} must be positive")));
        }
        if self.mailbox.max_pending_per_tab == 0 {
            return Err(MeanAiError::Config(
                "mailbox.max_pending_per_tab must be positive".to_owned(),
            ));
        }
        Ok(())
    }

    /// Load config from `path`, falling back to defaults when the file does
    /// not exist.
    ///
    /// # Errors
    /// Returns `MeanAiError::Config` if the file exists but cannot be read,
    /// parsed, or validated.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        let config = read_config(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Read a config file from disk and deserialize it.
///
/// # Errors
/// Returns `MeanAiError::Config` if the file cannot be read or parsed.
pub fn read_config(path: &Path) -> Result<MeanAiConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        MeanAiError::Config(format!(
            "failed to read config file '{}': {e}",
            path.display()
        ))
    })?;
    toml::from_str(&contents).map_err(|e| {
        MeanAiError::Config(format!(
            "failed to parse config file '{}': {e}",
            path.display()
        ))
    })
}

/// Write a config file atomically (temp file → fsync → rename).
///
/// # Errors
/// Returns `MeanAiError::Config` on serialization, write, or rename failure.
pub fn write_config_atomic(path: &Path, config: &MeanAiConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| MeanAiError::Config(format!("failed to serialize config: {e}")))?;
    let tmp_path = path.with_extension("toml.tmp");

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            MeanAiError::Config(format!(
                "failed to create config directory '{}': {e}",
                parent.display()
            ))
        })?;
    }

    let mut file = std::fs::File::create(&tmp_path).map_err(|e| {
        MeanAiError::Config(format!(
            "failed to create temp file '{}': {e}",
            tmp_path.display()
        ))
    })?;
    file.write_all(toml_str.as_bytes())
        .map_err(|e| MeanAiError::Config(format!("failed to write temp file: {e}")))?;
    file.sync_all()
        .map_err(|e| MeanAiError::Config(format!("failed to sync temp file: {e}")))?;

    std::fs::rename(&tmp_path, path).map_err(|e| {
        MeanAiError::Config(format!(
            "failed to rename '{}' to '{}': {e}",
            tmp_path.display(),
            path.display()
        ))
    })
}
