//! Progress event types for model download and session creation.
//!
//! Session creation may trigger a model download inside the runtime. The
//! runtime reports progress through a callback so the background host can
//! log it (or forward it) without blocking other callers of the
//! capability gate.

use std::sync::Arc;

/// Progress events emitted while a model is downloaded or loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// The runtime started fetching the model.
    DownloadStarted {
        /// Runtime model identifier (e.g. `"gemma3:1b"`).
        model: String,
    },

    /// Download progress update.
    DownloadProgress {
        /// Runtime model identifier.
        model: String,
        /// Bytes downloaded so far.
        bytes_downloaded: u64,
        /// Total size in bytes, if known.
        total_bytes: Option<u64>,
    },

    /// The model download completed.
    DownloadComplete {
        /// Runtime model identifier.
        model: String,
    },

    /// A failure occurred while downloading.
    Error {
        /// Human-readable error description.
        message: String,
    },
}

impl ProgressEvent {
    /// Fraction complete in `0.0..=1.0`, when the total is known.
    pub fn fraction(&self) -> Option<f64> {
        match self {
            Self::DownloadProgress {
                bytes_downloaded,
                total_bytes: Some(total),
                ..
            } if *total > 0 => Some((*bytes_downloaded as f64 / *total as f64).min(1.0)),
            Self::DownloadComplete { .. } => Some(1.0),
            _ => None,
        }
    }
}

/// Callback type for receiving progress events.
///
/// Shared between the session factory and any prefetch task it spawns.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Progress callback that forwards every event to `tracing`.
pub fn tracing_progress() -> ProgressCallback {
    Arc::new(|event| match &event {
        ProgressEvent::DownloadStarted { model } => {
            tracing::info!(model = %model, "model download started");
        }
        ProgressEvent::DownloadProgress {
            model,
            bytes_downloaded,
            total_bytes,
        } => {
            tracing::debug!(
                model = %model,
                bytes_downloaded,
                total_bytes = ?total_bytes,
                fraction = ?event.fraction(),
                "model download progress"
            );
        }
        ProgressEvent::DownloadComplete { model } => {
            tracing::info!(model = %model, "model download complete");
        }
        ProgressEvent::Error { message } => {
            tracing::warn!(error = %message, "model download failed");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn callback_receives_events_in_order() {
        let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: ProgressCallback = Arc::new(move |event| {
            let Ok(mut guard) = sink.lock() else {
                return;
            };
            guard.push(event);
        });

        callback(ProgressEvent::DownloadStarted {
            model: "gemma3:1b".into(),
        });
        callback(ProgressEvent::DownloadProgress {
            model: "gemma3:1b".into(),
            bytes_downloaded: 50,
            total_bytes: Some(200),
        });
        callback(ProgressEvent::DownloadComplete {
            model: "gemma3:1b".into(),
        });

        let guard = events.lock().unwrap_or_else(|e| e.into_inner());
        assert_eq!(guard.len(), 3);
        assert_eq!(guard[1].fraction(), Some(0.25));
        assert_eq!(guard[2].fraction(), Some(1.0));
    }

    #[test]
    fn fraction_unknown_without_total() {
        let event = ProgressEvent::DownloadProgress {
            model: "m".into(),
            bytes_downloaded: 10,
            total_bytes: None,
        };
        assert_eq!(event.fraction(), None);
        let zero = ProgressEvent::DownloadProgress {
            model: "m".into(),
            bytes_downloaded: 10,
            total_bytes: Some(0),
        };
        assert_eq!(zero.fraction(), None);
    }
}
