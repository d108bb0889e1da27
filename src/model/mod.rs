//! On-device model runtime boundary.
//!
//! The runtime is consumed only through [`LanguageModel`] (capability
//! check + session creation) and [`ModelSession`] (prompt + destroy).
//! Everything above this boundary (the capability gate, the session pool,
//! the explain cycle) is runtime-agnostic.
//!
//! # Availability model
//!
//! [`ModelAvailability`] moves forward only: `unknown` may become anything
//! on the first query, `downloadable → downloading → available` after
//! that, and `unavailable` is terminal until the gate is explicitly reset.

pub mod availability;
pub mod ollama;
pub mod pool;
pub mod scripted;
pub mod session;

pub use availability::CapabilityGate;
pub use pool::{PoolStats, SessionFactory, SessionPool};
pub use session::{Session, SessionId, SessionOrigin};

use crate::progress::ProgressCallback;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Availability of the on-device model as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelAvailability {
    /// Not yet queried.
    #[default]
    Unknown,
    /// Cannot run on this device (terminal).
    Unavailable,
    /// Can run once downloaded; creating a session starts the download.
    Downloadable,
    /// Download in progress.
    Downloading,
    /// Ready to create sessions.
    Available,
}

impl ModelAvailability {
    /// Render to wire format.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Unavailable => "unavailable",
            Self::Downloadable => "downloadable",
            Self::Downloading => "downloading",
            Self::Available => "available",
        }
    }

    /// Whether sessions may be created in this state.
    #[must_use]
    pub fn permits_sessions(self) -> bool {
        matches!(self, Self::Downloadable | Self::Available)
    }

    fn rank(self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Unavailable => 1,
            Self::Downloadable => 2,
            Self::Downloading => 3,
            Self::Available => 4,
        }
    }

    /// Combine the recorded state with a freshly observed one.
    ///
    /// `unavailable` absorbs everything. An aborted download is the one
    /// accepted step back (`downloading → downloadable`); any other
    /// regression keeps the recorded state.
    #[must_use]
    pub fn advance(self, observed: Self) -> Self {
        match (self, observed) {
            (Self::Unknown, next) => next,
            (Self::Unavailable, _) | (_, Self::Unavailable) => Self::Unavailable,
            (current, Self::Unknown) => current,
            (Self::Downloading, Self::Downloadable) => Self::Downloadable,
            (current, next) if next.rank() >= current.rank() => next,
            (current, _) => current,
        }
    }
}

impl fmt::Display for ModelAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures reported by the model runtime itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// The runtime could not be reached.
    #[error("runtime unreachable: {0}")]
    Unreachable(String),

    /// The runtime did not answer in time.
    #[error("runtime timed out: {0}")]
    Timeout(String),

    /// The runtime answered with an error status.
    #[error("runtime returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The runtime answered with something that is not a known format.
    #[error("incompatible runtime response: {0}")]
    Incompatible(String),

    /// The session was already destroyed.
    #[error("session already disposed")]
    Disposed,
}

impl RuntimeError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Incompatible(_) | Self::Disposed => false,
        }
    }
}

/// Parameters for creating a session.
#[derive(Clone)]
pub struct SessionConfig {
    /// Instructions fixed for the session's whole lifetime.
    pub system_prompt: String,
    /// Receives download progress if creation has to fetch the model.
    pub progress: Option<ProgressCallback>,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("system_prompt", &self.system_prompt)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

/// Capability check and session creation on the model runtime.
///
/// `availability` must not create a durable session as a side effect.
/// `create` must be cancel-safe: dropping the future before it resolves
/// must not leave runtime state behind.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Query the runtime for model availability.
    async fn availability(&self) -> Result<ModelAvailability, RuntimeError>;

    /// Create a session with the given fixed system prompt.
    async fn create(&self, config: SessionConfig) -> Result<Box<dyn ModelSession>, RuntimeError>;
}

/// A live inference context.
#[async_trait]
pub trait ModelSession: Send {
    /// Send one user prompt and return the model's raw text reply.
    async fn prompt(&mut self, text: &str) -> Result<String, RuntimeError>;

    /// Release the runtime context. Called exactly once by [`Session`].
    async fn destroy(&mut self) -> Result<(), RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ModelAvailability::*;

    #[test]
    fn unknown_accepts_anything() {
        for next in [Unknown, Unavailable, Downloadable, Downloading, Available] {
            assert_eq!(Unknown.advance(next), next);
        }
    }

    #[test]
    fn unavailable_is_terminal() {
        for next in [Unknown, Downloadable, Downloading, Available] {
            assert_eq!(Unavailable.advance(next), Unavailable);
        }
        assert_eq!(Available.advance(Unavailable), Unavailable);
    }

    #[test]
    fn transitions_only_move_forward() {
        assert_eq!(Downloadable.advance(Downloading), Downloading);
        assert_eq!(Downloading.advance(Available), Available);
        assert_eq!(Available.advance(Downloadable), Available);
        assert_eq!(Available.advance(Unknown), Available);
    }

    #[test]
    fn aborted_download_steps_back() {
        assert_eq!(Downloading.advance(Downloadable), Downloadable);
    }

    #[test]
    fn availability_serde_is_lowercase() {
        let json = serde_json::to_string(&Downloadable).expect("serialize");
        assert_eq!(json, "\"downloadable\"");
        let parsed: ModelAvailability = serde_json::from_str("\"available\"").expect("parse");
        assert_eq!(parsed, Available);
    }

    #[test]
    fn permits_sessions_only_when_loadable() {
        assert!(Available.permits_sessions());
        assert!(Downloadable.permits_sessions());
        assert!(!Downloading.permits_sessions());
        assert!(!Unavailable.permits_sessions());
        assert!(!Unknown.permits_sessions());
    }

    #[test]
    fn runtime_error_transience() {
        assert!(RuntimeError::Unreachable("x".into()).is_transient());
        assert!(
            RuntimeError::Http {
                status: 503,
                message: "busy".into()
            }
            .is_transient()
        );
        assert!(
            !RuntimeError::Http {
                status: 404,
                message: "no model".into()
            }
            .is_transient()
        );
        assert!(!RuntimeError::Disposed.is_transient());
    }
}
