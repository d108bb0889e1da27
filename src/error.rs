//! Error types for the meanai runtime.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE) that is
//! included in the Display output and accessible via [`MeanAiError::code()`].
//! The content side receives the code on error records, so codes are part of
//! the wire contract and will not change.

use crate::model::RuntimeError;

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// The on-device model cannot run on this machine.
    pub const MODEL_UNAVAILABLE: &str = "MODEL_UNAVAILABLE";

    /// The model is still downloading; retry after a delay.
    pub const MODEL_DOWNLOADING: &str = "MODEL_DOWNLOADING";

    /// Creating an inference session failed.
    pub const SESSION_CREATE_FAILED: &str = "SESSION_CREATE_FAILED";

    /// Prompting a live session failed.
    pub const PROMPT_FAILED: &str = "PROMPT_FAILED";

    /// Model output could not be parsed into a record.
    pub const PARSE_FAILED: &str = "PARSE_FAILED";

    /// A message could not reach its destination tab.
    pub const DELIVERY_FAILED: &str = "DELIVERY_FAILED";

    /// Invalid or missing configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// A message or envelope violated the wire contract.
    pub const PROTOCOL_INVALID: &str = "PROTOCOL_INVALID";

    /// An internal channel was closed.
    pub const CHANNEL_CLOSED: &str = "CHANNEL_CLOSED";

    /// Filesystem or stdio failure.
    pub const IO_ERROR: &str = "IO_ERROR";
}

/// Top-level error type.
///
/// The Display impl formats as `[CODE] message`.
#[derive(Debug, thiserror::Error)]
pub enum MeanAiError {
    /// The model runtime reported terminal unavailability.
    #[error("[{}] {}", error_codes::MODEL_UNAVAILABLE, .0)]
    ModelUnavailable(String),

    /// The model runtime is downloading the model.
    #[error("[{}] {}", error_codes::MODEL_DOWNLOADING, .0)]
    ModelDownloading(String),

    /// Session creation failed; the runtime cause is attached as the source.
    #[error("[{}] {message}", error_codes::SESSION_CREATE_FAILED)]
    SessionCreateFailed {
        message: String,
        #[source]
        cause: RuntimeError,
    },

    /// Prompting failed.
    #[error("[{}] {}", error_codes::PROMPT_FAILED, .0)]
    PromptFailed(String),

    /// Output parsing failed. Recovered locally by the normalizer.
    #[error("[{}] {}", error_codes::PARSE_FAILED, .0)]
    ParseFailed(String),

    /// Delivery to a tab failed. Recovered by queuing in the mailbox.
    #[error("[{}] {}", error_codes::DELIVERY_FAILED, .0)]
    DeliveryFailed(String),

    /// Invalid configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),

    /// Wire contract violation.
    #[error("[{}] {}", error_codes::PROTOCOL_INVALID, .0)]
    Protocol(String),

    /// Channel send/receive error.
    #[error("[{}] {}", error_codes::CHANNEL_CLOSED, .0)]
    Channel(String),

    /// I/O error.
    #[error("[{}] {}", error_codes::IO_ERROR, .0)]
    Io(#[from] std::io::Error),
}

impl MeanAiError {
    /// Build a [`MeanAiError::SessionCreateFailed`] wrapping a runtime error.
    pub fn session_create(message: impl Into<String>, cause: RuntimeError) -> Self {
        Self::SessionCreateFailed {
            message: message.into(),
            cause,
        }
    }

    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ModelUnavailable(_) => error_codes::MODEL_UNAVAILABLE,
            Self::ModelDownloading(_) => error_codes::MODEL_DOWNLOADING,
            Self::SessionCreateFailed { .. } => error_codes::SESSION_CREATE_FAILED,
            Self::PromptFailed(_) => error_codes::PROMPT_FAILED,
            Self::ParseFailed(_) => error_codes::PARSE_FAILED,
            Self::DeliveryFailed(_) => error_codes::DELIVERY_FAILED,
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Protocol(_) => error_codes::PROTOCOL_INVALID,
            Self::Channel(_) => error_codes::CHANNEL_CLOSED,
            Self::Io(_) => error_codes::IO_ERROR,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> String {
        match self {
            Self::ModelUnavailable(m)
            | Self::ModelDownloading(m)
            | Self::PromptFailed(m)
            | Self::ParseFailed(m)
            | Self::DeliveryFailed(m)
            | Self::Config(m)
            | Self::Protocol(m)
            | Self::Channel(m) => m.clone(),
            Self::SessionCreateFailed { message, cause } => format!("{message}: {cause}"),
            Self::Io(e) => e.to_string(),
        }
    }

    /// Returns true if the caller may retry the same request later.
    ///
    /// `ModelUnavailable` is terminal until the user explicitly retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ModelDownloading(_) | Self::PromptFailed(_) | Self::DeliveryFailed(_) => true,
            Self::SessionCreateFailed { cause, .. } => cause.is_transient(),
            Self::ModelUnavailable(_)
            | Self::ParseFailed(_)
            | Self::Config(_)
            | Self::Protocol(_)
            | Self::Channel(_)
            | Self::Io(_) => false,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, MeanAiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_prefix() {
        let err = MeanAiError::ModelUnavailable("not enough disk".into());
        let display = format!("{err}");
        assert!(display.starts_with("[MODEL_UNAVAILABLE]"));
        assert!(display.contains("not enough disk"));
    }

    #[test]
    fn session_create_keeps_cause_as_source() {
        let err = MeanAiError::session_create(
            "could not create session",
            RuntimeError::Unreachable("connection refused".into()),
        );
        assert_eq!(err.code(), "SESSION_CREATE_FAILED");
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(
            source.as_deref(),
            Some("runtime unreachable: connection refused")
        );
        assert!(err.message().contains("connection refused"));
    }

    #[test]
    fn downloading_is_retryable_unavailable_is_not() {
        assert!(MeanAiError::ModelDownloading("x".into()).is_retryable());
        assert!(!MeanAiError::ModelUnavailable("x".into()).is_retryable());
    }

    #[test]
    fn session_create_retryability_follows_cause() {
        let transient = MeanAiError::session_create("x", RuntimeError::Timeout("5s".into()));
        assert!(transient.is_retryable());
        let fatal = MeanAiError::session_create("x", RuntimeError::Incompatible("bad".into()));
        assert!(!fatal.is_retryable());
    }

    #[test]
    fn all_codes_are_screaming_snake_case() {
        let errors = vec![
            MeanAiError::ModelUnavailable("x".into()),
            MeanAiError::ModelDownloading("x".into()),
            MeanAiError::session_create("x", RuntimeError::Disposed),
            MeanAiError::PromptFailed("x".into()),
            MeanAiError::ParseFailed("x".into()),
            MeanAiError::DeliveryFailed("x".into()),
            MeanAiError::Config("x".into()),
            MeanAiError::Protocol("x".into()),
            MeanAiError::Channel("x".into()),
            MeanAiError::Io(std::io::Error::other("x")),
        ];
        for err in &errors {
            let code = err.code();
            assert!(
                code.chars().all(|c| c.is_ascii_uppercase() || c == '_'),
                "code {code:?} is not SCREAMING_SNAKE_CASE"
            );
        }
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MeanAiError>();
    }
}
