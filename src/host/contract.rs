//! Versioned cross-context message contract.
//!
//! Content scripts send [`ContentMessage`]s to the background host; the host
//! answers with [`BackgroundMessage`]s. Message names and payload shapes are
//! stable. Outside a browser the messages travel inside versioned
//! envelopes that carry the tab id the browser would otherwise supply.

use crate::error::MeanAiError;
use crate::explain::ExplanationRecord;
use crate::tab::TabId;
use serde::{Deserialize, Serialize};

/// Contract version for envelopes.
pub const EVENT_VERSION: u32 = 1;

/// A context-menu entry registered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuItem {
    pub id: &'static str,
    pub title: &'static str,
    /// Browser contexts the entry appears in.
    pub contexts: &'static [&'static str],
}

/// The "explain selection" context-menu entry.
pub const EXPLAIN_MENU: MenuItem = MenuItem {
    id: "explain",
    title: "Explain the selected text simply",
    contexts: &["selection"],
};

/// Content script → background host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentMessage {
    /// The content script mounted and is listening.
    ContentReady,
    /// Text was selected; warm a session speculatively.
    PrefetchSession,
    /// The icon was activated; explain `text`.
    ExplainText { text: String },
    /// The user asked to retry after the model was reported unavailable.
    RetryModel,
    /// The tab is going away.
    TabClosed,
    /// A host context-menu entry was activated.
    ContextMenuClicked {
        #[serde(rename = "menuItemId")]
        menu_item_id: String,
        #[serde(rename = "selectionText", default)]
        selection_text: String,
    },
}

impl ContentMessage {
    /// Render the message kind to wire format.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ContentReady => "CONTENT_READY",
            Self::PrefetchSession => "PREFETCH_SESSION",
            Self::ExplainText { .. } => "EXPLAIN_TEXT",
            Self::RetryModel => "RETRY_MODEL",
            Self::TabClosed => "TAB_CLOSED",
            Self::ContextMenuClicked { .. } => "CONTEXT_MENU_CLICKED",
        }
    }

    /// The text to explain, if this message asks for an explanation.
    ///
    /// `EXPLAIN_TEXT` text is passed through as submitted.
    /// A context-menu click counts only for the explain entry and a
    /// non-empty selection.
    pub fn explain_request(&self) -> Option<&str> {
        match self {
            Self::ExplainText { text } => Some(text.as_str()),
            Self::ContextMenuClicked {
                menu_item_id,
                selection_text,
            } if menu_item_id == EXPLAIN_MENU.id && !selection_text.trim().is_empty() => {
                Some(selection_text.trim())
            }
            _ => None,
        }
    }

    /// Validate message payload.
    pub fn validate(&self) -> Result<(), ContractError> {
        match self {
            Self::ExplainText { text } if text.trim().is_empty() => Err(ContractError::new(
                ContractErrorKind::InvalidMessage,
                "EXPLAIN_TEXT text cannot be empty".to_owned(),
            )),
            _ => Ok(()),
        }
    }
}

/// Background host → content script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackgroundMessage {
    /// Render an explanation (or an error record).
    Show { data: ExplanationRecord },
}

/// A versioned inbound envelope (content side → host).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    pub v: u32,
    #[serde(rename = "tabId")]
    pub tab_id: TabId,
    pub message: ContentMessage,
}

impl InboundEnvelope {
    /// Build a v1 inbound envelope.
    #[must_use]
    pub fn new(tab_id: TabId, message: ContentMessage) -> Self {
        Self {
            v: EVENT_VERSION,
            tab_id,
            message,
        }
    }

    /// Validate envelope version and message payload.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.v != EVENT_VERSION {
            return Err(ContractError::new(
                ContractErrorKind::UnsupportedVersion,
                format!(
                    "unsupported contract version {}; expected {}",
                    self.v, EVENT_VERSION
                ),
            ));
        }
        self.message.validate()
    }
}

/// A versioned outbound envelope (host → content side).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    pub v: u32,
    #[serde(rename = "tabId")]
    pub tab_id: TabId,
    pub message: BackgroundMessage,
}

impl OutboundEnvelope {
    #[must_use]
    pub fn new(tab_id: TabId, message: BackgroundMessage) -> Self {
        Self {
            v: EVENT_VERSION,
            tab_id,
            message,
        }
    }
}

/// Reply to an input line that could not be accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub v: u32,
    pub error: String,
}

impl ErrorEnvelope {
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            v: EVENT_VERSION,
            error: error.into(),
        }
    }
}

/// Contract validation error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorKind {
    UnsupportedVersion,
    InvalidMessage,
}

/// Contract validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractError {
    pub kind: ContractErrorKind,
    pub message: String,
}

impl ContractError {
    #[must_use]
    pub fn new(kind: ContractErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

impl std::fmt::Display for ContractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ContractError {}

impl From<ContractError> for MeanAiError {
    fn from(err: ContractError) -> Self {
        MeanAiError::Protocol(err.to_string())
    }
}
