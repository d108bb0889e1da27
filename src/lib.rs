//! MeanAI: select-to-explain over a local language model.
//!
//! A user selects text on a page, clicks the icon that appears next to the
//! selection, and gets a short structured explanation (part of speech,
//! definition, synonyms) produced by an on-device model.
//!
//! # Architecture
//!
//! - **Model**: capability gate, session factory and warm-prefetch pool over
//!   a [`LanguageModel`](model::LanguageModel) (Ollama in production)
//! - **Explain**: prompt construction and response normalization
//! - **Host**: per-tab mailbox, message router and the stdio bridge
//! - **Content**: selection tracking and the icon/dialog state machine

pub mod config;
pub mod content;
pub mod error;
pub mod explain;
pub mod host;
pub mod model;
pub mod paths;
pub mod progress;
pub mod tab;

pub use config::MeanAiConfig;
pub use error::{MeanAiError, Result};
pub use explain::{ExplanationRecord, Explainer};
pub use progress::{ProgressCallback, ProgressEvent};
pub use tab::TabId;
