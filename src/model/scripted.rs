//! Deterministic in-process model runtime.
//!
//! Used by unit and integration tests to drive the gate, the pool and the
//! router without a real runtime. Clones share state, so a test can hand
//! one clone to the host and keep another to script replies and inspect
//! counters.

use super::{LanguageModel, ModelAvailability, ModelSession, RuntimeError, SessionConfig};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Reply returned when no scripted reply is queued.
pub const DEFAULT_REPLY: &str = r#"{"partOfSpeech":"noun","description":"a scripted explanation","similar1":"","similar2":"","similar3":""}"#;

/// One scripted outcome for a prompt call.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Return this text.
    Text(String),
    /// Fail with this runtime error.
    Fail(RuntimeError),
}

#[derive(Debug)]
struct ScriptState {
    availability: ModelAvailability,
    fail_availability: bool,
    replies: VecDeque<ScriptedReply>,
    failing_creates: usize,
    create_delay: Duration,
    prompt_delay: Duration,
    prompts: Vec<String>,
    system_prompts: Vec<String>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<ScriptState>,
    availability_queries: AtomicU64,
    created: AtomicU64,
    destroyed: AtomicU64,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scripted [`LanguageModel`]. Reports `available` unless told otherwise.
#[derive(Debug, Clone)]
pub struct ScriptedModel {
    shared: Arc<Shared>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ScriptState {
                    availability: ModelAvailability::Available,
                    fail_availability: false,
                    replies: VecDeque::new(),
                    failing_creates: 0,
                    create_delay: Duration::ZERO,
                    prompt_delay: Duration::ZERO,
                    prompts: Vec::new(),
                    system_prompts: Vec::new(),
                }),
                availability_queries: AtomicU64::new(0),
                created: AtomicU64::new(0),
                destroyed: AtomicU64::new(0),
            }),
        }
    }

    pub fn with_availability(self, availability: ModelAvailability) -> Self {
        self.set_availability(availability);
        self
    }

    /// Queue a successful reply.
    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.push_reply(ScriptedReply::Text(text.into()));
        self
    }

    /// Queue a failing prompt.
    pub fn with_prompt_failure(self, error: RuntimeError) -> Self {
        self.push_reply(ScriptedReply::Fail(error));
        self
    }

    /// Delay every session creation. Creation is not counted until the
    /// delay has elapsed, so an abandoned creation leaves nothing behind.
    pub fn with_create_delay(self, delay: Duration) -> Self {
        self.shared.state().create_delay = delay;
        self
    }

    pub fn with_prompt_delay(self, delay: Duration) -> Self {
        self.shared.state().prompt_delay = delay;
        self
    }

    pub fn set_availability(&self, availability: ModelAvailability) {
        self.shared.state().availability = availability;
    }

    /// Make availability queries fail with `Unreachable`.
    pub fn fail_availability(&self, fail: bool) {
        self.shared.state().fail_availability = fail;
    }

    pub fn push_reply(&self, reply: ScriptedReply) {
        self.shared.state().replies.push_back(reply);
    }

    /// Fail the next `count` session creations.
    pub fn fail_next_creates(&self, count: usize) {
        self.shared.state().failing_creates = count;
    }

    pub fn availability_queries(&self) -> u64 {
        self.shared.availability_queries.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> u64 {
        self.shared.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> u64 {
        self.shared.destroyed.load(Ordering::SeqCst)
    }

    /// Sessions created and not yet destroyed.
    pub fn live(&self) -> u64 {
        self.created().saturating_sub(self.destroyed())
    }

    /// Every user prompt received, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.shared.state().prompts.clone()
    }

    /// The system prompt of every created session, in order.
    pub fn system_prompts(&self) -> Vec<String> {
        self.shared.state().system_prompts.clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn availability(&self) -> Result<ModelAvailability, RuntimeError> {
        self.shared
            .availability_queries
            .fetch_add(1, Ordering::SeqCst);
        let state = self.shared.state();
        if state.fail_availability {
            return Err(RuntimeError::Unreachable("scripted outage".to_owned()));
        }
        Ok(state.availability)
    }

    async fn create(&self, config: SessionConfig) -> Result<Box<dyn ModelSession>, RuntimeError> {
        let delay = self.shared.state().create_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        {
            let mut state = self.shared.state();
            if state.failing_creates > 0 {
                state.failing_creates -= 1;
                return Err(RuntimeError::Http {
                    status: 500,
                    message: "scripted create failure".to_owned(),
                });
            }
            state.system_prompts.push(config.system_prompt);
        }

        self.shared.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            shared: Arc::clone(&self.shared),
            destroyed: false,
        }))
    }
}

struct ScriptedSession {
    shared: Arc<Shared>,
    destroyed: bool,
}

#[async_trait]
impl ModelSession for ScriptedSession {
    async fn prompt(&mut self, text: &str) -> Result<String, RuntimeError> {
        if self.destroyed {
            return Err(RuntimeError::Disposed);
        }
        let (reply, delay) = {
            let mut state = self.shared.state();
            state.prompts.push(text.to_owned());
            (state.replies.pop_front(), state.prompt_delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match reply {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Fail(e)) => Err(e),
            None => Ok(DEFAULT_REPLY.to_owned()),
        }
    }

    async fn destroy(&mut self) -> Result<(), RuntimeError> {
        if !self.destroyed {
            self.destroyed = true;
            self.shared.destroyed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SessionConfig {
        SessionConfig {
            system_prompt: "sys".to_owned(),
            progress: None,
        }
    }

    #[tokio::test]
    async fn replies_are_served_in_order_then_default() {
        let model = ScriptedModel::new()
            .with_reply("first")
            .with_prompt_failure(RuntimeError::Timeout("slow".into()));
        let mut session = model.create(config()).await.expect("create");

        assert_eq!(session.prompt("a").await.expect("first"), "first");
        assert!(session.prompt("b").await.is_err());
        assert_eq!(session.prompt("c").await.expect("default"), DEFAULT_REPLY);
        assert_eq!(model.prompts(), vec!["a", "b", "c"]);
        assert_eq!(model.system_prompts(), vec!["sys"]);

        session.destroy().await.expect("destroy");
        session.destroy().await.expect("second destroy");
        assert_eq!(model.destroyed(), 1);
        assert_eq!(model.live(), 0);
    }

    #[tokio::test]
    async fn failing_creates_are_counted_down() {
        let model = ScriptedModel::new();
        model.fail_next_creates(1);
        assert!(model.create(config()).await.is_err());
        let mut session = model.create(config()).await.expect("second create");
        session.destroy().await.expect("destroy");
        assert_eq!(model.created(), 1);
    }
}
