//! The explain cycle: capability check, session acquire, prompt,
//! guaranteed release, normalization.

pub mod normalize;
pub mod prompt;
pub mod record;

pub use normalize::normalize;
pub use prompt::{DEFAULT_SYSTEM_PROMPT, build_prompt};
pub use record::ExplanationRecord;

use crate::error::{MeanAiError, Result};
use crate::model::{CapabilityGate, ModelAvailability, Session, SessionPool};
use crate::tab::TabId;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Runs explain cycles against a capability gate and a session pool.
pub struct Explainer {
    gate: Arc<CapabilityGate>,
    pool: Arc<SessionPool>,
    prompt_timeout: Duration,
    warm_on_ready: bool,
    warming: AtomicBool,
}

impl Explainer {
    pub fn new(gate: Arc<CapabilityGate>, pool: Arc<SessionPool>, prompt_timeout: Duration) -> Self {
        Self {
            gate,
            pool,
            prompt_timeout,
            warm_on_ready: true,
            warming: AtomicBool::new(false),
        }
    }

    /// Whether a `downloadable` model is warmed on content readiness.
    pub fn with_warm_on_ready(mut self, warm: bool) -> Self {
        self.warm_on_ready = warm;
        self
    }

    pub fn gate(&self) -> &Arc<CapabilityGate> {
        &self.gate
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    /// Run one explain cycle for `text` on behalf of `tab`.
    ///
    /// Never fails: capability, creation and prompt failures become an
    /// error record that keeps `text` as its origin. The session acquired
    /// for the cycle is released on every path.
    pub async fn explain(&self, tab: TabId, text: &str) -> ExplanationRecord {
        match self.try_explain(tab, text).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(tab_id = %tab, code = e.code(), error = %e, "explain cycle failed");
                ExplanationRecord::from_error(text, &e)
            }
        }
    }

    async fn try_explain(&self, tab: TabId, text: &str) -> Result<ExplanationRecord> {
        if let Err(e) = self.gate.ensure_ready().await {
            // A prefetched session cannot be used now; do not keep it alive.
            self.pool.evict(tab);
            return Err(e);
        }

        let mut session = self.pool.acquire(tab).await?;
        tracing::debug!(
            tab_id = %tab,
            session_id = %session.id(),
            origin = session.origin().as_str(),
            "explain cycle started"
        );
        let outcome = self.prompt(&mut session, text).await;
        self.pool.release(session).await;

        let raw = outcome?;
        Ok(normalize(&raw, text))
    }

    async fn prompt(&self, session: &mut Session, text: &str) -> Result<String> {
        let prompt = build_prompt(text);
        match tokio::time::timeout(self.prompt_timeout, session.prompt(&prompt)).await {
            Err(_) => Err(MeanAiError::PromptFailed(format!(
                "the model did not answer within {}s",
                self.prompt_timeout.as_secs()
            ))),
            Ok(Err(e)) => Err(MeanAiError::PromptFailed(e.to_string())),
            Ok(Ok(raw)) if raw.trim().is_empty() => Err(MeanAiError::PromptFailed(
                "the model returned an empty reply".to_owned(),
            )),
            Ok(Ok(raw)) => Ok(raw),
        }
    }

    /// Readiness hook: check availability and, if the model is only
    /// downloadable, start the download with one transient session.
    ///
    /// Concurrent calls start at most one warm-up.
    pub async fn on_content_ready(&self) -> ModelAvailability {
        let availability = self.gate.check().await;
        if availability != ModelAvailability::Downloadable || !self.warm_on_ready {
            return availability;
        }
        if self.warming.swap(true, Ordering::SeqCst) {
            return availability;
        }

        tracing::info!("model is downloadable; warming it");
        if let Err(e) = self.pool.warm_model().await {
            tracing::warn!(error = %e, "model warm-up failed");
        }
        self.warming.store(false, Ordering::SeqCst);
        self.gate.check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::scripted::ScriptedModel;
    use crate::model::{RuntimeError, SessionFactory};

    fn make_explainer(model: &ScriptedModel, prefetch: bool) -> Explainer {
        let shared: Arc<dyn crate::model::LanguageModel> = Arc::new(model.clone());
        let gate = Arc::new(CapabilityGate::new(Arc::clone(&shared)));
        let factory = SessionFactory::new(shared, DEFAULT_SYSTEM_PROMPT, Duration::from_secs(5));
        let pool = Arc::new(SessionPool::new(factory, prefetch));
        Explainer::new(gate, pool, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn successful_cycle_normalizes_and_disposes() {
        let model = ScriptedModel::new().with_reply(
            r#"{"originText":"ubiquitous","partOfSpeech":"adjective","description":"present everywhere","similar1":"omnipresent","similar2":"","similar3":""}"#,
        );
        let explainer = make_explainer(&model, true);

        let record = explainer.explain(TabId(1), "ubiquitous").await;
        assert_eq!(record.origin_text, "ubiquitous");
        assert_eq!(record.part_of_speech, "adjective");
        assert_eq!(record.similar[1], "");
        assert_eq!(record.similar[2], "");
        assert_eq!(model.created(), 1);
        assert_eq!(model.destroyed(), 1);
        assert_eq!(model.system_prompts(), vec![DEFAULT_SYSTEM_PROMPT]);
        assert!(model.prompts()[0].contains("\"ubiquitous\""));
    }

    #[tokio::test]
    async fn unavailable_model_yields_error_record_without_sessions() {
        let model = ScriptedModel::new().with_availability(ModelAvailability::Unavailable);
        let explainer = make_explainer(&model, true);

        let record = explainer.explain(TabId(1), "word").await;
        assert_eq!(record.origin_text, "word");
        assert!(!record.description.is_empty());
        assert_eq!(record.error_code.as_deref(), Some("MODEL_UNAVAILABLE"));
        assert_eq!(model.created(), 0);
    }

    #[tokio::test]
    async fn prompt_failure_still_disposes() {
        let model = ScriptedModel::new()
            .with_prompt_failure(RuntimeError::Http {
                status: 500,
                message: "boom".into(),
            });
        let explainer = make_explainer(&model, true);

        let record = explainer.explain(TabId(2), "word").await;
        assert_eq!(record.error_code.as_deref(), Some("PROMPT_FAILED"));
        assert_eq!(model.created(), 1);
        assert_eq!(model.destroyed(), 1);
    }

    #[tokio::test]
    async fn empty_reply_is_prompt_failure() {
        let model = ScriptedModel::new().with_reply("  \n");
        let explainer = make_explainer(&model, false);
        let record = explainer.explain(TabId(1), "word").await;
        assert_eq!(record.error_code.as_deref(), Some("PROMPT_FAILED"));
        assert_eq!(model.live(), 0);
    }

    #[tokio::test]
    async fn prose_reply_becomes_description() {
        let model = ScriptedModel::new().with_reply("It is found everywhere.");
        let explainer = make_explainer(&model, false);
        let record = explainer.explain(TabId(1), "ubiquitous").await;
        assert_eq!(record.description, "It is found everywhere.");
        assert_eq!(record.part_of_speech, "Unknown");
        assert!(!record.is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_prompt_times_out_and_disposes() {
        let model = ScriptedModel::new().with_prompt_delay(Duration::from_secs(60));
        let explainer = make_explainer(&model, false);
        let record = explainer.explain(TabId(1), "word").await;
        assert_eq!(record.error_code.as_deref(), Some("PROMPT_FAILED"));
        assert!(record.description.contains("did not answer"));
        assert_eq!(model.live(), 0);
    }

    #[tokio::test]
    async fn create_failure_surfaces_as_session_create_failed() {
        let model = ScriptedModel::new();
        model.fail_next_creates(1);
        let explainer = make_explainer(&model, false);
        let record = explainer.explain(TabId(1), "word").await;
        assert_eq!(record.error_code.as_deref(), Some("SESSION_CREATE_FAILED"));
        assert_eq!(model.live(), 0);
    }

    #[tokio::test]
    async fn gate_failure_disposes_prefetched_session() {
        let model = ScriptedModel::new();
        let explainer = make_explainer(&model, true);
        assert!(explainer.pool().prefetch(TabId(3)));

        model.set_availability(ModelAvailability::Unavailable);
        let record = explainer.explain(TabId(3), "word").await;
        assert!(record.is_error());
        assert!(!explainer.pool().has_prefetch(TabId(3)));
        explainer.pool().shutdown().await;
        assert_eq!(model.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn gate_failure_does_not_wait_for_slow_prefetch() {
        let model = ScriptedModel::new().with_create_delay(Duration::from_secs(100));
        let shared: Arc<dyn crate::model::LanguageModel> = Arc::new(model.clone());
        let gate = Arc::new(CapabilityGate::new(Arc::clone(&shared)));
        let factory = SessionFactory::new(shared, DEFAULT_SYSTEM_PROMPT, Duration::from_secs(300));
        let pool = Arc::new(SessionPool::new(factory, true));
        let explainer = Explainer::new(gate, pool, Duration::from_secs(5));
        assert!(explainer.pool().prefetch(TabId(1)));

        model.set_availability(ModelAvailability::Unavailable);
        let started = tokio::time::Instant::now();
        let record = explainer.explain(TabId(1), "word").await;
        assert_eq!(record.error_code.as_deref(), Some("MODEL_UNAVAILABLE"));
        assert!(started.elapsed() < Duration::from_secs(1));

        explainer.pool().shutdown().await;
        assert_eq!(model.created(), 1);
        assert_eq!(model.live(), 0);
    }

    #[tokio::test]
    async fn readiness_warms_downloadable_model() {
        let model = ScriptedModel::new().with_availability(ModelAvailability::Downloadable);
        let explainer = make_explainer(&model, true);
        explainer.on_content_ready().await;
        assert_eq!(model.created(), 1);
        assert_eq!(model.destroyed(), 1);

        let available = ScriptedModel::new();
        let explainer = make_explainer(&available, true);
        assert_eq!(explainer.on_content_ready().await, ModelAvailability::Available);
        assert_eq!(available.created(), 0);
    }

    #[tokio::test]
    async fn readiness_warm_up_can_be_disabled() {
        let model = ScriptedModel::new().with_availability(ModelAvailability::Downloadable);
        let explainer = make_explainer(&model, true).with_warm_on_ready(false);
        explainer.on_content_ready().await;
        assert_eq!(model.created(), 0);
    }
}
