//! Message router: the single ingress point of the background host.
//!
//! [`RouterClient`] is cheap to clone and sends `(tab, message)` requests
//! over an mpsc channel; [`Router::run`] routes each one and acknowledges
//! it with a [`Dispatch`]. Work that may suspend for long (explain cycles,
//! capability probes, pruning a prefetch that is still creating) runs on
//! tracked tasks so the router keeps accepting messages.
//!
//! Delivery to a tab is serialised by a per-tab lock. A flush takes the
//! tab's whole mailbox, pushes oldest first, and puts the remainder back
//! at the front on the first failure. Two readiness signals racing for the
//! same tab therefore cannot deliver the same result twice.

use crate::config::MeanAiConfig;
use crate::error::{MeanAiError, Result};
use crate::explain::{ExplanationRecord, Explainer};
use crate::host::contract::{BackgroundMessage, ContentMessage};
use crate::host::mailbox::Mailbox;
use crate::host::transport::TabTransport;
use crate::model::{
    CapabilityGate, LanguageModel, ModelAvailability, SessionFactory, SessionPool,
};
use crate::progress::tracing_progress;
use crate::tab::TabId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::task::TaskTracker;
use uuid::Uuid;

/// How the router handled a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Readiness recorded; `delivered` queued results were pushed.
    Ready { delivered: usize },
    /// A session prefetch was started.
    PrefetchStarted,
    /// The prefetch was not started (already outstanding, disabled, or the
    /// model cannot create sessions).
    PrefetchIgnored,
    /// An explain cycle was scheduled for this text.
    ExplainScheduled { text: String },
    /// The capability latch was cleared and a fresh check scheduled.
    ModelReset,
    /// Tab state was dropped; `dropped` queued results were discarded.
    TabClosed { dropped: usize },
    /// Nothing to do (e.g. an unrelated context-menu entry).
    Ignored,
}

/// Observable router activity.
#[derive(Debug, Clone, PartialEq)]
pub enum RouterEvent {
    PrefetchStarted { tab: TabId },
    ExplainStarted { tab: TabId, text: String },
    ExplainFinished { tab: TabId, error_code: Option<String> },
    Delivered { tab: TabId, parcel_id: Uuid },
    Queued { tab: TabId, pending: usize },
    TabPruned { tab: TabId, dropped: usize },
    ModelStatus { availability: ModelAvailability },
}

/// Background-process state owned by the router.
pub struct Background {
    explainer: Explainer,
    mailbox: Mailbox,
    transport: Arc<dyn TabTransport>,
    delivery_locks: Mutex<HashMap<TabId, Arc<tokio::sync::Mutex<()>>>>,
}

impl Background {
    pub fn new(explainer: Explainer, mailbox: Mailbox, transport: Arc<dyn TabTransport>) -> Self {
        Self {
            explainer,
            mailbox,
            transport,
            delivery_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wire gate, pool, explainer and mailbox from configuration.
    pub fn from_config(
        config: &MeanAiConfig,
        model: Arc<dyn LanguageModel>,
        transport: Arc<dyn TabTransport>,
    ) -> Self {
        let gate = Arc::new(CapabilityGate::new(Arc::clone(&model)));
        let factory = SessionFactory::new(
            model,
            config.model.system_prompt.as_str(),
            config.model.create_timeout(),
        )
        .with_progress(tracing_progress());
        let pool = Arc::new(SessionPool::new(factory, config.sessions.prefetch));
        let explainer = Explainer::new(gate, pool, config.model.prompt_timeout())
            .with_warm_on_ready(config.model.warm_download_on_ready);
        Self::new(
            explainer,
            Mailbox::new(config.mailbox.max_pending_per_tab),
            transport,
        )
    }

    pub fn explainer(&self) -> &Explainer {
        &self.explainer
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    fn gate(&self) -> &CapabilityGate {
        self.explainer.gate()
    }

    fn pool(&self) -> &SessionPool {
        self.explainer.pool()
    }

    fn delivery_lock(&self, tab: TabId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .delivery_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(tab).or_default())
    }

    /// Push every queued result for `tab`, oldest first. Returns how many
    /// were delivered; the rest stay queued in order.
    async fn flush(&self, tab: TabId, events: &broadcast::Sender<RouterEvent>) -> usize {
        let lock = self.delivery_lock(tab);
        let _guard = lock.lock().await;

        let mut parcels = self.mailbox.drain_to(tab).into_iter();
        let mut delivered = 0;
        while let Some(parcel) = parcels.next() {
            let message = BackgroundMessage::Show {
                data: parcel.record.clone(),
            };
            match self.transport.deliver(tab, &message).await {
                Ok(()) => {
                    delivered += 1;
                    let _ = events.send(RouterEvent::Delivered {
                        tab,
                        parcel_id: parcel.id,
                    });
                }
                Err(e) => {
                    let mut undelivered = vec![parcel];
                    undelivered.extend(parcels);
                    self.mailbox.restore_front(tab, undelivered);
                    let pending = self.mailbox.pending(tab);
                    tracing::warn!(tab_id = %tab, pending, error = %e, "delivery failed; result stays queued");
                    let _ = events.send(RouterEvent::Queued { tab, pending });
                    break;
                }
            }
        }
        delivered
    }

    /// Post a finished record and try to push it straight away.
    async fn complete(
        &self,
        tab: TabId,
        record: ExplanationRecord,
        events: &broadcast::Sender<RouterEvent>,
    ) {
        self.mailbox.post(tab, record);
        self.flush(tab, events).await;
    }

    fn forget_tab(&self, tab: TabId) {
        self.delivery_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&tab);
    }
}

struct RouterRequest {
    tab: TabId,
    message: ContentMessage,
    ack: oneshot::Sender<Result<Dispatch>>,
}

/// Cloneable handle for sending messages to the router.
#[derive(Clone)]
pub struct RouterClient {
    request_tx: mpsc::Sender<RouterRequest>,
    event_tx: broadcast::Sender<RouterEvent>,
}

impl RouterClient {
    /// Send `message` on behalf of `tab` and wait for the router's ack.
    ///
    /// # Errors
    /// `Protocol` for invalid messages, `Channel` if the router is gone.
    pub async fn send(&self, tab: TabId, message: ContentMessage) -> Result<Dispatch> {
        message.validate()?;

        let (ack, ack_rx) = oneshot::channel();
        self.request_tx
            .send(RouterRequest { tab, message, ack })
            .await
            .map_err(|e| MeanAiError::Channel(format!("failed to send router request: {e}")))?;

        ack_rx
            .await
            .map_err(|e| MeanAiError::Channel(format!("router ack dropped: {e}")))?
    }

    /// A sender bound to one tab, as a content script sees the runtime.
    #[must_use]
    pub fn for_tab(&self, tab: TabId) -> TabPort {
        TabPort {
            tab,
            client: self.clone(),
        }
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<RouterEvent> {
        self.event_tx.subscribe()
    }
}

/// Router handle bound to a single tab.
#[derive(Clone)]
pub struct TabPort {
    tab: TabId,
    client: RouterClient,
}

impl TabPort {
    pub fn tab(&self) -> TabId {
        self.tab
    }

    pub async fn send(&self, message: ContentMessage) -> Result<Dispatch> {
        self.client.send(self.tab, message).await
    }
}

/// Router server loop.
pub struct Router {
    request_rx: mpsc::Receiver<RouterRequest>,
    event_tx: broadcast::Sender<RouterEvent>,
    background: Arc<Background>,
    tasks: TaskTracker,
}

#[must_use]
pub fn router_channel(
    request_capacity: usize,
    event_capacity: usize,
    background: Background,
) -> (RouterClient, Router) {
    let (request_tx, request_rx) = mpsc::channel(request_capacity.max(1));
    let (event_tx, _event_rx) = broadcast::channel(event_capacity.max(1));

    (
        RouterClient {
            request_tx,
            event_tx: event_tx.clone(),
        },
        Router {
            request_rx,
            event_tx,
            background: Arc::new(background),
            tasks: TaskTracker::new(),
        },
    )
}

impl Router {
    /// Shared background state, for inspection.
    pub fn background(&self) -> Arc<Background> {
        Arc::clone(&self.background)
    }

    /// Route requests until every client is dropped, then wait for
    /// in-flight work and dispose prefetched sessions.
    pub async fn run(mut self) {
        while let Some(request) = self.request_rx.recv().await {
            let kind = request.message.kind();
            let outcome = self.route(request.tab, request.message).await;
            if let Err(e) = &outcome {
                tracing::warn!(tab_id = %request.tab, kind, error = %e, "message rejected");
            }
            let _ = request.ack.send(outcome);
        }

        tracing::info!("router clients gone; draining in-flight work");
        self.tasks.close();
        self.tasks.wait().await;
        self.background.pool().shutdown().await;
        tracing::info!("router stopped");
    }

    /// Route one message from `tab`.
    pub async fn route(&self, tab: TabId, message: ContentMessage) -> Result<Dispatch> {
        message.validate()?;
        tracing::debug!(tab_id = %tab, kind = message.kind(), "routing message");

        if let Some(text) = message.explain_request() {
            return Ok(self.handle_explain(tab, text.to_owned()));
        }
        match message {
            ContentMessage::ContentReady => Ok(self.handle_ready(tab).await),
            ContentMessage::PrefetchSession => Ok(self.handle_prefetch(tab)),
            ContentMessage::RetryModel => Ok(self.handle_retry()),
            ContentMessage::TabClosed => Ok(self.handle_tab_closed(tab)),
            ContentMessage::ExplainText { .. } | ContentMessage::ContextMenuClicked { .. } => {
                Ok(Dispatch::Ignored)
            }
        }
    }

    async fn handle_ready(&self, tab: TabId) -> Dispatch {
        let background = &self.background;
        background.transport.on_ready(tab);
        let delivered = background.flush(tab, &self.event_tx).await;

        let task_background = Arc::clone(background);
        let events = self.event_tx.clone();
        self.tasks.spawn(async move {
            let availability = task_background.explainer.on_content_ready().await;
            let _ = events.send(RouterEvent::ModelStatus { availability });
        });

        Dispatch::Ready { delivered }
    }

    fn handle_prefetch(&self, tab: TabId) -> Dispatch {
        let availability = self.background.gate().last_known();
        if matches!(
            availability,
            ModelAvailability::Unavailable | ModelAvailability::Downloading
        ) {
            tracing::debug!(tab_id = %tab, availability = %availability, "prefetch skipped");
            return Dispatch::PrefetchIgnored;
        }
        if self.background.pool().prefetch(tab) {
            let _ = self.event_tx.send(RouterEvent::PrefetchStarted { tab });
            Dispatch::PrefetchStarted
        } else {
            Dispatch::PrefetchIgnored
        }
    }

    fn handle_explain(&self, tab: TabId, text: String) -> Dispatch {
        let background = Arc::clone(&self.background);
        let events = self.event_tx.clone();
        let cycle_text = text.clone();
        self.tasks.spawn(async move {
            let _ = events.send(RouterEvent::ExplainStarted {
                tab,
                text: cycle_text.clone(),
            });
            let record = background.explainer.explain(tab, &cycle_text).await;
            let _ = events.send(RouterEvent::ExplainFinished {
                tab,
                error_code: record.error_code.clone(),
            });
            background.complete(tab, record, &events).await;
        });
        Dispatch::ExplainScheduled { text }
    }

    fn handle_retry(&self) -> Dispatch {
        self.background.gate().reset();
        let background = Arc::clone(&self.background);
        let events = self.event_tx.clone();
        self.tasks.spawn(async move {
            let availability = background.gate().check().await;
            let _ = events.send(RouterEvent::ModelStatus { availability });
        });
        Dispatch::ModelReset
    }

    fn handle_tab_closed(&self, tab: TabId) -> Dispatch {
        let background = &self.background;
        background.transport.on_closed(tab);
        let dropped = background.mailbox.prune(tab);
        background.forget_tab(tab);
        let _ = self.event_tx.send(RouterEvent::TabPruned { tab, dropped });

        let task_background = Arc::clone(background);
        self.tasks.spawn(async move {
            task_background.pool().prune(tab).await;
        });
        Dispatch::TabClosed { dropped }
    }
}
