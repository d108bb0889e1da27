//! Session pool: warm-prefetch with fresh fallback.
//!
//! A prefetch starts creating a session for a tab before the user confirms.
//! At most one prefetch is held per tab; a second prefetch for a tab whose
//! slot is occupied (still creating or already created) is a no-op.
//! [`SessionPool::acquire`] consumes the slot, awaiting a prefetch that is
//! still in flight, and falls back to a fresh session if there is none or
//! it failed. Every session handed out must come back through
//! [`SessionPool::release`], which disposes it; sessions are never reused
//! across requests.

use super::session::{Session, SessionId, SessionOrigin};
use super::{LanguageModel, RuntimeError, SessionConfig};
use crate::error::{MeanAiError, Result};
use crate::progress::ProgressCallback;
use crate::tab::TabId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

/// Snapshot of pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Sessions successfully created.
    pub created: u64,
    /// Sessions disposed.
    pub destroyed: u64,
    /// Session creations that failed or timed out.
    pub create_failures: u64,
    /// Prefetches started.
    pub prefetches: u64,
    /// Tabs currently holding a prefetch slot.
    pub outstanding_prefetches: usize,
}

impl PoolStats {
    /// Sessions created but not yet disposed.
    pub fn live(&self) -> u64 {
        self.created.saturating_sub(self.destroyed)
    }
}

#[derive(Debug, Default)]
struct PoolCounters {
    created: AtomicU64,
    destroyed: AtomicU64,
    create_failures: AtomicU64,
    prefetches: AtomicU64,
}

/// Creates and disposes sessions with a fixed system prompt.
///
/// Cheap to clone; prefetch tasks carry their own clone.
#[derive(Clone)]
pub struct SessionFactory {
    model: Arc<dyn LanguageModel>,
    system_prompt: Arc<str>,
    create_timeout: Duration,
    progress: Option<ProgressCallback>,
    next_id: Arc<AtomicU64>,
    counters: Arc<PoolCounters>,
}

impl SessionFactory {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        system_prompt: impl Into<Arc<str>>,
        create_timeout: Duration,
    ) -> Self {
        Self {
            model,
            system_prompt: system_prompt.into(),
            create_timeout,
            progress: None,
            next_id: Arc::new(AtomicU64::new(1)),
            counters: Arc::new(PoolCounters::default()),
        }
    }

    /// Attach a download progress callback passed to every creation.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Create a session.
    ///
    /// # Errors
    /// Returns `SessionCreateFailed` with the runtime cause attached, also
    /// when creation exceeds the configured timeout.
    pub async fn create(&self, origin: SessionOrigin) -> Result<Session> {
        self.create_within(origin, Some(self.create_timeout)).await
    }

    /// Create a session, bounded by `limit` if given.
    async fn create_within(&self, origin: SessionOrigin, limit: Option<Duration>) -> Result<Session> {
        let config = SessionConfig {
            system_prompt: self.system_prompt.to_string(),
            progress: self.progress.clone(),
        };

        let created = match limit {
            Some(limit) => tokio::time::timeout(limit, self.model.create(config)).await,
            None => Ok(self.model.create(config).await),
        };
        let inner = match created {
            Ok(Ok(inner)) => inner,
            Ok(Err(cause)) => {
                self.counters.create_failures.fetch_add(1, Ordering::SeqCst);
                return Err(MeanAiError::session_create(
                    "failed to create model session",
                    cause,
                ));
            }
            Err(_) => {
                self.counters.create_failures.fetch_add(1, Ordering::SeqCst);
                return Err(MeanAiError::session_create(
                    "model session creation timed out",
                    RuntimeError::Timeout(format!(
                        "{}s elapsed",
                        limit.unwrap_or(self.create_timeout).as_secs()
                    )),
                ));
            }
        };

        let id = SessionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.counters.created.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(session_id = %id, origin = origin.as_str(), "session created");
        Ok(Session::new(
            id,
            Arc::clone(&self.system_prompt),
            origin,
            inner,
        ))
    }

    /// Dispose a session. Failures are logged; the session counts as
    /// disposed either way and is never prompted again.
    pub async fn dispose(&self, session: Session) {
        let id = session.id();
        match session.dispose().await {
            Ok(()) => tracing::debug!(session_id = %id, "session disposed"),
            Err(e) => tracing::warn!(session_id = %id, error = %e, "session destroy failed"),
        }
        self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

type PrefetchSlot = JoinHandle<Result<Session>>;

/// Per-tab session pool.
pub struct SessionPool {
    factory: SessionFactory,
    prefetch_enabled: bool,
    slots: Mutex<HashMap<TabId, PrefetchSlot>>,
    disposals: TaskTracker,
}

impl SessionPool {
    pub fn new(factory: SessionFactory, prefetch_enabled: bool) -> Self {
        Self {
            factory,
            prefetch_enabled,
            slots: Mutex::new(HashMap::new()),
            disposals: TaskTracker::new(),
        }
    }

    /// Start warming a session for `tab`.
    ///
    /// Returns `true` if a prefetch was started, `false` if prefetching is
    /// disabled or the tab already holds a slot.
    pub fn prefetch(&self, tab: TabId) -> bool {
        if !self.prefetch_enabled {
            return false;
        }
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots.contains_key(&tab) {
            tracing::debug!(tab_id = %tab, "prefetch already outstanding; ignoring");
            return false;
        }

        let factory = self.factory.clone();
        let handle = tokio::spawn(async move {
            let created = factory.create(SessionOrigin::Pooled).await;
            if let Err(e) = &created {
                tracing::warn!(tab_id = %tab, error = %e, "session prefetch failed");
            }
            created
        });
        slots.insert(tab, handle);
        self.factory
            .counters
            .prefetches
            .fetch_add(1, Ordering::SeqCst);
        tracing::debug!(tab_id = %tab, "session prefetch started");
        true
    }

    /// Whether `tab` holds a prefetch slot.
    pub fn has_prefetch(&self, tab: TabId) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&tab)
    }

    /// Take a session for one explain cycle on `tab`.
    ///
    /// # Errors
    /// Returns `SessionCreateFailed` if no prefetched session is usable and
    /// fresh creation fails.
    pub async fn acquire(&self, tab: TabId) -> Result<Session> {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&tab);

        if let Some(handle) = slot {
            match handle.await {
                Ok(Ok(session)) => {
                    tracing::debug!(tab_id = %tab, session_id = %session.id(), "using prefetched session");
                    return Ok(session);
                }
                Ok(Err(e)) => {
                    tracing::debug!(tab_id = %tab, error = %e, "prefetched session unusable; creating fresh");
                }
                Err(e) => {
                    tracing::warn!(tab_id = %tab, error = %e, "prefetch task did not complete; creating fresh");
                }
            }
        }

        self.factory.create(SessionOrigin::Fresh).await
    }

    /// Return a session after use. Always disposes it.
    pub async fn release(&self, session: Session) {
        self.factory.dispose(session).await;
    }

    /// Drop `tab`'s prefetch slot, disposing the session it holds or is
    /// still creating. Returns whether a slot existed.
    pub async fn prune(&self, tab: TabId) -> bool {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&tab);
        match slot {
            Some(handle) => {
                self.discard(handle).await;
                tracing::debug!(tab_id = %tab, "prefetch slot pruned");
                true
            }
            None => false,
        }
    }

    /// Drop `tab`'s prefetch slot without waiting for it. A session still
    /// being created is disposed in the background once it exists.
    /// Returns whether a slot existed.
    pub fn evict(&self, tab: TabId) -> bool {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&tab);
        let Some(handle) = slot else {
            return false;
        };
        let factory = self.factory.clone();
        self.disposals.spawn(async move {
            if let Ok(Ok(session)) = handle.await {
                factory.dispose(session).await;
            }
        });
        tracing::debug!(tab_id = %tab, "prefetch slot evicted");
        true
    }

    /// Dispose every prefetched session, including evicted ones still
    /// being created. Used on host shutdown.
    pub async fn shutdown(&self) {
        let slots: Vec<(TabId, PrefetchSlot)> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (tab, handle) in slots {
            tracing::debug!(tab_id = %tab, "disposing prefetched session on shutdown");
            self.discard(handle).await;
        }
        self.disposals.close();
        self.disposals.wait().await;
        self.disposals.reopen();
    }

    /// Create one session and dispose it straight away, so a downloadable
    /// model is downloaded before the first real request.
    ///
    /// Not bounded by the creation timeout: the download runs to the end.
    ///
    /// # Errors
    /// Returns `SessionCreateFailed` if creation fails.
    pub async fn warm_model(&self) -> Result<()> {
        let session = self.factory.create_within(SessionOrigin::Fresh, None).await?;
        self.factory.dispose(session).await;
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        let counters = &self.factory.counters;
        PoolStats {
            created: counters.created.load(Ordering::SeqCst),
            destroyed: counters.destroyed.load(Ordering::SeqCst),
            create_failures: counters.create_failures.load(Ordering::SeqCst),
            prefetches: counters.prefetches.load(Ordering::SeqCst),
            outstanding_prefetches: self
                .slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }

    async fn discard(&self, handle: PrefetchSlot) {
        if let Ok(Ok(session)) = handle.await {
            self.factory.dispose(session).await;
        }
    }
}
