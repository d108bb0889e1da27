//! Delivery of background messages to tabs.

use crate::error::{MeanAiError, Result};
use crate::host::contract::BackgroundMessage;
use crate::tab::TabId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// Pushes messages to a tab's content script.
///
/// `deliver` fails with `DeliveryFailed` when nobody in the tab is
/// listening; the router keeps the result queued in that case.
#[async_trait]
pub trait TabTransport: Send + Sync {
    async fn deliver(&self, tab: TabId, message: &BackgroundMessage) -> Result<()>;

    /// The tab announced readiness.
    fn on_ready(&self, _tab: TabId) {}

    /// The tab is gone.
    fn on_closed(&self, _tab: TabId) {}
}

/// In-process transport: each attached tab owns an unbounded receiver.
#[derive(Default)]
pub struct ChannelTransport {
    tabs: Mutex<HashMap<TabId, mpsc::UnboundedSender<BackgroundMessage>>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start listening on `tab`. Replaces any earlier listener, as a
    /// re-injected content script does.
    pub fn attach(&self, tab: TabId) -> mpsc::UnboundedReceiver<BackgroundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.tabs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tab, tx);
        rx
    }

    pub fn detach(&self, tab: TabId) {
        self.tabs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&tab);
    }

    pub fn is_attached(&self, tab: TabId) -> bool {
        self.tabs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&tab)
            .is_some_and(|tx| !tx.is_closed())
    }
}

#[async_trait]
impl TabTransport for ChannelTransport {
    async fn deliver(&self, tab: TabId, message: &BackgroundMessage) -> Result<()> {
        let mut tabs = self.tabs.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = tabs.get(&tab) else {
            return Err(MeanAiError::DeliveryFailed(format!(
                "no listener attached for {tab}"
            )));
        };
        if tx.send(message.clone()).is_err() {
            tabs.remove(&tab);
            return Err(MeanAiError::DeliveryFailed(format!(
                "listener for {tab} went away"
            )));
        }
        Ok(())
    }

    fn on_closed(&self, tab: TabId) {
        self.detach(tab);
    }
}
