//! The per-tab content script runtime.
//!
//! One task per mounted tab owns the selection tracker and the interaction
//! machine. DOM events and user actions arrive on a single local channel so
//! their order is preserved; `SHOW` messages arrive on the tab's inbox. The
//! task executes machine effects (router sends, the result timer) and
//! publishes every state on a watch channel.

use super::machine::{Effect, InteractionMachine, UiEvent, UiState};
use super::selection::{DomEvent, SelectionTracker};
use super::view::{Layout, Overlay, project};
use crate::config::ContentConfig;
use crate::error::{MeanAiError, Result};
use crate::host::contract::{BackgroundMessage, ContentMessage};
use crate::host::router::{Dispatch, TabPort};
use crate::tab::TabId;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Clicks on the injected UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    ActivateIcon,
    Dismiss,
    Retry,
}

#[derive(Debug)]
enum LocalInput {
    Dom(DomEvent),
    Action(UserAction),
}

pub struct ContentScript {
    port: TabPort,
    inbox: mpsc::UnboundedReceiver<BackgroundMessage>,
    inbox_open: bool,
    local_rx: mpsc::UnboundedReceiver<LocalInput>,
    tracker: SelectionTracker,
    machine: InteractionMachine,
    result_timeout: Duration,
    deadline: Option<(u64, Instant)>,
    state_tx: watch::Sender<UiState>,
    cancel: CancellationToken,
}

impl ContentScript {
    /// Inject the script into a tab and start its event loop.
    ///
    /// `inbox` receives the messages the background pushes to this tab.
    /// The script announces itself with `CONTENT_READY` before handling
    /// any input.
    pub fn mount(
        port: TabPort,
        inbox: mpsc::UnboundedReceiver<BackgroundMessage>,
        config: &ContentConfig,
    ) -> ContentHandle {
        let (local_tx, local_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(UiState::Idle);
        let cancel = CancellationToken::new();

        let script = Self {
            port: port.clone(),
            inbox,
            inbox_open: true,
            local_rx,
            tracker: SelectionTracker::new(),
            machine: InteractionMachine::new(config.result_timeout()),
            result_timeout: config.result_timeout(),
            deadline: None,
            state_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(script.run());

        ContentHandle {
            input: local_tx,
            state: state_rx,
            layout: Layout::from(config),
            port,
            task,
            _guard: cancel.drop_guard(),
        }
    }

    async fn run(mut self) {
        let tab = self.port.tab();
        match self.port.send(ContentMessage::ContentReady).await {
            Ok(Dispatch::Ready { delivered }) if delivered > 0 => {
                tracing::debug!(tab_id = %tab, delivered, "queued results flushed on ready");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(tab_id = %tab, error = %e, "failed to announce content script"),
        }

        loop {
            let deadline = self.deadline;
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                input = self.local_rx.recv() => match input {
                    Some(LocalInput::Dom(event)) => {
                        if let Some(signal) = self.tracker.observe(event) {
                            self.apply(UiEvent::Selection(signal)).await;
                        }
                    }
                    Some(LocalInput::Action(action)) => {
                        self.apply(match action {
                            UserAction::ActivateIcon => UiEvent::IconActivated,
                            UserAction::Dismiss => UiEvent::Dismissed,
                            UserAction::Retry => UiEvent::RetryRequested,
                        })
                        .await;
                    }
                    None => break,
                },
                message = self.inbox.recv(), if self.inbox_open => match message {
                    Some(BackgroundMessage::Show { data }) => {
                        self.apply(UiEvent::ResultArrived(data)).await;
                    }
                    None => {
                        tracing::debug!(tab_id = %tab, "inbox closed");
                        self.inbox_open = false;
                    }
                },
                seq = wait_deadline(deadline) => {
                    self.deadline = None;
                    tracing::warn!(tab_id = %tab, seq, "no result before timeout");
                    self.apply(UiEvent::LoadingTimedOut { seq }).await;
                }
            }
        }
        tracing::debug!(tab_id = %tab, "content script stopped");
    }

    async fn apply(&mut self, event: UiEvent) {
        let effects = self.machine.handle(event);
        for effect in effects {
            match effect {
                Effect::Send(message) => {
                    let kind = message.kind();
                    if let Err(e) = self.port.send(message).await {
                        tracing::warn!(tab_id = %self.port.tab(), kind, error = %e, "send to background failed");
                    }
                }
                Effect::ArmResultTimeout { seq } => {
                    self.deadline = Some((seq, Instant::now() + self.result_timeout));
                }
            }
        }
        if !self.machine.state().is_loading() {
            self.deadline = None;
        }
        self.state_tx.send_replace(self.machine.state().clone());
    }
}

async fn wait_deadline(deadline: Option<(u64, Instant)>) -> u64 {
    match deadline {
        Some((seq, at)) => {
            tokio::time::sleep_until(at).await;
            seq
        }
        None => std::future::pending().await,
    }
}

/// Control handle for a mounted content script. Dropping it stops the
/// script.
pub struct ContentHandle {
    input: mpsc::UnboundedSender<LocalInput>,
    state: watch::Receiver<UiState>,
    layout: Layout,
    port: TabPort,
    task: JoinHandle<()>,
    _guard: DropGuard,
}

impl ContentHandle {
    pub fn tab(&self) -> TabId {
        self.port.tab()
    }

    pub fn dom_event(&self, event: DomEvent) -> Result<()> {
        self.push(LocalInput::Dom(event))
    }

    pub fn activate_icon(&self) -> Result<()> {
        self.push(LocalInput::Action(UserAction::ActivateIcon))
    }

    pub fn dismiss(&self) -> Result<()> {
        self.push(LocalInput::Action(UserAction::Dismiss))
    }

    pub fn retry(&self) -> Result<()> {
        self.push(LocalInput::Action(UserAction::Retry))
    }

    fn push(&self, input: LocalInput) -> Result<()> {
        self.input
            .send(input)
            .map_err(|_| MeanAiError::Channel(format!("content script for {} stopped", self.tab())))
    }

    pub fn state(&self) -> UiState {
        self.state.borrow().clone()
    }

    pub fn overlay(&self) -> Overlay {
        project(&self.state.borrow(), &self.layout)
    }

    /// Wait until the published state satisfies `pred` and return it.
    ///
    /// # Errors
    /// `Channel` if the script stopped first.
    pub async fn wait_for(&self, pred: impl Fn(&UiState) -> bool) -> Result<UiState> {
        let mut state = self.state.clone();
        let matched = state
            .wait_for(|s| pred(s))
            .await
            .map_err(|_| MeanAiError::Channel(format!("content script for {} stopped", self.tab())))?;
        Ok(UiState::clone(&matched))
    }

    /// Stop the script, e.g. on navigation. Queued results stay in the
    /// background mailbox for the next mount.
    pub async fn unmount(self) {
        let Self { task, _guard, .. } = self;
        drop(_guard);
        if let Err(e) = task.await {
            tracing::error!(error = %e, "content script task failed");
        }
    }

    /// Stop the script and report the tab as closed.
    ///
    /// # Errors
    /// Propagates the router's rejection of `TAB_CLOSED`.
    pub async fn close(self) -> Result<Dispatch> {
        let port = self.port.clone();
        self.unmount().await;
        port.send(ContentMessage::TabClosed).await
    }
}
