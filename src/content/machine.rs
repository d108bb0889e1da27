//! Interaction state machine: idle → icon → dialog.
//!
//! A reducer. [`InteractionMachine::handle`] applies one event to the
//! current [`UiState`] and returns the effects the runtime must perform
//! (messages to the background host, timers). It does no I/O itself.

use super::geometry::{Point, Rect};
use super::selection::SelectionSignal;
use crate::error::MeanAiError;
use crate::explain::ExplanationRecord;
use crate::host::contract::ContentMessage;
use std::time::Duration;

/// What the dialog shows.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogContent {
    /// Waiting for the result of request `seq` for `text`.
    Loading { text: String, seq: u64 },
    Ready(ExplanationRecord),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum UiState {
    #[default]
    Idle,
    /// The icon affordance is shown at `anchor_point` (the selection's
    /// bottom-right corner, page coordinates).
    IconShown {
        text: String,
        anchor_point: Point,
        selection: Rect,
    },
    /// The dialog is open under `anchor`.
    Dialog { content: DialogContent, anchor: Rect },
}

impl UiState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            Self::Dialog {
                content: DialogContent::Loading { .. },
                ..
            }
        )
    }

    /// The record on display, if the dialog holds one.
    pub fn record(&self) -> Option<&ExplanationRecord> {
        match self {
            Self::Dialog {
                content: DialogContent::Ready(record),
                ..
            } => Some(record),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Selection(SelectionSignal),
    IconActivated,
    Dismissed,
    /// A `SHOW` message arrived.
    ResultArrived(ExplanationRecord),
    /// The result timer for request `seq` fired.
    LoadingTimedOut { seq: u64 },
    /// The user asked to retry a failed explanation.
    RetryRequested,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Send(ContentMessage),
    /// Start (or restart) the result timer for request `seq`.
    ArmResultTimeout { seq: u64 },
}

#[derive(Debug)]
pub struct InteractionMachine {
    state: UiState,
    last_selection: Option<Rect>,
    next_seq: u64,
    result_timeout: Duration,
}

impl InteractionMachine {
    pub fn new(result_timeout: Duration) -> Self {
        Self {
            state: UiState::Idle,
            last_selection: None,
            next_seq: 1,
            result_timeout,
        }
    }

    pub fn state(&self) -> &UiState {
        &self.state
    }

    pub fn handle(&mut self, event: UiEvent) -> Vec<Effect> {
        match event {
            UiEvent::Selection(SelectionSignal::Selected { text, anchor }) => {
                self.on_selected(text, anchor)
            }
            UiEvent::Selection(SelectionSignal::Cleared) => {
                if matches!(self.state, UiState::IconShown { .. }) {
                    self.state = UiState::Idle;
                }
                Vec::new()
            }
            UiEvent::Selection(SelectionSignal::PointerOutside) => {
                if !self.state.is_idle() {
                    self.state = UiState::Idle;
                }
                Vec::new()
            }
            UiEvent::IconActivated => self.on_icon_activated(),
            UiEvent::Dismissed => {
                if matches!(self.state, UiState::Dialog { .. }) {
                    self.state = UiState::Idle;
                }
                Vec::new()
            }
            UiEvent::ResultArrived(record) => {
                self.on_result(record);
                Vec::new()
            }
            UiEvent::LoadingTimedOut { seq } => {
                self.on_timeout(seq);
                Vec::new()
            }
            UiEvent::RetryRequested => self.on_retry(),
        }
    }

    fn on_selected(&mut self, text: String, anchor: Rect) -> Vec<Effect> {
        self.last_selection = Some(anchor);
        self.state = UiState::IconShown {
            text,
            anchor_point: anchor.bottom_right(),
            selection: anchor,
        };
        vec![Effect::Send(ContentMessage::PrefetchSession)]
    }

    fn on_icon_activated(&mut self) -> Vec<Effect> {
        let UiState::IconShown {
            text, selection, ..
        } = &self.state
        else {
            return Vec::new();
        };
        let (text, anchor) = (text.clone(), *selection);
        self.start_loading(text, anchor)
    }

    fn start_loading(&mut self, text: String, anchor: Rect) -> Vec<Effect> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.state = UiState::Dialog {
            content: DialogContent::Loading {
                text: text.clone(),
                seq,
            },
            anchor,
        };
        vec![
            Effect::Send(ContentMessage::ExplainText { text }),
            Effect::ArmResultTimeout { seq },
        ]
    }

    /// Last write wins. A result with no dialog open opens one at the last
    /// known selection.
    fn on_result(&mut self, record: ExplanationRecord) {
        let anchor = match &self.state {
            UiState::Dialog { anchor, .. } => *anchor,
            UiState::IconShown { selection, .. } => *selection,
            UiState::Idle => self.last_selection.unwrap_or_default(),
        };
        self.state = UiState::Dialog {
            content: DialogContent::Ready(record),
            anchor,
        };
    }

    fn on_timeout(&mut self, seq: u64) {
        let UiState::Dialog {
            content:
                DialogContent::Loading {
                    text,
                    seq: pending,
                },
            anchor,
        } = &self.state
        else {
            return;
        };
        if *pending != seq {
            return;
        }
        let err = MeanAiError::DeliveryFailed(format!(
            "no explanation arrived within {}s",
            self.result_timeout.as_secs()
        ));
        self.state = UiState::Dialog {
            content: DialogContent::Ready(ExplanationRecord::from_error(text, &err)),
            anchor: *anchor,
        };
    }

    fn on_retry(&mut self) -> Vec<Effect> {
        let UiState::Dialog {
            content: DialogContent::Ready(record),
            anchor,
        } = &self.state
        else {
            return Vec::new();
        };
        if !record.is_error() || record.origin_text.trim().is_empty() {
            return Vec::new();
        }
        let (text, anchor) = (record.origin_text.clone(), *anchor);
        let mut effects = vec![Effect::Send(ContentMessage::RetryModel)];
        effects.extend(self.start_loading(text, anchor));
        effects
    }
}
