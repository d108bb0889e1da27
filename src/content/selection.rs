//! Selection tracker: DOM selection events to selection signals.
//!
//! Events whose target lies inside the injected UI are ignored, so clicking
//! the icon or the dialog never feeds back into selection tracking. Anchors
//! are converted to page coordinates once, when the selection is made.

use super::geometry::{Point, Rect};

/// Where a DOM event's target lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    /// The host page.
    Page,
    /// The injected icon/dialog subtree.
    OwnUi,
}

/// Raw DOM input.
#[derive(Debug, Clone, PartialEq)]
pub enum DomEvent {
    /// The document selection changed (`mouseup`/`selectionchange`).
    SelectionChanged {
        text: String,
        /// Bounding rectangle of the selection range, in viewport
        /// coordinates, if there is a range.
        rect: Option<Rect>,
        /// Scroll offset at the time of the event.
        scroll: Point,
        origin: EventOrigin,
    },
    /// A pointer was pressed.
    PointerDown { origin: EventOrigin },
}

/// What the interaction machine needs to know about the selection.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionSignal {
    /// Non-empty text with a positive-area bounding box, anchored in page
    /// coordinates.
    Selected { text: String, anchor: Rect },
    /// The selection went away.
    Cleared,
    /// A pointer was pressed outside the injected UI.
    PointerOutside,
}

#[derive(Debug, Default)]
pub struct SelectionTracker {
    current: Option<(String, Rect)>,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current selection's anchor in page coordinates.
    pub fn anchor(&self) -> Option<Rect> {
        self.current.as_ref().map(|(_, rect)| *rect)
    }

    /// Feed one DOM event. Repeated events for an unchanged selection
    /// produce no signal.
    pub fn observe(&mut self, event: DomEvent) -> Option<SelectionSignal> {
        match event {
            DomEvent::SelectionChanged {
                origin: EventOrigin::OwnUi,
                ..
            }
            | DomEvent::PointerDown {
                origin: EventOrigin::OwnUi,
            } => None,
            DomEvent::PointerDown {
                origin: EventOrigin::Page,
            } => Some(SelectionSignal::PointerOutside),
            DomEvent::SelectionChanged {
                text, rect, scroll, ..
            } => {
                let text = text.trim();
                match rect.filter(Rect::has_area) {
                    Some(rect) if !text.is_empty() => {
                        let anchor = rect.to_page(scroll);
                        if self
                            .current
                            .as_ref()
                            .is_some_and(|(t, a)| t == text && *a == anchor)
                        {
                            return None;
                        }
                        self.current = Some((text.to_owned(), anchor));
                        Some(SelectionSignal::Selected {
                            text: text.to_owned(),
                            anchor,
                        })
                    }
                    _ => self.current.take().map(|_| SelectionSignal::Cleared),
                }
            }
        }
    }
}
