//! Projection of the interaction state onto what is drawn.

use super::geometry::Point;
use super::machine::{DialogContent, UiState};
use crate::config::ContentConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    /// Offset of the icon from the selection's bottom-right corner.
    pub icon_offset: Point,
    /// Gap between the selection's bottom edge and the dialog.
    pub dialog_gap: f64,
}

impl Default for Layout {
    fn default() -> Self {
        Self::from(&ContentConfig::default())
    }
}

impl From<&ContentConfig> for Layout {
    fn from(config: &ContentConfig) -> Self {
        Self {
            icon_offset: Point::new(config.icon_offset_x, config.icon_offset_y),
            dialog_gap: config.dialog_gap,
        }
    }
}

/// The injected UI, positioned in page coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum Overlay {
    None,
    Icon { position: Point },
    Dialog(DialogView),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DialogView {
    pub position: Point,
    pub origin_text: String,
    pub part_of_speech: Option<String>,
    /// `None` while loading.
    pub description: Option<String>,
    /// Synonym chips; empty synonyms are not shown.
    pub chips: Vec<String>,
    pub loading: bool,
    pub error: bool,
    pub retry_available: bool,
}

pub fn project(state: &UiState, layout: &Layout) -> Overlay {
    match state {
        UiState::Idle => Overlay::None,
        UiState::IconShown { anchor_point, .. } => Overlay::Icon {
            position: anchor_point.offset(layout.icon_offset),
        },
        UiState::Dialog { content, anchor } => {
            let position = anchor.bottom_left().offset(Point::new(0.0, layout.dialog_gap));
            match content {
                DialogContent::Loading { text, .. } => Overlay::Dialog(DialogView {
                    position,
                    origin_text: text.clone(),
                    part_of_speech: None,
                    description: None,
                    chips: Vec::new(),
                    loading: true,
                    error: false,
                    retry_available: false,
                }),
                // Nothing to show for a record without a description.
                DialogContent::Ready(record) if record.description.trim().is_empty() => {
                    Overlay::None
                }
                DialogContent::Ready(record) => Overlay::Dialog(DialogView {
                    position,
                    origin_text: record.origin_text.clone(),
                    part_of_speech: Some(record.part_of_speech.clone())
                        .filter(|p| !p.is_empty()),
                    description: Some(record.description.clone()),
                    chips: record.synonyms().map(str::to_owned).collect(),
                    loading: false,
                    error: record.is_error(),
                    retry_available: record.is_error(),
                }),
            }
        }
    }
}
