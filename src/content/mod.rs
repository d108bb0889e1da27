//! Content-side runtime: selection tracking, the interaction state machine,
//! overlay projection and the per-tab script loop.

pub mod geometry;
pub mod machine;
pub mod script;
pub mod selection;
pub mod view;

pub use geometry::{Point, Rect};
pub use machine::{DialogContent, Effect, InteractionMachine, UiEvent, UiState};
pub use script::{ContentHandle, ContentScript, UserAction};
pub use selection::{DomEvent, EventOrigin, SelectionSignal, SelectionTracker};
pub use view::{DialogView, Layout, Overlay, project};
