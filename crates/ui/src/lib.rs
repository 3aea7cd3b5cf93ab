//! Pageflow UI Library
//!
//! The interactive side of the viewer: the [`Viewer`] context object that ties
//! physics, rendering and caches together per frame, mouse-driven text
//! selection, the RSVP reading mode, and the [`Scene`] handed to the host for
//! drawing.

pub mod clipboard;
pub mod rsvp;
pub mod scene;
pub mod selection;
pub mod viewer;

#[cfg(test)]
mod testing;

pub use clipboard::{Clipboard, ClipboardError, MemoryClipboard};
pub use rsvp::{extract_text_for_rsvp, RsvpFrame, RsvpKey, RsvpPresenter};
pub use scene::{Color, OverlayText, PageBitmap, PageQuad, Scene, ScrollbarThumb};
pub use selection::{CursorKind, SelectionController, SelectionHighlight, SelectionState};
pub use viewer::{FrameReport, Viewer};

use pageflow_core::TextCacheError;
use pageflow_engine::EngineError;
use pageflow_scheduler::SchedulerError;
use pageflow_viewer_core::ConfigError;

/// Errors surfaced by [`Viewer`] entry points
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("no document loaded")]
    NoDocument,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Text(#[from] TextCacheError),
    #[error(transparent)]
    Clipboard(#[from] ClipboardError),
}
