//! Clipboard seam
//!
//! The viewer never talks to the OS clipboard itself. Hosts pass a
//! [`Clipboard`] implementation in; [`MemoryClipboard`] keeps the text in
//! process and is what tests and headless runs use.

/// Errors reported by a clipboard implementation
#[derive(Debug, thiserror::Error)]
pub enum ClipboardError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),
    #[error("failed to set clipboard contents: {0}")]
    Write(String),
}

/// Destination for copied text
pub trait Clipboard: Send {
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError>;
}

/// In-process clipboard
#[derive(Debug, Clone, Default)]
pub struct MemoryClipboard {
    contents: Option<String>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last text copied, if any
    pub fn contents(&self) -> Option<&str> {
        self.contents.as_deref()
    }
}

impl Clipboard for MemoryClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), ClipboardError> {
        self.contents = Some(text.to_string());
        Ok(())
    }
}
