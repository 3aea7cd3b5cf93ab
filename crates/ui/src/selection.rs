//! Mouse-driven text selection across pages
//!
//! The drag start and end points are stored as page locations in unscaled
//! page units, so a selection survives zoom and scroll changes made while it
//! is shown. At query time both points are mapped back into content space
//! and span the selection rectangle; every word whose content-space box
//! intersects that rectangle is selected.
//!
//! Word boxes come from the structured text of a page when it has any, else
//! from OCR, which is run lazily the first time a selection touches the page.

use crate::clipboard::Clipboard;
use crate::ViewerError;
use pageflow_core::{TextCache, TextCacheError};
use pageflow_engine::Rect;
use pageflow_viewer_core::{DocumentLayout, PageLocation, Viewport};
use std::ops::RangeInclusive;

/// Highlight colour for selected words (RGBA, normalized 0-1)
pub const SELECTION_COLOR: [f32; 4] = [0.2, 0.6, 1.0, 0.3];

/// Selection state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionState {
    /// Whether the user is still dragging
    pub active: bool,

    /// Where the drag started
    pub start: PageLocation,

    /// Current (or final) drag position
    pub end: PageLocation,
}

impl SelectionState {
    fn new(location: PageLocation) -> Self {
        Self { active: true, start: location, end: location }
    }

    pub fn start_page(&self) -> usize {
        self.start.page
    }

    pub fn end_page(&self) -> usize {
        self.end.page
    }

    /// Pages touched by the selection, first page first, whichever way the
    /// drag went.
    pub fn page_range(&self) -> RangeInclusive<usize> {
        let first = self.start.page.min(self.end.page);
        let last = self.start.page.max(self.end.page);
        first..=last
    }

    /// Content-space rectangle spanned by the drag under `layout`.
    pub fn content_rect(&self, layout: &DocumentLayout) -> Option<Rect> {
        let start = layout.content_point(self.start.page, self.start.x, self.start.y)?;
        let end = layout.content_point(self.end.page, self.end.x, self.end.y)?;
        Some(Rect::from_points(start, end))
    }
}

/// A selected word on screen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionHighlight {
    pub page: usize,

    /// Word box in screen coordinates
    pub rect: Rect,
}

/// Mouse cursor to show over the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorKind {
    #[default]
    Default,
    /// Hovering over selectable text
    Text,
}

/// A selected word with enough context to rebuild reading order
#[derive(Debug, Clone, PartialEq)]
struct SelectedWord {
    page: usize,
    line: usize,
    text: String,
    content_rect: Rect,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionController {
    state: Option<SelectionState>,
}

impl SelectionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Option<&SelectionState> {
        self.state.as_ref()
    }

    /// Whether a drag is in progress
    pub fn is_selecting(&self) -> bool {
        self.state.is_some_and(|state| state.active)
    }

    /// Start a selection at a screen point.
    ///
    /// Returns `false`, and drops any previous selection, when the point does
    /// not resolve to a page.
    pub fn mouse_down(&mut self, viewport: &Viewport, x: f32, y: f32) -> bool {
        self.state = viewport.locate_screen(x, y).map(SelectionState::new);
        self.state.is_some()
    }

    pub fn mouse_drag(&mut self, viewport: &Viewport, x: f32, y: f32) {
        let Some(state) = self.state.as_mut().filter(|state| state.active) else {
            return;
        };
        if let Some(location) = viewport.locate_screen(x, y) {
            state.end = location;
        }
    }

    pub fn mouse_up(&mut self, viewport: &Viewport, x: f32, y: f32) {
        self.mouse_drag(viewport, x, y);
        if let Some(state) = self.state.as_mut() {
            state.active = false;
        }
    }

    pub fn clear(&mut self) {
        self.state = None;
    }

    /// Selected words in reading order: page, then line, then word.
    fn selected_words(
        &self,
        layout: &DocumentLayout,
        texts: &mut TextCache,
    ) -> Result<Vec<SelectedWord>, TextCacheError> {
        let Some(state) = self.state else {
            return Ok(Vec::new());
        };
        let Some(rect) = state.content_rect(layout) else {
            return Ok(Vec::new());
        };
        // A click without a drag selects nothing. Measured in page units.
        let zoom = layout.zoom();
        if rect.width < zoom && rect.height < zoom {
            return Ok(Vec::new());
        }

        let mut words = Vec::new();
        for page in state.page_range() {
            let text = texts.page_text(page)?;
            for (line_index, line) in text.lines.iter().enumerate() {
                for run in &line.runs {
                    let Some(content_rect) = layout.page_rect_to_content(page, &run.bbox) else {
                        continue;
                    };
                    let word = run.text.trim();
                    if word.is_empty() || !content_rect.intersects(&rect) {
                        continue;
                    }
                    words.push(SelectedWord {
                        page,
                        line: line_index,
                        text: word.to_string(),
                        content_rect,
                    });
                }
            }
        }

        Ok(words)
    }

    /// Screen-space highlight boxes for every selected word, in reading order.
    pub fn highlights(
        &self,
        viewport: &Viewport,
        texts: &mut TextCache,
    ) -> Result<Vec<SelectionHighlight>, TextCacheError> {
        let words = self.selected_words(viewport.layout(), texts)?;
        Ok(words
            .into_iter()
            .map(|word| {
                let (x, y) = viewport.content_to_screen(word.content_rect.x, word.content_rect.y);
                SelectionHighlight {
                    page: word.page,
                    rect: Rect::new(x, y, word.content_rect.width, word.content_rect.height),
                }
            })
            .collect())
    }

    /// Selected text: words joined by spaces, lines by `\n`, pages by `\n\n`.
    pub fn selected_text(
        &self,
        viewport: &Viewport,
        texts: &mut TextCache,
    ) -> Result<String, TextCacheError> {
        let words = self.selected_words(viewport.layout(), texts)?;

        let mut out = String::new();
        let mut previous: Option<(usize, usize)> = None;
        for word in &words {
            if let Some((page, line)) = previous {
                out.push_str(if page != word.page {
                    "\n\n"
                } else if line != word.line {
                    "\n"
                } else {
                    " "
                });
            }
            out.push_str(&word.text);
            previous = Some((word.page, word.line));
        }

        Ok(out)
    }

    /// Put the selected text on the clipboard and return it.
    ///
    /// An empty selection leaves the clipboard untouched and returns `None`.
    pub fn copy_selected_text(
        &self,
        viewport: &Viewport,
        texts: &mut TextCache,
        clipboard: &mut dyn Clipboard,
    ) -> Result<Option<String>, ViewerError> {
        let text = self.selected_text(viewport, texts)?;
        if text.is_empty() {
            return Ok(None);
        }

        clipboard.set_text(&text)?;
        log::info!("copied {} characters to the clipboard", text.len());
        Ok(Some(text))
    }
}

/// Cursor for a screen position: [`CursorKind::Text`] over a word.
///
/// Hovering never triggers OCR; scanned pages show the text cursor only once
/// their words are known.
pub fn cursor_for_position(
    viewport: &Viewport,
    texts: &mut TextCache,
    x: f32,
    y: f32,
) -> Result<CursorKind, TextCacheError> {
    let Some(location) = viewport.locate_screen(x, y) else {
        return Ok(CursorKind::Default);
    };

    let text = texts.peek_page_text(location.page)?;
    Ok(match text.run_at(location.x, location.y) {
        Some(_) => CursorKind::Text,
        None => CursorKind::Default,
    })
}
