//! Text as delivered by the backends.
//!
//! Structured text boxes are in unscaled page units (points, top-left origin).
//! OCR word boxes are normalised to the unit square so they stay valid at any
//! rasterisation scale.

use crate::geometry::Rect;

/// A positioned run of text, usually one word.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub bbox: Rect,
}

impl TextRun {
    pub fn new(text: impl Into<String>, bbox: Rect) -> Self {
        Self { text: text.into(), bbox }
    }
}

/// Runs sharing a baseline, in reading order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextLine {
    pub bbox: Rect,
    pub runs: Vec<TextRun>,
}

impl TextLine {
    /// Build a line, deriving its box from the runs.
    pub fn from_runs(runs: Vec<TextRun>) -> Self {
        let bbox = runs
            .iter()
            .map(|run| run.bbox)
            .reduce(|acc, bbox| acc.union(&bbox))
            .unwrap_or_default();
        Self { bbox, runs }
    }
}

/// Structured text of one page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructuredTextPage {
    pub lines: Vec<TextLine>,
}

impl StructuredTextPage {
    pub fn new(lines: Vec<TextLine>) -> Self {
        Self { lines }
    }

    /// True when there is no run with visible characters.
    pub fn is_empty(&self) -> bool {
        !self
            .lines
            .iter()
            .flat_map(|line| line.runs.iter())
            .any(|run| !run.text.trim().is_empty())
    }

    pub fn run_count(&self) -> usize {
        self.lines.iter().map(|line| line.runs.len()).sum()
    }

    /// Plain text, runs joined by spaces and lines by newlines.
    pub fn plain_text(&self) -> String {
        self.lines
            .iter()
            .map(|line| {
                line.runs.iter().map(|run| run.text.as_str()).collect::<Vec<_>>().join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A word recognised by OCR.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    /// Normalised to `[0,1]x[0,1]`, top-left origin.
    pub bbox: Rect,
}

impl OcrWord {
    pub fn new(text: impl Into<String>, bbox: Rect) -> Self {
        Self { text: text.into(), bbox }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_only_page_counts_as_empty() {
        let page = StructuredTextPage::new(vec![TextLine::from_runs(vec![TextRun::new(
            "   ",
            Rect::new(0.0, 0.0, 10.0, 10.0),
        )])]);
        assert!(page.is_empty());
        assert!(StructuredTextPage::default().is_empty());
    }

    #[test]
    fn line_box_is_union_of_runs() {
        let line = TextLine::from_runs(vec![
            TextRun::new("a", Rect::new(10.0, 10.0, 5.0, 10.0)),
            TextRun::new("b", Rect::new(20.0, 8.0, 5.0, 14.0)),
        ]);
        assert_eq!(line.bbox, Rect::new(10.0, 8.0, 15.0, 14.0));
    }

    #[test]
    fn plain_text_joins_runs_and_lines() {
        let page = StructuredTextPage::new(vec![
            TextLine::from_runs(vec![
                TextRun::new("hello", Rect::default()),
                TextRun::new("world", Rect::default()),
            ]),
            TextLine::from_runs(vec![TextRun::new("again", Rect::default())]),
        ]);
        assert_eq!(page.plain_text(), "hello world\nagain");
        assert_eq!(page.run_count(), 3);
    }
}
