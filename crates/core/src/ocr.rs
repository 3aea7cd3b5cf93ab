//! OCR configuration and word post-processing
//!
//! Words coming back from an OCR backend are cleaned up before they are
//! cached: empty words are dropped and every box is clamped into the unit
//! square. [`group_lines`] rebuilds reading-order lines from the flat word
//! list.

use pageflow_engine::OcrWord;

/// OCR configuration
#[derive(Debug, Clone, PartialEq)]
pub struct OcrConfig {
    /// Pixels per point used to rasterise a page before recognition
    pub render_scale: f32,

    /// Two words share a line when their vertical centres are closer than
    /// this fraction of the taller word's height
    pub line_tolerance: f32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self { render_scale: 2.0, line_tolerance: 0.5 }
    }
}

impl OcrConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rasterisation scale
    pub fn with_render_scale(mut self, scale: f32) -> Self {
        self.render_scale = scale;
        self
    }

    /// Set the line grouping tolerance
    pub fn with_line_tolerance(mut self, tolerance: f32) -> Self {
        self.line_tolerance = tolerance;
        self
    }
}

/// Cached OCR output for one page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OcrPage {
    /// Recognised words, reading order, normalised boxes
    pub words: Vec<OcrWord>,

    /// Recognition was attempted and failed
    pub failed: bool,
}

impl OcrPage {
    pub fn recognized(words: Vec<OcrWord>) -> Self {
        Self { words, failed: false }
    }

    pub fn failed() -> Self {
        Self { words: Vec::new(), failed: true }
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }
}

/// Result of [`crate::TextCache::perform_ocr_if_needed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrOutcome {
    /// The page was processed earlier; nothing was done.
    AlreadyProcessed,
    /// The page has structured text, so OCR was skipped.
    NotNeeded,
    /// OCR ran and found this many words.
    Recognized(usize),
    /// Rasterisation or recognition failed; the page is marked processed.
    Failed,
}

/// Drop empty words and clamp boxes into `[0,1]x[0,1]`.
pub fn normalize_words(words: Vec<OcrWord>) -> Vec<OcrWord> {
    words
        .into_iter()
        .filter(|word| !word.text.trim().is_empty())
        .map(|word| OcrWord { text: word.text.trim().to_string(), bbox: word.bbox.clamp_unit() })
        .collect()
}

/// Group words into lines by vertical-centre proximity, keeping reading order.
///
/// Words within a line are sorted left to right.
pub fn group_lines(words: &[OcrWord], tolerance: f32) -> Vec<Vec<OcrWord>> {
    let mut lines: Vec<(f32, f32, Vec<OcrWord>)> = Vec::new();

    for word in words {
        let center = word.bbox.center_y();
        let height = word.bbox.height;

        match lines.last_mut() {
            Some((line_center, line_height, line))
                if (center - *line_center).abs() <= tolerance * line_height.max(height) =>
            {
                line.push(word.clone());
                *line_height = line_height.max(height);
            }
            _ => lines.push((center, height, vec![word.clone()])),
        }
    }

    lines
        .into_iter()
        .map(|(_, _, mut line)| {
            line.sort_by(|a, b| a.bbox.x.total_cmp(&b.bbox.x));
            line
        })
        .collect()
}
