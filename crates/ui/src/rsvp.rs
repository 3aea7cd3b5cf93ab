//! Rapid serial visual presentation
//!
//! Flashes the words of the document one chunk at a time at a fixed pace.
//! The word sequence spans all pages in reading order and is rebuilt from
//! the text cache on demand.

use pageflow_core::{TextCache, TextCacheError};

pub const RSVP_DEFAULT_WPM: u32 = 300;
pub const RSVP_MIN_WPM: u32 = 100;
pub const RSVP_MAX_WPM: u32 = 1000;
pub const RSVP_WPM_STEP: u32 = 20;
pub const RSVP_MIN_CHUNK: usize = 1;
pub const RSVP_MAX_CHUNK: usize = 5;

/// Every word of the document in reading order.
///
/// Pages with structured text use it; other pages are OCR'd on the way.
/// Pages with no recoverable text are skipped.
pub fn extract_text_for_rsvp(texts: &mut TextCache) -> Result<Vec<String>, TextCacheError> {
    let mut words = Vec::new();
    for page in 0..texts.page_count() {
        let text = texts.page_text(page)?;
        words.extend(text.words().map(str::to_string));
    }
    log::debug!("RSVP sequence has {} words", words.len());
    Ok(words)
}

/// Key commands understood by the presenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsvpKey {
    Faster,
    Slower,
    BiggerChunk,
    SmallerChunk,
    TogglePause,
    /// Jump back to the first chunk
    Restart,
}

/// What to draw for the current chunk
#[derive(Debug, Clone, PartialEq)]
pub struct RsvpFrame {
    pub text: String,
    pub wpm: u32,
    pub chunk_size: usize,
    /// Fraction of the sequence shown so far, 0.0 to 1.0
    pub progress: f32,
    pub paused: bool,
    pub finished: bool,
}

#[derive(Debug, Clone)]
pub struct RsvpPresenter {
    words: Vec<String>,
    /// Index of the first word of the current chunk
    position: usize,
    wpm: u32,
    chunk_size: usize,
    accumulator: f32,
    active: bool,
    paused: bool,
}

impl Default for RsvpPresenter {
    fn default() -> Self {
        Self::new(RSVP_DEFAULT_WPM, RSVP_MIN_CHUNK)
    }
}

impl RsvpPresenter {
    /// Out-of-range settings are clamped.
    pub fn new(wpm: u32, chunk_size: usize) -> Self {
        Self {
            words: Vec::new(),
            position: 0,
            wpm: wpm.clamp(RSVP_MIN_WPM, RSVP_MAX_WPM),
            chunk_size: chunk_size.clamp(RSVP_MIN_CHUNK, RSVP_MAX_CHUNK),
            accumulator: 0.0,
            active: false,
            paused: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn wpm(&self) -> u32 {
        self.wpm
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn has_words(&self) -> bool {
        !self.words.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of chunks already advanced past
    pub fn chunk_index(&self) -> usize {
        self.position / self.chunk_size
    }

    pub fn accumulator(&self) -> f32 {
        self.accumulator
    }

    /// Seconds each chunk stays on screen.
    pub fn interval(&self) -> f32 {
        60.0 / self.wpm as f32
    }

    /// Replace the word sequence and start from the beginning.
    pub fn load_words(&mut self, words: Vec<String>) {
        self.words = words;
        self.restart();
    }

    /// Forget the word sequence, e.g. when the document changes.
    pub fn reset(&mut self) {
        self.words.clear();
        self.active = false;
        self.paused = false;
        self.restart();
    }

    /// Switch the mode on or off. Either way the presentation starts over.
    ///
    /// Returns whether the mode is now on.
    pub fn toggle(&mut self) -> bool {
        self.active = !self.active;
        self.paused = false;
        self.restart();
        self.active
    }

    fn restart(&mut self) {
        self.position = 0;
        self.accumulator = 0.0;
    }

    /// The last chunk is on screen; nothing further will be shown.
    pub fn is_finished(&self) -> bool {
        self.position + self.chunk_size >= self.words.len()
    }

    /// Advance the clock by `dt` seconds. Returns whether the chunk changed.
    ///
    /// At most one chunk is advanced per call.
    pub fn update(&mut self, dt: f32) -> bool {
        if !self.active || self.paused || !dt.is_finite() || dt <= 0.0 {
            return false;
        }
        if self.is_finished() {
            return false;
        }

        self.accumulator += dt;
        let interval = self.interval();
        if self.accumulator < interval {
            return false;
        }

        self.accumulator = (self.accumulator - interval) % interval;
        self.position += self.chunk_size;
        true
    }

    pub fn handle_key(&mut self, key: RsvpKey) {
        match key {
            RsvpKey::Faster => {
                self.wpm = (self.wpm + RSVP_WPM_STEP).min(RSVP_MAX_WPM);
            }
            RsvpKey::Slower => {
                self.wpm = self.wpm.saturating_sub(RSVP_WPM_STEP).max(RSVP_MIN_WPM);
            }
            RsvpKey::BiggerChunk => {
                self.chunk_size = (self.chunk_size + 1).min(RSVP_MAX_CHUNK);
            }
            RsvpKey::SmallerChunk => {
                self.chunk_size = self.chunk_size.saturating_sub(1).max(RSVP_MIN_CHUNK);
            }
            RsvpKey::TogglePause => self.paused = !self.paused,
            RsvpKey::Restart => self.restart(),
        }
        log::debug!("RSVP {key:?}: {} wpm, chunk {}", self.wpm, self.chunk_size);
    }

    /// Words of the current chunk.
    pub fn current_chunk(&self) -> &[String] {
        let start = self.position.min(self.words.len());
        let end = (self.position + self.chunk_size).min(self.words.len());
        &self.words[start..end]
    }

    pub fn frame(&self) -> RsvpFrame {
        let shown = (self.position + self.chunk_size).min(self.words.len());
        let progress = if self.words.is_empty() {
            1.0
        } else {
            shown as f32 / self.words.len() as f32
        };

        RsvpFrame {
            text: self.current_chunk().join(" "),
            wpm: self.wpm,
            chunk_size: self.chunk_size,
            progress,
            paused: self.paused,
            finished: self.is_finished(),
        }
    }
}
