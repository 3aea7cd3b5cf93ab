//! Pageflow Core Library
//!
//! Per-page text state for the viewer: lazily extracted structured text, an
//! at-most-once OCR pass for pages without a text layer, and a unified
//! [`PageText`] view that selection and RSVP read from.

mod ocr;
mod page_text;
mod slot;
mod text_cache;

pub use ocr::{group_lines, normalize_words, OcrConfig, OcrOutcome, OcrPage};
pub use page_text::{PageText, TextSource};
pub use slot::{Slot, SlotTable};
pub use text_cache::{TextCache, TextCacheCounters, TextCacheError};
