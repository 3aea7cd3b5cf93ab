//! Lazy per-page text and OCR cache.
//!
//! Structured text is fetched from the document backend the first time a page
//! is asked for and never again, even when the page turns out to have no
//! text. OCR runs at most once per page, and only for pages whose structured
//! text is empty; a failed recognition still marks the page processed so a
//! broken page cannot trigger repeated expensive work. [`TextCache::clear_ocr`]
//! is the only way to make a page eligible again.
//!
//! All calls are synchronous and may block on the backends for one page.

use crate::ocr::{group_lines, normalize_words, OcrConfig, OcrOutcome, OcrPage};
use crate::page_text::{PageText, TextSource};
use crate::slot::SlotTable;
use pageflow_engine::{
    DocumentBackend, EngineError, OcrBackend, RenderMode, StructuredTextPage, TextLine, TextRun,
};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum TextCacheError {
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: usize, page_count: usize },
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// How often each backend was invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextCacheCounters {
    pub structured_extractions: u64,
    pub ocr_renders: u64,
    pub ocr_recognitions: u64,
    pub ocr_failures: u64,
}

pub struct TextCache {
    backend: Arc<dyn DocumentBackend>,
    ocr: Arc<dyn OcrBackend>,
    config: OcrConfig,
    page_count: usize,
    structured: SlotTable<StructuredTextPage>,
    ocr_pages: SlotTable<OcrPage>,
    counters: TextCacheCounters,
}

impl TextCache {
    pub fn new(
        backend: Arc<dyn DocumentBackend>,
        ocr: Arc<dyn OcrBackend>,
        config: OcrConfig,
    ) -> Self {
        let page_count = backend.page_count();
        Self {
            backend,
            ocr,
            config,
            page_count,
            structured: SlotTable::new(page_count),
            ocr_pages: SlotTable::new(page_count),
            counters: TextCacheCounters::default(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn counters(&self) -> TextCacheCounters {
        self.counters
    }

    fn check_page(&self, page: usize) -> Result<(), TextCacheError> {
        if page < self.page_count {
            Ok(())
        } else {
            Err(TextCacheError::PageOutOfRange { page, page_count: self.page_count })
        }
    }

    /// Structured text of `page`, extracted on first access.
    ///
    /// A backend failure is logged and cached as an empty page.
    pub fn structured_text(&mut self, page: usize) -> Result<&StructuredTextPage, TextCacheError> {
        self.check_page(page)?;

        if !self.structured.is_present(page) {
            self.counters.structured_extractions += 1;
            let text = match self.backend.extract_structured_text(page) {
                Ok(text) => text,
                Err(err) => {
                    log::warn!("text extraction failed for page {page}: {err}");
                    StructuredTextPage::default()
                }
            };
            log::debug!("page {page}: cached {} structured runs", text.run_count());
            self.structured.fill(page, text);
        }

        self.structured
            .get(page)
            .ok_or(TextCacheError::PageOutOfRange { page, page_count: self.page_count })
    }

    /// Cached structured text, without triggering extraction.
    pub fn cached_structured_text(&self, page: usize) -> Option<&StructuredTextPage> {
        self.structured.get(page)
    }

    pub fn has_structured_text(&mut self, page: usize) -> Result<bool, TextCacheError> {
        Ok(!self.structured_text(page)?.is_empty())
    }

    /// Run OCR on `page` unless it was already processed or has structured text.
    pub fn perform_ocr_if_needed(&mut self, page: usize) -> Result<OcrOutcome, TextCacheError> {
        self.check_page(page)?;

        if self.ocr_pages.is_present(page) {
            return Ok(OcrOutcome::AlreadyProcessed);
        }

        if self.has_structured_text(page)? {
            self.ocr_pages.fill(page, OcrPage::default());
            return Ok(OcrOutcome::NotNeeded);
        }

        self.counters.ocr_renders += 1;
        let scale = self.config.render_scale;
        let image = match self.backend.render_page(page, scale, RenderMode::Light) {
            Ok(image) => image,
            Err(err) => {
                log::warn!("could not rasterise page {page} for OCR: {err}");
                return Ok(self.mark_failed(page));
            }
        };

        self.counters.ocr_recognitions += 1;
        match self.ocr.recognize(&image) {
            Ok(words) => {
                let words = normalize_words(words);
                let count = words.len();
                log::info!("OCR recognised {count} words on page {page}");
                self.ocr_pages.fill(page, OcrPage::recognized(words));
                Ok(OcrOutcome::Recognized(count))
            }
            Err(err) => {
                log::warn!("OCR failed on page {page}: {err}");
                Ok(self.mark_failed(page))
            }
        }
    }

    fn mark_failed(&mut self, page: usize) -> OcrOutcome {
        self.counters.ocr_failures += 1;
        self.ocr_pages.fill(page, OcrPage::failed());
        OcrOutcome::Failed
    }

    pub fn ocr_page(&self, page: usize) -> Option<&OcrPage> {
        self.ocr_pages.get(page)
    }

    pub fn is_ocr_processed(&self, page: usize) -> bool {
        self.ocr_pages.is_present(page)
    }

    /// Make `page` eligible for OCR again.
    pub fn clear_ocr(&mut self, page: usize) {
        self.ocr_pages.reset(page);
    }

    /// Text of `page` from whichever source has it, running OCR if needed.
    ///
    /// OCR boxes are converted from normalised coordinates to page units.
    pub fn page_text(&mut self, page: usize) -> Result<PageText, TextCacheError> {
        self.build_page_text(page, true)
    }

    /// Like [`TextCache::page_text`], but only uses OCR results that already exist.
    pub fn peek_page_text(&mut self, page: usize) -> Result<PageText, TextCacheError> {
        self.build_page_text(page, false)
    }

    fn build_page_text(&mut self, page: usize, run_ocr: bool) -> Result<PageText, TextCacheError> {
        let structured = self.structured_text(page)?;
        if !structured.is_empty() {
            return Ok(PageText::from_structured(page, structured));
        }

        if run_ocr {
            self.perform_ocr_if_needed(page)?;
        }

        let words = match self.ocr_pages.get(page) {
            Some(ocr) if !ocr.words.is_empty() => &ocr.words,
            _ => return Ok(PageText::empty(page)),
        };

        let size = self.backend.page_size(page)?;
        let lines = group_lines(words, self.config.line_tolerance)
            .into_iter()
            .map(|line| {
                TextLine::from_runs(
                    line.into_iter()
                        .map(|word| {
                            TextRun::new(word.text, word.bbox.scale(size.width, size.height))
                        })
                        .collect(),
                )
            })
            .collect();

        Ok(PageText { page, source: TextSource::Ocr, lines })
    }
}
