//! In-memory backends shared by the unit tests of this crate.

use pageflow_engine::{
    DocumentBackend, EngineError, EngineResult, OcrBackend, OcrError, OcrWord, PageSize,
    PixelBuffer, Rect, RenderMode, StructuredTextPage, TextLine, TextRun,
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Two 200x100 pages. Page 0 has two lines of structured text, page 1 is
/// a "scan" whose words only come back from [`FakeOcr`].
pub struct FakeDocument {
    pub sizes: Vec<PageSize>,
    pub renders: AtomicUsize,
    pub closed: AtomicUsize,
    /// Every render fails with this error when set.
    pub render_error: Option<fn() -> EngineError>,
}

impl FakeDocument {
    pub fn new() -> Self {
        Self::with_pages(2)
    }

    pub fn with_pages(count: usize) -> Self {
        Self {
            sizes: vec![PageSize::new(200.0, 100.0); count],
            renders: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
            render_error: None,
        }
    }

    pub fn failing(render_error: fn() -> EngineError) -> Self {
        Self { render_error: Some(render_error), ..Self::new() }
    }
}

impl DocumentBackend for FakeDocument {
    fn page_count(&self) -> usize {
        self.sizes.len()
    }

    fn page_size(&self, page: usize) -> EngineResult<PageSize> {
        self.sizes.get(page).copied().ok_or(EngineError::PageOutOfRange {
            page,
            page_count: self.sizes.len(),
        })
    }

    fn render_page(&self, page: usize, scale: f32, mode: RenderMode) -> EngineResult<PixelBuffer> {
        let size = self.page_size(page)?;
        self.renders.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.render_error {
            return Err(error());
        }
        let width = (size.width * scale).round().max(1.0) as u32;
        let height = (size.height * scale).round().max(1.0) as u32;
        PixelBuffer::filled(width, height, mode.paper())
    }

    fn extract_structured_text(&self, page: usize) -> EngineResult<StructuredTextPage> {
        if page != 0 {
            return Ok(StructuredTextPage::default());
        }
        Ok(StructuredTextPage::new(vec![
            TextLine::from_runs(vec![
                TextRun::new("hello", Rect::new(10.0, 10.0, 30.0, 10.0)),
                TextRun::new("world", Rect::new(50.0, 10.0, 30.0, 10.0)),
            ]),
            TextLine::from_runs(vec![
                TextRun::new("second", Rect::new(10.0, 40.0, 40.0, 10.0)),
                TextRun::new("line", Rect::new(60.0, 40.0, 25.0, 10.0)),
            ]),
        ]))
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeOcr {
    pub calls: AtomicUsize,
}

impl FakeOcr {
    pub fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }
}

impl OcrBackend for FakeOcr {
    fn recognize(&self, _image: &PixelBuffer) -> Result<Vec<OcrWord>, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            OcrWord::new("scanned", Rect::new(0.1, 0.2, 0.2, 0.1)),
            OcrWord::new("text", Rect::new(0.4, 0.2, 0.2, 0.1)),
            OcrWord::new("footer", Rect::new(0.1, 0.9, 0.2, 0.05)),
        ])
    }
}
