//! Backend traits consumed by the viewer core.

use crate::geometry::PageSize;
use crate::pixels::{PixelBuffer, RenderMode};
use crate::text::{OcrWord, StructuredTextPage};

/// Errors reported by a document backend.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: usize, page_count: usize },
    #[error("invalid render scale {0}")]
    InvalidScale(f32),
    #[error("invalid bitmap dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("could not allocate {bytes} bytes for a page bitmap")]
    ResourceExhausted { bytes: usize },
    #[error("document has no pages")]
    EmptyDocument,
    #[error("encrypted PDFs are not supported by this backend")]
    EncryptedUnsupported,
    #[error("backend error: {0}")]
    Backend(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported by an OCR backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OcrError {
    #[error("no OCR engine is available")]
    Unavailable,
    #[error("invalid image data: {0}")]
    InvalidImage(String),
    #[error("OCR processing failed: {0}")]
    Failed(String),
}

/// A loaded document.
///
/// Implementations are shared between the interactive thread and the render
/// workers, so every method takes `&self` and may be called concurrently.
/// Page count and page sizes never change for the lifetime of the value.
pub trait DocumentBackend: Send + Sync {
    fn page_count(&self) -> usize;

    /// Intrinsic size of a page in points.
    fn page_size(&self, page: usize) -> EngineResult<PageSize>;

    /// Rasterise a page. `scale` is pixels per point.
    fn render_page(&self, page: usize, scale: f32, mode: RenderMode) -> EngineResult<PixelBuffer>;

    /// Positioned text runs in reading order.
    fn extract_structured_text(&self, page: usize) -> EngineResult<StructuredTextPage>;

    /// Release backend resources. Called once when the viewer closes the document.
    fn close(&self) {}

    /// All page sizes, in page order.
    fn page_sizes(&self) -> EngineResult<Vec<PageSize>> {
        (0..self.page_count()).map(|page| self.page_size(page)).collect()
    }
}

/// Word-level text recognition on a page image.
pub trait OcrBackend: Send + Sync {
    /// Words in reading order with boxes normalised to the image.
    fn recognize(&self, image: &PixelBuffer) -> Result<Vec<OcrWord>, OcrError>;
}

/// OCR backend used when no engine is installed; every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableOcr;

impl OcrBackend for UnavailableOcr {
    fn recognize(&self, _image: &PixelBuffer) -> Result<Vec<OcrWord>, OcrError> {
        Err(OcrError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_ocr_always_fails() {
        let image = PixelBuffer::filled(2, 2, [255; 4]).unwrap();
        assert_eq!(UnavailableOcr.recognize(&image), Err(OcrError::Unavailable));
    }

    #[test]
    fn error_display() {
        let error = EngineError::PageOutOfRange { page: 7, page_count: 3 };
        assert_eq!(error.to_string(), "page 7 out of range (page_count=3)");

        let error = OcrError::Failed("timeout".to_string());
        assert_eq!(error.to_string(), "OCR processing failed: timeout");
    }
}
