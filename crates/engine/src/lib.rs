//! Pageflow Engine Library
//!
//! Backend seams for the viewer core: the document backend that supplies page
//! geometry, rasterised pages and structured text, and the OCR backend that
//! recognises words on page images.
//!
//! The crate also ships [`LopdfBackend`], a pure-Rust document backend built on
//! `lopdf` that reads page boxes and text positions straight from the content
//! streams and rasterises pages as greeked proxies.
//!
//! # Example
//!
//! ```no_run
//! use pageflow_engine::{DocumentBackend, LopdfBackend, RenderMode};
//!
//! let backend = LopdfBackend::open("document.pdf")?;
//! let pixels = backend.render_page(0, 1.5, RenderMode::Light)?;
//! println!("{}x{} ({} bytes/row)", pixels.width(), pixels.height(), pixels.stride());
//! # Ok::<(), pageflow_engine::EngineError>(())
//! ```

mod backend;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
mod geometry;
mod lopdf_backend;
mod pixels;
mod text;

pub use backend::{DocumentBackend, EngineError, EngineResult, OcrBackend, OcrError, UnavailableOcr};
pub use geometry::{PageSize, Rect};
pub use lopdf_backend::LopdfBackend;
pub use pixels::{PixelBuffer, RenderMode, BYTES_PER_PIXEL};
pub use text::{OcrWord, StructuredTextPage, TextLine, TextRun};
