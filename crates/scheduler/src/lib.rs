//! Pageflow Scheduler Library
//!
//! Background page rendering for the viewer.
//!
//! [`RenderPipeline`] accepts render requests from the interactive thread,
//! runs them on a [`WorkerPool`] and hands finished bitmaps back through a
//! non-blocking [`RenderPipeline::poll`]. Every job carries a
//! [`CancellationToken`] so pages that scroll out of view or are re-requested
//! at another zoom can be abandoned.
//!
//! # Example
//!
//! ```no_run
//! use pageflow_engine::{LopdfBackend, RenderMode};
//! use pageflow_scheduler::{PipelineConfig, RenderPipeline, RenderRequest};
//! use std::sync::Arc;
//!
//! let backend = Arc::new(LopdfBackend::open("document.pdf")?);
//! let mut pipeline = RenderPipeline::new(backend, PipelineConfig::default())?;
//!
//! pipeline.request(RenderRequest::new(0, 1.0, 1.0, RenderMode::Light));
//!
//! // Once per frame:
//! while let Some(result) = pipeline.poll() {
//!     println!("page {} ready: {}x{}", result.page(), result.width(), result.height());
//!     result.release();
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod cancel;
mod pipeline;
mod worker;

pub use cancel::{CancellationRegistry, CancellationToken};
pub use pipeline::{
    JobId, PageState, PipelineConfig, PipelineStats, RenderFailure, RenderPipeline, RenderRequest,
    RenderResult, RequestOutcome,
};
pub use worker::{JobHandler, WorkerPool, WorkerPoolConfig};

/// Errors raised while setting up background work.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}
