//! Asynchronous, cancellable page rendering.
//!
//! The interactive thread submits [`RenderRequest`]s; a [`WorkerPool`]
//! rasterises them through the document backend and sends the outcome back
//! over a second channel, which only [`RenderPipeline::poll`] drains. Results
//! arrive in completion order, not submission order.
//!
//! Requests are deduplicated per page: while a page is pending, a request at
//! the same zoom and mode is a no-op, and one at a different zoom or mode
//! cancels the old job before submitting the new one. Cancellation is
//! advisory, so a result for a cancelled job may still be produced; `poll`
//! drops it. Callers must still check the page and zoom of every delivered
//! result against their current view, since the view may have moved on since
//! the request was made.
//!
//! Failed renders are not retried by the pipeline. They are queued as
//! [`RenderFailure`]s for [`RenderPipeline::take_failures`], and the caller
//! decides whether the page is worth requesting again.

use crate::cancel::{CancellationRegistry, CancellationToken};
use crate::worker::{JobHandler, WorkerPool, WorkerPoolConfig};
use crate::SchedulerError;
use flume::{Receiver, RecvTimeoutError, Sender};
use pageflow_engine::{DocumentBackend, EngineError, PixelBuffer, RenderMode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identifier of one submitted render job.
pub type JobId = u64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page: usize,
    /// Zoom the result is meant for; used to validate it on delivery.
    pub zoom: f32,
    /// Pixels per point passed to the backend.
    pub scale: f32,
    pub mode: RenderMode,
}

impl RenderRequest {
    pub fn new(page: usize, zoom: f32, scale: f32, mode: RenderMode) -> Self {
        Self { page, zoom, scale, mode }
    }
}

/// Where a page is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageState {
    Idle,
    /// Queued, not yet picked up by a worker.
    Requested,
    Rendering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Submitted,
    /// An identical request is already queued or rendering.
    AlreadyPending,
    /// A pending request for the page at another zoom or mode was cancelled
    /// and replaced.
    Superseded,
    /// Invalid page or scale, or the workers are gone.
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineStats {
    pub submitted: u64,
    pub delivered: u64,
    pub cancelled: u64,
    pub failed: u64,
    /// Results produced for jobs that were cancelled or superseded meanwhile.
    pub discarded: u64,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub workers: WorkerPoolConfig,
    /// Two zoom values closer than this are the same zoom.
    pub zoom_tolerance: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { workers: WorkerPoolConfig::default(), zoom_tolerance: 0.001 }
    }
}

impl PipelineConfig {
    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.workers = WorkerPoolConfig::new(num_workers);
        self
    }
}

/// A rendered page handed to the caller.
///
/// The caller owns the pixels; [`RenderResult::release`] and
/// [`RenderResult::into_pixels`] consume the result, so it can be released
/// only once.
#[derive(Debug)]
pub struct RenderResult {
    pub request: RenderRequest,
    pixels: PixelBuffer,
}

impl RenderResult {
    pub fn page(&self) -> usize {
        self.request.page
    }

    pub fn zoom(&self) -> f32 {
        self.request.zoom
    }

    pub fn mode(&self) -> RenderMode {
        self.request.mode
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn stride(&self) -> usize {
        self.pixels.stride()
    }

    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    pub fn into_pixels(self) -> PixelBuffer {
        self.pixels
    }

    /// Free the pixel buffer without using it.
    pub fn release(self) {
        drop(self.pixels);
    }
}

/// A live render that the backend could not produce.
#[derive(Debug)]
pub struct RenderFailure {
    pub request: RenderRequest,
    pub error: EngineError,
}

impl RenderFailure {
    pub fn page(&self) -> usize {
        self.request.page
    }

    /// Only resource exhaustion may succeed when asked again with the same
    /// request; every other error repeats deterministically.
    pub fn is_retryable(&self) -> bool {
        matches!(self.error, EngineError::ResourceExhausted { .. })
    }
}

struct RenderJob {
    id: JobId,
    request: RenderRequest,
    token: CancellationToken,
}

enum WorkerMessage {
    Completed { id: JobId, request: RenderRequest, pixels: PixelBuffer },
    Cancelled { id: JobId, page: usize },
    Failed { id: JobId, request: RenderRequest, error: EngineError },
}

struct PendingJob {
    id: JobId,
    request: RenderRequest,
    /// Clone of the token the worker holds.
    token: CancellationToken,
}

pub struct RenderPipeline {
    page_count: usize,
    request_tx: Option<Sender<RenderJob>>,
    result_rx: Receiver<WorkerMessage>,
    pool: WorkerPool,
    registry: CancellationRegistry,
    pending: HashMap<usize, PendingJob>,
    failures: Vec<RenderFailure>,
    next_id: JobId,
    zoom_tolerance: f32,
    stats: PipelineStats,
}

impl RenderPipeline {
    pub fn new(
        backend: Arc<dyn DocumentBackend>,
        config: PipelineConfig,
    ) -> Result<Self, SchedulerError> {
        let page_count = backend.page_count();
        let (request_tx, request_rx) = flume::unbounded::<RenderJob>();
        // Unbounded, but never holds more than one live result per page
        // because requests are deduplicated per page.
        let (result_tx, result_rx) = flume::unbounded::<WorkerMessage>();

        let handler: JobHandler<RenderJob> =
            Arc::new(move |job: RenderJob| run_job(backend.as_ref(), job, &result_tx));
        let pool = WorkerPool::spawn(request_rx, handler, &config.workers)?;

        Ok(Self {
            page_count,
            request_tx: Some(request_tx),
            result_rx,
            pool,
            registry: CancellationRegistry::new(),
            pending: HashMap::new(),
            failures: Vec::new(),
            next_id: 1,
            zoom_tolerance: config.zoom_tolerance,
            stats: PipelineStats::default(),
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn num_workers(&self) -> usize {
        self.pool.num_workers()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Number of pages currently queued or rendering.
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    pub fn request(&mut self, request: RenderRequest) -> RequestOutcome {
        if request.page >= self.page_count
            || !request.zoom.is_finite()
            || !request.scale.is_finite()
            || request.scale <= 0.0
        {
            log::debug!("rejecting render request {request:?}");
            return RequestOutcome::Rejected;
        }

        let superseded = match self.pending.get(&request.page) {
            Some(pending) => {
                if pending.request.mode == request.mode
                    && (pending.request.zoom - request.zoom).abs() <= self.zoom_tolerance
                {
                    return RequestOutcome::AlreadyPending;
                }
                true
            }
            None => false,
        };

        if superseded {
            self.cancel(request.page);
        }

        if !self.submit(request) {
            return RequestOutcome::Rejected;
        }

        if superseded {
            RequestOutcome::Superseded
        } else {
            RequestOutcome::Submitted
        }
    }

    fn submit(&mut self, request: RenderRequest) -> bool {
        let Some(request_tx) = self.request_tx.as_ref() else {
            return false;
        };

        let id = self.next_id;
        self.next_id += 1;

        let token = self.registry.register(id);
        let job = RenderJob { id, request, token: token.clone() };

        if request_tx.send(job).is_err() {
            log::warn!("render workers are gone; dropping request for page {}", request.page);
            self.registry.unregister(id);
            return false;
        }

        self.pending.insert(request.page, PendingJob { id, request, token });
        self.stats.submitted += 1;
        true
    }

    /// Cancel the pending job for `page`. Returns `true` if there was one.
    ///
    /// Safe to call redundantly.
    pub fn cancel(&mut self, page: usize) -> bool {
        let Some(pending) = self.pending.remove(&page) else {
            return false;
        };

        pending.token.cancel();
        self.registry.unregister(pending.id);
        self.stats.cancelled += 1;
        true
    }

    /// Cancel every pending job, returning how many there were.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.registry.cancel_all();
        self.stats.cancelled += self.pending.len() as u64;
        self.pending.clear();
        count
    }

    pub fn is_pending(&self, page: usize) -> bool {
        self.pending.contains_key(&page)
    }

    /// The request currently pending for `page`.
    pub fn pending_request(&self, page: usize) -> Option<RenderRequest> {
        self.pending.get(&page).map(|pending| pending.request)
    }

    /// Pages with a queued or running job, in no particular order.
    pub fn pending_pages(&self) -> Vec<usize> {
        self.pending.keys().copied().collect()
    }

    pub fn state(&self, page: usize) -> PageState {
        match self.pending.get(&page) {
            Some(pending) if pending.token.is_started() => PageState::Rendering,
            Some(_) => PageState::Requested,
            None => PageState::Idle,
        }
    }

    /// Take the next deliverable result without blocking.
    pub fn poll(&mut self) -> Option<RenderResult> {
        loop {
            let message = self.result_rx.try_recv().ok()?;
            if let Some(result) = self.accept(message) {
                return Some(result);
            }
        }
    }

    /// Like [`RenderPipeline::poll`], but waits up to `timeout` for a result.
    pub fn poll_timeout(&mut self, timeout: Duration) -> Option<RenderResult> {
        let deadline = Instant::now() + timeout;
        loop {
            let message = match self.result_rx.recv_deadline(deadline) {
                Ok(message) => message,
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            };
            if let Some(result) = self.accept(message) {
                return Some(result);
            }
        }
    }

    /// Every currently deliverable result.
    pub fn drain(&mut self) -> Vec<RenderResult> {
        std::iter::from_fn(|| self.poll()).collect()
    }

    fn accept(&mut self, message: WorkerMessage) -> Option<RenderResult> {
        match message {
            WorkerMessage::Completed { id, request, pixels } => {
                if !self.finish(request.page, id) {
                    self.stats.discarded += 1;
                    log::trace!("discarding stale render of page {}", request.page);
                    return None;
                }
                self.stats.delivered += 1;
                Some(RenderResult { request, pixels })
            }
            WorkerMessage::Cancelled { id, page } => {
                self.finish(page, id);
                None
            }
            WorkerMessage::Failed { id, request, error } => {
                if !self.finish(request.page, id) {
                    log::debug!("ignoring failure of stale render of page {}", request.page);
                    return None;
                }
                log::warn!("rendering page {} failed: {error}", request.page);
                self.stats.failed += 1;
                self.failures.push(RenderFailure { request, error });
                None
            }
        }
    }

    /// Failures of live jobs seen by `poll` since the last call, oldest first.
    pub fn take_failures(&mut self) -> Vec<RenderFailure> {
        std::mem::take(&mut self.failures)
    }

    /// Retire the pending job `id` for `page`. Returns `false` if it is no
    /// longer the live job for that page or was cancelled.
    fn finish(&mut self, page: usize, id: JobId) -> bool {
        match self.pending.get(&page) {
            Some(pending) if pending.id == id => {
                let live = !pending.token.is_cancelled();
                self.pending.remove(&page);
                self.registry.unregister(id);
                live
            }
            _ => false,
        }
    }

    /// Cancel everything, stop the workers and wait for them.
    pub fn shutdown(&mut self) {
        self.cancel_all();
        self.request_tx = None;
        self.pool.shutdown();
    }
}

impl Drop for RenderPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_job(backend: &dyn DocumentBackend, job: RenderJob, results: &Sender<WorkerMessage>) {
    let RenderJob { id, request, token } = job;

    let message = if !token.start() {
        WorkerMessage::Cancelled { id, page: request.page }
    } else {
        match backend.render_page(request.page, request.scale, request.mode) {
            Ok(_) if token.is_cancelled() => {
                WorkerMessage::Cancelled { id, page: request.page }
            }
            Ok(pixels) => WorkerMessage::Completed { id, request, pixels },
            Err(error) => WorkerMessage::Failed { id, request, error },
        }
    };

    // The receiver is gone only while the pipeline shuts down.
    let _ = results.send(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pageflow_engine::{EngineResult, PageSize, StructuredTextPage};

    struct FakeBackend {
        pages: usize,
        fail: Option<fn() -> EngineError>,
        entered: Option<Sender<usize>>,
        gate: Option<Receiver<()>>,
    }

    impl FakeBackend {
        fn instant(pages: usize) -> Self {
            Self { pages, fail: None, entered: None, gate: None }
        }

        /// Renders block until the test sends on the returned gate.
        fn gated(pages: usize) -> (Self, Receiver<usize>, Sender<()>) {
            let (entered_tx, entered_rx) = flume::unbounded();
            let (gate_tx, gate_rx) = flume::unbounded();
            let backend =
                Self { pages, fail: None, entered: Some(entered_tx), gate: Some(gate_rx) };
            (backend, entered_rx, gate_tx)
        }
    }

    impl DocumentBackend for FakeBackend {
        fn page_count(&self) -> usize {
            self.pages
        }

        fn page_size(&self, _page: usize) -> EngineResult<PageSize> {
            Ok(PageSize::new(100.0, 200.0))
        }

        fn render_page(
            &self,
            page: usize,
            scale: f32,
            mode: RenderMode,
        ) -> EngineResult<PixelBuffer> {
            if let Some(entered) = &self.entered {
                let _ = entered.send(page);
            }
            if let Some(gate) = &self.gate {
                let _ = gate.recv();
            }
            if let Some(error) = self.fail {
                return Err(error());
            }
            let width = (100.0 * scale).round() as u32;
            let height = (200.0 * scale).round() as u32;
            PixelBuffer::filled(width, height, mode.paper())
        }

        fn extract_structured_text(&self, _page: usize) -> EngineResult<StructuredTextPage> {
            Ok(StructuredTextPage::default())
        }
    }

    fn pipeline(backend: FakeBackend) -> RenderPipeline {
        RenderPipeline::new(Arc::new(backend), PipelineConfig::default().with_workers(1)).unwrap()
    }

    const WAIT: Duration = Duration::from_secs(5);
    const SHORT: Duration = Duration::from_millis(150);

    #[test]
    fn delivers_rendered_page() {
        let mut pipeline = pipeline(FakeBackend::instant(3));

        let outcome = pipeline.request(RenderRequest::new(1, 1.5, 1.5, RenderMode::Light));
        assert_eq!(outcome, RequestOutcome::Submitted);
        assert!(pipeline.is_pending(1));

        let result = pipeline.poll_timeout(WAIT).unwrap();
        assert_eq!(result.page(), 1);
        assert_eq!(result.zoom(), 1.5);
        assert_eq!((result.width(), result.height()), (150, 300));
        assert_eq!(result.stride(), 600);
        result.release();

        assert_eq!(pipeline.state(1), PageState::Idle);
        assert_eq!(pipeline.stats().delivered, 1);
    }

    #[test]
    fn duplicate_requests_render_once() {
        let (backend, entered, gate) = FakeBackend::gated(2);
        let mut pipeline = pipeline(backend);
        let request = RenderRequest::new(0, 1.0, 1.0, RenderMode::Light);

        assert_eq!(pipeline.request(request), RequestOutcome::Submitted);
        assert_eq!(pipeline.pending_pages(), vec![0]);
        for _ in 0..10 {
            assert_eq!(pipeline.request(request), RequestOutcome::AlreadyPending);
        }

        entered.recv_timeout(WAIT).unwrap();
        assert_eq!(pipeline.state(0), PageState::Rendering);
        gate.send(()).unwrap();

        assert!(pipeline.poll_timeout(WAIT).is_some());
        assert!(pipeline.poll_timeout(SHORT).is_none());
        assert_eq!(pipeline.stats().submitted, 1);
        assert!(entered.try_recv().is_err());
    }

    #[test]
    fn new_zoom_supersedes_pending_request() {
        let (backend, entered, gate) = FakeBackend::gated(1);
        let mut pipeline = pipeline(backend);

        pipeline.request(RenderRequest::new(0, 1.0, 1.0, RenderMode::Light));
        entered.recv_timeout(WAIT).unwrap();

        let outcome = pipeline.request(RenderRequest::new(0, 2.0, 2.0, RenderMode::Light));
        assert_eq!(outcome, RequestOutcome::Superseded);
        assert_eq!(pipeline.state(0), PageState::Requested);
        assert_eq!(pipeline.pending_request(0).map(|request| request.zoom), Some(2.0));
        assert_eq!(pipeline.pending_request(1), None);

        gate.send(()).unwrap();
        gate.send(()).unwrap();

        let result = pipeline.poll_timeout(WAIT).unwrap();
        assert_eq!(result.zoom(), 2.0);
        assert!(pipeline.poll_timeout(SHORT).is_none());
        assert_eq!(pipeline.stats().cancelled, 1);
    }

    #[test]
    fn mode_change_supersedes_pending_request() {
        let (backend, _entered, gate) = FakeBackend::gated(1);
        let mut pipeline = pipeline(backend);

        pipeline.request(RenderRequest::new(0, 1.0, 1.0, RenderMode::Light));
        let outcome = pipeline.request(RenderRequest::new(0, 1.0, 1.0, RenderMode::Dark));
        assert_eq!(outcome, RequestOutcome::Superseded);

        gate.send(()).unwrap();
        gate.send(()).unwrap();
        let result = pipeline.poll_timeout(WAIT).unwrap();
        assert_eq!(result.mode(), RenderMode::Dark);
    }

    #[test]
    fn cancelled_mid_render_is_never_delivered() {
        let (backend, entered, gate) = FakeBackend::gated(1);
        let mut pipeline = pipeline(backend);

        pipeline.request(RenderRequest::new(0, 1.0, 1.0, RenderMode::Light));
        entered.recv_timeout(WAIT).unwrap();

        assert!(pipeline.cancel(0));
        assert!(!pipeline.cancel(0));
        assert_eq!(pipeline.state(0), PageState::Idle);

        gate.send(()).unwrap();
        assert!(pipeline.poll_timeout(SHORT).is_none());
        assert_eq!(pipeline.stats().delivered, 0);
    }

    #[test]
    fn cancel_all_clears_every_page() {
        let (backend, _entered, gate) = FakeBackend::gated(4);
        let mut pipeline = pipeline(backend);

        for page in 0..4 {
            pipeline.request(RenderRequest::new(page, 1.0, 1.0, RenderMode::Light));
        }
        assert_eq!(pipeline.outstanding(), 4);

        assert_eq!(pipeline.cancel_all(), 4);
        assert_eq!(pipeline.outstanding(), 0);
        assert!((0..4).all(|page| !pipeline.is_pending(page)));

        for _ in 0..4 {
            gate.send(()).unwrap();
        }
        assert!(pipeline.poll_timeout(SHORT).is_none());
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let mut pipeline = pipeline(FakeBackend::instant(2));

        assert_eq!(
            pipeline.request(RenderRequest::new(2, 1.0, 1.0, RenderMode::Light)),
            RequestOutcome::Rejected
        );
        assert_eq!(
            pipeline.request(RenderRequest::new(0, 1.0, 0.0, RenderMode::Light)),
            RequestOutcome::Rejected
        );
        assert_eq!(
            pipeline.request(RenderRequest::new(0, f32::NAN, 1.0, RenderMode::Light)),
            RequestOutcome::Rejected
        );
        assert_eq!(pipeline.outstanding(), 0);
    }

    #[test]
    fn failed_render_returns_page_to_idle() {
        let mut backend = FakeBackend::instant(1);
        backend.fail = Some(|| EngineError::Backend("boom".to_string()));
        let mut pipeline = pipeline(backend);

        pipeline.request(RenderRequest::new(0, 1.0, 1.0, RenderMode::Light));
        assert!(pipeline.poll_timeout(SHORT).is_none());

        assert_eq!(pipeline.state(0), PageState::Idle);
        assert_eq!(pipeline.stats().failed, 1);
        assert_eq!(
            pipeline.request(RenderRequest::new(0, 1.0, 1.0, RenderMode::Light)),
            RequestOutcome::Submitted
        );
    }

    #[test]
    fn failures_are_reported_once() {
        let mut backend = FakeBackend::instant(2);
        backend.fail = Some(|| EngineError::InvalidDimensions { width: 0, height: 0 });
        let mut pipeline = pipeline(backend);

        pipeline.request(RenderRequest::new(1, 4.0, 8.0, RenderMode::Dark));
        assert!(pipeline.poll_timeout(SHORT).is_none());

        let failures = pipeline.take_failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].page(), 1);
        assert_eq!(failures[0].request, RenderRequest::new(1, 4.0, 8.0, RenderMode::Dark));
        assert!(!failures[0].is_retryable());
        assert!(pipeline.take_failures().is_empty());
    }

    #[test]
    fn resource_exhaustion_is_retryable() {
        let mut backend = FakeBackend::instant(1);
        backend.fail = Some(|| EngineError::ResourceExhausted { bytes: usize::MAX });
        let mut pipeline = pipeline(backend);

        pipeline.request(RenderRequest::new(0, 1.0, 1.0, RenderMode::Light));
        assert!(pipeline.poll_timeout(SHORT).is_none());

        let failures = pipeline.take_failures();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].is_retryable());
    }

    #[test]
    fn failure_of_cancelled_job_is_not_reported() {
        let (mut backend, entered, gate) = FakeBackend::gated(1);
        backend.fail = Some(|| EngineError::Backend("boom".to_string()));
        let mut pipeline = pipeline(backend);

        pipeline.request(RenderRequest::new(0, 1.0, 1.0, RenderMode::Light));
        entered.recv_timeout(WAIT).unwrap();
        pipeline.cancel(0);
        gate.send(()).unwrap();

        assert!(pipeline.poll_timeout(SHORT).is_none());
        assert!(pipeline.take_failures().is_empty());
        assert_eq!(pipeline.stats().failed, 0);
    }

    #[test]
    fn results_arrive_from_several_workers() {
        let backend = Arc::new(FakeBackend::instant(8));
        let config = PipelineConfig::default().with_workers(3);
        let mut pipeline = RenderPipeline::new(backend, config).unwrap();
        assert_eq!(pipeline.num_workers(), 3);

        for page in 0..8 {
            pipeline.request(RenderRequest::new(page, 0.5, 0.5, RenderMode::Light));
        }

        let mut pages: Vec<usize> =
            (0..8).filter_map(|_| pipeline.poll_timeout(WAIT)).map(|r| r.page()).collect();
        pages.sort_unstable();
        assert_eq!(pages, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn drain_collects_ready_results() {
        let mut pipeline = pipeline(FakeBackend::instant(3));
        assert!(pipeline.drain().is_empty());

        for page in 0..3 {
            pipeline.request(RenderRequest::new(page, 1.0, 1.0, RenderMode::Light));
        }

        let deadline = Instant::now() + WAIT;
        let mut pages = Vec::new();
        while pages.len() < 3 && Instant::now() < deadline {
            pages.extend(pipeline.drain().iter().map(RenderResult::page));
            std::thread::sleep(Duration::from_millis(5));
        }
        pages.sort_unstable();
        assert_eq!(pages, vec![0, 1, 2]);
        assert_eq!(pipeline.outstanding(), 0);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut pipeline = pipeline(FakeBackend::instant(1));
        pipeline.shutdown();
        pipeline.shutdown();
        assert_eq!(
            pipeline.request(RenderRequest::new(0, 1.0, 1.0, RenderMode::Light)),
            RequestOutcome::Rejected
        );
    }
}
