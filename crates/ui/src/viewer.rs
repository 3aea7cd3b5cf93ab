//! The viewer context
//!
//! [`Viewer`] is the one object a host application talks to. It owns the
//! state of the loaded document as a single [`Session`]: viewport physics and
//! layout, the render pipeline, the texture and text caches, the selection
//! and the RSVP presenter. A session is created when a document is loaded
//! and dropped as a unit when it is closed or replaced.
//!
//! Every frame the host calls [`Viewer::tick`] with the elapsed time, then
//! [`Viewer::draw`] to get a [`Scene`] built from the current cache state.

use crate::clipboard::Clipboard;
use crate::rsvp::{extract_text_for_rsvp, RsvpFrame, RsvpKey, RsvpPresenter};
use crate::scene::{Color, OverlayText, PageBitmap, PageQuad, Scene, ScrollbarThumb};
use crate::selection::{self, CursorKind, SelectionController, SelectionState, SELECTION_COLOR};
use crate::ViewerError;
use pageflow_cache::{TextureCache, TextureCacheStats, TextureLookup};
use pageflow_core::{OcrConfig, OcrOutcome, SlotTable, TextCache, TextCacheCounters};
use pageflow_engine::{DocumentBackend, LopdfBackend, OcrBackend, Rect, RenderMode};
use pageflow_scheduler::{
    PipelineConfig, PipelineStats, RenderPipeline, RenderRequest, RequestOutcome,
};
use pageflow_viewer_core::{ViewerConfig, Viewport};
use std::path::Path;
use std::sync::Arc;

/// Scrollbar alpha lost per second once scrolling stops
const SCROLLBAR_FADE_PER_SECOND: f32 = 2.0;

/// The overlay fades out over its last half second
const OVERLAY_FADE_SECONDS: f32 = 0.5;

/// What happened during one [`Viewer::tick`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub scrolled: bool,
    pub zoom_changed: bool,

    /// Render jobs submitted
    pub requested: usize,

    /// Pending jobs cancelled because their page left the view
    pub cancelled: usize,

    /// Results uploaded into the texture cache
    pub uploaded: usize,

    /// Results dropped because they no longer match the view
    pub discarded: usize,

    /// Pages the backend could not render at the current zoom and mode
    pub failed: usize,

    /// Textures dropped after a large zoom jump
    pub textures_dropped: usize,

    pub rsvp_advanced: bool,
}

struct Overlay {
    text: String,
    remaining: f32,
}

/// Everything tied to one loaded document.
struct Session {
    backend: Arc<dyn DocumentBackend>,
    viewport: Viewport,
    pipeline: RenderPipeline,
    textures: TextureCache<PageBitmap>,
    texts: TextCache,
    selection: SelectionController,
    rsvp: RsvpPresenter,
    /// Pages whose render failed at the current zoom and mode. They are not
    /// requested again until either changes.
    unrenderable: SlotTable<()>,
    /// Device pixels per layout pixel.
    pixel_ratio: f32,
}

impl Session {
    fn open(
        backend: Arc<dyn DocumentBackend>,
        ocr: Arc<dyn OcrBackend>,
        config: &ViewerConfig,
    ) -> Result<Self, ViewerError> {
        let sizes = backend.page_sizes()?;
        let page_count = sizes.len();

        let viewport = Viewport::with_gap(
            sizes,
            config.physics(),
            config.page_gap,
            config.viewport_width,
            config.viewport_height,
        );

        let mut pipeline_config = PipelineConfig::default().with_workers(config.render_threads);
        pipeline_config.zoom_tolerance = config.zoom_tolerance;
        let pipeline = RenderPipeline::new(backend.clone(), pipeline_config)?;

        let ocr_config = OcrConfig::new().with_render_scale(config.ocr_render_scale);

        Ok(Self {
            texts: TextCache::new(backend.clone(), ocr, ocr_config),
            textures: TextureCache::new(page_count, config.zoom_tolerance),
            backend,
            viewport,
            pipeline,
            selection: SelectionController::new(),
            rsvp: RsvpPresenter::new(config.rsvp_wpm, config.rsvp_chunk_size),
            unrenderable: SlotTable::new(page_count),
            pixel_ratio: config.pixel_ratio,
        })
    }

    /// Reconcile the texture cache with a new zoom. Returns how many textures
    /// were dropped for being too far off to serve as placeholders.
    fn commit_zoom(&mut self, clear_ratio: f32) -> usize {
        let zoom = self.viewport.zoom();
        let stale = self.textures.invalidate(zoom);
        let dropped = self.textures.retain_fresh_or_close(zoom, clear_ratio);
        self.unrenderable.clear();
        log::debug!("zoom {zoom:.3}: {stale} stale textures, {dropped} dropped");
        dropped
    }

    /// Cancel work for pages out of view and request visible pages that need
    /// a render. Returns `(requested, cancelled)`.
    fn request_visible(&mut self, mode: RenderMode, margin: usize) -> (usize, usize) {
        let zoom = self.viewport.zoom();
        let visible = self.viewport.visible_pages(margin);

        let mut cancelled = 0;
        for page in self.pipeline.pending_pages() {
            if !visible.as_ref().is_some_and(|range| range.contains(&page))
                && self.pipeline.cancel(page)
            {
                cancelled += 1;
            }
        }

        let Some(visible) = visible else {
            return (0, cancelled);
        };

        // Mid-gesture, a scaled placeholder is good enough.
        let zooming = self.viewport.is_zooming();

        let mut requested = 0;
        for page in visible {
            if self.textures.is_fresh(page, zoom)
                || (zooming && self.textures.contains(page))
                || self.unrenderable.is_present(page)
            {
                continue;
            }
            let request = RenderRequest::new(page, zoom, zoom * self.pixel_ratio, mode);
            match self.pipeline.request(request) {
                RequestOutcome::Submitted | RequestOutcome::Superseded => requested += 1,
                RequestOutcome::AlreadyPending | RequestOutcome::Rejected => {}
            }
        }

        (requested, cancelled)
    }

    /// Move finished renders into the texture cache. Returns `(uploaded, discarded)`.
    fn upload_results(&mut self, mode: RenderMode, tolerance: f32) -> (usize, usize) {
        let zoom = self.viewport.zoom();
        let page_count = self.textures.page_count();

        let mut uploaded = 0;
        let mut discarded = 0;
        while let Some(result) = self.pipeline.poll() {
            let current = result.page() < page_count
                && (result.zoom() - zoom).abs() <= tolerance
                && result.mode() == mode;
            if !current {
                log::trace!("dropping stale render of page {}", result.page());
                result.release();
                discarded += 1;
                continue;
            }

            let page = result.page();
            let rendered_at = result.zoom();
            let (width, height) = (result.width(), result.height());
            let bitmap = PageBitmap::new(result.into_pixels());
            if self.textures.put(page, bitmap, rendered_at, width, height) {
                uploaded += 1;
            }
        }

        (uploaded, discarded)
    }

    /// Mark pages whose current render failed for good. Resource exhaustion
    /// stays eligible for another request. Returns how many were marked.
    fn record_failures(&mut self, mode: RenderMode, tolerance: f32) -> usize {
        let zoom = self.viewport.zoom();
        let mut marked = 0;
        for failure in self.pipeline.take_failures() {
            let request = failure.request;
            let current = (request.zoom - zoom).abs() <= tolerance && request.mode == mode;
            if !current || failure.is_retryable() {
                continue;
            }
            if self.unrenderable.fill(request.page, ()) {
                log::info!("page {} has no renderable content at zoom {zoom:.3}", request.page);
                marked += 1;
            }
        }
        marked
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.pipeline.shutdown();
        self.backend.close();
    }
}

pub struct Viewer {
    config: ViewerConfig,
    ocr: Arc<dyn OcrBackend>,
    clipboard: Box<dyn Clipboard>,
    mode: RenderMode,
    session: Option<Session>,
    overlay: Option<Overlay>,
    scrollbar_alpha: f32,
}

impl Viewer {
    pub fn new(
        config: ViewerConfig,
        ocr: Arc<dyn OcrBackend>,
        clipboard: Box<dyn Clipboard>,
    ) -> Result<Self, ViewerError> {
        config.validate()?;
        let mode = if config.dark_mode { RenderMode::Dark } else { RenderMode::Light };

        Ok(Self {
            config,
            ocr,
            clipboard,
            mode,
            session: None,
            overlay: None,
            scrollbar_alpha: 0.0,
        })
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Open a PDF file with the built-in backend.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ViewerError> {
        let backend = LopdfBackend::open(path)?;
        self.load_document(Arc::new(backend))
    }

    /// Replace the current document, if any, with `backend`.
    pub fn load_document(&mut self, backend: Arc<dyn DocumentBackend>) -> Result<(), ViewerError> {
        self.close_document();

        let session = Session::open(backend, self.ocr.clone(), &self.config)?;
        log::info!(
            "loaded document: {} pages, {} render workers",
            session.viewport.layout().page_count(),
            session.pipeline.num_workers()
        );
        self.session = Some(session);
        self.scrollbar_alpha = 0.0;
        Ok(())
    }

    /// Drop the current document and all state tied to it.
    pub fn close_document(&mut self) -> bool {
        match self.session.take() {
            Some(session) => {
                log::info!("closing document");
                drop(session);
                true
            }
            None => false,
        }
    }

    pub fn has_document(&self) -> bool {
        self.session.is_some()
    }

    pub fn page_count(&self) -> usize {
        self.session.as_ref().map_or(0, |session| session.viewport.layout().page_count())
    }

    pub fn viewport(&self) -> Option<&Viewport> {
        self.session.as_ref().map(|session| &session.viewport)
    }

    pub fn zoom(&self) -> Option<f32> {
        self.viewport().map(Viewport::zoom)
    }

    pub fn render_mode(&self) -> RenderMode {
        self.mode
    }

    pub fn texture_stats(&self) -> Option<TextureCacheStats> {
        self.session.as_ref().map(|session| session.textures.stats())
    }

    pub fn pipeline_stats(&self) -> Option<PipelineStats> {
        self.session.as_ref().map(|session| session.pipeline.stats())
    }

    pub fn text_counters(&self) -> Option<TextCacheCounters> {
        self.session.as_ref().map(|session| session.texts.counters())
    }

    /// Render jobs queued or in flight.
    pub fn pending_renders(&self) -> usize {
        self.session.as_ref().map_or(0, |session| session.pipeline.outstanding())
    }

    fn session_mut(&mut self) -> Result<&mut Session, ViewerError> {
        self.session.as_mut().ok_or(ViewerError::NoDocument)
    }

    pub fn scroll_impulse(&mut self, dx: f32, dy: f32) {
        if let Some(session) = self.session.as_mut() {
            session.viewport.scroll_impulse(dx, dy);
        }
    }

    /// Add zoom momentum anchored at a screen point.
    pub fn zoom_impulse(&mut self, delta: f32, anchor_x: f32, anchor_y: f32) {
        if let Some(session) = self.session.as_mut() {
            session.viewport.zoom_impulse(delta, anchor_x, anchor_y);
        }
    }

    /// Jump to a zoom level, keeping the centre of the viewport in place.
    pub fn zoom_to(&mut self, zoom: f32) -> bool {
        let clear_ratio = self.config.zoom_clear_ratio;
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        let state = *session.viewport.state();
        let changed = session.viewport.set_zoom(
            zoom,
            state.viewport_width / 2.0,
            state.viewport_height / 2.0,
        );
        if !changed {
            return false;
        }

        session.commit_zoom(clear_ratio);
        let label = format!("{:.0}%", session.viewport.zoom() * 100.0);
        self.show_overlay(label);
        true
    }

    /// Jump to a scroll position, clamped to the content.
    pub fn set_scroll(&mut self, x: f32, y: f32) {
        if let Some(session) = self.session.as_mut() {
            session.viewport.set_scroll(x, y);
            self.scrollbar_alpha = 1.0;
        }
    }

    pub fn set_viewport_size(&mut self, width: f32, height: f32) {
        if !(width.is_finite() && height.is_finite()) {
            return;
        }
        self.config.viewport_width = width.max(0.0);
        self.config.viewport_height = height.max(0.0);
        if let Some(session) = self.session.as_mut() {
            session.viewport.set_viewport_size(width, height);
        }
    }

    /// Switch between light and dark rendering.
    ///
    /// Every texture was rendered in the old mode, so the cache is cleared and
    /// pending work is cancelled.
    pub fn toggle_dark_mode(&mut self) -> RenderMode {
        self.mode = self.mode.toggled();
        if let Some(session) = self.session.as_mut() {
            session.pipeline.cancel_all();
            session.textures.clear();
            session.unrenderable.clear();
        }
        let label = match self.mode {
            RenderMode::Dark => "Dark mode",
            RenderMode::Light => "Light mode",
        };
        self.show_overlay(label);
        self.mode
    }

    /// Show transient status text for the configured time.
    pub fn show_overlay(&mut self, text: impl Into<String>) {
        self.overlay = Some(Overlay { text: text.into(), remaining: self.config.overlay_seconds });
    }

    /// Advance the viewer by `dt` seconds of wall time.
    pub fn tick(&mut self, dt: f32) -> FrameReport {
        let mut report = FrameReport::default();
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        if let Some(overlay) = self.overlay.as_mut() {
            overlay.remaining -= dt;
            if overlay.remaining <= 0.0 {
                self.overlay = None;
            }
        }

        let mode = self.mode;
        let margin = self.config.prefetch_margin;
        let tolerance = self.config.zoom_tolerance;
        let clear_ratio = self.config.zoom_clear_ratio;

        let Some(session) = self.session.as_mut() else {
            return report;
        };

        let update = session.viewport.update(dt);
        report.scrolled = update.scrolled;
        report.zoom_changed = update.zoom_changed;

        if update.scrolled || update.zoom_changed {
            self.scrollbar_alpha = 1.0;
        } else {
            self.scrollbar_alpha = (self.scrollbar_alpha - dt * SCROLLBAR_FADE_PER_SECOND).max(0.0);
        }

        if update.zoom_changed {
            report.textures_dropped = session.commit_zoom(clear_ratio);
        }

        (report.requested, report.cancelled) = session.request_visible(mode, margin);
        (report.uploaded, report.discarded) = session.upload_results(mode, tolerance);
        report.failed = session.record_failures(mode, tolerance);
        report.rsvp_advanced = session.rsvp.update(dt);

        if update.zoom_changed {
            let label = format!("{:.0}%", session.viewport.zoom() * 100.0);
            self.show_overlay(label);
        }

        report
    }

    fn background(&self) -> Color {
        match self.mode {
            RenderMode::Light => Color::rgb(0.85, 0.85, 0.85),
            RenderMode::Dark => Color::rgb(0.08, 0.08, 0.08),
        }
    }

    /// Build the scene for the current state.
    ///
    /// Drawing may run OCR on pages touched by the selection.
    pub fn draw(&mut self) -> Scene {
        let mut scene = Scene::empty(self.background());
        scene.highlight_color = Color::rgba(
            SELECTION_COLOR[0],
            SELECTION_COLOR[1],
            SELECTION_COLOR[2],
            SELECTION_COLOR[3],
        );
        scene.overlay = self.overlay.as_ref().map(|overlay| OverlayText {
            text: overlay.text.clone(),
            alpha: (overlay.remaining / OVERLAY_FADE_SECONDS).min(1.0),
        });

        let Some(session) = self.session.as_mut() else {
            return scene;
        };

        let viewport = &session.viewport;
        let zoom = viewport.zoom();

        if let Some(visible) = viewport.visible_pages(0) {
            for page in visible {
                let Some(entry) = viewport.layout().entry(page) else {
                    continue;
                };
                let (x, y) = viewport.content_to_screen(entry.x_offset, entry.y_offset);
                let (bitmap, placeholder) = match session.textures.lookup(page, zoom) {
                    TextureLookup::Fresh(texture) => (Some(texture.handle.clone()), false),
                    TextureLookup::Placeholder { entry: texture, .. } => {
                        (Some(texture.handle.clone()), true)
                    }
                    TextureLookup::Missing => (None, false),
                };
                scene.pages.push(PageQuad {
                    page,
                    rect: Rect::new(x, y, entry.width, entry.height),
                    bitmap,
                    placeholder,
                });
            }
        }

        scene.highlights = match session.selection.highlights(viewport, &mut session.texts) {
            Ok(highlights) => highlights,
            Err(err) => {
                log::warn!("could not compute selection highlights: {err}");
                Vec::new()
            }
        };

        let state = viewport.state();
        scene.scrollbar = ScrollbarThumb::compute(
            state.scroll_y,
            state.viewport_width,
            state.viewport_height,
            state.total_height,
            self.scrollbar_alpha,
        );

        if session.rsvp.is_active() {
            scene.rsvp = Some(session.rsvp.frame());
        }

        scene
    }

    pub fn mouse_down(&mut self, x: f32, y: f32) -> bool {
        match self.session.as_mut() {
            Some(session) => session.selection.mouse_down(&session.viewport, x, y),
            None => false,
        }
    }

    pub fn mouse_drag(&mut self, x: f32, y: f32) {
        if let Some(session) = self.session.as_mut() {
            session.selection.mouse_drag(&session.viewport, x, y);
        }
    }

    pub fn mouse_up(&mut self, x: f32, y: f32) {
        if let Some(session) = self.session.as_mut() {
            session.selection.mouse_up(&session.viewport, x, y);
        }
    }

    pub fn selection(&self) -> Option<&SelectionState> {
        self.session.as_ref().and_then(|session| session.selection.state())
    }

    pub fn clear_selection(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.selection.clear();
        }
    }

    pub fn selected_text(&mut self) -> Result<String, ViewerError> {
        let session = self.session_mut()?;
        Ok(session.selection.selected_text(&session.viewport, &mut session.texts)?)
    }

    /// Copy the selection to the clipboard. `None` when nothing is selected.
    pub fn copy_selection(&mut self) -> Result<Option<String>, ViewerError> {
        let session = self.session.as_mut().ok_or(ViewerError::NoDocument)?;
        session.selection.copy_selected_text(
            &session.viewport,
            &mut session.texts,
            self.clipboard.as_mut(),
        )
    }

    pub fn cursor_for_position(&mut self, x: f32, y: f32) -> CursorKind {
        let Some(session) = self.session.as_mut() else {
            return CursorKind::Default;
        };
        selection::cursor_for_position(&session.viewport, &mut session.texts, x, y)
            .unwrap_or_else(|err| {
                log::debug!("no cursor hit test at ({x}, {y}): {err}");
                CursorKind::Default
            })
    }

    /// Run OCR on a page ahead of time.
    pub fn perform_ocr_if_needed(&mut self, page: usize) -> Result<OcrOutcome, ViewerError> {
        Ok(self.session_mut()?.texts.perform_ocr_if_needed(page)?)
    }

    /// Switch RSVP mode, building the word sequence the first time it is
    /// switched on. Returns whether the mode is now on.
    pub fn toggle_rsvp(&mut self) -> Result<bool, ViewerError> {
        let session = self.session_mut()?;
        let active = session.rsvp.toggle();
        if active && !session.rsvp.has_words() {
            let words = extract_text_for_rsvp(&mut session.texts)?;
            session.rsvp.load_words(words);
        }
        log::info!("RSVP mode {}", if active { "on" } else { "off" });
        Ok(active)
    }

    pub fn rsvp_key(&mut self, key: RsvpKey) {
        if let Some(session) = self.session.as_mut() {
            session.rsvp.handle_key(key);
        }
    }

    /// Current RSVP chunk while the mode is on.
    pub fn rsvp_frame(&self) -> Option<RsvpFrame> {
        let session = self.session.as_ref()?;
        session.rsvp.is_active().then(|| session.rsvp.frame())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;
    use crate::testing::{FakeDocument, FakeOcr};
    use pageflow_engine::EngineError;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const FRAME: f32 = 1.0 / 60.0;

    fn config() -> ViewerConfig {
        ViewerConfig {
            viewport_width: 200.0,
            viewport_height: 300.0,
            render_threads: 1,
            ..ViewerConfig::default()
        }
    }

    fn viewer_with(document: Arc<FakeDocument>) -> Viewer {
        let mut viewer =
            Viewer::new(config(), Arc::new(FakeOcr::new()), Box::new(MemoryClipboard::new()))
                .unwrap();
        viewer.load_document(document).unwrap();
        viewer
    }

    /// Tick until every visible page has a fresh bitmap.
    fn settle(viewer: &mut Viewer) -> Scene {
        for _ in 0..500 {
            viewer.tick(FRAME);
            let scene = viewer.draw();
            if !scene.pages.is_empty() && scene.fresh_pages() == scene.pages.len() {
                return scene;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("pages never finished rendering");
    }

    #[test]
    fn test_visible_pages_are_rendered() {
        let mut viewer = viewer_with(Arc::new(FakeDocument::new()));

        let scene = viewer.draw();
        assert_eq!(scene.pages.len(), 2);
        assert_eq!(scene.blank_pages(), 2);

        let scene = settle(&mut viewer);
        assert_eq!(scene.pages[0].rect, Rect::new(0.0, 0.0, 200.0, 100.0));
        assert_eq!(scene.pages[1].rect, Rect::new(0.0, 120.0, 200.0, 100.0));
        let bitmap = scene.pages[0].bitmap.as_ref().unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (200, 100));
        assert_eq!(viewer.texture_stats().unwrap().entries, 2);
    }

    #[test]
    fn test_zoom_keeps_close_textures_as_placeholders() {
        let mut viewer = viewer_with(Arc::new(FakeDocument::new()));
        settle(&mut viewer);

        assert!(viewer.zoom_to(1.5));
        let scene = viewer.draw();
        assert_eq!(scene.placeholder_pages(), 2);
        assert_eq!(scene.overlay.as_ref().map(|overlay| overlay.text.as_str()), Some("150%"));

        let scene = settle(&mut viewer);
        let bitmap = scene.pages[0].bitmap.as_ref().unwrap();
        assert_eq!(bitmap.width(), 300);
    }

    #[test]
    fn test_large_zoom_jump_drops_textures() {
        let mut viewer = viewer_with(Arc::new(FakeDocument::new()));
        settle(&mut viewer);

        assert!(viewer.zoom_to(4.0));
        assert_eq!(viewer.zoom(), Some(4.0));
        assert_eq!(viewer.texture_stats().unwrap().entries, 0);
        assert_eq!(viewer.draw().placeholder_pages(), 0);
    }

    #[test]
    fn test_zoom_is_clamped() {
        let mut viewer = viewer_with(Arc::new(FakeDocument::new()));
        viewer.zoom_to(100.0);
        assert_eq!(viewer.zoom(), Some(4.0));
        assert!(!viewer.zoom_to(f32::NAN));
        assert_eq!(viewer.zoom(), Some(4.0));
    }

    #[test]
    fn test_dark_mode_rerenders_pages() {
        let mut viewer = viewer_with(Arc::new(FakeDocument::new()));
        let light = settle(&mut viewer);

        assert_eq!(viewer.toggle_dark_mode(), RenderMode::Dark);
        let scene = viewer.draw();
        assert_eq!(scene.blank_pages(), 2);
        assert_ne!(scene.background, light.background);

        let scene = settle(&mut viewer);
        let pixels = scene.pages[0].bitmap.as_ref().unwrap().pixels();
        assert_eq!(pixels.pixel(0, 0), Some(RenderMode::Dark.paper()));
    }

    fn unrenderable() -> EngineError {
        EngineError::InvalidDimensions { width: 0, height: 0 }
    }

    /// Tick until `done` holds, summing the pages reported as failed.
    fn tick_until(viewer: &mut Viewer, done: impl Fn(&Viewer) -> bool) -> usize {
        let mut failed = 0;
        for _ in 0..500 {
            failed += viewer.tick(FRAME).failed;
            if done(viewer) {
                return failed;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("viewer never reached the expected state");
    }

    #[test]
    fn test_failed_page_is_rendered_once_per_zoom() {
        let document = Arc::new(FakeDocument::failing(unrenderable));
        let mut viewer = viewer_with(document.clone());

        let failed = tick_until(&mut viewer, |viewer| {
            viewer.pipeline_stats().unwrap().failed == 2 && viewer.pending_renders() == 0
        });
        assert_eq!(failed, 2);
        for _ in 0..60 {
            let report = viewer.tick(FRAME);
            assert_eq!(report.requested, 0);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(document.renders.load(Ordering::SeqCst), 2);
        assert_eq!(viewer.draw().blank_pages(), 2);

        assert!(viewer.zoom_to(1.5));
        tick_until(&mut viewer, |viewer| viewer.pipeline_stats().unwrap().failed == 4);
        for _ in 0..60 {
            viewer.tick(FRAME);
        }
        assert_eq!(document.renders.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_dark_mode_retries_failed_pages() {
        let document = Arc::new(FakeDocument::failing(unrenderable));
        let mut viewer = viewer_with(document.clone());
        tick_until(&mut viewer, |viewer| viewer.pipeline_stats().unwrap().failed == 2);

        viewer.toggle_dark_mode();
        tick_until(&mut viewer, |viewer| viewer.pipeline_stats().unwrap().failed == 4);
        assert_eq!(document.renders.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_resource_exhaustion_is_retried() {
        let document = Arc::new(FakeDocument::failing(|| EngineError::ResourceExhausted {
            bytes: usize::MAX,
        }));
        let mut viewer = viewer_with(document.clone());

        let failed = tick_until(&mut viewer, |_| document.renders.load(Ordering::SeqCst) > 4);
        assert_eq!(failed, 0);
    }

    #[test]
    fn test_pixel_ratio_scales_bitmaps_not_layout() {
        let config = ViewerConfig { pixel_ratio: 2.0, ..config() };
        let mut viewer =
            Viewer::new(config, Arc::new(FakeOcr::new()), Box::new(MemoryClipboard::new()))
                .unwrap();
        viewer.load_document(Arc::new(FakeDocument::new())).unwrap();

        let scene = settle(&mut viewer);
        assert_eq!(scene.pages[0].rect, Rect::new(0.0, 0.0, 200.0, 100.0));
        let bitmap = scene.pages[0].bitmap.as_ref().unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (400, 200));
    }

    #[test]
    fn test_scrolling_shows_scrollbar() {
        let mut viewer = viewer_with(Arc::new(FakeDocument::with_pages(10)));
        assert!(viewer.draw().scrollbar.is_none());

        viewer.scroll_impulse(0.0, 2.0);
        let report = viewer.tick(FRAME);
        assert!(report.scrolled);
        assert!(viewer.viewport().unwrap().state().scroll_y > 0.0);

        let scrollbar = viewer.draw().scrollbar.unwrap();
        assert_eq!(scrollbar.alpha, 1.0);

        // Once the motion has died down the scrollbar fades out.
        for _ in 0..120 {
            viewer.tick(FRAME);
        }
        assert!(viewer.draw().scrollbar.is_none());
    }

    #[test]
    fn test_pages_out_of_view_are_not_requested() {
        let document = Arc::new(FakeDocument::with_pages(10));
        let mut viewer = viewer_with(document);

        let report = viewer.tick(FRAME);
        // Pages 0..=2 are visible, page 3 is the prefetch margin.
        assert_eq!(report.requested, 4);
    }

    #[test]
    fn test_selection_and_copy() {
        let mut viewer = viewer_with(Arc::new(FakeDocument::new()));

        assert!(viewer.mouse_down(5.0, 5.0));
        viewer.mouse_drag(95.0, 25.0);
        viewer.mouse_up(95.0, 25.0);

        assert_eq!(viewer.copy_selection().unwrap().as_deref(), Some("hello world"));
        assert_eq!(viewer.draw().highlights.len(), 2);
        assert_eq!(viewer.cursor_for_position(20.0, 15.0), CursorKind::Text);

        viewer.clear_selection();
        assert!(viewer.copy_selection().unwrap().is_none());
    }

    #[test]
    fn test_rsvp_through_viewer() {
        let mut viewer = viewer_with(Arc::new(FakeDocument::new()));
        assert!(viewer.rsvp_frame().is_none());

        assert!(viewer.toggle_rsvp().unwrap());
        assert_eq!(viewer.rsvp_frame().unwrap().text, "hello");
        assert_eq!(viewer.text_counters().unwrap().ocr_recognitions, 1);

        let report = viewer.tick(0.25);
        assert!(report.rsvp_advanced);
        assert_eq!(viewer.draw().rsvp.unwrap().text, "world");

        viewer.rsvp_key(RsvpKey::Faster);
        assert_eq!(viewer.rsvp_frame().unwrap().wpm, 320);

        assert!(!viewer.toggle_rsvp().unwrap());
        assert!(viewer.draw().rsvp.is_none());
    }

    #[test]
    fn test_close_document_tears_down_session() {
        let document = Arc::new(FakeDocument::new());
        let mut viewer = viewer_with(document.clone());
        viewer.mouse_down(5.0, 5.0);

        assert!(viewer.close_document());
        assert!(!viewer.has_document());
        assert_eq!(document.closed.load(Ordering::SeqCst), 1);
        assert_eq!(viewer.page_count(), 0);
        assert!(viewer.selection().is_none());
        assert!(matches!(viewer.copy_selection(), Err(ViewerError::NoDocument)));
        assert!(!viewer.close_document());
    }

    #[test]
    fn test_loading_replaces_previous_document() {
        let first = Arc::new(FakeDocument::new());
        let mut viewer = viewer_with(first.clone());
        viewer.toggle_rsvp().unwrap();

        viewer.load_document(Arc::new(FakeDocument::with_pages(5))).unwrap();
        assert_eq!(first.closed.load(Ordering::SeqCst), 1);
        assert_eq!(viewer.page_count(), 5);
        assert!(viewer.rsvp_frame().is_none());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ViewerConfig { zoom_min: 0.0, ..ViewerConfig::default() };
        let result =
            Viewer::new(config, Arc::new(FakeOcr::new()), Box::new(MemoryClipboard::new()));
        assert!(matches!(result, Err(ViewerError::Config(_))));
    }
}
