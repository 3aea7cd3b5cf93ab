//! Scroll and zoom momentum.
//!
//! Two independent damped systems share one [`Viewport`]: translation
//! (scroll position and velocity) and scale (zoom and zoom velocity). Input
//! gestures only ever add velocity; [`Viewport::update`] integrates it with
//! exponential decay using the frame time supplied by the host loop.

use crate::layout::{DocumentLayout, PageLocation, DEFAULT_PAGE_GAP};
use pageflow_engine::PageSize;
use std::ops::RangeInclusive;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsConfig {
    /// Exponential decay rate of every velocity, per second.
    pub damping: f32,
    /// Content pixels travelled per unit of scroll delta.
    pub scroll_sensitivity: f32,
    /// Zoom change per unit of zoom delta.
    pub zoom_sensitivity: f32,
    pub zoom_min: f32,
    pub zoom_max: f32,
    /// Translation speed (px/s) below which motion stops.
    pub velocity_epsilon: f32,
    pub zoom_velocity_epsilon: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            damping: 10.0,
            scroll_sensitivity: 120.0,
            zoom_sensitivity: 0.05,
            zoom_min: 0.25,
            zoom_max: 4.0,
            velocity_epsilon: 0.5,
            zoom_velocity_epsilon: 0.001,
        }
    }
}

impl PhysicsConfig {
    pub fn clamp_zoom(&self, zoom: f32) -> f32 {
        zoom.clamp(self.zoom_min, self.zoom_max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    pub scroll_x: f32,
    pub scroll_y: f32,
    pub velocity_x: f32,
    pub velocity_y: f32,
    pub zoom: f32,
    pub zoom_velocity: f32,
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub total_height: f32,
    pub max_width: f32,
}

/// What one integration step changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewportUpdate {
    pub scrolled: bool,
    pub zoom_changed: bool,
}

pub struct Viewport {
    config: PhysicsConfig,
    sizes: Vec<PageSize>,
    gap: f32,
    layout: DocumentLayout,
    state: ViewportState,
    zoom_anchor: (f32, f32),
}

impl Viewport {
    pub fn new(
        sizes: Vec<PageSize>,
        config: PhysicsConfig,
        viewport_width: f32,
        viewport_height: f32,
    ) -> Self {
        Self::with_gap(sizes, config, DEFAULT_PAGE_GAP, viewport_width, viewport_height)
    }

    pub fn with_gap(
        sizes: Vec<PageSize>,
        config: PhysicsConfig,
        gap: f32,
        viewport_width: f32,
        viewport_height: f32,
    ) -> Self {
        let zoom = config.clamp_zoom(1.0);
        let layout = DocumentLayout::compute(&sizes, zoom, gap);
        let state = ViewportState {
            scroll_x: 0.0,
            scroll_y: 0.0,
            velocity_x: 0.0,
            velocity_y: 0.0,
            zoom,
            zoom_velocity: 0.0,
            viewport_width: viewport_width.max(0.0),
            viewport_height: viewport_height.max(0.0),
            total_height: layout.total_height(),
            max_width: layout.max_width(),
        };

        let mut viewport = Self {
            config,
            sizes,
            gap,
            layout,
            state,
            zoom_anchor: (viewport_width / 2.0, viewport_height / 2.0),
        };
        viewport.clamp_scroll();
        viewport
    }

    pub fn state(&self) -> &ViewportState {
        &self.state
    }

    pub fn layout(&self) -> &DocumentLayout {
        &self.layout
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn zoom(&self) -> f32 {
        self.state.zoom
    }

    pub fn is_moving(&self) -> bool {
        self.state.velocity_x != 0.0 || self.state.velocity_y != 0.0 || self.is_zooming()
    }

    pub fn is_zooming(&self) -> bool {
        self.state.zoom_velocity != 0.0
    }

    pub fn max_scroll(&self) -> (f32, f32) {
        (
            (self.state.max_width - self.state.viewport_width).max(0.0),
            (self.state.total_height - self.state.viewport_height).max(0.0),
        )
    }

    /// Screen padding that centres content narrower than the viewport.
    pub fn horizontal_padding(&self) -> f32 {
        ((self.state.viewport_width - self.state.max_width) / 2.0).max(0.0)
    }

    pub fn screen_to_content(&self, x: f32, y: f32) -> (f32, f32) {
        (x + self.state.scroll_x - self.horizontal_padding(), y + self.state.scroll_y)
    }

    pub fn content_to_screen(&self, x: f32, y: f32) -> (f32, f32) {
        (x - self.state.scroll_x + self.horizontal_padding(), y - self.state.scroll_y)
    }

    /// Page and unscaled page point under a screen position.
    pub fn locate_screen(&self, x: f32, y: f32) -> Option<PageLocation> {
        let (cx, cy) = self.screen_to_content(x, y);
        self.layout.locate(cx, cy)
    }

    /// Pages intersecting the viewport, widened by `margin` pages on each side.
    pub fn visible_pages(&self, margin: usize) -> Option<RangeInclusive<usize>> {
        let top = self.state.scroll_y;
        let bottom = top + self.state.viewport_height;
        let range = self
            .layout
            .visible_pages(top, bottom)
            .or_else(|| self.layout.page_at_y(top).map(|page| page..=page))?;

        let last = self.layout.page_count().saturating_sub(1);
        Some(range.start().saturating_sub(margin)..=(range.end() + margin).min(last))
    }

    pub fn scroll_impulse(&mut self, dx: f32, dy: f32) {
        if !dx.is_finite() || !dy.is_finite() {
            return;
        }
        let gain = self.config.scroll_sensitivity * self.config.damping;
        self.state.velocity_x += dx * gain;
        self.state.velocity_y += dy * gain;
    }

    /// Add zoom velocity anchored at a screen point.
    pub fn zoom_impulse(&mut self, delta: f32, anchor_x: f32, anchor_y: f32) {
        if !delta.is_finite() || !anchor_x.is_finite() || !anchor_y.is_finite() {
            return;
        }
        self.state.zoom_velocity += delta * self.config.zoom_sensitivity * self.config.damping;
        self.zoom_anchor = (anchor_x, anchor_y);
    }

    pub fn set_velocity(&mut self, velocity_x: f32, velocity_y: f32) {
        if velocity_x.is_finite() && velocity_y.is_finite() {
            self.state.velocity_x = velocity_x;
            self.state.velocity_y = velocity_y;
        }
    }

    pub fn stop(&mut self) {
        self.state.velocity_x = 0.0;
        self.state.velocity_y = 0.0;
        self.state.zoom_velocity = 0.0;
    }

    /// Jump to a scroll position, clamped to the content.
    pub fn set_scroll(&mut self, x: f32, y: f32) {
        if x.is_finite() && y.is_finite() {
            self.state.scroll_x = x;
            self.state.scroll_y = y;
        }
        self.clamp_scroll();
    }

    pub fn set_viewport_size(&mut self, width: f32, height: f32) {
        if !width.is_finite() || !height.is_finite() {
            return;
        }
        self.state.viewport_width = width.max(0.0);
        self.state.viewport_height = height.max(0.0);
        self.clamp_scroll();
    }

    /// Change zoom keeping the content under the screen point `(center_x, center_y)` fixed.
    ///
    /// Returns whether the zoom changed. Non-finite requests are ignored and
    /// out-of-range ones are clamped.
    pub fn set_zoom(&mut self, new_zoom: f32, center_x: f32, center_y: f32) -> bool {
        if !new_zoom.is_finite() || !center_x.is_finite() || !center_y.is_finite() {
            return false;
        }

        let target = self.config.clamp_zoom(new_zoom);
        if target == self.state.zoom {
            return false;
        }

        let anchor = self.locate_screen(center_x, center_y);

        self.state.zoom = target;
        self.relayout();

        if let Some(location) = anchor {
            if let Some((x, y)) = self.layout.content_point(location.page, location.x, location.y) {
                self.state.scroll_x = x + self.horizontal_padding() - center_x;
                self.state.scroll_y = y - center_y;
            }
        }
        self.clamp_scroll();

        true
    }

    /// Advance the simulation by `dt` seconds.
    pub fn update(&mut self, dt: f32) -> ViewportUpdate {
        let mut report = ViewportUpdate::default();
        if !dt.is_finite() || dt <= 0.0 {
            return report;
        }

        let decay = (-self.config.damping * dt).exp();

        let epsilon = self.config.velocity_epsilon;
        self.state.velocity_x = self.settle(self.state.velocity_x * decay, epsilon);
        self.state.velocity_y = self.settle(self.state.velocity_y * decay, epsilon);

        if self.state.velocity_x != 0.0 || self.state.velocity_y != 0.0 {
            let before = (self.state.scroll_x, self.state.scroll_y);
            let wanted_x = before.0 + self.state.velocity_x * dt;
            let wanted_y = before.1 + self.state.velocity_y * dt;
            self.state.scroll_x = wanted_x;
            self.state.scroll_y = wanted_y;
            self.clamp_scroll();

            if self.state.scroll_x != wanted_x {
                self.state.velocity_x = 0.0;
            }
            if self.state.scroll_y != wanted_y {
                self.state.velocity_y = 0.0;
            }
            report.scrolled = (self.state.scroll_x, self.state.scroll_y) != before;
        }

        self.state.zoom_velocity =
            self.settle(self.state.zoom_velocity * decay, self.config.zoom_velocity_epsilon);

        if self.state.zoom_velocity != 0.0 {
            let wanted = self.state.zoom + self.state.zoom_velocity * dt;
            let (anchor_x, anchor_y) = self.zoom_anchor;
            report.zoom_changed = self.set_zoom(wanted, anchor_x, anchor_y);

            if self.config.clamp_zoom(wanted) != wanted {
                self.state.zoom_velocity = 0.0;
            }
        }

        report
    }

    fn settle(&self, velocity: f32, epsilon: f32) -> f32 {
        if velocity.abs() < epsilon || !velocity.is_finite() {
            0.0
        } else {
            velocity
        }
    }

    fn relayout(&mut self) {
        self.layout = DocumentLayout::compute(&self.sizes, self.state.zoom, self.gap);
        self.state.total_height = self.layout.total_height();
        self.state.max_width = self.layout.max_width();
        log::debug!(
            "layout recomputed: zoom={:.3} total_height={:.1}",
            self.state.zoom,
            self.state.total_height
        );
    }

    fn clamp_scroll(&mut self) {
        let (max_x, max_y) = self.max_scroll();
        self.state.scroll_x = self.state.scroll_x.clamp(0.0, max_x);
        self.state.scroll_y = self.state.scroll_y.clamp(0.0, max_y);
    }
}
