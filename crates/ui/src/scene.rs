//! Draw output of the viewer
//!
//! A [`Scene`] is rebuilt from cache state every time the host asks to draw.
//! It holds plain data only; the host owns the actual GPU or software
//! rasteriser.

use crate::rsvp::RsvpFrame;
use crate::selection::SelectionHighlight;
use pageflow_engine::{PixelBuffer, Rect};
use std::sync::Arc;

/// Width of the scrollbar thumb in screen pixels
pub const SCROLLBAR_WIDTH: f32 = 8.0;

/// Shortest thumb drawn, however long the document
pub const SCROLLBAR_MIN_LENGTH: f32 = 24.0;

/// RGBA color value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    /// Create a new color from RGBA values (0.0 to 1.0)
    pub fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Create a new opaque color from RGB values
    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn from_rgba8(rgba: [u8; 4]) -> Self {
        let [r, g, b, a] = rgba.map(|channel| channel as f32 / 255.0);
        Self { r, g, b, a }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }
}

/// Bitmap of a rendered page, shared between the texture cache and scenes
#[derive(Debug, Clone, PartialEq)]
pub struct PageBitmap(Arc<PixelBuffer>);

impl PageBitmap {
    pub fn new(pixels: PixelBuffer) -> Self {
        Self(Arc::new(pixels))
    }

    pub fn pixels(&self) -> &PixelBuffer {
        &self.0
    }

    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }
}

/// One page as it should appear on screen
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuad {
    pub page: usize,

    /// Page rectangle in screen coordinates at the current zoom
    pub rect: Rect,

    /// Bitmap to stretch over `rect`; `None` draws a blank page
    pub bitmap: Option<PageBitmap>,

    /// The bitmap was rendered at another zoom and is shown scaled until a
    /// fresh render arrives
    pub placeholder: bool,
}

/// Transient status text, e.g. the zoom level after a zoom change
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayText {
    pub text: String,
    pub alpha: f32,
}

/// Vertical scrollbar thumb
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollbarThumb {
    pub rect: Rect,
    pub alpha: f32,
}

impl ScrollbarThumb {
    /// Thumb for a viewport over content of `total_height`, or `None` when
    /// everything fits or the scrollbar has faded out.
    pub fn compute(
        scroll_y: f32,
        viewport_width: f32,
        viewport_height: f32,
        total_height: f32,
        alpha: f32,
    ) -> Option<Self> {
        if alpha <= 0.0 || total_height <= viewport_height || viewport_height <= 0.0 {
            return None;
        }

        let length = (viewport_height * viewport_height / total_height)
            .max(SCROLLBAR_MIN_LENGTH)
            .min(viewport_height);
        let max_scroll = total_height - viewport_height;
        let travel = viewport_height - length;
        let y = (scroll_y / max_scroll).clamp(0.0, 1.0) * travel;

        Some(Self {
            rect: Rect::new(viewport_width - SCROLLBAR_WIDTH, y, SCROLLBAR_WIDTH, length),
            alpha: alpha.min(1.0),
        })
    }
}

/// Everything needed to draw one frame
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub background: Color,
    pub pages: Vec<PageQuad>,
    pub highlights: Vec<SelectionHighlight>,
    pub highlight_color: Color,
    pub overlay: Option<OverlayText>,
    pub scrollbar: Option<ScrollbarThumb>,
    pub rsvp: Option<RsvpFrame>,
}

impl Scene {
    /// A scene with nothing but the background
    pub fn empty(background: Color) -> Self {
        Self {
            background,
            pages: Vec::new(),
            highlights: Vec::new(),
            highlight_color: Color::rgba(0.0, 0.0, 0.0, 0.0),
            overlay: None,
            scrollbar: None,
            rsvp: None,
        }
    }

    /// Pages shown with a bitmap rendered at the current zoom
    pub fn fresh_pages(&self) -> usize {
        self.pages.iter().filter(|quad| quad.bitmap.is_some() && !quad.placeholder).count()
    }

    pub fn placeholder_pages(&self) -> usize {
        self.pages.iter().filter(|quad| quad.placeholder).count()
    }

    pub fn blank_pages(&self) -> usize {
        self.pages.iter().filter(|quad| quad.bitmap.is_none()).count()
    }
}
