//! Plain geometry shared by every layer of the viewer.

/// Intrinsic page size in points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// US Letter, used when a page carries no usable media box.
    pub const LETTER: PageSize = PageSize::new(612.0, 792.0);
}

/// Axis-aligned rectangle with a top-left origin.
///
/// The same type is used for page units, normalised OCR boxes, content space
/// and screen space; the owning API documents which space a value lives in.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle spanned by two arbitrary corner points.
    pub fn from_points(a: (f32, f32), b: (f32, f32)) -> Self {
        let min_x = a.0.min(b.0);
        let min_y = a.1.min(b.1);
        Self::new(min_x, min_y, a.0.max(b.0) - min_x, a.1.max(b.1) - min_y)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }

    /// Closed-interval overlap test, so touching edges count as intersecting.
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.right() < other.x
            || other.right() < self.x
            || self.bottom() < other.y
            || other.bottom() < self.y)
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        if !self.intersects(other) {
            return None;
        }

        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        Some(Rect::new(
            x,
            y,
            self.right().min(other.right()) - x,
            self.bottom().min(other.bottom()) - y,
        ))
    }

    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        Rect::new(x, y, self.right().max(other.right()) - x, self.bottom().max(other.bottom()) - y)
    }

    /// Scale every coordinate independently on each axis.
    pub fn scale(&self, sx: f32, sy: f32) -> Rect {
        Rect::new(self.x * sx, self.y * sy, self.width * sx, self.height * sy)
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Clamp into the unit square, as required for normalised OCR boxes.
    pub fn clamp_unit(&self) -> Rect {
        let x0 = self.x.clamp(0.0, 1.0);
        let y0 = self.y.clamp(0.0, 1.0);
        let x1 = self.right().clamp(0.0, 1.0);
        let y1 = self.bottom().clamp(0.0, 1.0);
        Rect::new(x0, y0, (x1 - x0).max(0.0), (y1 - y0).max(0.0))
    }
}
