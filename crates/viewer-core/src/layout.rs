use pageflow_engine::{PageSize, Rect};
use std::ops::RangeInclusive;

/// Vertical space between pages in content pixels. Not scaled by zoom.
pub const DEFAULT_PAGE_GAP: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayoutEntry {
    pub width: f32,
    pub height: f32,
    pub y_offset: f32,
    /// Centres the page within the widest page.
    pub x_offset: f32,
    pub original: PageSize,
}

impl PageLayoutEntry {
    /// Page rectangle in content space.
    pub fn rect(&self) -> Rect {
        Rect::new(self.x_offset, self.y_offset, self.width, self.height)
    }

    pub fn bottom(&self) -> f32 {
        self.y_offset + self.height
    }
}

/// A content point resolved to a page, in unscaled page units.
///
/// The point is not clamped to the page: a point in the gap below a page or
/// in the margin beside it still maps back to the same content position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLocation {
    pub page: usize,
    pub x: f32,
    pub y: f32,
}

/// Page geometry for one zoom factor.
///
/// Always rebuilt from scratch; there is no incremental update path.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentLayout {
    entries: Vec<PageLayoutEntry>,
    zoom: f32,
    gap: f32,
    total_height: f32,
    max_width: f32,
}

impl Default for DocumentLayout {
    fn default() -> Self {
        Self::compute(&[], 1.0, DEFAULT_PAGE_GAP)
    }
}

impl DocumentLayout {
    pub fn compute(sizes: &[PageSize], zoom: f32, gap: f32) -> Self {
        let max_width = sizes.iter().map(|size| size.width * zoom).fold(0.0_f32, f32::max);

        let mut entries = Vec::with_capacity(sizes.len());
        let mut cursor = 0.0_f32;
        for (index, size) in sizes.iter().enumerate() {
            if index > 0 {
                cursor += gap;
            }
            let width = size.width * zoom;
            let height = size.height * zoom;
            entries.push(PageLayoutEntry {
                width,
                height,
                y_offset: cursor,
                x_offset: (max_width - width) / 2.0,
                original: *size,
            });
            cursor += height;
        }

        Self { entries, zoom, gap, total_height: cursor, max_width }
    }

    pub fn entries(&self) -> &[PageLayoutEntry] {
        &self.entries
    }

    pub fn entry(&self, page: usize) -> Option<&PageLayoutEntry> {
        self.entries.get(page)
    }

    pub fn page_count(&self) -> usize {
        self.entries.len()
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn gap(&self) -> f32 {
        self.gap
    }

    pub fn total_height(&self) -> f32 {
        self.total_height
    }

    pub fn max_width(&self) -> f32 {
        self.max_width
    }

    /// Page owning content offset `y`. The gap below a page belongs to that page.
    pub fn page_at_y(&self, y: f32) -> Option<usize> {
        if self.entries.is_empty() {
            return None;
        }

        let index = self.entries.partition_point(|entry| entry.bottom() + self.gap <= y);
        Some(index.min(self.entries.len() - 1))
    }

    /// Pages whose rectangle intersects the vertical span `[top, bottom]`.
    ///
    /// Returns `None` when the span falls entirely into a gap or outside the
    /// content.
    pub fn visible_pages(&self, top: f32, bottom: f32) -> Option<RangeInclusive<usize>> {
        if self.entries.is_empty() || bottom < top {
            return None;
        }

        let first = self.entries.partition_point(|entry| entry.bottom() < top);
        let end = self.entries.partition_point(|entry| entry.y_offset <= bottom);

        (first < end).then(|| first..=end - 1)
    }

    pub fn locate(&self, x: f32, y: f32) -> Option<PageLocation> {
        let page = self.page_at_y(y)?;
        let entry = &self.entries[page];

        Some(PageLocation {
            page,
            x: (x - entry.x_offset) / self.zoom,
            y: (y - entry.y_offset) / self.zoom,
        })
    }

    /// Inverse of [`DocumentLayout::locate`].
    pub fn content_point(&self, page: usize, x: f32, y: f32) -> Option<(f32, f32)> {
        let entry = self.entries.get(page)?;
        Some((entry.x_offset + x * self.zoom, entry.y_offset + y * self.zoom))
    }

    /// Content-space rectangle of a box given in unscaled page units.
    pub fn page_rect_to_content(&self, page: usize, rect: &Rect) -> Option<Rect> {
        let entry = self.entries.get(page)?;
        Some(rect.scale(self.zoom, self.zoom).translate(entry.x_offset, entry.y_offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes() -> Vec<PageSize> {
        vec![PageSize::new(600.0, 800.0), PageSize::new(400.0, 500.0), PageSize::new(600.0, 800.0)]
    }

    #[test]
    fn offsets_accumulate_heights_and_gaps() {
        let layout = DocumentLayout::compute(&sizes(), 1.0, 20.0);

        let offsets: Vec<f32> = layout.entries().iter().map(|entry| entry.y_offset).collect();
        assert_eq!(offsets, vec![0.0, 820.0, 1340.0]);
        assert_eq!(layout.total_height(), 2140.0);
        assert_eq!(layout.max_width(), 600.0);
        assert_eq!(layout.entry(1).unwrap().x_offset, 100.0);
    }

    #[test]
    fn gaps_do_not_scale_with_zoom() {
        let base = DocumentLayout::compute(&sizes(), 1.0, 20.0);
        let doubled = DocumentLayout::compute(&sizes(), 2.0, 20.0);

        assert_eq!(doubled.total_height(), (base.total_height() - 40.0) * 2.0 + 40.0);
        assert_eq!(doubled.max_width(), 1200.0);
    }

    #[test]
    fn without_gaps_height_scales_linearly() {
        let base = DocumentLayout::compute(&sizes(), 0.75, 0.0);
        let doubled = DocumentLayout::compute(&sizes(), 1.5, 0.0);
        assert!((doubled.total_height() - base.total_height() * 2.0).abs() < 1e-3);
    }

    #[test]
    fn recompute_is_idempotent() {
        let a = DocumentLayout::compute(&sizes(), 1.3, 20.0);
        let b = DocumentLayout::compute(&sizes(), 1.3, 20.0);
        assert_eq!(a, b);
    }

    #[test]
    fn empty_document_has_zero_extent() {
        let layout = DocumentLayout::compute(&[], 2.0, 20.0);
        assert_eq!(layout.total_height(), 0.0);
        assert_eq!(layout.max_width(), 0.0);
        assert_eq!(layout.page_at_y(10.0), None);
        assert_eq!(layout.visible_pages(0.0, 100.0), None);
    }

    #[test]
    fn page_at_y_assigns_gap_to_page_above() {
        let layout = DocumentLayout::compute(&sizes(), 1.0, 20.0);
        assert_eq!(layout.page_at_y(-5.0), Some(0));
        assert_eq!(layout.page_at_y(810.0), Some(0));
        assert_eq!(layout.page_at_y(820.0), Some(1));
        assert_eq!(layout.page_at_y(99_999.0), Some(2));
    }

    #[test]
    fn visible_pages_track_span() {
        let layout = DocumentLayout::compute(&sizes(), 1.0, 20.0);
        assert_eq!(layout.visible_pages(0.0, 720.0), Some(0..=0));
        assert_eq!(layout.visible_pages(700.0, 1400.0), Some(0..=2));
        assert_eq!(layout.visible_pages(805.0, 815.0), None);
        assert_eq!(layout.visible_pages(5000.0, 6000.0), None);
    }

    #[test]
    fn locate_round_trips_through_content_point() {
        let layout = DocumentLayout::compute(&sizes(), 1.7, 20.0);
        let location = layout.locate(512.0, 1500.0).unwrap();
        let (x, y) = layout.content_point(location.page, location.x, location.y).unwrap();
        assert!((x - 512.0).abs() < 1e-3);
        assert!((y - 1500.0).abs() < 1e-3);
    }

    #[test]
    fn page_rect_maps_into_content() {
        let layout = DocumentLayout::compute(&sizes(), 2.0, 20.0);
        let rect = layout.page_rect_to_content(1, &Rect::new(10.0, 10.0, 5.0, 5.0)).unwrap();
        assert_eq!(rect, Rect::new(200.0 + 20.0, 1620.0 + 20.0, 10.0, 10.0));
    }
}
