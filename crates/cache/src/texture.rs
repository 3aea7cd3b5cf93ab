//! Texture cache with one slot per page
//!
//! Each slot holds the most recent bitmap for its page together with the zoom
//! it was rendered at. An entry is fresh while that zoom matches the current
//! zoom within a tolerance. Stale entries are kept so the old bitmap can be
//! drawn scaled as a placeholder until a fresh render arrives.
//!
//! The cache is owned by the interactive thread; render workers never touch
//! it.

/// A cached bitmap handle and the zoom it was rendered at.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureEntry<T> {
    pub handle: T,
    pub zoom: f32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl<T> TextureEntry<T> {
    /// Estimated memory use, assuming RGBA8.
    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Result of looking up a page at the current zoom.
#[derive(Debug, PartialEq)]
pub enum TextureLookup<'a, T> {
    /// Rendered at the current zoom; draw as-is.
    Fresh(&'a TextureEntry<T>),
    /// Rendered at another zoom; draw scaled by `scale` while a fresh render is pending.
    Placeholder { entry: &'a TextureEntry<T>, scale: f32 },
    Missing,
}

/// Statistics about texture cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextureCacheStats {
    /// Number of occupied slots
    pub entries: usize,

    /// Number of slots (the document's page count)
    pub slots: usize,

    /// Estimated bytes held by cached bitmaps
    pub bytes: usize,

    /// Lookups that found a fresh entry
    pub hits: u64,

    /// Lookups that found a stale entry
    pub placeholder_hits: u64,

    /// Lookups that found nothing
    pub misses: u64,

    /// Successful `put` calls
    pub insertions: u64,
}

impl TextureCacheStats {
    /// Fraction of lookups served by a fresh entry (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.placeholder_hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Ratio between two zoom values, always >= 1.
pub fn zoom_ratio(a: f32, b: f32) -> f32 {
    if a <= 0.0 || b <= 0.0 {
        return f32::INFINITY;
    }
    if a > b {
        a / b
    } else {
        b / a
    }
}

pub struct TextureCache<T> {
    slots: Vec<Option<TextureEntry<T>>>,
    tolerance: f32,
    stats: TextureCacheStats,
}

impl<T> TextureCache<T> {
    /// Create a cache with one empty slot per page.
    pub fn new(page_count: usize, tolerance: f32) -> Self {
        let mut slots = Vec::with_capacity(page_count);
        slots.resize_with(page_count, || None);
        Self {
            slots,
            tolerance: tolerance.abs(),
            stats: TextureCacheStats { slots: page_count, ..TextureCacheStats::default() },
        }
    }

    pub fn page_count(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store a bitmap for `page`, replacing any previous entry.
    ///
    /// Returns `false` (and drops the handle) if the page is out of range.
    pub fn put(&mut self, page: usize, handle: T, zoom: f32, width: u32, height: u32) -> bool {
        let Some(slot) = self.slots.get_mut(page) else {
            log::debug!("ignoring texture for out-of-range page {page}");
            return false;
        };

        *slot = Some(TextureEntry { handle, zoom, width, height });
        self.stats.insertions += 1;
        true
    }

    pub fn get(&self, page: usize) -> Option<&TextureEntry<T>> {
        self.slots.get(page)?.as_ref()
    }

    pub fn contains(&self, page: usize) -> bool {
        self.get(page).is_some()
    }

    pub fn is_fresh(&self, page: usize, zoom: f32) -> bool {
        self.get(page).is_some_and(|entry| self.matches(entry.zoom, zoom))
    }

    /// Classify the slot for `page` against the current zoom.
    pub fn lookup(&mut self, page: usize, zoom: f32) -> TextureLookup<'_, T> {
        let tolerance = self.tolerance;
        match self.slots.get(page).and_then(Option::as_ref) {
            Some(entry) if (entry.zoom - zoom).abs() <= tolerance => {
                self.stats.hits += 1;
                TextureLookup::Fresh(entry)
            }
            Some(entry) => {
                self.stats.placeholder_hits += 1;
                TextureLookup::Placeholder { entry, scale: zoom / entry.zoom }
            }
            None => {
                self.stats.misses += 1;
                TextureLookup::Missing
            }
        }
    }

    /// Count the entries that are stale at `zoom`. Nothing is removed.
    pub fn invalidate(&self, zoom: f32) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|entry| !self.matches(entry.zoom, zoom))
            .count()
    }

    /// Drop entries rendered at a zoom more than `max_ratio` away from `zoom`.
    ///
    /// Fresh entries and stale entries close enough to serve as placeholders
    /// are kept. Returns how many entries were removed.
    pub fn retain_fresh_or_close(&mut self, zoom: f32, max_ratio: f32) -> usize {
        let mut removed = 0;
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|entry| zoom_ratio(entry.zoom, zoom) > max_ratio) {
                *slot = None;
                removed += 1;
            }
        }
        if removed > 0 {
            log::debug!("dropped {removed} textures too far from zoom {zoom:.3}");
        }
        removed
    }

    pub fn remove(&mut self, page: usize) -> Option<TextureEntry<T>> {
        self.slots.get_mut(page)?.take()
    }

    /// Drop every entry. Statistics are kept.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    pub fn stats(&self) -> TextureCacheStats {
        let mut stats = self.stats;
        stats.entries = self.len();
        stats.bytes = self.slots.iter().flatten().map(TextureEntry::byte_size).sum();
        stats
    }

    fn matches(&self, recorded: f32, zoom: f32) -> bool {
        (recorded - zoom).abs() <= self.tolerance
    }
}
