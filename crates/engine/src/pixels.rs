//! Owned RGBA pixel buffers produced by rasterisation.

use crate::backend::{EngineError, EngineResult};

/// RGBA8 pixels.
pub const BYTES_PER_PIXEL: usize = 4;

/// Largest edge a single page bitmap may have.
const MAX_DIMENSION: u32 = 16_384;

/// Colour scheme used when rasterising a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderMode {
    #[default]
    Light,
    Dark,
}

impl RenderMode {
    pub fn toggled(self) -> Self {
        match self {
            RenderMode::Light => RenderMode::Dark,
            RenderMode::Dark => RenderMode::Light,
        }
    }

    /// Paper colour for this mode.
    pub fn paper(self) -> [u8; 4] {
        match self {
            RenderMode::Light => [255, 255, 255, 255],
            RenderMode::Dark => [30, 30, 30, 255],
        }
    }

    /// Ink colour for this mode.
    pub fn ink(self) -> [u8; 4] {
        match self {
            RenderMode::Light => [40, 40, 40, 255],
            RenderMode::Dark => [215, 215, 215, 255],
        }
    }
}

/// A rasterised page: tightly packed RGBA rows.
///
/// The buffer is owned by whoever holds it; moving it into a cache or calling
/// [`PixelBuffer::into_raw`] is the only way to hand the pixels on.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    stride: usize,
    data: Vec<u8>,
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .finish_non_exhaustive()
    }
}

impl PixelBuffer {
    /// Allocate a buffer filled with one colour.
    ///
    /// Allocation failures surface as [`EngineError::ResourceExhausted`]
    /// instead of aborting the process.
    pub fn filled(width: u32, height: u32, color: [u8; 4]) -> EngineResult<Self> {
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(EngineError::InvalidDimensions { width, height });
        }

        let stride = width as usize * BYTES_PER_PIXEL;
        let len = stride
            .checked_mul(height as usize)
            .ok_or(EngineError::ResourceExhausted { bytes: usize::MAX })?;

        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| EngineError::ResourceExhausted { bytes: len })?;
        for _ in 0..(width as usize * height as usize) {
            data.extend_from_slice(&color);
        }

        Ok(Self { width, height, stride, data })
    }

    /// Wrap existing RGBA rows.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> EngineResult<Self> {
        let stride = width as usize * BYTES_PER_PIXEL;
        if width == 0 || height == 0 || data.len() != stride * height as usize {
            return Err(EngineError::InvalidDimensions { width, height });
        }
        Ok(Self { width, height, stride, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y as usize * self.stride + x as usize * BYTES_PER_PIXEL;
        let px = &self.data[offset..offset + BYTES_PER_PIXEL];
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, color: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = y as usize * self.stride + x as usize * BYTES_PER_PIXEL;
        self.data[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&color);
    }

    /// Fill a pixel-space rectangle, clipped to the buffer.
    pub fn fill_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, color: [u8; 4]) {
        let x0 = x0.clamp(0, self.width as i64) as u32;
        let x1 = x1.clamp(0, self.width as i64) as u32;
        let y0 = y0.clamp(0, self.height as i64) as u32;
        let y1 = y1.clamp(0, self.height as i64) as u32;

        for y in y0..y1 {
            for x in x0..x1 {
                self.put_pixel(x, y, color);
            }
        }
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filled_buffer_has_tight_stride() {
        let buffer = PixelBuffer::filled(3, 2, [1, 2, 3, 4]).unwrap();
        assert_eq!(buffer.stride(), 12);
        assert_eq!(buffer.byte_len(), 24);
        assert_eq!(buffer.pixel(2, 1), Some([1, 2, 3, 4]));
        assert_eq!(buffer.pixel(3, 0), None);
    }

    #[test]
    fn zero_sized_buffers_are_rejected() {
        let err = PixelBuffer::filled(0, 10, [0; 4]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidDimensions { width: 0, height: 10 }));
    }

    #[test]
    fn oversized_buffers_are_rejected() {
        assert!(PixelBuffer::filled(MAX_DIMENSION + 1, 1, [0; 4]).is_err());
    }

    #[test]
    fn fill_rect_clips_to_bounds() {
        let mut buffer = PixelBuffer::filled(4, 4, [0, 0, 0, 255]).unwrap();
        buffer.fill_rect(-5, 2, 100, 100, [9, 9, 9, 255]);
        assert_eq!(buffer.pixel(0, 1), Some([0, 0, 0, 255]));
        assert_eq!(buffer.pixel(3, 3), Some([9, 9, 9, 255]));
    }

    #[test]
    fn from_raw_checks_length() {
        assert!(PixelBuffer::from_raw(2, 2, vec![0; 16]).is_ok());
        assert!(PixelBuffer::from_raw(2, 2, vec![0; 15]).is_err());
    }

    #[test]
    fn render_mode_toggles() {
        assert_eq!(RenderMode::Light.toggled(), RenderMode::Dark);
        assert_eq!(RenderMode::Dark.toggled(), RenderMode::Light);
    }
}
