//! Pageflow Cache Library
//!
//! Per-page bitmap cache keyed by the zoom each bitmap was rendered at.

pub mod texture;

pub use texture::{zoom_ratio, TextureCache, TextureCacheStats, TextureEntry, TextureLookup};
