//! Viewport geometry for the pageflow viewer.
//!
//! [`DocumentLayout`] derives page rectangles from intrinsic page sizes and a
//! zoom factor. [`Viewport`] owns a layout and integrates scroll and zoom
//! momentum on top of it. [`ViewerConfig`] collects the tunables of both.

mod config;
mod layout;
mod physics;

pub use config::{ConfigError, ViewerConfig};
pub use layout::{DocumentLayout, PageLayoutEntry, PageLocation, DEFAULT_PAGE_GAP};
pub use physics::{PhysicsConfig, Viewport, ViewportState, ViewportUpdate};
