//! Viewer configuration.
//!
//! Every field has a default, so a configuration file only needs to name the
//! values it changes. Values can also be overridden from the environment.

use crate::layout::DEFAULT_PAGE_GAP;
use crate::physics::PhysicsConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid configuration file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub viewport_width: f32,
    pub viewport_height: f32,
    /// Unscaled gap between pages.
    pub page_gap: f32,
    pub friction_damping: f32,
    pub scroll_sensitivity: f32,
    pub zoom_sensitivity: f32,
    pub zoom_min: f32,
    pub zoom_max: f32,
    pub velocity_epsilon: f32,
    pub zoom_velocity_epsilon: f32,
    /// A cached bitmap is fresh when its zoom is within this distance of the current zoom.
    pub zoom_tolerance: f32,
    /// Zoom jumps larger than this ratio drop every cached bitmap.
    pub zoom_clear_ratio: f32,
    /// Pages requested beyond the visible range on each side.
    pub prefetch_margin: usize,
    /// Render worker count; `0` picks one from the available parallelism.
    pub render_threads: usize,
    /// Device pixels per layout pixel. Page bitmaps are rendered at
    /// `zoom * pixel_ratio` pixels per point.
    pub pixel_ratio: f32,
    /// Pixels per point used when rasterising a page for OCR.
    pub ocr_render_scale: f32,
    pub rsvp_wpm: u32,
    pub rsvp_chunk_size: usize,
    pub overlay_seconds: f32,
    pub dark_mode: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        let physics = PhysicsConfig::default();
        Self {
            viewport_width: 1280.0,
            viewport_height: 720.0,
            page_gap: DEFAULT_PAGE_GAP,
            friction_damping: physics.damping,
            scroll_sensitivity: physics.scroll_sensitivity,
            zoom_sensitivity: physics.zoom_sensitivity,
            zoom_min: physics.zoom_min,
            zoom_max: physics.zoom_max,
            velocity_epsilon: physics.velocity_epsilon,
            zoom_velocity_epsilon: physics.zoom_velocity_epsilon,
            zoom_tolerance: 0.001,
            zoom_clear_ratio: 2.0,
            prefetch_margin: 1,
            render_threads: 0,
            pixel_ratio: 1.0,
            ocr_render_scale: 2.0,
            rsvp_wpm: 300,
            rsvp_chunk_size: 1,
            overlay_seconds: 1.5,
            dark_mode: false,
        }
    }
}

impl ViewerConfig {
    /// Reads a JSON configuration file. Missing fields keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty-printed JSON.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }

    /// Defaults overridden from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Optional file, then environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `PAGEFLOW_*` environment variables on top of `self`.
    ///
    /// - `PAGEFLOW_VIEWPORT_WIDTH`, `PAGEFLOW_VIEWPORT_HEIGHT`
    /// - `PAGEFLOW_PAGE_GAP`
    /// - `PAGEFLOW_DAMPING`
    /// - `PAGEFLOW_ZOOM_MIN`, `PAGEFLOW_ZOOM_MAX`
    /// - `PAGEFLOW_PREFETCH_MARGIN`
    /// - `PAGEFLOW_RENDER_THREADS`
    /// - `PAGEFLOW_OCR_SCALE`
    /// - `PAGEFLOW_RSVP_WPM`, `PAGEFLOW_RSVP_CHUNK`
    /// - `PAGEFLOW_DARK_MODE`
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        override_from_env("PAGEFLOW_VIEWPORT_WIDTH", &mut self.viewport_width)?;
        override_from_env("PAGEFLOW_VIEWPORT_HEIGHT", &mut self.viewport_height)?;
        override_from_env("PAGEFLOW_PAGE_GAP", &mut self.page_gap)?;
        override_from_env("PAGEFLOW_DAMPING", &mut self.friction_damping)?;
        override_from_env("PAGEFLOW_ZOOM_MIN", &mut self.zoom_min)?;
        override_from_env("PAGEFLOW_ZOOM_MAX", &mut self.zoom_max)?;
        override_from_env("PAGEFLOW_PREFETCH_MARGIN", &mut self.prefetch_margin)?;
        override_from_env("PAGEFLOW_RENDER_THREADS", &mut self.render_threads)?;
        override_from_env("PAGEFLOW_PIXEL_RATIO", &mut self.pixel_ratio)?;
        override_from_env("PAGEFLOW_OCR_SCALE", &mut self.ocr_render_scale)?;
        override_from_env("PAGEFLOW_RSVP_WPM", &mut self.rsvp_wpm)?;
        override_from_env("PAGEFLOW_RSVP_CHUNK", &mut self.rsvp_chunk_size)?;
        override_from_env("PAGEFLOW_DARK_MODE", &mut self.dark_mode)?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("viewport_width", self.viewport_width),
            ("viewport_height", self.viewport_height),
            ("friction_damping", self.friction_damping),
            ("scroll_sensitivity", self.scroll_sensitivity),
            ("zoom_sensitivity", self.zoom_sensitivity),
            ("zoom_min", self.zoom_min),
            ("zoom_tolerance", self.zoom_tolerance),
            ("pixel_ratio", self.pixel_ratio),
            ("ocr_render_scale", self.ocr_render_scale),
            ("overlay_seconds", self.overlay_seconds),
        ];
        for (key, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!("{key} must be positive, got {value}")));
            }
        }

        if !self.page_gap.is_finite() || self.page_gap < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "page_gap must be >= 0, got {}",
                self.page_gap
            )));
        }
        if !self.zoom_max.is_finite() || self.zoom_max < self.zoom_min {
            return Err(ConfigError::Invalid(format!(
                "zoom range {}..{} is empty",
                self.zoom_min, self.zoom_max
            )));
        }
        if !self.zoom_clear_ratio.is_finite() || self.zoom_clear_ratio < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "zoom_clear_ratio must be >= 1, got {}",
                self.zoom_clear_ratio
            )));
        }
        if self.velocity_epsilon < 0.0 || self.zoom_velocity_epsilon < 0.0 {
            return Err(ConfigError::Invalid("velocity epsilons must be >= 0".to_string()));
        }
        if self.rsvp_wpm == 0 || self.rsvp_chunk_size == 0 {
            return Err(ConfigError::Invalid("RSVP speed and chunk size must be >= 1".to_string()));
        }

        Ok(())
    }

    pub fn physics(&self) -> PhysicsConfig {
        PhysicsConfig {
            damping: self.friction_damping,
            scroll_sensitivity: self.scroll_sensitivity,
            zoom_sensitivity: self.zoom_sensitivity,
            zoom_min: self.zoom_min,
            zoom_max: self.zoom_max,
            velocity_epsilon: self.velocity_epsilon,
            zoom_velocity_epsilon: self.zoom_velocity_epsilon,
        }
    }
}

fn override_from_env<T: FromStr>(key: &str, target: &mut T) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(key) {
        *target = value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { key: key.to_string(), value })?;
    }
    Ok(())
}
