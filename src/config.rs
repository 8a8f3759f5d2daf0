use std::fs;
use std::path::Path;

use log::info;
use serde::Deserialize;

use crate::error::{MapError, Result};
use crate::geo::EXTENT_EPSILON;
use crate::raster::Color;

/// Rendering settings. Every field has a default, so a config file only
/// needs the keys it changes.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Features drawn between yields when chunking
    pub feature_chunk_size: usize,
    /// Labels placed between yields when chunking
    pub label_chunk_size: usize,
    pub use_chunking: bool,
    /// Layers with fewer features than this are scanned linearly instead of
    /// through the spatial index
    pub linear_scan_threshold: usize,
    /// Rendering is suspended while either viewport side is smaller
    pub min_viewport_px: i32,
    pub extent_epsilon: f64,
    pub history_limit: usize,
    /// Shift cached layer buffers on pan and draw only the exposed strips
    pub extend_buffer: bool,
    pub zoom_factor: f64,
    pub background: Color,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            feature_chunk_size: 50_000,
            label_chunk_size: 10_000,
            use_chunking: true,
            linear_scan_threshold: 64,
            min_viewport_px: 5,
            extent_epsilon: EXTENT_EPSILON,
            history_limit: 100,
            extend_buffer: true,
            zoom_factor: 1.5,
            background: Color::rgb(8, 12, 28),
        }
    }
}

impl RenderConfig {
    /// Parse a JSON config document
    pub fn from_json(bytes: &mut [u8]) -> Result<Self> {
        let config: RenderConfig =
            simd_json::serde::from_slice(bytes).map_err(|e| MapError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let mut bytes = fs::read(path)?;
        let config = Self::from_json(&mut bytes)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.feature_chunk_size == 0 || self.label_chunk_size == 0 {
            return Err(MapError::Config("chunk sizes must be positive".into()));
        }
        if !(self.zoom_factor.is_finite() && self.zoom_factor > 1.0) {
            return Err(MapError::Config(format!("zoom_factor must be > 1, got {}", self.zoom_factor)));
        }
        if !(self.extent_epsilon.is_finite() && self.extent_epsilon > 0.0) {
            return Err(MapError::Config("extent_epsilon must be positive".into()));
        }
        Ok(())
    }
}
