use thiserror::Error;

/// Errors raised by the rendering engine and its loaders.
///
/// Most rendering failures are recovered locally (the feature, tile or category is
/// skipped), so these only surface from construction, configuration and I/O.
#[derive(Debug, Error)]
pub enum MapError {
    #[error("extent {width}x{height} is degenerate")]
    DegenerateExtent { width: f64, height: f64 },

    #[error("feature {feature} has malformed geometry: {reason}")]
    MalformedGeometry { feature: u64, reason: &'static str },

    #[error("no layer with id {0}")]
    UnknownLayer(u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] simd_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MapError>;
