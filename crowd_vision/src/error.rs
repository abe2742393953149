// THEORY:
// Errors in this crate fall into two families. A `ValidationError` describes a single bad
// input at the boundary (a zone polygon that cannot be a polygon, a detection with a NaN box).
// Those are never fatal to the engine: the input is skipped, reported, and the frame goes on.
// An `EngineError` is what an administrative or setup call hands back to its caller, and wraps
// validation failures together with lookups, configuration and I/O problems.

use thiserror::Error;

/// Result alias used by every fallible engine operation.
pub type Result<T> = std::result::Result<T, EngineError>;

/// A rejected zone or detection.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("polygon needs at least 3 vertices, got {count}")]
    TooFewVertices { count: usize },

    #[error("non-finite coordinate in {context}")]
    NonFiniteCoordinate { context: &'static str },

    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f32),

    #[error("zone name must not be empty")]
    EmptyZoneName,

    #[error("zone threshold must be positive")]
    ZeroThreshold,

    #[error("frame dimensions must be non-zero, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("unknown zone: {0}")]
    UnknownZone(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to encode heatmap image: {0}")]
    Image(#[from] image::ImageError),

    #[error("ingest worker is no longer running")]
    WorkerClosed,

    #[error("ingest queue is full, frame dropped")]
    QueueFull,
}
