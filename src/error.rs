//! Error types for NeuroCalm Flux

use thiserror::Error;

/// Errors that can occur while aggregating a snapshot or fusing a verdict
#[derive(Debug, Error)]
pub enum FluxError {
    #[error("Malformed snapshot row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Prediction failed: {0}")]
    Fusion(#[from] FusionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reason a snapshot row cannot become an observation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidObservation {
    #[error("missing channel")]
    MissingChannel,

    #[error("missing band")]
    MissingBand,

    #[error("missing value")]
    MissingValue,

    #[error("value {0:?} is not a number")]
    NotANumber(String),

    #[error("value {0} is not finite")]
    NonFinite(f64),
}

/// Request rejected before any processing took place
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("EEG parameters must be non-negative ({band} = {value})")]
    NegativeBand { band: &'static str, value: f64 },

    #[error("EEG parameter {band} is not a finite number")]
    NonFiniteBand { band: &'static str },

    #[error("File must be an image (content type: {0})")]
    NotAnImage(String),

    #[error("Uploaded image is empty")]
    EmptyImage,
}

/// Failure inside the fusion step; no verdict is produced
#[derive(Debug, Error)]
pub enum FusionError {
    #[error("{model} predictor failed: {message}")]
    Predictor { model: String, message: String },

    #[error("{model} returned an invalid stress score: {score}")]
    InvalidScore { model: String, score: f64 },

    #[error("unserializable output at {path}: {reason}")]
    Unserializable { path: String, reason: String },

    #[error("upload artifact error: {0}")]
    Artifact(#[from] std::io::Error),
}

/// Error reported by an external predictor
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct PredictorError(pub String);

impl PredictorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
