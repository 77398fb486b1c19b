//! Failure taxonomy for the analytics service
//!
//! Failures inside one model's retrain or one feed's fetch are contained
//! locally; only `PredictError::ModelUnavailable` is surfaced synchronously
//! to an inference caller.

use crate::models::ModelName;
use thiserror::Error;

/// Failure hydrating a model from its persisted artifact.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no persisted artifact at {path}")]
    MissingArtifact { path: String },

    #[error("artifact at {path} failed validation: {reason}")]
    CorruptArtifact { path: String, reason: String },

    #[error("artifact io: {0}")]
    Io(#[from] std::io::Error),

    #[error("bootstrap training failed")]
    Bootstrap(#[source] TrainError),
}

/// Failure during a model fit. `InsufficientData` is expected control
/// flow (retry next cycle); `Failed` keeps the last-good parameters.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("insufficient data: {have} samples, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("training failed: {0}")]
    Failed(String),
}

/// Failure answering an inference request.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("model {0} is not loaded")]
    ModelUnavailable(ModelName),

    #[error("request does not match model {0}")]
    InvalidRequest(ModelName),

    #[error("inference failed: {0}")]
    Internal(String),
}

/// Transient ingestion-side failure; logged and retried with back-off.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source {source_name} unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },
}
