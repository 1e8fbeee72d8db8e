//! Error types for the obbseg-eval library.

use thiserror::Error;

/// Result type for obbseg-eval operations.
pub type Result<T> = std::result::Result<T, ObbSegError>;

/// Error types that can occur during box and mask evaluation.
#[derive(Error, Debug)]
pub enum ObbSegError {
    /// Error during JSON parsing or serialization.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error during I/O operations.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Error while building a results table.
    #[error("DataFrame error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),

    /// Tensor, raster or row shapes that cannot be reconciled.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Predictions and ground truth batches have different lengths.
    #[error("Sample count mismatch: {predictions} prediction sets for {ground_truths} ground truth sets")]
    SampleCountMismatch {
        predictions: usize,
        ground_truths: usize,
    },

    /// Invalid IoU or confidence threshold.
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    /// Invalid run configuration.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// The optional COCO cross-check failed or is unavailable.
    #[error("Cross-check unavailable: {0}")]
    CrossCheckUnavailable(String),

    /// A single sample failed; aborts the run.
    #[error("Sample {index}: {source}")]
    Sample {
        index: usize,
        #[source]
        source: Box<ObbSegError>,
    },
}

impl ObbSegError {
    /// Attach the index of the offending sample.
    pub fn in_sample(self, index: usize) -> Self {
        match self {
            ObbSegError::Sample { .. } => self,
            other => ObbSegError::Sample {
                index,
                source: Box::new(other),
            },
        }
    }
}
