//! Prediction serving core.
//!
//! - [`types`]: the feature record carried through the service and its cache key
//! - [`engine`]: single and batch scoring on top of the prediction cache and the opaque model

pub mod engine;
pub mod types;

pub use engine::ScoringEngine;

use crate::model::ModelError;

/// Failures that prevent a score from being produced. Never masked as a default score.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("model inference failed: {0}")]
    Model(#[from] ModelError),

    #[error("model returned {actual} predictions for {expected} rows")]
    OutputShape { expected: usize, actual: usize },

    #[error("model returned a non-finite prediction ({value})")]
    NonFinite { value: f64 },

    #[error("no prediction produced for batch position {position}")]
    Unfilled { position: usize },
}
