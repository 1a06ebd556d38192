//! Opaque regression model abstraction.
//!
//! The scoring engine never depends on a concrete modelling library. Anything that can turn
//! feature rows into scores implements [`ScoringModel`] and is injected at startup.
//!
//! The only shipped implementation is [`linear::LinearPipeline`], a standard-scaler followed by
//! an ordinary least squares regressor, loaded from a JSON artifact. [`training`] fits that
//! artifact offline from a CSV of graded students.

use std::path::PathBuf;

use crate::scoring::types::FeatureRecord;

pub mod linear;
pub mod training;

pub use linear::LinearPipeline;

/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors raised while loading or invoking a model
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to read model artifact {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse model artifact: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid model artifact: {0}")]
    InvalidArtifact(String),

    #[error("failed to read training data: {0}")]
    TrainingData(#[from] csv::Error),

    #[error("cannot fit model: {0}")]
    Fit(String),

    #[error("model unavailable: {0}")]
    Unavailable(String),
}

/// A trained regressor treated as a black box.
///
/// Implementations must be safe for concurrent reads: the same instance serves every request.
pub trait ScoringModel: Send + Sync {
    /// Stable identifier of the loaded model, used to namespace cached predictions
    fn fingerprint(&self) -> &str;

    /// Score many rows in a single inference call. Output is positionally aligned with `rows`.
    fn predict_many(&self, rows: &[FeatureRecord]) -> Result<Vec<f64>>;

    /// Score a single row
    fn predict_one(&self, row: &FeatureRecord) -> Result<f64> {
        self.predict_many(std::slice::from_ref(row))?
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::Unavailable("model returned no prediction for a single row".to_string()))
    }
}
