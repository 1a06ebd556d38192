//! Standard-scaler + linear regression pipeline.
//!
//! The artifact is a JSON document written by [`super::training`] (`scorecast --train`):
//!
//! ```json
//! {
//!   "version": "2024-05-01",
//!   "features": ["comprehension", "attention", "focus", "retention", "engagement_time"],
//!   "scaler": { "mean": [0.5, 0.5, 0.5, 0.5, 30.0], "scale": [0.2, 0.2, 0.2, 0.2, 10.0] },
//!   "coefficients": [8.1, 4.2, 5.0, 6.3, 3.7],
//!   "intercept": 65.0
//! }
//! ```
//!
//! Prediction for a row `x` is `intercept + Σ coefficients[i] * (x[i] - mean[i]) / scale[i]`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

use super::{ModelError, Result, ScoringModel};
use crate::scoring::types::{FEATURE_NAMES, FeatureRecord};

/// On-disk form of a fitted pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Artifact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub features: Vec<String>,
    pub scaler: ScalerParams,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScalerParams {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// A fitted scaler + regressor pipeline
#[derive(Debug, Clone)]
pub struct LinearPipeline {
    mean: [f64; 5],
    scale: [f64; 5],
    coefficients: [f64; 5],
    intercept: f64,
    fingerprint: String,
}

impl LinearPipeline {
    /// Load and validate an artifact from disk
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ModelError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        let pipeline = Self::from_slice(&bytes)?;
        info!("Loaded model from {} (fingerprint {})", path.display(), pipeline.fingerprint);
        Ok(pipeline)
    }

    /// Parse and validate an artifact from its raw JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let artifact: Artifact = serde_json::from_slice(bytes)?;

        if artifact.features != FEATURE_NAMES {
            return Err(ModelError::InvalidArtifact(format!(
                "expected features {:?}, artifact declares {:?}",
                FEATURE_NAMES, artifact.features
            )));
        }

        let mean = fixed_width("scaler.mean", &artifact.scaler.mean)?;
        let scale = fixed_width("scaler.scale", &artifact.scaler.scale)?;
        let coefficients = fixed_width("coefficients", &artifact.coefficients)?;

        if let Some(idx) = scale.iter().position(|s| *s == 0.0) {
            return Err(ModelError::InvalidArtifact(format!(
                "scaler.scale for '{}' is zero",
                FEATURE_NAMES[idx]
            )));
        }
        if !artifact.intercept.is_finite() {
            return Err(ModelError::InvalidArtifact("intercept is not finite".to_string()));
        }

        let fingerprint = match artifact.version {
            Some(version) if !version.trim().is_empty() => version,
            _ => {
                let digest = format!("{:x}", Sha256::digest(bytes));
                digest[..16].to_string()
            }
        };

        Ok(Self {
            mean,
            scale,
            coefficients,
            intercept: artifact.intercept,
            fingerprint,
        })
    }

    fn predict_row(&self, row: [f64; 5]) -> f64 {
        row.iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .zip(self.coefficients.iter())
            .fold(self.intercept, |acc, ((x, (mean, scale)), coef)| acc + coef * (x - mean) / scale)
    }
}

fn fixed_width(field: &str, values: &[f64]) -> Result<[f64; 5]> {
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::InvalidArtifact(format!("{field} contains non-finite values")));
    }
    values.try_into().map_err(|_| {
        ModelError::InvalidArtifact(format!("{field} has {} values, expected {}", values.len(), FEATURE_NAMES.len()))
    })
}

impl ScoringModel for LinearPipeline {
    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn predict_many(&self, rows: &[FeatureRecord]) -> Result<Vec<f64>> {
        debug!(rows = rows.len(), "Running linear pipeline inference");
        Ok(rows.iter().map(|row| self.predict_row(row.to_row())).collect())
    }
}
