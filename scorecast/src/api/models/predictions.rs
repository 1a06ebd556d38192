//! API request/response models for predictions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::scoring::types::FeatureRecord;

/// Field whose presence marks a request body as a batch
pub const BATCH_FIELD: &str = "students";

/// Request body rejected before any scoring happens.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("request body must be a JSON object")]
    NotAnObject,

    #[error("invalid request body: {0}")]
    Malformed(String),

    #[error("batch must contain at least 1 student (at most {max})")]
    EmptyBatch { max: usize },

    #[error("batch of {actual} students exceeds the maximum batch size of {max}")]
    BatchTooLarge { max: usize, actual: usize },
}

/// Several students scored in one call.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct BatchRequest {
    /// Between 1 and 200 feature records
    pub students: Vec<FeatureRecord>,
}

/// Body of `POST /predict`: one feature record, or `{ "students": [...] }`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(untagged)]
pub enum PredictionRequest {
    Single(FeatureRecord),
    Batch(BatchRequest),
}

impl PredictionRequest {
    /// Resolve the request shape.
    ///
    /// An object carrying a `students` field is a batch, any other object a single record. The
    /// batch length is checked before any element is parsed.
    pub fn from_value(value: Value, max_batch_size: usize) -> Result<Self, ValidationError> {
        let Value::Object(mut fields) = value else {
            return Err(ValidationError::NotAnObject);
        };

        let Some(students) = fields.remove(BATCH_FIELD) else {
            return serde_json::from_value(Value::Object(fields))
                .map(PredictionRequest::Single)
                .map_err(|e| ValidationError::Malformed(e.to_string()));
        };

        if let Some(extra) = fields.keys().next() {
            return Err(ValidationError::Malformed(format!("unknown field `{extra}` in batch request")));
        }

        let Value::Array(items) = students else {
            return Err(ValidationError::Malformed(format!("`{BATCH_FIELD}` must be a list")));
        };

        if items.is_empty() {
            return Err(ValidationError::EmptyBatch { max: max_batch_size });
        }
        if items.len() > max_batch_size {
            return Err(ValidationError::BatchTooLarge {
                max: max_batch_size,
                actual: items.len(),
            });
        }

        let students = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value(item).map_err(|e| ValidationError::Malformed(format!("{BATCH_FIELD}[{i}]: {e}")))
            })
            .collect::<Result<Vec<FeatureRecord>, _>>()?;

        Ok(PredictionRequest::Batch(BatchRequest { students }))
    }
}

/// One predicted score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PredictionResponse {
    /// Score rounded to two decimal places, half away from zero
    #[schema(example = "72.35")]
    pub predicted_score: String,
}

impl PredictionResponse {
    pub fn from_score(score: f64) -> Self {
        Self {
            predicted_score: format_score(score),
        }
    }
}

/// Scores for a batch, aligned with the request order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchPredictionResponse {
    pub batch_size: usize,
    pub predictions: Vec<PredictionResponse>,
}

impl BatchPredictionResponse {
    pub fn from_scores(scores: &[f64]) -> Self {
        Self {
            batch_size: scores.len(),
            predictions: scores.iter().copied().map(PredictionResponse::from_score).collect(),
        }
    }
}

/// Response of `POST /predict`, shaped like the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum PredictionOutput {
    Batch(BatchPredictionResponse),
    Single(PredictionResponse),
}

fn format_score(score: f64) -> String {
    let rounded = (score * 100.0).round() / 100.0;
    if rounded.is_finite() {
        format!("{rounded:.2}")
    } else {
        format!("{score:.2}")
    }
}
