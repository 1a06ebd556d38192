//! Offline fitting of the [`LinearPipeline`](super::LinearPipeline) artifact.
//!
//! Input is a CSV of graded students with a header row naming the five features and the
//! `assessment_score` target. Other columns are ignored. Features are standardised with the
//! population standard deviation, then an ordinary least squares regressor with intercept is
//! fitted on the standardised rows.
//!
//! Every fifth row is held out of the fit and used to report R².
//!
//! ```text
//! scorecast --train data/students.csv --output models/student_score_model.json
//! ```

use serde::Deserialize;
use std::{io::Read, path::Path};
use tracing::{info, instrument};

use super::{
    ModelError, Result,
    linear::{Artifact, ScalerParams},
};
use crate::scoring::types::FEATURE_NAMES;

const WIDTH: usize = FEATURE_NAMES.len();
const HOLDOUT_EVERY: usize = 5;

#[derive(Debug, Deserialize)]
struct TrainingRow {
    comprehension: f64,
    attention: f64,
    focus: f64,
    retention: f64,
    engagement_time: f64,
    assessment_score: f64,
}

/// Labelled examples in [`FEATURE_NAMES`] order
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub rows: Vec<[f64; WIDTH]>,
    pub targets: Vec<f64>,
}

impl Dataset {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_csv(csv::Reader::from_path(path)?)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        Self::from_csv(csv::Reader::from_reader(reader))
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let mut dataset = Self::default();
        for row in reader.deserialize::<TrainingRow>() {
            let row = row?;
            dataset.rows.push([
                row.comprehension,
                row.attention,
                row.focus,
                row.retention,
                row.engagement_time,
            ]);
            dataset.targets.push(row.assessment_score);
        }
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A fitted artifact and how well it generalises
#[derive(Debug, Clone)]
pub struct FitReport {
    pub artifact: Artifact,
    pub train_rows: usize,
    pub holdout_rows: usize,
    /// `None` when there is no holdout or its targets are constant
    pub holdout_r2: Option<f64>,
}

/// Fit a scaler + least squares pipeline
#[instrument(skip_all, fields(rows = dataset.len()))]
pub fn fit(dataset: &Dataset, version: Option<String>) -> Result<FitReport> {
    if let Some(idx) = dataset
        .rows
        .iter()
        .zip(&dataset.targets)
        .position(|(row, target)| !target.is_finite() || row.iter().any(|x| !x.is_finite()))
    {
        return Err(ModelError::Fit(format!("row {} contains a non-finite value", idx + 1)));
    }

    let (mut train, mut holdout) = (Vec::new(), Vec::new());
    for (idx, example) in dataset.rows.iter().zip(&dataset.targets).enumerate() {
        if dataset.len() >= HOLDOUT_EVERY && idx % HOLDOUT_EVERY == HOLDOUT_EVERY - 1 {
            holdout.push(example);
        } else {
            train.push(example);
        }
    }

    if train.len() <= WIDTH {
        return Err(ModelError::Fit(format!(
            "need more than {WIDTH} training rows, got {}",
            train.len()
        )));
    }

    let n = train.len() as f64;
    let mut mean = [0.0; WIDTH];
    for (row, _) in &train {
        for j in 0..WIDTH {
            mean[j] += row[j] / n;
        }
    }

    let mut scale = [0.0; WIDTH];
    for (row, _) in &train {
        for j in 0..WIDTH {
            scale[j] += (row[j] - mean[j]).powi(2) / n;
        }
    }
    // Constant features keep unit scale and get a zero coefficient
    let constant: [bool; WIDTH] = std::array::from_fn(|j| scale[j] == 0.0);
    for j in 0..WIDTH {
        scale[j] = if constant[j] { 1.0 } else { scale[j].sqrt() };
    }

    let target_mean = train.iter().map(|(_, y)| **y).sum::<f64>() / n;

    // Normal equations on standardised features; their columns are centred so the intercept is
    // the target mean
    let mut gram = [[0.0; WIDTH]; WIDTH];
    let mut moment = [0.0; WIDTH];
    for (row, y) in &train {
        let z: [f64; WIDTH] = std::array::from_fn(|j| (row[j] - mean[j]) / scale[j]);
        for i in 0..WIDTH {
            moment[i] += z[i] * (**y - target_mean);
            for j in 0..WIDTH {
                gram[i][j] += z[i] * z[j];
            }
        }
    }
    for j in (0..WIDTH).filter(|&j| constant[j]) {
        gram[j] = [0.0; WIDTH];
        gram[j][j] = 1.0;
        moment[j] = 0.0;
    }

    let coefficients = solve(gram, moment, 1e-9 * n).ok_or_else(|| {
        ModelError::Fit("features are linearly dependent; the least squares solution is not unique".to_string())
    })?;

    let predict = |row: &[f64; WIDTH]| {
        (0..WIDTH).fold(target_mean, |acc, j| acc + coefficients[j] * (row[j] - mean[j]) / scale[j])
    };
    let holdout_r2 = r_squared(holdout.iter().map(|(row, y)| (predict(*row), **y)));

    info!(
        train_rows = train.len(),
        holdout_rows = holdout.len(),
        holdout_r2 = ?holdout_r2,
        "Fitted linear pipeline"
    );

    Ok(FitReport {
        artifact: Artifact {
            version,
            features: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
            scaler: ScalerParams {
                mean: mean.to_vec(),
                scale: scale.to_vec(),
            },
            coefficients: coefficients.to_vec(),
            intercept: target_mean,
        },
        train_rows: train.len(),
        holdout_rows: holdout.len(),
        holdout_r2,
    })
}

/// Gaussian elimination with partial pivoting. `None` when a pivot falls below `tolerance`.
fn solve(mut a: [[f64; WIDTH]; WIDTH], mut b: [f64; WIDTH], tolerance: f64) -> Option<[f64; WIDTH]> {
    for col in 0..WIDTH {
        let pivot = (col..WIDTH).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < tolerance {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..WIDTH {
            let factor = a[row][col] / a[col][col];
            for k in col..WIDTH {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; WIDTH];
    for row in (0..WIDTH).rev() {
        let tail: f64 = (row + 1..WIDTH).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

fn r_squared(pairs: impl Iterator<Item = (f64, f64)>) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = pairs.collect();
    if pairs.is_empty() {
        return None;
    }
    let mean = pairs.iter().map(|(_, y)| y).sum::<f64>() / pairs.len() as f64;
    let total: f64 = pairs.iter().map(|(_, y)| (y - mean).powi(2)).sum();
    let residual: f64 = pairs.iter().map(|(p, y)| (y - p).powi(2)).sum();
    (total > 0.0).then(|| 1.0 - residual / total)
}
