// Feature scaling
// Per-feature standardization fit on training data and applied before classification

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScalerError {
    #[error("Scaler expects {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Cannot fit scaler on an empty dataset")]
    EmptyDataset,

    #[error("Scaler has {means} means but {scales} scales")]
    Corrupt { means: usize, scales: usize },
}

/// Linear transform to zero-mean / unit-variance feature space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    /// Per-feature mean of the training data
    pub mean: Vec<f32>,

    /// Per-feature standard deviation (1.0 where the feature was constant)
    pub scale: Vec<f32>,
}

impl FeatureScaler {
    /// Scaler that passes features through unchanged
    pub fn identity(n_features: usize) -> Self {
        FeatureScaler {
            mean: vec![0.0; n_features],
            scale: vec![1.0; n_features],
        }
    }

    /// Fit mean and population standard deviation per column
    pub fn fit(rows: &[Vec<f32>]) -> Result<Self, ScalerError> {
        let n_features = rows.first().map(|r| r.len()).ok_or(ScalerError::EmptyDataset)?;

        if let Some(bad) = rows.iter().find(|r| r.len() != n_features) {
            return Err(ScalerError::DimensionMismatch {
                expected: n_features,
                actual: bad.len(),
            });
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0f64; n_features];
        for row in rows {
            for (m, &v) in mean.iter_mut().zip(row.iter()) {
                *m += v as f64;
            }
        }
        for m in mean.iter_mut() {
            *m /= n;
        }

        let mut variance = vec![0.0f64; n_features];
        for row in rows {
            for ((var, &m), &v) in variance.iter_mut().zip(mean.iter()).zip(row.iter()) {
                *var += (v as f64 - m).powi(2);
            }
        }

        let scale = variance
            .iter()
            .map(|var| {
                let std = (var / n).sqrt();
                if std > f64::EPSILON {
                    std as f32
                } else {
                    1.0
                }
            })
            .collect();

        Ok(FeatureScaler {
            mean: mean.into_iter().map(|m| m as f32).collect(),
            scale,
        })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn is_identity(&self) -> bool {
        self.mean.iter().all(|&m| m == 0.0) && self.scale.iter().all(|&s| s == 1.0)
    }

    /// Standardize a single row
    pub fn transform(&self, row: &[f32]) -> Result<Vec<f32>, ScalerError> {
        if self.mean.len() != self.scale.len() {
            return Err(ScalerError::Corrupt {
                means: self.mean.len(),
                scales: self.scale.len(),
            });
        }

        if row.len() != self.mean.len() {
            return Err(ScalerError::DimensionMismatch {
                expected: self.mean.len(),
                actual: row.len(),
            });
        }

        Ok(row
            .iter()
            .zip(self.mean.iter().zip(self.scale.iter()))
            .map(|(&v, (&m, &s))| (v - m) / s)
            .collect())
    }

    /// Standardize many rows
    pub fn transform_all(&self, rows: &[Vec<f32>]) -> Result<Vec<Vec<f32>>, ScalerError> {
        rows.iter().map(|r| self.transform(r)).collect()
    }
}
