//! Regularized Mahalanobis distance against a reference window.
//!
//! Scores how far a feature vector sits from the bulk of a reference sample
//! set, accounting for feature scale and correlation. The covariance is
//! estimated from the finite rows of the reference set, ridge-regularized
//! (`reg = REG_ABS + REG_REL * mean(diag Σ)`) so zero-variance or collinear
//! features stay factorable, and factored with Cholesky.
//!
//! Every failure collapses to `None` at [`score`]; [`try_score`] reports the
//! cause.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Undefined;
use crate::linalg::{
    add_to_diagonal, all_finite, cholesky_factor, column_means, mean_diagonal, sample_covariance,
};

/// Minimum finite reference rows before a covariance is trusted.
pub const DEFAULT_MIN_SAMPLES: usize = 30;

/// Absolute ridge added to the covariance diagonal.
pub const DEFAULT_REG_ABS: f64 = 1e-6;

/// Ridge relative to the mean feature variance.
pub const DEFAULT_REG_REL: f64 = 1e-3;

/// Scoring constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MahalanobisConfig {
    pub min_samples: usize,
    pub reg_abs: f64,
    pub reg_rel: f64,
}

impl Default for MahalanobisConfig {
    fn default() -> Self {
        Self {
            min_samples: DEFAULT_MIN_SAMPLES,
            reg_abs: DEFAULT_REG_ABS,
            reg_rel: DEFAULT_REG_REL,
        }
    }
}

impl MahalanobisConfig {
    /// Rows required for dimension `dim`: `max(min_samples, dim + 2)`.
    pub fn required_samples(&self, dim: usize) -> usize {
        self.min_samples.max(dim + 2)
    }

    /// Ridge term for a covariance whose diagonal averages `diag_mean`.
    pub fn ridge(&self, diag_mean: f64) -> f64 {
        self.reg_abs + self.reg_rel * diag_mean.max(0.0)
    }
}

/// Mean and Cholesky factor of a regularized reference covariance.
///
/// Fit once per reference snapshot, then score any number of queries.
#[derive(Debug, Clone)]
pub struct MahalanobisModel {
    mean: DVector<f64>,
    factor: DMatrix<f64>,
    samples: usize,
    ridge: f64,
}

impl MahalanobisModel {
    /// Fit against `reference` for queries of dimension `dim`.
    pub fn fit<R>(reference: &[R], dim: usize, config: &MahalanobisConfig) -> Result<Self, Undefined>
    where
        R: AsRef<[f64]>,
    {
        if dim == 0 {
            return Err(Undefined::ShapeMismatch {
                expected: 1,
                found: 0,
            });
        }
        if let Some(row) = reference.iter().find(|r| r.as_ref().len() != dim) {
            return Err(Undefined::ShapeMismatch {
                expected: dim,
                found: row.as_ref().len(),
            });
        }

        let rows: Vec<&[f64]> = reference
            .iter()
            .map(|r| r.as_ref())
            .filter(|r| all_finite(r))
            .collect();

        let required = config.required_samples(dim);
        if rows.len() < required {
            return Err(Undefined::InsufficientSamples {
                found: rows.len(),
                required,
            });
        }

        let mean = column_means(&rows, dim);
        let mut cov = match sample_covariance(&rows, &mean) {
            Some(cov) if all_finite(cov.as_slice()) => cov,
            _ => return Err(Undefined::NonFiniteInput("covariance")),
        };

        let ridge = config.ridge(mean_diagonal(&cov));
        add_to_diagonal(&mut cov, ridge);
        let factor = cholesky_factor(cov).ok_or(Undefined::SingularCovariance)?;

        Ok(Self {
            mean,
            factor,
            samples: rows.len(),
            ridge,
        })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        self.mean.as_slice()
    }

    /// Finite reference rows the model was fitted on.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Ridge term that was added to the covariance diagonal.
    pub fn ridge(&self) -> f64 {
        self.ridge
    }

    /// Distance of `x` from the fitted mean.
    pub fn distance(&self, x: &[f64]) -> Result<f64, Undefined> {
        if x.len() != self.dim() {
            return Err(Undefined::ShapeMismatch {
                expected: self.dim(),
                found: x.len(),
            });
        }
        if !all_finite(x) {
            return Err(Undefined::NonFiniteInput("query"));
        }

        let diff = DVector::from_iterator(
            self.dim(),
            x.iter().zip(self.mean.iter()).map(|(a, m)| a - m),
        );
        // The factor's diagonal is strictly positive, so the solve succeeds.
        let y = self
            .factor
            .solve_lower_triangular(&diff)
            .ok_or(Undefined::SingularCovariance)?;
        // Overflow of y·y on a finite query is a genuine +inf distance.
        Ok(y.norm_squared().max(0.0).sqrt())
    }
}

/// Score `x` against `reference`, reporting why when no score exists.
pub fn try_score<R>(x: &[f64], reference: &[R], config: &MahalanobisConfig) -> Result<f64, Undefined>
where
    R: AsRef<[f64]>,
{
    if x.is_empty() {
        return Err(Undefined::ShapeMismatch {
            expected: 1,
            found: 0,
        });
    }
    if let Some(row) = reference.iter().find(|r| r.as_ref().len() != x.len()) {
        return Err(Undefined::ShapeMismatch {
            expected: x.len(),
            found: row.as_ref().len(),
        });
    }
    if !all_finite(x) {
        return Err(Undefined::NonFiniteInput("query"));
    }
    MahalanobisModel::fit(reference, x.len(), config)?.distance(x)
}

/// Score `x` against `reference`; `None` when the score is undefined.
pub fn score<R>(x: &[f64], reference: &[R], config: &MahalanobisConfig) -> Option<f64>
where
    R: AsRef<[f64]>,
{
    match try_score(x, reference, config) {
        Ok(d) => Some(d),
        Err(cause) => {
            debug!(%cause, dim = x.len(), rows = reference.len(), "mahalanobis score undefined");
            None
        }
    }
}
