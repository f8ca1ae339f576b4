//! Causes behind an undefined anomaly score.
//!
//! The scorer never raises these to its caller through `score()`; every cause
//! collapses into `None`. They are exposed through `try_score()` for callers
//! that want to log or count why a tick produced no signal.

use thiserror::Error;

/// Why a Mahalanobis score could not be produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Undefined {
    #[error("shape mismatch: expected dimension {expected}, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("insufficient samples: {found} finite rows, need at least {required}")]
    InsufficientSamples { found: usize, required: usize },

    #[error("non-finite value in {0}")]
    NonFiniteInput(&'static str),

    #[error("covariance is not positive-definite after regularization")]
    SingularCovariance,
}
