//! KSense Core: stream characterization without retaining raw samples.
//!
//! Two independent, stateless estimators:
//! - Percentiles from a sub-bucketed power-of-two histogram (`histogram`)
//! - Regularized Mahalanobis distance against a reference window (`mahalanobis`)
//!
//! Plus the pieces around them:
//! - Covariance helpers over `nalgebra` (`linalg`)
//! - Undefined-score causes (`error`)
//! - TOML configuration (`config`)
//! - Collectors that feed the estimators: `SubBucketHistogram`, `ReferenceWindow`

pub mod config;
pub mod error;
pub mod histogram;
pub mod linalg;
pub mod mahalanobis;
pub mod window;

pub use config::{ConfigError, HistogramConfig, KsenseConfig, WindowConfig};
pub use error::Undefined;
pub use histogram::{
    decode_range, encode_key, estimate_percentiles, key_for_value, pick_value, HistogramError,
    PercentileEstimate, PercentileEstimates, PickMode, SubBucketHistogram, SubRange,
    DEFAULT_SUBBITS,
};
pub use mahalanobis::{score, try_score, MahalanobisConfig, MahalanobisModel};
pub use window::{ReferenceWindow, WindowError};
