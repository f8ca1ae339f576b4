//! Per-tick evaluation: one percentile map and one distance per call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use ksense_core::{estimate_percentiles, mahalanobis, KsenseConfig, PercentileEstimates};

/// Output of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    pub percentiles: PercentileEstimates,
    /// `None` while the reference window cannot support a score.
    pub distance: Option<f64>,
}

/// Runs both estimators against caller-supplied snapshots.
///
/// Holds configuration only; every call is independent of the previous one.
#[derive(Debug, Clone, Default)]
pub struct TickEvaluator {
    config: KsenseConfig,
}

impl TickEvaluator {
    pub fn new(config: KsenseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KsenseConfig {
        &self.config
    }

    pub fn percentiles<I>(&self, histogram: I) -> PercentileEstimates
    where
        I: IntoIterator<Item = (u64, u64)>,
    {
        let h = &self.config.histogram;
        estimate_percentiles(histogram, &h.percentiles, h.subbits, h.mode)
    }

    pub fn distance<R>(&self, x: &[f64], reference: &[R]) -> Option<f64>
    where
        R: AsRef<[f64]>,
    {
        mahalanobis::score(x, reference, &self.config.mahalanobis)
    }

    pub fn evaluate<I, R>(&self, tick: u64, histogram: I, reference: &[R], x: &[f64]) -> TickReport
    where
        I: IntoIterator<Item = (u64, u64)>,
        R: AsRef<[f64]>,
    {
        let percentiles = self.percentiles(histogram);
        let distance = self.distance(x, reference);
        debug!(tick, ?distance, percentiles = ?percentiles.values(), "tick evaluated");
        TickReport {
            tick,
            timestamp: Utc::now(),
            percentiles,
            distance,
        }
    }
}
