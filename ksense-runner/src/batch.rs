//! Score many queries against one reference snapshot.
//!
//! The covariance is fitted once and shared; queries are scored sequentially
//! or with rayon. Results match `ksense_core::score` query by query.

use rayon::prelude::*;
use tracing::debug;

use ksense_core::{MahalanobisConfig, MahalanobisModel};

pub fn score_batch<Q, R>(
    queries: &[Q],
    reference: &[R],
    config: &MahalanobisConfig,
    parallel: bool,
) -> Vec<Option<f64>>
where
    Q: AsRef<[f64]> + Sync,
    R: AsRef<[f64]>,
{
    let Some(first) = reference.first() else {
        return vec![None; queries.len()];
    };
    let dim = first.as_ref().len();

    let model = match MahalanobisModel::fit(reference, dim, config) {
        Ok(model) => model,
        Err(cause) => {
            debug!(%cause, queries = queries.len(), "batch reference unusable");
            return vec![None; queries.len()];
        }
    };

    let score_one = |q: &Q| -> Option<f64> {
        let q = q.as_ref();
        if q.len() != dim {
            return None;
        }
        model.distance(q).ok()
    };

    if parallel {
        queries.par_iter().map(score_one).collect()
    } else {
        queries.iter().map(score_one).collect()
    }
}
