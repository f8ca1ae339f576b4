//! Covariance helpers on top of `nalgebra`.
//!
//! Rows arrive as borrowed slices; the centered data, covariance and its
//! factor live in `DMatrix`. Factorization and triangular solves are left to
//! `nalgebra` itself.

use nalgebra::{DMatrix, DVector};

/// True when every element is neither NaN nor infinite.
pub fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// Mean of each column. Rows must all be of length `dim`.
pub fn column_means(rows: &[&[f64]], dim: usize) -> DVector<f64> {
    let mut mu = DVector::<f64>::zeros(dim);
    if rows.is_empty() {
        return mu;
    }
    for row in rows {
        for (m, v) in mu.iter_mut().zip(row.iter()) {
            *m += v;
        }
    }
    mu / rows.len() as f64
}

/// Unbiased sample covariance (divisor `n - 1`) around `mean`.
///
/// Returns `None` with fewer than two rows.
pub fn sample_covariance(rows: &[&[f64]], mean: &DVector<f64>) -> Option<DMatrix<f64>> {
    let n = rows.len();
    if n < 2 {
        return None;
    }
    let dim = mean.len();

    let mut centered = DMatrix::<f64>::zeros(n, dim);
    for (r, row) in rows.iter().enumerate() {
        for (c, &v) in row.iter().enumerate().take(dim) {
            centered[(r, c)] = v - mean[c];
        }
    }

    Some((centered.transpose() * &centered) / (n - 1) as f64)
}

/// Mean of the diagonal; 0 for an empty matrix.
pub fn mean_diagonal(m: &DMatrix<f64>) -> f64 {
    let d = m.nrows().min(m.ncols());
    if d == 0 {
        return 0.0;
    }
    m.diagonal().sum() / d as f64
}

pub fn add_to_diagonal(m: &mut DMatrix<f64>, value: f64) {
    let d = m.nrows().min(m.ncols());
    for i in 0..d {
        m[(i, i)] += value;
    }
}

/// Lower Cholesky factor `L` of `m`, or `None` unless `m` is strictly
/// positive-definite (every pivot finite and above zero).
pub fn cholesky_factor(m: DMatrix<f64>) -> Option<DMatrix<f64>> {
    let l = m.cholesky()?.l();
    l.diagonal()
        .iter()
        .all(|p| p.is_finite() && *p > 0.0)
        .then_some(l)
}
