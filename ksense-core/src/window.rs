//! Rolling reference window of feature vectors.
//!
//! Bounded FIFO: pushing at capacity evicts the oldest row. The scorer never
//! sees the window itself, only an owned [`ReferenceWindow::snapshot`].

use std::collections::VecDeque;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("feature vector has dimension {found}, window expects {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("feature vector is empty")]
    Empty,
}

#[derive(Debug, Clone)]
pub struct ReferenceWindow {
    capacity: usize,
    dim: Option<usize>,
    rows: VecDeque<Vec<f64>>,
}

impl ReferenceWindow {
    /// Window holding at most `capacity` rows (at least one). The dimension
    /// is fixed by the first accepted row.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            dim: None,
            rows: VecDeque::with_capacity(capacity),
        }
    }

    /// Window with a dimension fixed up front.
    pub fn with_dim(capacity: usize, dim: usize) -> Self {
        let mut w = Self::new(capacity);
        w.dim = Some(dim);
        w
    }

    /// Append a row, evicting the oldest at capacity.
    ///
    /// Returns the evicted row, if any. Non-finite values are accepted here
    /// and filtered by the scorer.
    pub fn push(&mut self, row: Vec<f64>) -> Result<Option<Vec<f64>>, WindowError> {
        if row.is_empty() {
            return Err(WindowError::Empty);
        }
        match self.dim {
            Some(expected) if expected != row.len() => {
                return Err(WindowError::DimensionMismatch {
                    expected,
                    found: row.len(),
                });
            }
            Some(_) => {}
            None => self.dim = Some(row.len()),
        }

        let evicted = if self.rows.len() == self.capacity {
            self.rows.pop_front()
        } else {
            None
        };
        self.rows.push_back(row);
        Ok(evicted)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() == self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f64]> {
        self.rows.iter().map(|r| r.as_slice())
    }

    /// Owned point-in-time copy, oldest row first.
    pub fn snapshot(&self) -> Vec<Vec<f64>> {
        self.rows.iter().cloned().collect()
    }

    /// Drop all rows. The dimension stays fixed.
    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut w = ReferenceWindow::new(2);
        assert_eq!(w.push(vec![1.0]).unwrap(), None);
        assert_eq!(w.push(vec![2.0]).unwrap(), None);
        assert!(w.is_full());
        assert_eq!(w.push(vec![3.0]).unwrap(), Some(vec![1.0]));
        assert_eq!(w.snapshot(), vec![vec![2.0], vec![3.0]]);
    }

    #[test]
    fn first_row_fixes_dimension() {
        let mut w = ReferenceWindow::new(4);
        w.push(vec![1.0, 2.0]).unwrap();
        assert_eq!(w.dim(), Some(2));
        assert_eq!(
            w.push(vec![1.0]),
            Err(WindowError::DimensionMismatch {
                expected: 2,
                found: 1
            })
        );
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn preset_dimension_is_enforced() {
        let mut w = ReferenceWindow::with_dim(4, 3);
        assert!(w.push(vec![0.0, 0.0]).is_err());
        assert!(w.push(vec![0.0, 0.0, 0.0]).is_ok());
    }

    #[test]
    fn empty_row_rejected() {
        let mut w = ReferenceWindow::new(4);
        assert_eq!(w.push(vec![]), Err(WindowError::Empty));
        assert_eq!(w.dim(), None);
    }

    #[test]
    fn clear_keeps_dimension() {
        let mut w = ReferenceWindow::new(4);
        w.push(vec![1.0, 2.0]).unwrap();
        w.clear();
        assert!(w.is_empty());
        assert_eq!(w.dim(), Some(2));
    }

    #[test]
    fn zero_capacity_holds_one_row() {
        let mut w = ReferenceWindow::new(0);
        assert_eq!(w.capacity(), 1);
        assert_eq!(w.push(vec![1.0]).unwrap(), None);
        assert_eq!(w.push(vec![2.0]).unwrap(), Some(vec![1.0]));
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn non_finite_rows_are_kept() {
        let mut w = ReferenceWindow::new(4);
        w.push(vec![f64::NAN]).unwrap();
        assert_eq!(w.len(), 1);
    }
}
