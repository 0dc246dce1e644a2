//! Brute-force neighbor search shared by the classifier and the regressor.

use crate::error::{check_query, check_samples, Error, Result};
use ndarray::{Array2, ArrayView1};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Dense training matrix with exhaustive nearest-neighbor lookup.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub(crate) struct NeighborIndex {
    data: Array2<f32>,
}

impl NeighborIndex {
    /// Snapshot the samples into a row-major matrix.
    pub(crate) fn build(samples: &[Vec<f32>]) -> Result<Self> {
        let d = check_samples(samples)?;
        let flat: Vec<f32> = samples.iter().flatten().copied().collect();
        let data = Array2::from_shape_vec((samples.len(), d), flat)
            .map_err(|e| Error::ShapeMismatch {
                expected: format!("{}x{}", samples.len(), d),
                actual: e.to_string(),
            })?;
        Ok(Self { data })
    }

    pub(crate) fn n_samples(&self) -> usize {
        self.data.nrows()
    }

    pub(crate) fn n_features(&self) -> usize {
        self.data.ncols()
    }

    /// `k` must lie in `1..=n_samples`.
    pub(crate) fn check_k(&self, k: usize) -> Result<()> {
        if k == 0 || k > self.n_samples() {
            return Err(Error::InvalidNeighborCount {
                k,
                n_samples: self.n_samples(),
            });
        }
        Ok(())
    }

    /// Validate `k` and the query, then search.
    pub(crate) fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        self.check_k(k)?;
        check_query(0, query, self.n_features())?;
        Ok(self.nearest_unchecked(query, k))
    }

    /// The `k` closest rows as `(row, squared distance)`, nearest first.
    ///
    /// Distances are accumulated and ranked in f64; the reported f32 value
    /// may saturate to infinity for huge inputs without affecting the order.
    /// Equal distances keep insertion order, so the result is fully
    /// determined by the training set and the query.
    pub(crate) fn nearest_unchecked(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f64)> = self
            .data
            .outer_iter()
            .enumerate()
            .map(|(i, row)| (i, squared_distance(query, &row)))
            .collect();

        let by_distance = |a: &(usize, f64), b: &(usize, f64)| {
            a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0))
        };

        if k < scored.len() {
            scored.select_nth_unstable_by(k - 1, by_distance);
            scored.truncate(k);
        }
        scored.sort_unstable_by(by_distance);
        scored.into_iter().map(|(i, d)| (i, d as f32)).collect()
    }
}

/// Squared Euclidean distance, accumulated in f64.
fn squared_distance(a: &[f32], b: &ArrayView1<'_, f32>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| (f64::from(x) - f64::from(y)).powi(2))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line() -> NeighborIndex {
        NeighborIndex::build(&[vec![0.0], vec![3.0], vec![1.0], vec![-1.0], vec![1.0]]).unwrap()
    }

    #[test]
    fn test_nearest_sorted_by_distance() {
        let index = line();
        let hits = index.nearest(&[0.0], 5).unwrap();
        let rows: Vec<usize> = hits.iter().map(|h| h.0).collect();
        // 1.0 appears at rows 2 and 4 with the same distance as -1.0 at row 3.
        assert_eq!(rows, vec![0, 2, 3, 4, 1]);
        assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn test_nearest_partial_selection_matches_full_sort() {
        let index = line();
        let full = index.nearest(&[0.5], 5).unwrap();
        for k in 1..=5 {
            assert_eq!(index.nearest(&[0.5], k).unwrap(), full[..k].to_vec());
        }
    }

    #[test]
    fn test_nearest_rejects_bad_k() {
        let index = line();
        assert_eq!(
            index.nearest(&[0.0], 0),
            Err(Error::InvalidNeighborCount { k: 0, n_samples: 5 })
        );
        assert_eq!(
            index.nearest(&[0.0], 6),
            Err(Error::InvalidNeighborCount { k: 6, n_samples: 5 })
        );
    }

    #[test]
    fn test_nearest_rejects_bad_query() {
        let index = line();
        assert!(matches!(
            index.nearest(&[0.0, 1.0], 1),
            Err(Error::DimensionMismatch { expected: 1, found: 2 })
        ));
        assert!(matches!(
            index.nearest(&[f32::INFINITY], 1),
            Err(Error::NonFinite { .. })
        ));
    }

    #[test]
    fn test_ranking_survives_f32_overflow() {
        let index = NeighborIndex::build(&[vec![0.0], vec![1e19]]).unwrap();
        let hits = index.nearest(&[1e20], 2).unwrap();
        assert_eq!(hits[0].0, 1);
        assert_eq!(hits[1].0, 0);
        assert!(hits[0].1.is_infinite());
    }
}
