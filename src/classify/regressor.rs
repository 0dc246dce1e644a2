//! K-nearest-neighbors regression.
//!
//! Same neighbor search as [`KNearest`](super::KNearest), but each training
//! sample carries a real-valued target and the prediction is the unweighted
//! mean of the `k` nearest targets.

use super::knn::DEFAULT_K;
use super::neighbors::NeighborIndex;
use super::traits::Classifier;
use crate::error::{Error, Result};
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// K-nearest-neighbors regressor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KNearestRegressor {
    index: NeighborIndex,
    targets: Vec<f32>,
    k: usize,
}

impl KNearestRegressor {
    /// Store `samples` with their real-valued `targets`.
    pub fn train(samples: &[Vec<f32>], targets: &[f32]) -> Result<Self> {
        if samples.len() != targets.len() {
            return Err(Error::LengthMismatch {
                samples: samples.len(),
                labels: targets.len(),
            });
        }
        if let Some(i) = targets.iter().position(|t| !t.is_finite()) {
            return Err(Error::invalid("targets", format!("target {i} is not finite")));
        }
        let index = NeighborIndex::build(samples)?;
        debug!(
            n_samples = index.n_samples(),
            n_features = index.n_features(),
            "trained k-nearest regressor"
        );
        Ok(Self {
            index,
            targets: targets.to_vec(),
            k: DEFAULT_K,
        })
    }

    /// Set the neighbor count used by [`Classifier::predict`].
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Mean target of the `k` nearest training samples.
    pub fn regress(&self, query: &[f32], k: usize) -> Result<f32> {
        let hits = self.index.nearest(query, k)?;
        let sum: f64 = hits.iter().map(|&(i, _)| f64::from(self.targets[i])).sum();
        Ok((sum / hits.len() as f64) as f32)
    }
}

impl Classifier for KNearestRegressor {
    type Output = f32;

    fn predict(&self, query: &[f32]) -> Result<f32> {
        self.regress(query, self.k)
    }

    fn n_features(&self) -> usize {
        self.index.n_features()
    }
}
