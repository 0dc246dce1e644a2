//! Clustering traits shared by [`Kmeans`](super::Kmeans) and [`Gmm`](super::Gmm).

use crate::error::Result;

/// Hard clustering: every point gets exactly one cluster index.
pub trait Clustering {
    /// Fit on `data` and return one cluster index in `0..n_clusters()` per row.
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<usize>>;

    /// Configured number of clusters.
    fn n_clusters(&self) -> usize;
}

/// Soft clustering: every point gets a distribution over clusters.
pub trait SoftClustering: Clustering {
    /// Fit on `data` and return per-point membership probabilities.
    ///
    /// Entry \[i\]\[k\] is P(cluster k | point i); each row sums to 1.
    fn fit_predict_proba(&self, data: &[Vec<f32>]) -> Result<Vec<Vec<f64>>>;
}
