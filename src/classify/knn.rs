//! K-nearest-neighbors classification with majority voting.
//!
//! # The Rule
//!
//! Given a query `q` and a labeled training set, take the `k` training
//! samples closest to `q` under squared Euclidean distance and predict the
//! label that occurs most often among them.
//!
//! ```text
//! ŷ(q) = argmax_c |{ i ∈ N_k(q) : yᵢ = c }|
//! ```
//!
//! Squared distance ranks neighbors exactly as Euclidean distance does, and
//! skips the square root.
//!
//! # Determinism
//!
//! Two tie-breaks make every prediction reproducible:
//!
//! - Neighbors at equal distance rank by training insertion order.
//! - Labels with equal vote counts resolve to the one whose first
//!   occurrence is nearest to the query.
//!
//! # Confidence
//!
//! The neighbor list is returned with the prediction. The fraction of the
//! `k` neighbors that agree with the winning label is a cheap confidence
//! score: a query deep inside one class sees near-unanimous neighbors, a
//! query on a class boundary sees a split vote.

use super::neighbors::NeighborIndex;
use super::traits::Classifier;
use crate::error::{check_query, Error, Result};
use std::collections::HashMap;
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Neighbor count used by [`Classifier::predict`] unless overridden.
pub const DEFAULT_K: usize = 1;

/// One of the `k` nearest training samples for a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position of the sample in the training set.
    pub index: usize,
    /// Training label of the sample.
    pub label: i32,
    /// Squared Euclidean distance to the query.
    pub distance: f32,
}

/// Result of classifying one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Majority label among the neighbors.
    pub label: i32,
    /// The `k` nearest neighbors, nearest first.
    pub neighbors: Vec<Neighbor>,
}

impl Prediction {
    /// Neighbor labels in distance order.
    pub fn neighbor_labels(&self) -> Vec<i32> {
        self.neighbors.iter().map(|n| n.label).collect()
    }

    /// Squared neighbor distances in ascending order.
    pub fn distances(&self) -> Vec<f32> {
        self.neighbors.iter().map(|n| n.distance).collect()
    }

    /// Number of neighbors voting for the predicted label.
    pub fn agreeing(&self) -> usize {
        self.neighbors
            .iter()
            .filter(|n| n.label == self.label)
            .count()
    }

    /// Fraction of neighbors voting for the predicted label, in (0, 1].
    pub fn confidence(&self) -> f64 {
        self.agreeing() as f64 / self.neighbors.len() as f64
    }
}

/// K-nearest-neighbors classifier over an owned, immutable training set.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KNearest {
    index: NeighborIndex,
    labels: Vec<i32>,
    /// Neighbor count for [`Classifier::predict`].
    k: usize,
}

impl KNearest {
    /// Store a snapshot of `samples` with their class `labels`.
    ///
    /// # Errors
    ///
    /// - [`Error::LengthMismatch`] if the two slices differ in length.
    /// - [`Error::EmptyInput`] if there are no samples.
    /// - [`Error::DimensionMismatch`] if a sample's length differs from the first.
    /// - [`Error::NonFinite`] if a feature is NaN or infinite.
    pub fn train(samples: &[Vec<f32>], labels: &[i32]) -> Result<Self> {
        if samples.len() != labels.len() {
            return Err(Error::LengthMismatch {
                samples: samples.len(),
                labels: labels.len(),
            });
        }
        let index = NeighborIndex::build(samples)?;
        debug!(
            n_samples = index.n_samples(),
            n_features = index.n_features(),
            "trained k-nearest classifier"
        );
        Ok(Self {
            index,
            labels: labels.to_vec(),
            k: DEFAULT_K,
        })
    }

    /// Set the neighbor count used by [`Classifier::predict`].
    ///
    /// Validated when a prediction is made.
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Neighbor count used by [`Classifier::predict`].
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of stored training samples.
    pub fn n_samples(&self) -> usize {
        self.index.n_samples()
    }

    /// Training labels in insertion order.
    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    /// Classify `query` by majority vote among its `k` nearest neighbors.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidNeighborCount`] if `k` is zero or exceeds the training
    /// set size; [`Error::DimensionMismatch`] or [`Error::NonFinite`] for a
    /// malformed query.
    pub fn classify(&self, query: &[f32], k: usize) -> Result<Prediction> {
        self.index.check_k(k)?;
        check_query(0, query, self.index.n_features())?;
        Ok(self.classify_unchecked(query, k))
    }

    /// Classify every row of `queries` with the same `k`.
    ///
    /// All queries are validated before any is classified; with the
    /// `parallel` feature the searches then run on the rayon pool.
    pub fn classify_batch(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<Prediction>> {
        self.index.check_k(k)?;
        for (i, query) in queries.iter().enumerate() {
            check_query(i, query, self.index.n_features())?;
        }

        #[cfg(feature = "parallel")]
        let predictions = queries
            .par_iter()
            .map(|q| self.classify_unchecked(q, k))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let predictions = queries
            .iter()
            .map(|q| self.classify_unchecked(q, k))
            .collect();

        Ok(predictions)
    }

    fn classify_unchecked(&self, query: &[f32], k: usize) -> Prediction {
        let neighbors: Vec<Neighbor> = self
            .index
            .nearest_unchecked(query, k)
            .into_iter()
            .map(|(index, distance)| Neighbor {
                index,
                label: self.labels[index],
                distance,
            })
            .collect();

        Prediction {
            label: majority_label(&neighbors),
            neighbors,
        }
    }
}

impl Classifier for KNearest {
    type Output = i32;

    fn predict(&self, query: &[f32]) -> Result<i32> {
        Ok(self.classify(query, self.k)?.label)
    }

    fn n_features(&self) -> usize {
        self.index.n_features()
    }
}

/// Most frequent label; the nearest of the tied labels wins.
fn majority_label(neighbors: &[Neighbor]) -> i32 {
    let mut counts: HashMap<i32, usize> = HashMap::new();
    for n in neighbors {
        *counts.entry(n.label).or_insert(0) += 1;
    }

    let mut best_label = 0;
    let mut best_count = 0;
    for n in neighbors {
        let count = counts[&n.label];
        if count > best_count {
            best_label = n.label;
            best_count = count;
        }
    }
    best_label
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn two_groups() -> (Vec<Vec<f32>>, Vec<i32>) {
        let samples = vec![
            vec![0.0, 0.0],
            vec![0.1, 0.1],
            vec![0.2, 0.0],
            vec![10.0, 10.0],
            vec![10.1, 10.1],
            vec![10.2, 10.0],
        ];
        (samples, vec![1, 1, 1, 2, 2, 2])
    }

    #[test]
    fn test_knn_basic() {
        let (samples, labels) = two_groups();
        let knn = KNearest::train(&samples, &labels).unwrap();

        let near_origin = knn.classify(&[0.05, 0.05], 3).unwrap();
        assert_eq!(near_origin.label, 1);
        assert_eq!(near_origin.agreeing(), 3);
        assert!((near_origin.confidence() - 1.0).abs() < 1e-12);

        let far = knn.classify(&[9.9, 9.9], 3).unwrap();
        assert_eq!(far.label, 2);
    }

    #[test]
    fn test_knn_returns_distance_ordered_neighbors() {
        let (samples, labels) = two_groups();
        let knn = KNearest::train(&samples, &labels).unwrap();
        let pred = knn.classify(&[0.0, 0.0], 4).unwrap();

        assert_eq!(pred.neighbors.len(), 4);
        assert_eq!(pred.neighbors[0].index, 0);
        assert_eq!(pred.neighbors[0].distance, 0.0);
        assert_eq!(pred.neighbor_labels(), vec![1, 1, 1, 2]);
        let d = pred.distances();
        assert!(d.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_vote_tie_goes_to_nearest_label() {
        // Labels in distance order: 7, 3, 3, 7 -> two votes each.
        let samples = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]];
        let labels = vec![7, 3, 3, 7];
        let knn = KNearest::train(&samples, &labels).unwrap();
        assert_eq!(knn.classify(&[0.0], 4).unwrap().label, 7);

        // Mirror the query: now label 7 at 4.0 is nearest.
        assert_eq!(knn.classify(&[5.0], 4).unwrap().label, 7);

        // From 2.4 the order is 2.0, 3.0, 1.0, 4.0: labels 3, 3, 7, 7.
        assert_eq!(knn.classify(&[2.4], 4).unwrap().label, 3);
    }

    #[test]
    fn test_equal_distances_rank_by_insertion_order() {
        let samples = vec![vec![1.0], vec![-1.0], vec![1.0]];
        let labels = vec![5, 6, 7];
        let knn = KNearest::train(&samples, &labels).unwrap();
        let pred = knn.classify(&[0.0], 1).unwrap();
        assert_eq!(pred.neighbors[0].index, 0);
        assert_eq!(pred.label, 5);

        let pred = knn.classify(&[0.0], 3).unwrap();
        assert_eq!(pred.neighbor_labels(), vec![5, 6, 7]);
        // One vote each: nearest (first) wins.
        assert_eq!(pred.label, 5);
    }

    #[test]
    fn test_train_length_mismatch() {
        let (samples, _) = two_groups();
        let err = KNearest::train(&samples, &[1, 2]).unwrap_err();
        assert_eq!(
            err,
            Error::LengthMismatch {
                samples: 6,
                labels: 2
            }
        );
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_train_rejects_empty_and_ragged() {
        assert_eq!(KNearest::train(&[], &[]), Err(Error::EmptyInput));
        let ragged = vec![vec![0.0, 0.0], vec![1.0]];
        assert!(matches!(
            KNearest::train(&ragged, &[1, 2]),
            Err(Error::DimensionMismatch { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_classify_rejects_bad_k() {
        let (samples, labels) = two_groups();
        let knn = KNearest::train(&samples, &labels).unwrap();
        assert!(knn.classify(&[0.0, 0.0], 0).unwrap_err().is_invalid_input());
        assert_eq!(
            knn.classify(&[0.0, 0.0], 7),
            Err(Error::InvalidNeighborCount { k: 7, n_samples: 6 })
        );
    }

    #[test]
    fn test_classify_rejects_query_dimension() {
        let (samples, labels) = two_groups();
        let knn = KNearest::train(&samples, &labels).unwrap();
        assert!(matches!(
            knn.classify(&[0.0], 1),
            Err(Error::DimensionMismatch { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_classify_batch_matches_single() {
        let (samples, labels) = two_groups();
        let knn = KNearest::train(&samples, &labels).unwrap();
        let queries = vec![vec![0.0, 0.0], vec![5.0, 5.0], vec![10.0, 10.0]];

        let batch = knn.classify_batch(&queries, 3).unwrap();
        assert_eq!(batch.len(), 3);
        for (q, pred) in queries.iter().zip(&batch) {
            assert_eq!(&knn.classify(q, 3).unwrap(), pred);
        }
    }

    #[test]
    fn test_classify_batch_validates_every_query() {
        let (samples, labels) = two_groups();
        let knn = KNearest::train(&samples, &labels).unwrap();
        let queries = vec![vec![0.0, 0.0], vec![f32::NAN, 0.0]];
        assert_eq!(
            knn.classify_batch(&queries, 1),
            Err(Error::NonFinite {
                sample: 1,
                feature: 0
            })
        );
    }

    #[test]
    fn test_classifier_trait_uses_configured_k() {
        let (samples, labels) = two_groups();
        let knn = KNearest::train(&samples, &labels).unwrap().with_k(3);
        assert_eq!(knn.k(), 3);
        assert_eq!(knn.n_features(), 2);
        assert_eq!(knn.predict(&[10.0, 10.0]).unwrap(), 2);

        let too_many = knn.with_k(100);
        assert!(too_many.predict(&[0.0, 0.0]).is_err());
    }

    #[test]
    fn test_huge_coordinates_rank_correctly() {
        let samples = vec![vec![0.0], vec![1e19]];
        let knn = KNearest::train(&samples, &[2, 1]).unwrap();
        let pred = knn.classify(&[1e20], 1).unwrap();
        assert_eq!(pred.label, 1);
        assert_eq!(pred.neighbors[0].index, 1);
    }

    #[test]
    fn test_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<KNearest>();
        assert_send_sync::<Prediction>();
    }

    proptest! {
        #[test]
        fn classify_returns_known_label_and_k_sorted_neighbors(
            points in proptest::collection::vec(
                (-100.0f32..100.0, -100.0f32..100.0, 0i32..4),
                1..40,
            ),
            query in (-100.0f32..100.0, -100.0f32..100.0),
            k_seed in 0usize..1000,
        ) {
            let samples: Vec<Vec<f32>> = points.iter().map(|p| vec![p.0, p.1]).collect();
            let labels: Vec<i32> = points.iter().map(|p| p.2).collect();
            let k = 1 + k_seed % samples.len();
            let knn = KNearest::train(&samples, &labels).unwrap();

            let pred = knn.classify(&[query.0, query.1], k).unwrap();
            prop_assert!(labels.contains(&pred.label));
            prop_assert_eq!(pred.neighbors.len(), k);
            prop_assert!(pred.neighbors.windows(2).all(|w| w[0].distance <= w[1].distance));
            prop_assert!(pred.agreeing() >= 1);

            let again = knn.classify(&[query.0, query.1], k).unwrap();
            prop_assert_eq!(pred, again);
        }
    }
}
