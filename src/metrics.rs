//! Agreement scores between predictions and ground truth.
//!
//! | Metric | Range | Best | Use |
//! |--------|-------|------|-----|
//! | [`accuracy`] | [0, 1] | 1 | Classifier output vs. known labels |
//! | [`purity`] | [0, 1] | 1 | Clusters vs. classes, label-permutation free |
//! | [`ari`] | [-1, 1] | 1 | Chance-corrected partition agreement |
//!
//! Cluster indices from EM are arbitrary, so clustering output is compared
//! with [`purity`] or [`ari`], never [`accuracy`].
//!
//! All functions return 0.0 for empty or length-mismatched inputs.
//!
//! # Example
//!
//! ```rust
//! use cohort::metrics::{accuracy, ari, purity};
//!
//! assert_eq!(accuracy(&[1, 2, 2], &[1, 2, 1]), 2.0 / 3.0);
//!
//! let pred = [1, 1, 0, 0];
//! let truth = [0, 0, 1, 1];
//! assert_eq!(purity(&pred, &truth), 1.0);
//! assert!((ari(&pred, &truth) - 1.0).abs() < 1e-12);
//! ```

use std::collections::HashMap;
use std::hash::Hash;

/// Fraction of positions where `pred` equals `truth`.
pub fn accuracy<T: PartialEq>(pred: &[T], truth: &[T]) -> f64 {
    if pred.len() != truth.len() || pred.is_empty() {
        return 0.0;
    }
    let hits = pred.iter().zip(truth).filter(|(p, t)| p == t).count();
    hits as f64 / pred.len() as f64
}

/// Purity: each cluster votes for its majority class; fraction of points
/// that match their cluster's vote.
///
/// Reaches 1.0 trivially when every point is its own cluster.
pub fn purity<P, T>(pred: &[P], truth: &[T]) -> f64
where
    P: Eq + Hash + Copy,
    T: Eq + Hash + Copy,
{
    if pred.len() != truth.len() || pred.is_empty() {
        return 0.0;
    }
    let mut best: HashMap<P, usize> = HashMap::new();
    for (&(p, _), &count) in &contingency(pred, truth) {
        let slot = best.entry(p).or_insert(0);
        *slot = (*slot).max(count);
    }
    best.values().sum::<usize>() as f64 / pred.len() as f64
}

/// Adjusted Rand Index (Hubert & Arabie, 1985).
///
/// ```text
/// ARI = (Σᵢⱼ C(nᵢⱼ,2) - E) / (½(Σᵢ C(aᵢ,2) + Σⱼ C(bⱼ,2)) - E)
/// E   = Σᵢ C(aᵢ,2) · Σⱼ C(bⱼ,2) / C(n,2)
/// ```
pub fn ari<P, T>(pred: &[P], truth: &[T]) -> f64
where
    P: Eq + Hash + Copy,
    T: Eq + Hash + Copy,
{
    if pred.len() != truth.len() || pred.is_empty() {
        return 0.0;
    }

    let joint = contingency(pred, truth);
    let mut row_sums: HashMap<P, usize> = HashMap::new();
    let mut col_sums: HashMap<T, usize> = HashMap::new();
    for (&(p, t), &count) in &joint {
        *row_sums.entry(p).or_insert(0) += count;
        *col_sums.entry(t).or_insert(0) += count;
    }

    let index: f64 = joint.values().map(|&c| comb2(c)).sum();
    let sum_a: f64 = row_sums.values().map(|&a| comb2(a)).sum();
    let sum_b: f64 = col_sums.values().map(|&b| comb2(b)).sum();
    let total = comb2(pred.len());

    if total == 0.0 {
        return 1.0;
    }
    let expected = sum_a * sum_b / total;
    let max_index = 0.5 * (sum_a + sum_b);
    let denom = max_index - expected;
    if denom.abs() < 1e-12 {
        // Both partitions are trivial (all-in-one or all-singletons) and identical.
        return 1.0;
    }
    (index - expected) / denom
}

fn contingency<P, T>(pred: &[P], truth: &[T]) -> HashMap<(P, T), usize>
where
    P: Eq + Hash + Copy,
    T: Eq + Hash + Copy,
{
    let mut table = HashMap::new();
    for (&p, &t) in pred.iter().zip(truth) {
        *table.entry((p, t)).or_insert(0) += 1;
    }
    table
}

fn comb2(n: usize) -> f64 {
    if n < 2 {
        0.0
    } else {
        (n * (n - 1) / 2) as f64
    }
}
