//! Classification traits.

use crate::error::Result;

/// Trait for trained supervised predictors.
pub trait Classifier {
    /// Prediction type (class label or regression value).
    type Output;

    /// Predict the output for a single query vector.
    fn predict(&self, query: &[f32]) -> Result<Self::Output>;

    /// Dimensionality the predictor was trained on.
    fn n_features(&self) -> usize;
}
