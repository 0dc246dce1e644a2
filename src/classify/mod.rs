//! Supervised nearest-neighbor prediction.
//!
//! Both predictors keep the full training set and answer each query with an
//! exhaustive scan. There is no index structure to build, so training is a
//! copy and every query costs O(n·d).
//!
//! | Type | Output | Aggregation |
//! |------|--------|-------------|
//! | [`KNearest`] | class label (`i32`) | majority vote |
//! | [`KNearestRegressor`] | value (`f32`) | mean of targets |
//!
//! ## Usage
//!
//! ```rust
//! use cohort::classify::KNearest;
//!
//! let samples = vec![
//!     vec![0.0, 0.0],
//!     vec![0.1, 0.1],
//!     vec![10.0, 10.0],
//!     vec![10.1, 10.1],
//! ];
//! let labels = vec![1, 1, 2, 2];
//!
//! let knn = KNearest::train(&samples, &labels).unwrap();
//! let pred = knn.classify(&[0.2, 0.0], 2).unwrap();
//! assert_eq!(pred.label, 1);
//! assert_eq!(pred.agreeing(), 2);
//! ```

mod knn;
mod neighbors;
mod regressor;
mod traits;

pub use knn::{KNearest, Neighbor, Prediction, DEFAULT_K};
pub use regressor::KNearestRegressor;
pub use traits::Classifier;
