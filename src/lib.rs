//! # cohort
//!
//! Small-data statistical learning over dense `f32` feature vectors:
//! k-nearest-neighbor classification and Gaussian mixtures trained by
//! Expectation-Maximization.
//!
//! Every entry point validates its input and returns [`Result`]. Training
//! failures of EM are reported as [`Error::Degenerate`] together with the
//! last parameters that passed, never as a panic.
//!
//! Optional features: `parallel` spreads per-sample work over rayon
//! (results are identical to the sequential build), `serde` makes models
//! and parameters serializable.

pub mod classify;
pub mod cluster;
/// Error types used across `cohort`.
pub mod error;
pub mod metrics;


pub use error::{Degeneracy, Error, ErrorKind, Result};
pub use metrics::{accuracy, ari, purity};

pub use classify::{Classifier, KNearest, KNearestRegressor, Prediction};
pub use cluster::{
    Clustering, CovarianceMode, FitStatus, Gmm, InitMode, Kmeans, Mixture, MixtureParams,
    SoftClustering,
};
