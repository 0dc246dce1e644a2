//! Unsupervised grouping: Gaussian mixtures trained by EM, and k-means.
//!
//! ## Hard vs Soft Clustering
//!
//! **Hard clustering** assigns each point to exactly one cluster.
//! [`Kmeans`] does this, and its partition is also how mixture training
//! seeds itself.
//!
//! **Soft clustering** gives each point a probability distribution over
//! clusters. A [`Mixture`] reports P(component k | x) through
//! [`Mixture::predict_proba`], and the most probable component through
//! [`Mixture::predict`].
//!
//! ## Gaussian Mixture Model
//!
//! ```text
//! P(x) = Σ π_k × N(x | μ_k, Σ_k)
//! ```
//!
//! [`Gmm`] holds the training configuration and [`Gmm::fit`] produces a
//! [`Mixture`]. The covariance constraint is chosen with [`CovarianceMode`]:
//!
//! | Mode | Parameters per component | Shape |
//! |------|--------------------------|-------|
//! | `Spherical` | 1 | circles |
//! | `Diagonal` | D | axis-aligned ellipses |
//! | `Full` | D(D+1)/2 | arbitrary ellipses |
//!
//! Fitted parameters are a plain [`MixtureParams`] value. Passing them to
//! [`Gmm::with_params`] starts a new fit from them, typically a full
//! covariance run refining a cheap diagonal one.
//!
//! ## Usage
//!
//! ```rust
//! use cohort::cluster::{Clustering, CovarianceMode, Gmm, Kmeans};
//!
//! let data = vec![
//!     vec![0.0, 0.0],
//!     vec![0.1, 0.1],
//!     vec![10.0, 10.0],
//!     vec![10.1, 10.1],
//! ];
//!
//! // Hard clustering with K-means
//! let labels = Kmeans::new(2).with_seed(1).fit_predict(&data).unwrap();
//! assert_eq!(labels[0], labels[1]);
//! assert_ne!(labels[0], labels[2]);
//!
//! // Coarse diagonal pass, then a full-covariance refinement
//! let coarse = Gmm::new(2).fit(&data).unwrap();
//! let fine = Gmm::new(2)
//!     .with_covariance(CovarianceMode::Full)
//!     .with_params(coarse.params().clone())
//!     .fit(&data)
//!     .unwrap();
//! assert_eq!(fine.predict(&[0.05, 0.05]).unwrap(), fine.labels()[0]);
//! ```

mod gaussian;
mod gmm;
mod kmeans;
mod mixture;
mod params;
mod traits;

pub use gmm::{Gmm, InitMode, ToleranceKind, DEFAULT_SEED};
pub use kmeans::{Kmeans, KmeansFit};
pub use mixture::{FitStatus, Mixture};
pub use params::{CovarianceMode, MixtureParams};
pub use traits::{Clustering, SoftClustering};
