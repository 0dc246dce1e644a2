use thiserror::Error;

use crate::cluster::MixtureParams;

/// Result alias for `cohort`.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller passed malformed data or parameters. Never retried.
    InvalidInput,
    /// EM training produced a model that cannot be trusted.
    Degenerate,
}

/// Errors returned by the classifiers and the mixture engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Input was empty.
    #[error("empty input provided")]
    EmptyInput,

    /// Vector dimension mismatch.
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Found dimension.
        found: usize,
    },

    /// Number of samples and number of labels/targets differ.
    #[error("length mismatch: {samples} samples but {labels} labels")]
    LengthMismatch {
        /// Number of samples.
        samples: usize,
        /// Number of labels or targets.
        labels: usize,
    },

    /// Shape mismatch (string description).
    #[error("shape mismatch: expected {expected}, actual {actual}")]
    ShapeMismatch {
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        actual: String,
    },

    /// A sample contains NaN or an infinity.
    #[error("non-finite value in sample {sample} at feature {feature}")]
    NonFinite {
        /// Sample index.
        sample: usize,
        /// Feature index.
        feature: usize,
    },

    /// Requested neighbor count is zero or larger than the training set.
    #[error("cannot select {k} neighbors from {n_samples} training samples")]
    InvalidNeighborCount {
        /// Requested k.
        k: usize,
        /// Training set size.
        n_samples: usize,
    },

    /// Invalid number of clusters / mixture components requested.
    #[error("cannot create {requested} clusters from {n_items} items")]
    InvalidClusterCount {
        /// Requested count.
        requested: usize,
        /// Number of items.
        n_items: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: String,
    },

    /// EM training became numerically degenerate.
    #[error("degenerate mixture at iteration {iteration}: {reason}")]
    Degenerate {
        /// What went wrong.
        reason: Degeneracy,
        /// EM iteration at which it was detected (0 = initialization).
        iteration: usize,
        /// Last parameters that passed validation, when there were any.
        last_valid: Option<Box<MixtureParams>>,
    },
}

/// Reason attached to [`Error::Degenerate`].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum Degeneracy {
    /// A component's mixing weight fell below the configured minimum.
    #[error("component {component} weight collapsed to {weight:e}")]
    CollapsedWeight {
        /// Component index.
        component: usize,
        /// Weight at detection.
        weight: f64,
    },
    /// A covariance matrix failed Cholesky factorization.
    #[error("component {component} covariance is not positive definite")]
    NotPositiveDefinite {
        /// Component index.
        component: usize,
    },
    /// Total log-likelihood went down between iterations.
    #[error("log-likelihood decreased from {previous} to {current}")]
    LikelihoodDecreased {
        /// Log-likelihood before the iteration.
        previous: f64,
        /// Log-likelihood after the iteration.
        current: f64,
    },
    /// Total log-likelihood is NaN or infinite.
    #[error("log-likelihood is not finite")]
    NonFiniteLikelihood,
    /// Pruning removed every component.
    #[error("every component collapsed")]
    AllComponentsCollapsed,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Degenerate { .. } => ErrorKind::Degenerate,
            _ => ErrorKind::InvalidInput,
        }
    }

    /// True for caller errors (shapes, counts, parameters).
    pub fn is_invalid_input(&self) -> bool {
        self.kind() == ErrorKind::InvalidInput
    }

    /// True when EM training degenerated.
    pub fn is_degenerate(&self) -> bool {
        self.kind() == ErrorKind::Degenerate
    }

    /// Last valid mixture parameters attached to a degenerate-model error.
    pub fn last_valid(&self) -> Option<&MixtureParams> {
        match self {
            Error::Degenerate { last_valid, .. } => last_valid.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}

/// Validate a batch of samples: non-empty, equal dimension, at least one
/// feature, finite values. Returns the shared dimension.
pub(crate) fn check_samples(samples: &[Vec<f32>]) -> Result<usize> {
    let first = samples.first().ok_or(Error::EmptyInput)?;
    let d = first.len();
    if d == 0 {
        return Err(Error::invalid("samples", "samples must have at least one feature"));
    }
    for (i, sample) in samples.iter().enumerate() {
        if sample.len() != d {
            return Err(Error::DimensionMismatch {
                expected: d,
                found: sample.len(),
            });
        }
        check_finite(i, sample)?;
    }
    Ok(d)
}

/// Validate one query against a known dimension.
pub(crate) fn check_query(index: usize, query: &[f32], d: usize) -> Result<()> {
    if query.len() != d {
        return Err(Error::DimensionMismatch {
            expected: d,
            found: query.len(),
        });
    }
    check_finite(index, query)
}

fn check_finite(index: usize, sample: &[f32]) -> Result<()> {
    match sample.iter().position(|v| !v.is_finite()) {
        Some(feature) => Err(Error::NonFinite {
            sample: index,
            feature,
        }),
        None => Ok(()),
    }
}
