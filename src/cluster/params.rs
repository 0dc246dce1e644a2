//! Mixture parameters: the inspectable, persistable part of a fitted model.

use super::gaussian::{cholesky, GaussianFactor};
use crate::error::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tolerance on Σ πₖ = 1 for supplied weights.
pub(crate) const WEIGHT_SUM_TOL: f64 = 1e-5;

/// Relative tolerance on covariance symmetry for supplied matrices.
const SYMMETRY_TOL: f64 = 1e-6;

/// Shape constraint applied to every component covariance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CovarianceMode {
    /// σ²·I per component: one variance shared by all features.
    Spherical,
    /// Per-feature variances, off-diagonal terms fixed at zero.
    #[default]
    Diagonal,
    /// Unconstrained symmetric positive-definite matrix.
    Full,
}

/// Means, covariances and weights of an N-component mixture in D dimensions.
///
/// Covariances are always stored as full D×D matrices; a diagonal or
/// spherical model simply has zero off-diagonal entries. That keeps the
/// parameters of any model usable as the warm start of any other.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MixtureParams {
    means: Array2<f64>,
    covariances: Vec<Array2<f64>>,
    weights: Array1<f64>,
}

impl MixtureParams {
    /// Build and validate a parameter set.
    ///
    /// # Errors
    ///
    /// Invalid-input errors for inconsistent shapes, non-finite entries,
    /// asymmetric or non-positive-definite covariances, negative weights, or
    /// weights that do not sum to 1 within 1e-5.
    pub fn new(
        means: Array2<f64>,
        covariances: Vec<Array2<f64>>,
        weights: Array1<f64>,
    ) -> Result<Self> {
        let params = Self {
            means,
            covariances,
            weights,
        };
        params.validate()?;
        Ok(params)
    }

    pub(crate) fn from_parts(
        means: Array2<f64>,
        covariances: Vec<Array2<f64>>,
        weights: Array1<f64>,
    ) -> Self {
        Self {
            means,
            covariances,
            weights,
        }
    }

    /// Number of mixture components.
    pub fn n_components(&self) -> usize {
        self.weights.len()
    }

    /// Dimensionality of each component.
    pub fn n_features(&self) -> usize {
        self.means.ncols()
    }

    /// Component means, one row per component.
    pub fn means(&self) -> &Array2<f64> {
        &self.means
    }

    /// Component covariance matrices.
    pub fn covariances(&self) -> &[Array2<f64>] {
        &self.covariances
    }

    /// Mixing weights.
    pub fn weights(&self) -> &Array1<f64> {
        &self.weights
    }

    /// Largest absolute difference over all means, covariances and weights.
    ///
    /// `None` when the two parameter sets have different shapes.
    pub fn max_abs_diff(&self, other: &Self) -> Option<f64> {
        if self.means.dim() != other.means.dim()
            || self.weights.len() != other.weights.len()
            || self.covariances.len() != other.covariances.len()
        {
            return None;
        }
        let mut diff: f64 = 0.0;
        for (a, b) in self.means.iter().zip(other.means.iter()) {
            diff = diff.max((a - b).abs());
        }
        for (a, b) in self.weights.iter().zip(other.weights.iter()) {
            diff = diff.max((a - b).abs());
        }
        for (ca, cb) in self.covariances.iter().zip(&other.covariances) {
            if ca.dim() != cb.dim() {
                return None;
            }
            for (a, b) in ca.iter().zip(cb.iter()) {
                diff = diff.max((a - b).abs());
            }
        }
        Some(diff)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let k = self.weights.len();
        let d = self.means.ncols();
        if k == 0 {
            return Err(Error::EmptyInput);
        }
        if d == 0 {
            return Err(Error::invalid("means", "components must have at least one feature"));
        }
        if self.means.nrows() != k || self.covariances.len() != k {
            return Err(Error::ShapeMismatch {
                expected: format!("{k} means and {k} covariances"),
                actual: format!(
                    "{} means and {} covariances",
                    self.means.nrows(),
                    self.covariances.len()
                ),
            });
        }
        if self.means.iter().any(|v| !v.is_finite()) {
            return Err(Error::invalid("means", "means must be finite"));
        }

        for (c, cov) in self.covariances.iter().enumerate() {
            if cov.dim() != (d, d) {
                return Err(Error::ShapeMismatch {
                    expected: format!("{d}x{d} covariance"),
                    actual: format!("{}x{} covariance", cov.nrows(), cov.ncols()),
                });
            }
            if cov.iter().any(|v| !v.is_finite()) {
                return Err(Error::invalid("covariances", format!("covariance {c} is not finite")));
            }
            let scale = cov.iter().fold(1.0f64, |m, v| m.max(v.abs()));
            for i in 0..d {
                for j in (i + 1)..d {
                    if (cov[[i, j]] - cov[[j, i]]).abs() > SYMMETRY_TOL * scale {
                        return Err(Error::invalid(
                            "covariances",
                            format!("covariance {c} is not symmetric"),
                        ));
                    }
                }
            }
            if cholesky(cov.view()).is_none() {
                return Err(Error::invalid(
                    "covariances",
                    format!("covariance {c} is not positive definite"),
                ));
            }
        }

        if self.weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::invalid("weights", "weights must be finite and non-negative"));
        }
        let total: f64 = self.weights.sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOL {
            return Err(Error::invalid(
                "weights",
                format!("weights sum to {total}, expected 1"),
            ));
        }
        Ok(())
    }

    /// Force every covariance into the shape `mode` allows.
    pub(crate) fn project(&mut self, mode: CovarianceMode) {
        for cov in &mut self.covariances {
            project_covariance(cov, mode);
        }
    }

    /// Factor every component, or report the first one that fails.
    pub(crate) fn factorize(&self) -> std::result::Result<Vec<GaussianFactor>, usize> {
        self.covariances
            .iter()
            .enumerate()
            .map(|(c, cov)| GaussianFactor::new(self.means.row(c), cov.view()).ok_or(c))
            .collect()
    }
}

fn project_covariance(cov: &mut Array2<f64>, mode: CovarianceMode) {
    let d = cov.nrows();
    match mode {
        CovarianceMode::Full => {}
        CovarianceMode::Diagonal => {
            let diag = cov.diag().to_owned();
            *cov = Array2::from_diag(&diag);
        }
        CovarianceMode::Spherical => {
            let var = cov.diag().sum() / d as f64;
            *cov = Array2::eye(d) * var;
        }
    }
}

/// Weighted covariance of `data` around `mean`, constrained to `mode`,
/// with `reg` added to the diagonal.
///
/// `weights[i]` is sample i's weight and `total` their sum. Accumulation
/// runs in sample order.
pub(crate) fn scatter(
    data: ArrayView2<'_, f64>,
    weights: ArrayView1<'_, f64>,
    total: f64,
    mean: ArrayView1<'_, f64>,
    mode: CovarianceMode,
    reg: f64,
) -> Array2<f64> {
    let d = data.ncols();
    let mut cov = Array2::<f64>::zeros((d, d));
    match mode {
        CovarianceMode::Full => {
            let mut diff = vec![0.0; d];
            for (row, &w) in data.outer_iter().zip(weights.iter()) {
                if w == 0.0 {
                    continue;
                }
                for j in 0..d {
                    diff[j] = row[j] - mean[j];
                }
                for a in 0..d {
                    for b in 0..=a {
                        cov[[a, b]] += w * diff[a] * diff[b];
                    }
                }
            }
            for a in 0..d {
                for b in 0..a {
                    cov[[b, a]] = cov[[a, b]];
                }
            }
            cov /= total;
        }
        CovarianceMode::Diagonal | CovarianceMode::Spherical => {
            for (row, &w) in data.outer_iter().zip(weights.iter()) {
                if w == 0.0 {
                    continue;
                }
                for j in 0..d {
                    let diff = row[j] - mean[j];
                    cov[[j, j]] += w * diff * diff;
                }
            }
            cov /= total;
            project_covariance(&mut cov, mode);
        }
    }
    for j in 0..d {
        cov[[j, j]] += reg;
    }
    cov
}

/// Weighted mean of the rows of `data`.
pub(crate) fn weighted_mean(
    data: ArrayView2<'_, f64>,
    weights: ArrayView1<'_, f64>,
    total: f64,
) -> Array1<f64> {
    let mut mean = Array1::<f64>::zeros(data.ncols());
    for (row, &w) in data.outer_iter().zip(weights.iter()) {
        if w != 0.0 {
            mean.scaled_add(w, &row);
        }
    }
    mean / total
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn two_component() -> MixtureParams {
        MixtureParams::new(
            array![[0.0, 0.0], [5.0, 5.0]],
            vec![array![[1.0, 0.5], [0.5, 2.0]], Array2::eye(2)],
            array![0.25, 0.75],
        )
        .unwrap()
    }

    #[test]
    fn test_valid_params() {
        let p = two_component();
        assert_eq!(p.n_components(), 2);
        assert_eq!(p.n_features(), 2);
        assert_eq!(p.max_abs_diff(&p), Some(0.0));
    }

    #[test]
    fn test_rejects_shape_mismatch() {
        let err = MixtureParams::new(
            array![[0.0, 0.0]],
            vec![Array2::eye(2), Array2::eye(2)],
            array![0.5, 0.5],
        )
        .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));

        let err = MixtureParams::new(array![[0.0, 0.0]], vec![Array2::eye(3)], array![1.0])
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_rejects_bad_weights() {
        let err = MixtureParams::new(
            array![[0.0], [1.0]],
            vec![Array2::eye(1), Array2::eye(1)],
            array![0.5, 0.6],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "weights", .. }));

        let err = MixtureParams::new(
            array![[0.0], [1.0]],
            vec![Array2::eye(1), Array2::eye(1)],
            array![1.5, -0.5],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "weights", .. }));
    }

    #[test]
    fn test_rejects_non_pd_and_asymmetric() {
        let err = MixtureParams::new(
            array![[0.0, 0.0]],
            vec![array![[1.0, 2.0], [2.0, 1.0]]],
            array![1.0],
        )
        .unwrap_err();
        assert!(err.is_invalid_input());

        let err = MixtureParams::new(
            array![[0.0, 0.0]],
            vec![array![[1.0, 0.5], [0.0, 1.0]]],
            array![1.0],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "covariances", .. }));
    }

    #[test]
    fn test_project_modes() {
        let mut p = two_component();
        p.project(CovarianceMode::Diagonal);
        assert_eq!(p.covariances()[0], array![[1.0, 0.0], [0.0, 2.0]]);

        let mut p = two_component();
        p.project(CovarianceMode::Spherical);
        assert_eq!(p.covariances()[0], array![[1.5, 0.0], [0.0, 1.5]]);

        let mut p = two_component();
        p.project(CovarianceMode::Full);
        assert_eq!(p, two_component());
    }

    #[test]
    fn test_scatter_full_and_diagonal() {
        let data = array![[0.0, 0.0], [2.0, 2.0], [2.0, 0.0], [0.0, 2.0]];
        let ones = Array1::from_elem(4, 1.0);
        let mean = weighted_mean(data.view(), ones.view(), 4.0);
        assert_eq!(mean, array![1.0, 1.0]);

        let full = scatter(data.view(), ones.view(), 4.0, mean.view(), CovarianceMode::Full, 0.0);
        assert_eq!(full, array![[1.0, 0.0], [0.0, 1.0]]);

        let line = array![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]];
        let w = Array1::from_elem(3, 1.0);
        let m = weighted_mean(line.view(), w.view(), 3.0);
        let full = scatter(line.view(), w.view(), 3.0, m.view(), CovarianceMode::Full, 0.1);
        assert!((full[[0, 1]] - 2.0 / 3.0).abs() < 1e-12);
        assert!((full[[0, 0]] - (2.0 / 3.0 + 0.1)).abs() < 1e-12);

        let diag = scatter(line.view(), w.view(), 3.0, m.view(), CovarianceMode::Diagonal, 0.1);
        assert_eq!(diag[[0, 1]], 0.0);
        assert!((diag[[1, 1]] - (2.0 / 3.0 + 0.1)).abs() < 1e-12);
    }

    #[test]
    fn test_scatter_ignores_zero_weights() {
        let data = array![[0.0], [1.0], [100.0]];
        let w = array![1.0, 1.0, 0.0];
        let m = weighted_mean(data.view(), w.view(), 2.0);
        assert_eq!(m, array![0.5]);
        let cov = scatter(data.view(), w.view(), 2.0, m.view(), CovarianceMode::Diagonal, 0.0);
        assert!((cov[[0, 0]] - 0.25).abs() < 1e-12);
    }
}
