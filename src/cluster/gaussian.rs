//! Multivariate normal densities through Cholesky factors.
//!
//! For a component with mean μ and covariance Σ = L·Lᵀ:
//!
//! ```text
//! ln N(x | μ, Σ) = -½ (d·ln 2π + ln|Σ| + ‖L⁻¹(x - μ)‖²)
//! ln|Σ|          = 2 Σᵢ ln Lᵢᵢ
//! ```
//!
//! The Mahalanobis term is a triangular solve against L, so no inverse is ever
//! formed. A failed factorization is the signal that Σ is not positive
//! definite.

use faer::linalg::triangular_solve::solve_lower_triangular_in_place;
use faer::{Mat, Par, Side};
use ndarray::{Array1, ArrayView1, ArrayView2};

/// Lower-triangular Cholesky factor, or `None` if `a` is not positive definite.
pub(crate) fn cholesky(a: ArrayView2<'_, f64>) -> Option<Mat<f64>> {
    let n = a.nrows();
    if a.ncols() != n || a.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let mat = Mat::from_fn(n, n, |i, j| a[[i, j]]);
    let llt = mat.as_ref().llt(Side::Lower).ok()?;
    let l = llt.L().to_owned();
    (0..n)
        .all(|i| l[(i, i)].is_finite() && l[(i, i)] > 0.0)
        .then_some(l)
}

/// One mixture component, pre-factored for repeated density evaluation.
#[derive(Debug, Clone)]
pub(crate) struct GaussianFactor {
    mean: Array1<f64>,
    chol: Mat<f64>,
    /// -½ (d·ln 2π + ln|Σ|)
    log_norm: f64,
}

impl GaussianFactor {
    pub(crate) fn new(mean: ArrayView1<'_, f64>, cov: ArrayView2<'_, f64>) -> Option<Self> {
        let chol = cholesky(cov)?;
        let d = mean.len();
        let log_det: f64 = 2.0 * (0..d).map(|i| chol[(i, i)].ln()).sum::<f64>();
        Some(Self {
            mean: mean.to_owned(),
            chol,
            log_norm: -0.5 * (d as f64 * (2.0 * std::f64::consts::PI).ln() + log_det),
        })
    }

    /// ln N(x | μ, Σ).
    pub(crate) fn log_density(&self, x: ArrayView1<'_, f64>) -> f64 {
        let mut z = Mat::from_fn(self.mean.len(), 1, |i, _| x[i] - self.mean[i]);
        solve_lower_triangular_in_place(self.chol.as_ref(), z.as_mut(), Par::Seq);
        let mahalanobis: f64 = (0..z.nrows()).map(|i| z[(i, 0)] * z[(i, 0)]).sum();
        self.log_norm - 0.5 * mahalanobis
    }
}

/// ln πₖ + ln N(x | μₖ, Σₖ) for every component.
pub(crate) fn log_joint(
    x: ArrayView1<'_, f64>,
    log_weights: &[f64],
    factors: &[GaussianFactor],
) -> Vec<f64> {
    log_weights
        .iter()
        .zip(factors)
        .map(|(lw, g)| lw + g.log_density(x))
        .collect()
}

/// Log-sum-exp for numerical stability.
pub(crate) fn logsumexp(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }
    let max_val = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max_val.is_infinite() {
        return max_val;
    }
    max_val
        + values
            .iter()
            .map(|&v| (v - max_val).exp())
            .sum::<f64>()
            .ln()
}

/// Index of the largest value; ties resolve to the lowest index.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}
