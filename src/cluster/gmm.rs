//! Gaussian Mixture Model training by Expectation-Maximization.
//!
//! # The Probabilistic Model
//!
//! GMM assumes data is generated from N Gaussian distributions:
//!
//! ```text
//! P(x) = Σₖ πₖ × N(x | μₖ, Σₖ)
//! ```
//!
//! Where:
//! - πₖ = mixing weight (probability of component k)
//! - μₖ = mean of component k
//! - Σₖ = covariance matrix of component k
//!
//! # The EM Algorithm
//!
//! **E-step**: Compute "responsibilities" (soft assignments) in log space:
//! ```text
//! ln γₙₖ = ln πₖ + ln N(xₙ | μₖ, Σₖ) - logsumexpⱼ(ln πⱼ + ln N(xₙ | μⱼ, Σⱼ))
//! ```
//!
//! **M-step**: Update parameters using responsibilities, with Nₖ = Σₙ γₙₖ:
//! - πₖ = Nₖ / N
//! - μₖ = Σₙ γₙₖ xₙ / Nₖ
//! - Σₖ = Σₙ γₙₖ (xₙ - μₖ)(xₙ - μₖ)ᵀ / Nₖ + reg·I
//!
//! Each E/M round cannot lower the total log-likelihood Σₙ ln P(xₙ), so a
//! drop beyond rounding noise means the numerics have broken down.
//!
//! # Starting Points
//!
//! | [`InitMode`] | First step | Source of the starting point |
//! |--------------|------------|------------------------------|
//! | `Auto` | E-step | k-means++ partition, equal weights |
//! | `Supplied` | E-step | caller's means, covariances, weights |
//! | `Responsibilities` | M-step | caller's per-sample memberships |
//!
//! `Supplied` is what makes the coarse-then-refine workflow work: fit a
//! cheap diagonal model, then hand its [`MixtureParams`] to a full
//! covariance run.
//!
//! # Failure Modes
//!
//! - **Collapse**: a component's weight drains to zero. Fails with
//!   [`Degeneracy::CollapsedWeight`] unless pruning was requested.
//! - **Singular covariance**: a component shrinks onto too few points.
//!   `reg_covar` guards against it; if factorization still fails the fit
//!   fails with [`Degeneracy::NotPositiveDefinite`].
//! - **Local optima**: EM climbs to the nearest maximum; auto init runs
//!   several k-means++ restarts to start near a good one.

use super::gaussian::{argmax, cholesky, log_joint, logsumexp, GaussianFactor};
use super::kmeans::Kmeans;
use super::mixture::{FitStatus, Mixture};
use super::params::{scatter, weighted_mean, CovarianceMode, MixtureParams, WEIGHT_SUM_TOL};
use super::traits::{Clustering, SoftClustering};
use crate::error::{check_samples, Degeneracy, Error, Result};
use ndarray::{Array1, Array2};
use tracing::{debug, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Seed for k-means initialization when none is configured.
pub const DEFAULT_SEED: u64 = 0x5EED;

/// Allowed relative drop in log-likelihood before it counts as a regression.
const LIKELIHOOD_SLACK: f64 = 1e-6;

/// How EM obtains its starting point.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InitMode {
    /// Seed from a k-means++ partition of the samples.
    #[default]
    Auto,
    /// Start with an E-step on these parameters.
    Supplied(MixtureParams),
    /// Start with an M-step on this n_samples × n_components membership matrix.
    Responsibilities(Array2<f64>),
}

/// How the convergence tolerance is compared with the log-likelihood change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ToleranceKind {
    /// |ΔL| ≤ tol
    Absolute,
    /// |ΔL| ≤ tol · max(|L|, 1)
    #[default]
    Relative,
}

/// Gaussian Mixture Model trainer.
///
/// Holds configuration only; [`Gmm::fit`] returns a [`Mixture`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Gmm {
    /// Number of components.
    n_components: usize,
    /// Covariance constraint.
    covariance: CovarianceMode,
    /// Starting point.
    init: InitMode,
    /// Maximum EM iterations.
    max_iter: usize,
    /// Convergence tolerance on the log-likelihood change.
    tol: f64,
    tol_kind: ToleranceKind,
    /// Added to every covariance diagonal.
    reg_covar: f64,
    /// Weights below this count as collapsed.
    min_weight: f64,
    /// Seed for k-means initialization.
    seed: Option<u64>,
    /// k-means++ restarts for auto init.
    n_init: usize,
    /// Drop collapsed components instead of failing.
    prune_collapsed: bool,
}

impl Gmm {
    /// Create a trainer for `n_components` components.
    ///
    /// Defaults: diagonal covariance, auto init, 100 iterations, relative
    /// tolerance 1e-6, `reg_covar` 1e-6, `min_weight` 1e-6, 4 k-means
    /// restarts, no pruning.
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            covariance: CovarianceMode::Diagonal,
            init: InitMode::Auto,
            max_iter: 100,
            tol: 1e-6,
            tol_kind: ToleranceKind::Relative,
            reg_covar: 1e-6,
            min_weight: 1e-6,
            seed: None,
            n_init: 4,
            prune_collapsed: false,
        }
    }

    /// Set number of components.
    pub fn with_n_components(mut self, n: usize) -> Self {
        self.n_components = n;
        self
    }

    /// Set the covariance constraint.
    pub fn with_covariance(mut self, mode: CovarianceMode) -> Self {
        self.covariance = mode;
        self
    }

    /// Set the starting point.
    pub fn with_init(mut self, init: InitMode) -> Self {
        self.init = init;
        self
    }

    /// Warm start from `params` (shorthand for `InitMode::Supplied`).
    pub fn with_params(self, params: MixtureParams) -> Self {
        self.with_init(InitMode::Supplied(params))
    }

    /// Set maximum iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set convergence tolerance.
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Compare the tolerance absolutely or relatively.
    pub fn with_tol_kind(mut self, kind: ToleranceKind) -> Self {
        self.tol_kind = kind;
        self
    }

    /// Set covariance regularization.
    pub fn with_reg_covar(mut self, reg_covar: f64) -> Self {
        self.reg_covar = reg_covar;
        self
    }

    /// Set the collapse threshold on component weights.
    pub fn with_min_weight(mut self, min_weight: f64) -> Self {
        self.min_weight = min_weight;
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the number of k-means++ restarts used by auto init.
    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    /// Drop collapsed components and renormalize instead of failing.
    pub fn with_pruning(mut self, prune: bool) -> Self {
        self.prune_collapsed = prune;
        self
    }

    /// Configured number of components.
    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Configured covariance constraint.
    pub fn covariance_mode(&self) -> CovarianceMode {
        self.covariance
    }

    /// Fit a mixture to `samples`.
    ///
    /// # Errors
    ///
    /// Invalid-input errors for bad configuration, malformed samples, more
    /// components than samples, or a starting point that does not match the
    /// data. [`Error::Degenerate`] if training breaks down; the error carries
    /// the last parameters that passed.
    pub fn fit(&self, samples: &[Vec<f32>]) -> Result<Mixture> {
        self.check_config()?;
        let d = check_samples(samples)?;
        let n = samples.len();
        if self.n_components > n {
            return Err(Error::InvalidClusterCount {
                requested: self.n_components,
                n_items: n,
            });
        }

        let flat: Vec<f64> = samples.iter().flatten().map(|&v| f64::from(v)).collect();
        let data = Array2::from_shape_vec((n, d), flat).map_err(|e| Error::ShapeMismatch {
            expected: format!("{n}x{d}"),
            actual: e.to_string(),
        })?;

        let mut history: Vec<f64> = Vec::with_capacity(self.max_iter + 1);
        let mut accepted: Option<(MixtureParams, Vec<GaussianFactor>)> = None;

        let mut resp = if let InitMode::Responsibilities(r) = &self.init {
            self.check_responsibilities(r, n)?
        } else {
            let params = match &self.init {
                InitMode::Supplied(p) => self.supplied_params(p, d)?,
                _ => self.auto_params(samples, &data)?,
            };
            let factors = params.factorize().map_err(|component| {
                degenerate(Degeneracy::NotPositiveDefinite { component }, 0, None)
            })?;
            let (resp, ll) = e_step(&data, &params, &factors);
            self.check_likelihood(ll, None, 0, None)?;
            debug!(iteration = 0, log_likelihood = ll, "initial E-step");
            history.push(ll);
            accepted = Some((params, factors));
            resp
        };

        let mut status = FitStatus::MaxIterationsReached;
        let mut iterations = 0;

        for iteration in 1..=self.max_iter {
            let last_valid = accepted.as_ref().map(|(p, _)| p);
            let (params, pruned) = self.m_step(&data, &resp, iteration, last_valid)?;
            let factors = params.factorize().map_err(|component| {
                degenerate(
                    Degeneracy::NotPositiveDefinite { component },
                    iteration,
                    last_valid,
                )
            })?;
            let (next_resp, ll) = e_step(&data, &params, &factors);
            let previous = history.last().copied();
            self.check_likelihood(ll, previous.filter(|_| !pruned), iteration, last_valid)?;

            debug!(
                iteration,
                log_likelihood = ll,
                delta = previous.map_or(f64::NAN, |p| ll - p),
                n_components = params.n_components(),
                "EM iteration"
            );

            history.push(ll);
            resp = next_resp;
            accepted = Some((params, factors));
            iterations = iteration;

            if let Some(prev) = previous {
                if !pruned && self.converged(prev, ll) {
                    status = FitStatus::Converged;
                    break;
                }
            }
        }

        let (params, factors) =
            accepted.ok_or_else(|| Error::invalid("max_iter", "must be at least 1"))?;

        match status {
            FitStatus::Converged => info!(
                iterations,
                log_likelihood = history.last().copied().unwrap_or(f64::NAN),
                "EM converged"
            ),
            _ => warn!(
                max_iter = self.max_iter,
                log_likelihood = history.last().copied().unwrap_or(f64::NAN),
                "EM reached the iteration cap before converging"
            ),
        }

        let labels = resp
            .outer_iter()
            .map(|row| argmax(&row.to_vec()))
            .collect();

        Ok(Mixture::from_fit(
            params,
            factors,
            self.covariance,
            status,
            iterations,
            history,
            labels,
        ))
    }

    fn check_config(&self) -> Result<()> {
        if self.n_components == 0 {
            return Err(Error::invalid("n_components", "must be > 0"));
        }
        if self.max_iter == 0 {
            return Err(Error::invalid("max_iter", "must be > 0"));
        }
        if !self.tol.is_finite() || self.tol < 0.0 {
            return Err(Error::invalid("tol", "must be finite and non-negative"));
        }
        if !self.reg_covar.is_finite() || self.reg_covar < 0.0 {
            return Err(Error::invalid("reg_covar", "must be finite and non-negative"));
        }
        if !(0.0..1.0).contains(&self.min_weight) {
            return Err(Error::invalid("min_weight", "must lie in [0, 1)"));
        }
        Ok(())
    }

    /// k-means++ partition → per-group mean and covariance, equal weights.
    fn auto_params(&self, samples: &[Vec<f32>], data: &Array2<f64>) -> Result<MixtureParams> {
        let k = self.n_components;
        let (n, d) = data.dim();
        let fit = Kmeans::new(k)
            .with_seed(self.seed.unwrap_or(DEFAULT_SEED))
            .with_n_init(self.n_init)
            .fit(samples)?;

        let ones = Array1::from_elem(n, 1.0);
        let global_mean = weighted_mean(data.view(), ones.view(), n as f64);
        let global_cov = scatter(
            data.view(),
            ones.view(),
            n as f64,
            global_mean.view(),
            self.covariance,
            self.reg_covar,
        );

        let mut means = Array2::zeros((k, d));
        let mut covariances = Vec::with_capacity(k);
        for c in 0..k {
            let members: Array1<f64> = fit
                .labels
                .iter()
                .map(|&l| if l == c { 1.0 } else { 0.0 })
                .collect();
            let count = members.sum();

            let mean = if count > 0.0 {
                weighted_mean(data.view(), members.view(), count)
            } else {
                data.row(c * n / k).to_owned()
            };
            let mut cov = if count >= 2.0 {
                scatter(
                    data.view(),
                    members.view(),
                    count,
                    mean.view(),
                    self.covariance,
                    self.reg_covar,
                )
            } else {
                global_cov.clone()
            };
            if cholesky(cov.view()).is_none() {
                cov = global_cov.clone();
            }
            means.row_mut(c).assign(&mean);
            covariances.push(condition(cov, self.reg_covar));
        }

        debug!(
            n_components = k,
            inertia = fit.inertia,
            kmeans_iterations = fit.iterations,
            "seeded mixture from k-means"
        );
        Ok(MixtureParams::from_parts(
            means,
            covariances,
            Array1::from_elem(k, 1.0 / k as f64),
        ))
    }

    fn supplied_params(&self, params: &MixtureParams, d: usize) -> Result<MixtureParams> {
        params.validate()?;
        if params.n_components() != self.n_components {
            return Err(Error::ShapeMismatch {
                expected: format!("{} components", self.n_components),
                actual: format!("{} components", params.n_components()),
            });
        }
        if params.n_features() != d {
            return Err(Error::DimensionMismatch {
                expected: d,
                found: params.n_features(),
            });
        }
        let mut params = params.clone();
        params.project(self.covariance);
        Ok(params)
    }

    fn check_responsibilities(&self, resp: &Array2<f64>, n: usize) -> Result<Array2<f64>> {
        if resp.dim() != (n, self.n_components) {
            return Err(Error::ShapeMismatch {
                expected: format!("{}x{} responsibilities", n, self.n_components),
                actual: format!("{}x{} responsibilities", resp.nrows(), resp.ncols()),
            });
        }
        for (i, row) in resp.outer_iter().enumerate() {
            if row.iter().any(|r| !r.is_finite() || *r < 0.0) {
                return Err(Error::invalid(
                    "responsibilities",
                    format!("row {i} has negative or non-finite entries"),
                ));
            }
            if (row.sum() - 1.0).abs() > WEIGHT_SUM_TOL {
                return Err(Error::invalid(
                    "responsibilities",
                    format!("row {i} does not sum to 1"),
                ));
            }
        }
        Ok(resp.clone())
    }

    /// Re-estimate parameters from responsibilities. The flag reports
    /// whether any component was pruned.
    fn m_step(
        &self,
        data: &Array2<f64>,
        resp: &Array2<f64>,
        iteration: usize,
        last_valid: Option<&MixtureParams>,
    ) -> Result<(MixtureParams, bool)> {
        let n = data.nrows() as f64;
        let d = data.ncols();
        let mass: Vec<f64> = resp.columns().into_iter().map(|col| col.sum()).collect();

        let mut keep = Vec::with_capacity(mass.len());
        for (component, &nk) in mass.iter().enumerate() {
            let weight = nk / n;
            if nk > 0.0 && weight >= self.min_weight {
                keep.push(component);
            } else if self.prune_collapsed {
                warn!(component, weight, iteration, "pruning collapsed mixture component");
            } else {
                return Err(degenerate(
                    Degeneracy::CollapsedWeight { component, weight },
                    iteration,
                    last_valid,
                ));
            }
        }
        if keep.is_empty() {
            return Err(degenerate(Degeneracy::AllComponentsCollapsed, iteration, last_valid));
        }

        let kept_mass: f64 = keep.iter().map(|&c| mass[c]).sum();
        let mut means = Array2::zeros((keep.len(), d));
        let mut covariances = Vec::with_capacity(keep.len());
        let mut weights = Array1::zeros(keep.len());
        for (slot, &c) in keep.iter().enumerate() {
            let r = resp.column(c);
            let mean = weighted_mean(data.view(), r, mass[c]);
            covariances.push(scatter(
                data.view(),
                r,
                mass[c],
                mean.view(),
                self.covariance,
                self.reg_covar,
            ));
            means.row_mut(slot).assign(&mean);
            weights[slot] = mass[c] / kept_mass;
        }

        let pruned = keep.len() != mass.len();
        Ok((MixtureParams::from_parts(means, covariances, weights), pruned))
    }

    fn check_likelihood(
        &self,
        current: f64,
        previous: Option<f64>,
        iteration: usize,
        last_valid: Option<&MixtureParams>,
    ) -> Result<()> {
        if !current.is_finite() {
            return Err(degenerate(Degeneracy::NonFiniteLikelihood, iteration, last_valid));
        }
        if let Some(previous) = previous {
            if current < previous - LIKELIHOOD_SLACK * previous.abs().max(1.0) {
                return Err(degenerate(
                    Degeneracy::LikelihoodDecreased { previous, current },
                    iteration,
                    last_valid,
                ));
            }
        }
        Ok(())
    }

    fn converged(&self, previous: f64, current: f64) -> bool {
        let delta = (current - previous).abs();
        match self.tol_kind {
            ToleranceKind::Absolute => delta <= self.tol,
            ToleranceKind::Relative => delta <= self.tol * current.abs().max(1.0),
        }
    }
}

/// Smallest diagonal loading that makes `cov` factorizable.
///
/// Starts at max(reg, 1e-6 · mean variance, ε) and grows tenfold per retry.
fn condition(mut cov: Array2<f64>, reg: f64) -> Array2<f64> {
    if cholesky(cov.view()).is_some() {
        return cov;
    }
    let d = cov.nrows();
    let mean_var = cov.diag().iter().map(|v| v.abs()).sum::<f64>() / d as f64;
    let mut eps = reg.max(1e-6 * mean_var).max(f64::EPSILON);
    for _ in 0..32 {
        for j in 0..d {
            cov[[j, j]] += eps;
        }
        if cholesky(cov.view()).is_some() {
            break;
        }
        eps *= 10.0;
    }
    debug!(eps, "loaded singular initial covariance");
    cov
}

fn degenerate(reason: Degeneracy, iteration: usize, last_valid: Option<&MixtureParams>) -> Error {
    warn!(iteration, %reason, "mixture training degenerated");
    Error::Degenerate {
        reason,
        iteration,
        last_valid: last_valid.cloned().map(Box::new),
    }
}

/// Responsibilities and total log-likelihood under `params`.
///
/// Per-sample posteriors may be computed in parallel; the likelihood is
/// summed afterwards in sample order.
fn e_step(
    data: &Array2<f64>,
    params: &MixtureParams,
    factors: &[GaussianFactor],
) -> (Array2<f64>, f64) {
    let log_weights: Vec<f64> = params.weights().iter().map(|w| w.ln()).collect();
    let posterior = |i: usize| {
        let joint = log_joint(data.row(i), &log_weights, factors);
        let norm = logsumexp(&joint);
        (joint, norm)
    };

    #[cfg(feature = "parallel")]
    let rows: Vec<(Vec<f64>, f64)> = (0..data.nrows()).into_par_iter().map(posterior).collect();

    #[cfg(not(feature = "parallel"))]
    let rows: Vec<(Vec<f64>, f64)> = (0..data.nrows()).map(posterior).collect();

    let mut resp = Array2::zeros((data.nrows(), factors.len()));
    let mut total = 0.0;
    for (i, (joint, norm)) in rows.into_iter().enumerate() {
        total += norm;
        for (c, lp) in joint.into_iter().enumerate() {
            resp[[i, c]] = (lp - norm).exp();
        }
    }
    (resp, total)
}

impl Clustering for Gmm {
    fn fit_predict(&self, data: &[Vec<f32>]) -> Result<Vec<usize>> {
        Ok(self.fit(data)?.labels().to_vec())
    }

    fn n_clusters(&self) -> usize {
        self.n_components
    }
}

impl SoftClustering for Gmm {
    fn fit_predict_proba(&self, data: &[Vec<f32>]) -> Result<Vec<Vec<f64>>> {
        let mixture = self.fit(data)?;
        data.iter().map(|x| mixture.predict_proba(x)).collect()
    }
}
