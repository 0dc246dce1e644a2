//! A fitted Gaussian mixture: parameters, training record, prediction.

use super::gaussian::{argmax, log_joint, logsumexp, GaussianFactor};
use super::params::{CovarianceMode, MixtureParams};
use crate::error::{check_query, check_samples, Error, Result};
use ndarray::{Array1, Array2};
use tracing::debug;

/// How a [`Mixture`] came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStatus {
    /// Log-likelihood change fell within tolerance.
    Converged,
    /// Iteration cap reached first; the parameters are the last EM iterate.
    MaxIterationsReached,
    /// Built from stored parameters with [`Mixture::from_params`].
    Restored,
}

impl FitStatus {
    /// True only for [`FitStatus::Converged`].
    pub fn is_converged(self) -> bool {
        self == FitStatus::Converged
    }
}

/// Gaussian mixture ready for prediction.
#[derive(Debug, Clone)]
pub struct Mixture {
    params: MixtureParams,
    covariance: CovarianceMode,
    factors: Vec<GaussianFactor>,
    log_weights: Vec<f64>,
    status: FitStatus,
    iterations: usize,
    log_likelihood: Vec<f64>,
    labels: Vec<usize>,
}

impl Mixture {
    /// Rebuild a predictor from stored parameters.
    ///
    /// Covariances are projected onto `covariance` before factorization.
    pub fn from_params(mut params: MixtureParams, covariance: CovarianceMode) -> Result<Self> {
        params.validate()?;
        params.project(covariance);
        let factors = params.factorize().map_err(|c| {
            Error::invalid("covariances", format!("covariance {c} is not positive definite"))
        })?;
        debug!(
            n_components = params.n_components(),
            n_features = params.n_features(),
            "restored mixture"
        );
        Ok(Self::from_fit(
            params,
            factors,
            covariance,
            FitStatus::Restored,
            0,
            Vec::new(),
            Vec::new(),
        ))
    }

    pub(crate) fn from_fit(
        params: MixtureParams,
        factors: Vec<GaussianFactor>,
        covariance: CovarianceMode,
        status: FitStatus,
        iterations: usize,
        log_likelihood: Vec<f64>,
        labels: Vec<usize>,
    ) -> Self {
        let log_weights = params.weights().iter().map(|w| w.ln()).collect();
        Self {
            params,
            covariance,
            factors,
            log_weights,
            status,
            iterations,
            log_likelihood,
            labels,
        }
    }

    /// Number of components.
    pub fn n_components(&self) -> usize {
        self.params.n_components()
    }

    /// Dimensionality of the samples.
    pub fn n_features(&self) -> usize {
        self.params.n_features()
    }

    /// Component means, one row per component.
    pub fn means(&self) -> &Array2<f64> {
        self.params.means()
    }

    /// Component covariance matrices.
    pub fn covariances(&self) -> &[Array2<f64>] {
        self.params.covariances()
    }

    /// Mixing weights (sum to 1).
    pub fn weights(&self) -> &Array1<f64> {
        self.params.weights()
    }

    /// All parameters, e.g. to persist them or to seed another fit.
    pub fn params(&self) -> &MixtureParams {
        &self.params
    }

    /// Consume the model, keeping only its parameters.
    pub fn into_params(self) -> MixtureParams {
        self.params
    }

    /// Covariance constraint the model was fitted under.
    pub fn covariance_mode(&self) -> CovarianceMode {
        self.covariance
    }

    /// How training ended.
    pub fn status(&self) -> FitStatus {
        self.status
    }

    /// EM iterations performed (one M-step plus one E-step each).
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Total training log-likelihood after every E-step, oldest first.
    pub fn log_likelihood_history(&self) -> &[f64] {
        &self.log_likelihood
    }

    /// Training log-likelihood under the final parameters.
    pub fn final_log_likelihood(&self) -> Option<f64> {
        self.log_likelihood.last().copied()
    }

    /// Most probable component of each training sample (empty when restored).
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Index of the component with the highest posterior for `sample`.
    ///
    /// Ties resolve to the lowest component index.
    pub fn predict(&self, sample: &[f32]) -> Result<usize> {
        let x = self.to_point(sample)?;
        Ok(argmax(&log_joint(x.view(), &self.log_weights, &self.factors)))
    }

    /// Posterior probability of each component for `sample`.
    pub fn predict_proba(&self, sample: &[f32]) -> Result<Vec<f64>> {
        let x = self.to_point(sample)?;
        let joint = log_joint(x.view(), &self.log_weights, &self.factors);
        let norm = logsumexp(&joint);
        Ok(joint.iter().map(|lp| (lp - norm).exp()).collect())
    }

    /// [`predict`](Self::predict) for every row.
    pub fn predict_batch(&self, samples: &[Vec<f32>]) -> Result<Vec<usize>> {
        self.check_batch(samples)?;
        samples.iter().map(|s| self.predict(s)).collect()
    }

    /// Log density of `sample` under the whole mixture.
    pub fn score_sample(&self, sample: &[f32]) -> Result<f64> {
        let x = self.to_point(sample)?;
        Ok(logsumexp(&log_joint(x.view(), &self.log_weights, &self.factors)))
    }

    /// Total log-likelihood of `samples`, summed in order.
    pub fn log_likelihood(&self, samples: &[Vec<f32>]) -> Result<f64> {
        self.check_batch(samples)?;
        samples.iter().map(|s| self.score_sample(s)).sum()
    }

    fn check_batch(&self, samples: &[Vec<f32>]) -> Result<()> {
        let d = check_samples(samples)?;
        if d != self.n_features() {
            return Err(Error::DimensionMismatch {
                expected: self.n_features(),
                found: d,
            });
        }
        Ok(())
    }

    fn to_point(&self, sample: &[f32]) -> Result<Array1<f64>> {
        check_query(0, sample, self.n_features())?;
        Ok(sample.iter().map(|&v| f64::from(v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn grid_params() -> MixtureParams {
        MixtureParams::new(
            array![[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]],
            vec![Array2::eye(2), Array2::eye(2), Array2::eye(2)],
            array![0.5, 0.25, 0.25],
        )
        .unwrap()
    }

    #[test]
    fn test_restored_predict() {
        let m = Mixture::from_params(grid_params(), CovarianceMode::Full).unwrap();
        assert_eq!(m.status(), FitStatus::Restored);
        assert!(!m.status().is_converged());
        assert_eq!(m.predict(&[0.5, 0.5]).unwrap(), 0);
        assert_eq!(m.predict(&[9.0, 1.0]).unwrap(), 1);
        assert_eq!(m.predict(&[1.0, 9.0]).unwrap(), 2);
        assert!(m.labels().is_empty());
    }

    #[test]
    fn test_predict_tie_goes_to_lowest_index() {
        let params = MixtureParams::new(
            array![[-1.0], [1.0]],
            vec![Array2::eye(1), Array2::eye(1)],
            array![0.5, 0.5],
        )
        .unwrap();
        let m = Mixture::from_params(params, CovarianceMode::Diagonal).unwrap();
        assert_eq!(m.predict(&[0.0]).unwrap(), 0);
        let proba = m.predict_proba(&[0.0]).unwrap();
        assert!((proba[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_predict_proba_sums_to_one() {
        let m = Mixture::from_params(grid_params(), CovarianceMode::Full).unwrap();
        for x in [[0.0f32, 0.0], [5.0, 5.0], [3.0, -2.0]] {
            let p = m.predict_proba(&x).unwrap();
            assert_eq!(p.len(), 3);
            assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_score_and_log_likelihood() {
        let params = MixtureParams::new(array![[0.0]], vec![Array2::eye(1)], array![1.0]).unwrap();
        let m = Mixture::from_params(params, CovarianceMode::Spherical).unwrap();
        let half_ln_2pi = 0.5 * (2.0 * std::f64::consts::PI).ln();
        assert!((m.score_sample(&[0.0]).unwrap() + half_ln_2pi).abs() < 1e-12);

        let ll = m.log_likelihood(&[vec![0.0], vec![1.0]]).unwrap();
        assert!((ll - (-2.0 * half_ln_2pi - 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_wrong_dimension() {
        let m = Mixture::from_params(grid_params(), CovarianceMode::Full).unwrap();
        assert!(matches!(
            m.predict(&[1.0]),
            Err(Error::DimensionMismatch { expected: 2, found: 1 })
        ));
        assert!(matches!(
            m.predict_batch(&[vec![1.0, 2.0, 3.0]]),
            Err(Error::DimensionMismatch { expected: 2, found: 3 })
        ));
    }

    #[test]
    fn test_from_params_projects_covariance() {
        let params = MixtureParams::new(
            array![[0.0, 0.0]],
            vec![array![[2.0, 1.0], [1.0, 2.0]]],
            array![1.0],
        )
        .unwrap();
        let m = Mixture::from_params(params, CovarianceMode::Diagonal).unwrap();
        assert_eq!(m.covariances()[0], array![[2.0, 0.0], [0.0, 2.0]]);
        assert_eq!(m.covariance_mode(), CovarianceMode::Diagonal);
    }
}
