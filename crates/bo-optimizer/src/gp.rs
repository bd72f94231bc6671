//! Gaussian-process surrogate with an ARD squared-exponential kernel.
//!
//! `fit` rebuilds everything from the training set:
//!
//! 1. targets are standardized: centred on their mean and divided by their
//!    standard deviation, so the signal variance of the fitted kernel is 1
//!    and `predict` rescales by the empirical target variance;
//! 2. per-dimension length scales = empirical std of the inputs (1.0 when
//!    degenerate);
//! 3. `K[i][j] = exp(-½ Σ_d ((x_d - x'_d) / ℓ_d)²)` plus noise on the
//!    diagonal;
//! 4. Cholesky factor `L` of `K`. A failed factorisation doubles the noise
//!    and retries, up to `GpConfig::max_fit_attempts`.
//!
//! With no training data the surrogate reports the prior: mean 0, variance 1.

use nalgebra::{Cholesky, DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use bo_types::{GpConfig, SurrogateError};

/// Smallest variance `predict` will report.
pub const VARIANCE_FLOOR: f64 = 1e-10;

/// Length scales and signal variances below this are treated as degenerate.
const DEGENERATE: f64 = 1e-9;

/// Kernel hyperparameters estimated on each fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelHyperparameters {
    pub length_scales: Vec<f64>,
    /// Empirical variance of the targets, in objective units (1.0 when
    /// degenerate).
    pub signal_variance: f64,
    /// Diagonal noise, as a fraction of `signal_variance`.
    pub noise_variance: f64,
}

impl KernelHyperparameters {
    fn estimate(inputs: &[Vec<f64>], targets: &[f64], noise_variance: f64) -> Self {
        let width = inputs.first().map_or(0, Vec::len);
        let length_scales = (0..width)
            .map(|d| {
                let std = population_variance(inputs.iter().map(|x| x[d])).sqrt();
                if std.is_finite() && std > DEGENERATE {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        let var = population_variance(targets.iter().copied());
        let signal_variance = if var.is_finite() && var > DEGENERATE {
            var
        } else {
            1.0
        };

        Self {
            length_scales,
            signal_variance,
            noise_variance,
        }
    }

    /// Unit-variance squared-exponential kernel.
    pub fn correlation(&self, a: &[f64], b: &[f64]) -> f64 {
        let mut r_sq = 0.0;
        for ((x, y), ls) in a.iter().zip(b).zip(&self.length_scales) {
            let diff = (x - y) / ls;
            r_sq += diff * diff;
        }
        (-0.5 * r_sq).exp()
    }
}

fn population_variance(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let n = values.clone().count();
    if n == 0 {
        return 0.0;
    }
    let mean = values.clone().sum::<f64>() / n as f64;
    values.map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64
}

/// Posterior mean and variance at one point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub mean: f64,
    pub variance: f64,
}

impl Prediction {
    pub const PRIOR: Self = Self {
        mean: 0.0,
        variance: 1.0,
    };

    pub fn std(&self) -> f64 {
        self.variance.sqrt()
    }
}

/// Everything derived from one fit.
#[derive(Debug, Clone)]
struct FittedState {
    hyper: KernelHyperparameters,
    inputs: Vec<Vec<f64>>,
    target_mean: f64,
    target_scale: f64,
    /// Lower Cholesky factor of the standardized kernel matrix.
    lower: DMatrix<f64>,
    /// Solution of `K·α = (y - target_mean) / target_scale`.
    alpha: DVector<f64>,
    attempts: usize,
}

/// Exact-inference GP regression over encoded configuration vectors.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    config: GpConfig,
    state: Option<FittedState>,
}

impl GaussianProcess {
    pub fn new(config: GpConfig) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Rebuild the surrogate from scratch on `(inputs, targets)`.
    pub fn fit(&mut self, inputs: &[Vec<f64>], targets: &[f64]) -> Result<(), SurrogateError> {
        if inputs.len() != targets.len() {
            return Err(SurrogateError::MismatchedData {
                inputs: inputs.len(),
                targets: targets.len(),
            });
        }
        if let Some(index) = targets.iter().position(|t| !t.is_finite()) {
            return Err(SurrogateError::NonFiniteTarget { index });
        }
        let width = inputs.first().map_or(0, Vec::len);
        if let Some((index, x)) = inputs.iter().enumerate().find(|(_, x)| x.len() != width) {
            return Err(SurrogateError::InconsistentWidth {
                index,
                expected: width,
                got: x.len(),
            });
        }

        if inputs.is_empty() {
            self.state = None;
            return Ok(());
        }

        let n = inputs.len();
        let mut noise = self
            .config
            .initial_noise_variance
            .max(self.config.noise_floor);
        let mut hyper = KernelHyperparameters::estimate(inputs, targets, noise);

        let target_mean = if self.config.center_targets {
            targets.iter().sum::<f64>() / n as f64
        } else {
            0.0
        };
        let target_scale = hyper.signal_variance.sqrt();
        let standardized =
            DVector::from_iterator(n, targets.iter().map(|t| (t - target_mean) / target_scale));
        let correlations =
            DMatrix::from_fn(n, n, |i, j| hyper.correlation(&inputs[i], &inputs[j]));

        for attempt in 1..=self.config.max_fit_attempts {
            if attempt > 1 {
                noise *= 2.0;
            }
            hyper.noise_variance = noise;
            let k = &correlations + DMatrix::from_diagonal_element(n, n, noise);

            match Cholesky::new(k) {
                Some(cholesky) => {
                    let alpha = cholesky.solve(&standardized);
                    debug!(
                        observations = n,
                        attempt,
                        noise_variance = noise,
                        signal_variance = hyper.signal_variance,
                        "surrogate fitted"
                    );
                    self.state = Some(FittedState {
                        hyper,
                        inputs: inputs.to_vec(),
                        target_mean,
                        target_scale,
                        lower: cholesky.unpack(),
                        alpha,
                        attempts: attempt,
                    });
                    return Ok(());
                }
                None => {
                    warn!(
                        attempt,
                        noise_variance = noise,
                        "kernel matrix not positive definite, inflating noise"
                    );
                }
            }
        }

        self.state = None;
        Err(SurrogateError::NotPositiveDefinite {
            attempts: self.config.max_fit_attempts,
            noise_variance: noise,
        })
    }

    /// Posterior mean and variance for each candidate vector, in objective
    /// units.
    pub fn predict(&self, candidates: &[Vec<f64>]) -> Vec<Prediction> {
        let Some(state) = &self.state else {
            return vec![Prediction::PRIOR; candidates.len()];
        };

        let n = state.inputs.len();
        candidates
            .iter()
            .map(|x| {
                let k_star = DVector::from_iterator(
                    n,
                    state.inputs.iter().map(|xi| state.hyper.correlation(x, xi)),
                );
                let mean = state.target_mean + state.target_scale * k_star.dot(&state.alpha);
                // L·v = k*, so |v|² = k*ᵗ K⁻¹ k*.
                let explained = state
                    .lower
                    .solve_lower_triangular(&k_star)
                    .map_or(0.0, |v| v.norm_squared());
                let variance =
                    (state.hyper.signal_variance * (1.0 - explained)).max(VARIANCE_FLOOR);
                Prediction { mean, variance }
            })
            .collect()
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    pub fn hyperparameters(&self) -> Option<&KernelHyperparameters> {
        self.state.as_ref().map(|s| &s.hyper)
    }

    /// Attempts the last successful fit needed.
    pub fn fit_attempts(&self) -> Option<usize> {
        self.state.as_ref().map(|s| s.attempts)
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}

impl Default for GaussianProcess {
    fn default() -> Self {
        Self::new(GpConfig::default())
    }
}
