//! Optimizer run configuration.

use serde::{Deserialize, Serialize};

use crate::config_error;
use crate::errors::{BoError, BoResult};

/// Whether we are maximizing or minimizing the objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveDirection {
    #[default]
    Maximize,
    Minimize,
}

impl ObjectiveDirection {
    /// Map a raw objective onto the "larger is better" scale used internally.
    pub fn orient(self, objective: f64) -> f64 {
        match self {
            Self::Maximize => objective,
            Self::Minimize => -objective,
        }
    }

    /// Whether `candidate` beats `incumbent` (both raw objectives).
    pub fn improves(self, candidate: f64, incumbent: f64) -> bool {
        self.orient(candidate) > self.orient(incumbent)
    }
}

/// Acquisition function used to rank candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AcquisitionKind {
    #[default]
    #[serde(rename = "ei")]
    ExpectedImprovement,
    #[serde(rename = "ucb")]
    UpperConfidenceBound,
    #[serde(rename = "pi")]
    ProbabilityOfImprovement,
}

impl AcquisitionKind {
    /// Default exploration parameter: ξ for EI/PI, κ for UCB.
    pub fn default_exploration(self) -> f64 {
        match self {
            Self::ExpectedImprovement | Self::ProbabilityOfImprovement => 0.01,
            Self::UpperConfidenceBound => 2.0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ExpectedImprovement => "ei",
            Self::UpperConfidenceBound => "ucb",
            Self::ProbabilityOfImprovement => "pi",
        }
    }
}

impl std::fmt::Display for AcquisitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Gaussian-process surrogate settings.
///
/// Noise variances are relative to the signal variance: the surrogate fits
/// standardized targets, so `1e-6` means one part in a million of the
/// objective's variance whatever its magnitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpConfig {
    /// Noise variance added to the kernel diagonal on the first fit attempt.
    /// Raised to `noise_floor` if smaller.
    pub initial_noise_variance: f64,
    /// Smallest noise variance the surrogate will ever use.
    pub noise_floor: f64,
    /// Fit attempts (doubling the noise each time) before giving up.
    pub max_fit_attempts: usize,
    /// Use the sample mean of the targets as the prior mean.
    pub center_targets: bool,
}

impl GpConfig {
    pub const DEFAULT_NOISE_FLOOR: f64 = 1e-6;
}

impl Default for GpConfig {
    fn default() -> Self {
        Self {
            initial_noise_variance: Self::DEFAULT_NOISE_FLOOR,
            noise_floor: Self::DEFAULT_NOISE_FLOOR,
            max_fit_attempts: 12,
            center_targets: true,
        }
    }
}

/// Top-level configuration for an optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Budget of guided (post-seeding) iterations.
    pub max_iterations: usize,

    /// Random configurations evaluated before the surrogate is consulted.
    pub n_initial_samples: usize,

    #[serde(rename = "acquisition_function")]
    pub acquisition: AcquisitionKind,

    /// ξ for EI/PI, κ for UCB. `None` uses the acquisition's default.
    pub exploration_param: Option<f64>,

    /// Candidates proposed per iteration. `None` means one per worker.
    pub batch_size: Option<usize>,

    /// How many objective evaluations may run at once.
    pub parallel_evaluations: usize,

    /// Random candidates scored per acquisition search.
    pub candidate_pool_size: usize,

    /// Converged once the convergence score exceeds `1 - threshold`.
    pub convergence_threshold: f64,

    /// Convergence tracker window. Convergence is only declared once more
    /// than this many guided iterations have run.
    pub convergence_window: usize,

    /// Guided iterations without improvement before stopping.
    pub patience: usize,

    pub min_improvement: f64,

    pub direction: ObjectiveDirection,

    pub seed: Option<u64>,

    pub surrogate: GpConfig,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            n_initial_samples: 10,
            acquisition: AcquisitionKind::ExpectedImprovement,
            exploration_param: None,
            batch_size: None,
            parallel_evaluations: 1,
            candidate_pool_size: 1000,
            convergence_threshold: 0.01,
            convergence_window: 10,
            patience: 10,
            min_improvement: 1e-4,
            direction: ObjectiveDirection::Maximize,
            seed: None,
            surrogate: GpConfig::default(),
        }
    }
}

impl OptimizerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document and validate it.
    pub fn from_json_str(json: &str) -> BoResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn with_initial_samples(mut self, n: usize) -> Self {
        self.n_initial_samples = n;
        self
    }

    pub fn with_acquisition(mut self, kind: AcquisitionKind) -> Self {
        self.acquisition = kind;
        self
    }

    pub fn with_exploration(mut self, param: f64) -> Self {
        self.exploration_param = Some(param);
        self
    }

    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = Some(n);
        self
    }

    pub fn with_parallel_evaluations(mut self, n: usize) -> Self {
        self.parallel_evaluations = n;
        self
    }

    pub fn with_candidate_pool(mut self, n: usize) -> Self {
        self.candidate_pool_size = n;
        self
    }

    pub fn with_convergence(mut self, threshold: f64, window: usize) -> Self {
        self.convergence_threshold = threshold;
        self.convergence_window = window;
        self
    }

    pub fn with_patience(mut self, patience: usize, min_improvement: f64) -> Self {
        self.patience = patience;
        self.min_improvement = min_improvement;
        self
    }

    pub fn with_direction(mut self, direction: ObjectiveDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_surrogate(mut self, surrogate: GpConfig) -> Self {
        self.surrogate = surrogate;
        self
    }

    /// Effective exploration parameter for the configured acquisition.
    pub fn exploration(&self) -> f64 {
        self.exploration_param
            .unwrap_or_else(|| self.acquisition.default_exploration())
    }

    /// Effective number of candidates per iteration.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.unwrap_or(self.parallel_evaluations)
    }

    pub fn validate(&self) -> Result<(), BoError> {
        if self.parallel_evaluations == 0 {
            return Err(config_error!("parallel_evaluations must be at least 1"));
        }
        if self.effective_batch_size() == 0 {
            return Err(config_error!("batch_size must be at least 1"));
        }
        if self.candidate_pool_size == 0 {
            return Err(config_error!("candidate_pool_size must be at least 1"));
        }
        if self.effective_batch_size() > self.candidate_pool_size {
            return Err(config_error!(
                "batch_size ({}) exceeds candidate_pool_size ({})",
                self.effective_batch_size(),
                self.candidate_pool_size
            ));
        }
        if self.convergence_window == 0 {
            return Err(config_error!("convergence_window must be at least 1"));
        }
        let exploration = self.exploration();
        if !exploration.is_finite() || exploration < 0.0 {
            return Err(config_error!(
                "exploration_param must be finite and non-negative, got {exploration}"
            ));
        }
        if !(0.0..=1.0).contains(&self.convergence_threshold) {
            return Err(config_error!(
                "convergence_threshold must be in [0, 1], got {}",
                self.convergence_threshold
            ));
        }
        if !self.min_improvement.is_finite() || self.min_improvement < 0.0 {
            return Err(config_error!(
                "min_improvement must be finite and non-negative, got {}",
                self.min_improvement
            ));
        }
        let noise = self.surrogate.initial_noise_variance;
        if !noise.is_finite() || noise <= 0.0 {
            return Err(config_error!(
                "surrogate.initial_noise_variance must be positive, got {noise}"
            ));
        }
        let floor = self.surrogate.noise_floor;
        if !floor.is_finite() || floor <= 0.0 {
            return Err(config_error!(
                "surrogate.noise_floor must be positive, got {floor}"
            ));
        }
        if self.surrogate.max_fit_attempts == 0 {
            return Err(config_error!("surrogate.max_fit_attempts must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = OptimizerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.exploration(), 0.01);
        assert_eq!(config.effective_batch_size(), 1);
    }

    #[test]
    fn builder_chain() {
        let config = OptimizerConfig::new()
            .with_max_iterations(30)
            .with_initial_samples(5)
            .with_acquisition(AcquisitionKind::UpperConfidenceBound)
            .with_parallel_evaluations(4)
            .with_seed(42);
        assert_eq!(config.max_iterations, 30);
        assert_eq!(config.exploration(), 2.0);
        assert_eq!(config.effective_batch_size(), 4);
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(OptimizerConfig::new()
            .with_parallel_evaluations(0)
            .validate()
            .is_err());
        assert!(OptimizerConfig::new().with_batch_size(0).validate().is_err());
        assert!(OptimizerConfig::new()
            .with_exploration(-1.0)
            .validate()
            .is_err());
        assert!(OptimizerConfig::new()
            .with_convergence(1.5, 10)
            .validate()
            .is_err());
        assert!(OptimizerConfig::new()
            .with_convergence(0.01, 0)
            .validate()
            .is_err());
        assert!(OptimizerConfig::new()
            .with_surrogate(GpConfig {
                noise_floor: 0.0,
                ..GpConfig::default()
            })
            .validate()
            .is_err());
    }

    #[test]
    fn parses_partial_json() {
        let config = OptimizerConfig::from_json_str(
            r#"{"max_iterations": 30, "acquisition_function": "pi", "direction": "minimize"}"#,
        )
        .unwrap();
        assert_eq!(config.max_iterations, 30);
        assert_eq!(config.acquisition, AcquisitionKind::ProbabilityOfImprovement);
        assert_eq!(config.direction, ObjectiveDirection::Minimize);
        assert_eq!(config.n_initial_samples, 10);

        assert!(OptimizerConfig::from_json_str(r#"{"parallel_evaluations": 0}"#).is_err());
    }

    #[test]
    fn direction_orients_objectives() {
        assert!(ObjectiveDirection::Maximize.improves(2.0, 1.0));
        assert!(ObjectiveDirection::Minimize.improves(1.0, 2.0));
        assert_eq!(ObjectiveDirection::Minimize.orient(3.0), -3.0);
    }
}
