//! Acquisition functions: turn a posterior `(mean, std)` into a score.
//!
//! All three collapse to pure exploitation as `std -> 0`: EI and PI compare
//! the mean against the incumbent, UCB reduces to the mean. None of them
//! divides by a zero standard deviation.

use bo_types::{AcquisitionKind, OptimizerConfig};

/// Standard deviations at or below this are treated as zero.
const STD_EPSILON: f64 = 1e-12;

// ---------- normal distribution helpers ----------

/// Gauss error function (Abramowitz & Stegun 7.1.26).
///
/// Maximum absolute error is about 1.5e-7, which bounds the precision of
/// EI and PI near decision boundaries.
pub fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

/// Standard normal cumulative distribution function.
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Standard normal probability density function.
pub fn norm_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

// ---------- acquisition functions ----------

/// `EI = (μ - best - ξ)·Φ(z) + σ·φ(z)`, `z = (μ - best - ξ) / σ`; 0 when `σ = 0`.
pub fn expected_improvement(mean: f64, std: f64, best: f64, xi: f64) -> f64 {
    if !(std > STD_EPSILON) {
        return 0.0;
    }
    let improvement = mean - best - xi;
    let z = improvement / std;
    (improvement * norm_cdf(z) + std * norm_pdf(z)).max(0.0)
}

/// `UCB = μ + κ·σ`.
pub fn upper_confidence_bound(mean: f64, std: f64, kappa: f64) -> f64 {
    if !(std > STD_EPSILON) {
        return mean;
    }
    mean + kappa * std
}

/// `PI = Φ(z)` with the same `z` as EI; a step function when `σ = 0`.
pub fn probability_of_improvement(mean: f64, std: f64, best: f64, xi: f64) -> f64 {
    let improvement = mean - best - xi;
    if !(std > STD_EPSILON) {
        return if improvement > 0.0 { 1.0 } else { 0.0 };
    }
    norm_cdf(improvement / std)
}

/// An acquisition function with its exploration parameter bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acquisition {
    pub kind: AcquisitionKind,
    /// ξ for EI/PI, κ for UCB.
    pub exploration: f64,
}

impl Acquisition {
    pub fn new(kind: AcquisitionKind, exploration: f64) -> Self {
        Self { kind, exploration }
    }

    pub fn from_config(config: &OptimizerConfig) -> Self {
        Self::new(config.acquisition, config.exploration())
    }

    /// Exploration widened for the `slot`-th candidate of a batch.
    pub fn widened(self, slot: usize) -> Self {
        Self {
            exploration: self.exploration * (1 + slot) as f64,
            ..self
        }
    }

    /// Score a candidate; `best` is the incumbent on the maximisation scale.
    pub fn score(&self, mean: f64, std: f64, best: f64) -> f64 {
        match self.kind {
            AcquisitionKind::ExpectedImprovement => {
                expected_improvement(mean, std, best, self.exploration)
            }
            AcquisitionKind::UpperConfidenceBound => {
                upper_confidence_bound(mean, std, self.exploration)
            }
            AcquisitionKind::ProbabilityOfImprovement => {
                probability_of_improvement(mean, std, best, self.exploration)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KINDS: [AcquisitionKind; 3] = [
        AcquisitionKind::ExpectedImprovement,
        AcquisitionKind::UpperConfidenceBound,
        AcquisitionKind::ProbabilityOfImprovement,
    ];

    #[test]
    fn erf_matches_reference_values() {
        let reference = [
            (0.0, 0.0),
            (0.5, 0.520_499_877_8),
            (1.0, 0.842_700_792_9),
            (2.0, 0.995_322_265_0),
            (-1.0, -0.842_700_792_9),
        ];
        for (x, expected) in reference {
            assert!((erf(x) - expected).abs() < 2e-7, "erf({x}) = {}", erf(x));
        }
    }

    #[test]
    fn normal_cdf_is_symmetric() {
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((norm_cdf(1.96) - 0.975).abs() < 1e-3);
        for x in [0.3, 1.0, 2.5] {
            assert!((norm_cdf(x) + norm_cdf(-x) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn zero_std_collapses_to_exploitation() {
        assert_eq!(expected_improvement(2.0, 0.0, 1.0, 0.01), 0.0);
        assert_eq!(upper_confidence_bound(2.0, 0.0, 2.0), 2.0);
        assert_eq!(probability_of_improvement(2.0, 0.0, 1.0, 0.01), 1.0);
        assert_eq!(probability_of_improvement(0.5, 0.0, 1.0, 0.01), 0.0);

        for kind in KINDS {
            let acq = Acquisition::new(kind, kind.default_exploration());
            assert!(acq.score(1.0, 0.0, 1.0).is_finite());
            assert!(acq.score(1.0, f64::NAN, 1.0).is_finite());
        }
    }

    #[test]
    fn scores_non_decreasing_in_mean() {
        for kind in KINDS {
            let acq = Acquisition::new(kind, kind.default_exploration());
            for std in [0.05, 0.5, 2.0] {
                let mut prev = f64::NEG_INFINITY;
                for step in 0..80 {
                    let mean = -4.0 + step as f64 * 0.1;
                    let s = acq.score(mean, std, 0.0);
                    assert!(s >= prev - 1e-12, "{kind} at mean {mean}, std {std}");
                    prev = s;
                }
            }
        }
    }

    #[test]
    fn ucb_non_decreasing_in_std() {
        let acq = Acquisition::new(AcquisitionKind::UpperConfidenceBound, 2.0);
        let mut prev = f64::NEG_INFINITY;
        for step in 0..50 {
            let s = acq.score(0.3, step as f64 * 0.1, 0.0);
            assert!(s >= prev);
            prev = s;
        }
    }

    #[test]
    fn ei_rewards_uncertainty_below_incumbent() {
        let low = expected_improvement(0.0, 0.1, 1.0, 0.0);
        let high = expected_improvement(0.0, 1.0, 1.0, 0.0);
        assert!(high > low);
        assert!(low >= 0.0);
    }

    #[test]
    fn widening_scales_exploration() {
        let acq = Acquisition::new(AcquisitionKind::UpperConfidenceBound, 2.0);
        assert_eq!(acq.widened(0).exploration, 2.0);
        assert_eq!(acq.widened(2).exploration, 6.0);
        assert_eq!(acq.widened(2).kind, acq.kind);
    }
}
