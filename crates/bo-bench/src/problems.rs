//! Built-in benchmark objectives.
//!
//! Every problem is phrased for maximization; the classic minimization
//! benchmarks are negated so their best value is `-f(x*)`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bo_optimizer::Objective;
use bo_types::{Configuration, Evaluation, EvaluationError, Space, SpaceError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProblemError {
    #[error("Missing parameter: {name}")]
    MissingParameter { name: String },

    #[error("Parameter {name} is not numeric")]
    NotNumeric { name: String },

    #[error("Parameter {name} has unknown choice {value}")]
    UnknownChoice { name: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Problem {
    /// `-(x - 2)²` on `[-5, 5]`; best 0 at `x = 2`.
    Quadratic,
    /// Negated Branin on `[-5, 10] × [0, 15]`; best ≈ -0.397887.
    Branin,
    /// Negated Rosenbrock on `[-2, 2]²`; best 0 at `(1, 1)`.
    Rosenbrock,
    /// Synthetic training score over optimizer, log learning rate and depth.
    Mixed,
}

impl Problem {
    pub fn name(self) -> &'static str {
        match self {
            Self::Quadratic => "quadratic",
            Self::Branin => "branin",
            Self::Rosenbrock => "rosenbrock",
            Self::Mixed => "mixed",
        }
    }

    /// Search space the problem is defined on.
    pub fn space(self) -> Result<Space, SpaceError> {
        match self {
            Self::Quadratic => Space::builder().continuous("x", -5.0, 5.0).build(),
            Self::Branin => Space::builder()
                .continuous("x1", -5.0, 10.0)
                .continuous("x2", 0.0, 15.0)
                .build(),
            Self::Rosenbrock => Space::builder()
                .continuous("x", -2.0, 2.0)
                .continuous("y", -2.0, 2.0)
                .build(),
            Self::Mixed => Space::builder()
                .categorical("optimizer", ["sgd", "adam", "rmsprop"])
                .log_continuous("learning_rate", 1e-5, 1e-1)
                .int_range("layers", 1, 4)
                .build(),
        }
    }

    /// Known best value, used to report regret.
    pub fn optimum(self) -> f64 {
        match self {
            Self::Quadratic | Self::Rosenbrock => 0.0,
            Self::Branin => -0.397_887,
            Self::Mixed => 1.0,
        }
    }

    pub fn score(self, config: &Configuration) -> Result<f64, ProblemError> {
        match self {
            Self::Quadratic => {
                let x = number(config, "x")?;
                Ok(-(x - 2.0).powi(2))
            }
            Self::Branin => {
                let (x1, x2) = (number(config, "x1")?, number(config, "x2")?);
                Ok(-branin(x1, x2))
            }
            Self::Rosenbrock => {
                let (x, y) = (number(config, "x")?, number(config, "y")?);
                Ok(-((1.0 - x).powi(2) + 100.0 * (y - x * x).powi(2)))
            }
            Self::Mixed => {
                let optimizer = choice(config, "optimizer")?;
                let base = match optimizer {
                    "adam" => 1.0,
                    "rmsprop" => 0.8,
                    "sgd" => 0.6,
                    other => {
                        return Err(ProblemError::UnknownChoice {
                            name: "optimizer".to_string(),
                            value: other.to_string(),
                        })
                    }
                };
                let lr = number(config, "learning_rate")?;
                let layers = number(config, "layers")?;
                Ok(base - 0.1 * (lr.log10() + 3.0).powi(2) - 0.05 * (layers - 3.0).powi(2))
            }
        }
    }
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Objective for Problem {
    fn evaluate(&self, config: &Configuration) -> Result<Evaluation, EvaluationError> {
        self.score(config)
            .map(Evaluation::new)
            .map_err(|e| EvaluationError::Failed {
                message: e.to_string(),
            })
    }
}

fn branin(x1: f64, x2: f64) -> f64 {
    use std::f64::consts::PI;
    let b = 5.1 / (4.0 * PI * PI);
    let c = 5.0 / PI;
    let t = 1.0 / (8.0 * PI);
    (x2 - b * x1 * x1 + c * x1 - 6.0).powi(2) + 10.0 * (1.0 - t) * x1.cos() + 10.0
}

fn number(config: &Configuration, name: &str) -> Result<f64, ProblemError> {
    config
        .get(name)
        .ok_or_else(|| ProblemError::MissingParameter {
            name: name.to_string(),
        })?
        .as_f64()
        .ok_or_else(|| ProblemError::NotNumeric {
            name: name.to_string(),
        })
}

fn choice<'a>(config: &'a Configuration, name: &str) -> Result<&'a str, ProblemError> {
    let value = config
        .get(name)
        .ok_or_else(|| ProblemError::MissingParameter {
            name: name.to_string(),
        })?;
    value.as_str().ok_or_else(|| ProblemError::UnknownChoice {
        name: name.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bo_types::ParameterValue;
    use std::f64::consts::PI;

    fn config(pairs: &[(&str, ParameterValue)]) -> Configuration {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn optima_score_as_documented() {
        let q = config(&[("x", 2.0.into())]);
        assert_eq!(Problem::Quadratic.score(&q).unwrap(), 0.0);

        let r = config(&[("x", 1.0.into()), ("y", 1.0.into())]);
        assert_eq!(Problem::Rosenbrock.score(&r).unwrap(), 0.0);

        for (x1, x2) in [(-PI, 12.275), (PI, 2.275), (9.42478, 2.475)] {
            let b = config(&[("x1", x1.into()), ("x2", x2.into())]);
            let v = Problem::Branin.score(&b).unwrap();
            assert!((v - Problem::Branin.optimum()).abs() < 1e-4, "{v}");
        }

        let m = config(&[
            ("optimizer", "adam".into()),
            ("learning_rate", 1e-3.into()),
            ("layers", 3.0.into()),
        ]);
        assert!((Problem::Mixed.score(&m).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sampled_configurations_are_scorable() {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        for problem in [
            Problem::Quadratic,
            Problem::Branin,
            Problem::Rosenbrock,
            Problem::Mixed,
        ] {
            let space = problem.space().unwrap();
            for _ in 0..20 {
                let v = problem.score(&space.sample(&mut rng)).unwrap();
                assert!(v.is_finite());
                assert!(v <= problem.optimum() + 1e-9);
            }
        }
    }

    #[test]
    fn missing_parameters_fail_the_evaluation() {
        let err = Problem::Branin
            .score(&config(&[("x1", 0.0.into())]))
            .unwrap_err();
        assert_eq!(
            err,
            ProblemError::MissingParameter {
                name: "x2".to_string()
            }
        );
        assert!(matches!(
            Problem::Mixed.evaluate(&Configuration::new()),
            Err(EvaluationError::Failed { .. })
        ));
    }

    #[test]
    fn problem_names_round_trip_through_serde() {
        let p: Problem = serde_json::from_str("\"rosenbrock\"").unwrap();
        assert_eq!(p, Problem::Rosenbrock);
        assert_eq!(p.to_string(), "rosenbrock");
    }
}
