//! The objective being optimized and the guarded call around it.

use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use bo_types::{Configuration, Evaluation, EvaluationError};

/// A (possibly expensive) function of a configuration.
///
/// Called from worker threads, up to `parallel_evaluations` at a time.
/// Any `Fn(&Configuration) -> Result<T, E>` closure qualifies when `T`
/// converts into an [`Evaluation`] (a bare `f64` does) and `E` is printable.
pub trait Objective: Send + Sync {
    fn evaluate(&self, config: &Configuration) -> Result<Evaluation, EvaluationError>;
}

impl<F, T, E> Objective for F
where
    F: Fn(&Configuration) -> Result<T, E> + Send + Sync,
    T: Into<Evaluation>,
    E: Display,
{
    fn evaluate(&self, config: &Configuration) -> Result<Evaluation, EvaluationError> {
        self(config)
            .map(Into::into)
            .map_err(|e| EvaluationError::Failed {
                message: e.to_string(),
            })
    }
}

/// Outcome of one guarded objective call.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub result: Result<Evaluation, EvaluationError>,
    /// Wall-clock seconds.
    pub elapsed: f64,
}

/// Call the objective, turning panics and non-finite scores into errors.
pub fn evaluate_guarded<O: Objective + ?Sized>(
    objective: &O,
    config: &Configuration,
) -> EvaluationOutcome {
    let started = Instant::now();
    let result = match catch_unwind(AssertUnwindSafe(|| objective.evaluate(config))) {
        Ok(result) => reject_non_finite(result),
        Err(payload) => Err(EvaluationError::Panicked {
            message: panic_message(payload.as_ref()),
        }),
    };
    EvaluationOutcome {
        result,
        elapsed: started.elapsed().as_secs_f64(),
    }
}

/// NaN and infinite scores cannot be modelled; treat them as failures.
pub fn reject_non_finite(
    result: Result<Evaluation, EvaluationError>,
) -> Result<Evaluation, EvaluationError> {
    match result {
        Ok(evaluation) if !evaluation.score.is_finite() => Err(EvaluationError::NonFiniteScore {
            score: evaluation.score,
        }),
        other => other,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bo_types::ParameterValue;

    fn config(x: f64) -> Configuration {
        Configuration::from([("x".to_string(), ParameterValue::Float(x))])
    }

    fn x_of(c: &Configuration) -> f64 {
        c["x"].as_f64().unwrap_or_default()
    }

    #[test]
    fn closures_are_objectives() {
        let square = |c: &Configuration| Ok::<f64, String>(x_of(c).powi(2));
        let out = evaluate_guarded(&square, &config(3.0));
        assert_eq!(out.result.unwrap().score, 9.0);
        assert!(out.elapsed >= 0.0);

        let with_metrics = |c: &Configuration| {
            Ok::<_, String>(Evaluation::new(x_of(c)).with_metric("loss", 0.5))
        };
        let eval = evaluate_guarded(&with_metrics, &config(1.0)).result.unwrap();
        assert_eq!(eval.metrics["loss"], 0.5);
    }

    #[test]
    fn errors_are_captured() {
        let failing = |_: &Configuration| Err::<f64, _>("simulation diverged");
        match evaluate_guarded(&failing, &config(0.0)).result {
            Err(EvaluationError::Failed { message }) => {
                assert_eq!(message, "simulation diverged")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_finite_scores_are_rejected() {
        let nan = |_: &Configuration| Ok::<f64, String>(f64::NAN);
        assert!(matches!(
            evaluate_guarded(&nan, &config(0.0)).result,
            Err(EvaluationError::NonFiniteScore { .. })
        ));
    }

    #[test]
    fn panics_are_isolated() {
        let boom = |c: &Configuration| -> Result<f64, String> {
            if x_of(c) > 0.0 {
                panic!("objective exploded");
            }
            Ok(0.0)
        };
        match evaluate_guarded(&boom, &config(1.0)).result {
            Err(EvaluationError::Panicked { message }) => {
                assert!(message.contains("exploded"))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(evaluate_guarded(&boom, &config(-1.0)).result.is_ok());
    }

    struct Shifted(f64);

    impl Objective for Shifted {
        fn evaluate(&self, config: &Configuration) -> Result<Evaluation, EvaluationError> {
            Ok(Evaluation::new(x_of(config) + self.0))
        }
    }

    #[test]
    fn structs_implement_objective() {
        let out = evaluate_guarded(&Shifted(1.5), &config(1.0));
        assert_eq!(out.result.unwrap().score, 2.5);
    }
}
