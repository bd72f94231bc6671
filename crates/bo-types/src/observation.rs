//! Observations: one evaluated configuration each, appended and never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::config::AcquisitionKind;
use crate::errors::EvaluationError;
use crate::space::Configuration;

/// What an objective returns for one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub score: f64,
    /// Auxiliary metrics reported alongside the score.
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
}

impl Evaluation {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            metrics: HashMap::new(),
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

impl From<f64> for Evaluation {
    fn from(score: f64) -> Self {
        Self::new(score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservationStatus {
    Completed,
    Failed,
}

/// One evaluated configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: Uuid,
    /// Guided iteration that proposed this configuration (0 for seeding).
    pub iteration: usize,
    pub config: Configuration,
    pub vector: Vec<f64>,
    pub status: ObservationStatus,
    /// Raw objective; `None` for failed evaluations.
    pub objective: Option<f64>,
    pub metrics: HashMap<String, f64>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Wall-clock seconds spent in the objective.
    pub evaluation_cost: f64,
}

impl Observation {
    pub fn completed(
        iteration: usize,
        config: Configuration,
        vector: Vec<f64>,
        evaluation: Evaluation,
        evaluation_cost: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            iteration,
            config,
            vector,
            status: ObservationStatus::Completed,
            objective: Some(evaluation.score),
            metrics: evaluation.metrics,
            error: None,
            timestamp: Utc::now(),
            evaluation_cost,
        }
    }

    pub fn failed(
        iteration: usize,
        config: Configuration,
        vector: Vec<f64>,
        error: &EvaluationError,
        evaluation_cost: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            iteration,
            config,
            vector,
            status: ObservationStatus::Failed,
            objective: None,
            metrics: HashMap::new(),
            error: Some(error.to_string()),
            timestamp: Utc::now(),
            evaluation_cost,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ObservationStatus::Completed
    }
}

/// Acquisition decision kept for exploration/exploitation analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionRecord {
    pub iteration: usize,
    pub vector: Vec<f64>,
    pub config: Configuration,
    pub value: f64,
    pub predicted_mean: f64,
    pub predicted_std: f64,
    pub function: AcquisitionKind,
    /// Exploration parameter actually used (widened for later batch slots).
    pub exploration: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::ParameterValue;

    #[test]
    fn completed_observation_carries_score_and_metrics() {
        let config = Configuration::from([("x".to_string(), ParameterValue::Float(0.5))]);
        let eval = Evaluation::new(1.8).with_metric("val_loss", 0.3);
        let obs = Observation::completed(3, config, vec![0.5], eval, 0.25);

        assert!(obs.is_completed());
        assert_eq!(obs.objective, Some(1.8));
        assert_eq!(obs.metrics["val_loss"], 0.3);
        assert_eq!(obs.iteration, 3);
        assert!(obs.error.is_none());
    }

    #[test]
    fn failed_observation_has_no_objective() {
        let err = EvaluationError::Failed {
            message: "training diverged".into(),
        };
        let obs = Observation::failed(0, Configuration::new(), vec![], &err, 0.0);
        assert_eq!(obs.status, ObservationStatus::Failed);
        assert!(obs.objective.is_none());
        assert!(obs.error.as_deref().unwrap().contains("training diverged"));
    }

    #[test]
    fn evaluation_deserialises_without_metrics() {
        let eval: Evaluation = serde_json::from_str(r#"{"score": 0.9}"#).unwrap();
        assert_eq!(eval, Evaluation::from(0.9));
    }
}
