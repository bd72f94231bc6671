//! Run lifecycle and the final optimization result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::OptimizerConfig;
use crate::observation::{AcquisitionRecord, Observation};
use crate::space::Configuration;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Converged,
    PatienceExhausted,
    BudgetExhausted,
    Cancelled,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Converged => "converged",
            Self::PatienceExhausted => "patience exhausted",
            Self::BudgetExhausted => "budget exhausted",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerPhase {
    Idle,
    Seeding,
    Iterating,
    Terminated(TerminationReason),
}

/// Summary of recent objective history.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConvergenceDiagnostics {
    /// `(stability + (1 - improvement_rate)) / 2`, in `[0, 1]`.
    pub score: f64,
    pub stability: f64,
    pub improvement_rate: f64,
    /// Successful observations seen by the tracker.
    pub observations: usize,
    pub window: usize,
    /// Mean pairwise distance of the last window of configurations.
    pub diversity: f64,
}

/// Outcome of one `optimize()` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub run_id: Uuid,
    /// Seed that drove sampling; rerunning with it reproduces the proposals.
    pub seed: u64,
    pub best: Option<Observation>,
    pub observations: Vec<Observation>,
    pub diagnostics: ConvergenceDiagnostics,
    pub acquisition_history: Vec<AcquisitionRecord>,
    pub termination: TerminationReason,
    /// Guided iterations completed.
    pub iterations: usize,
    pub evaluations_succeeded: usize,
    pub evaluations_failed: usize,
    pub config: OptimizerConfig,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl OptimizationResult {
    pub fn best_config(&self) -> Option<&Configuration> {
        self.best.as_ref().map(|b| &b.config)
    }

    pub fn best_objective(&self) -> Option<f64> {
        self.best.as_ref().and_then(|b| b.objective)
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations_succeeded + self.evaluations_failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::Evaluation;
    use crate::space::ParameterValue;

    #[test]
    fn result_accessors() {
        let config = Configuration::from([("x".to_string(), ParameterValue::Float(2.0))]);
        let best = Observation::completed(4, config.clone(), vec![0.7], Evaluation::new(-0.1), 0.0);
        let now = Utc::now();
        let result = OptimizationResult {
            run_id: Uuid::new_v4(),
            seed: 1,
            best: Some(best.clone()),
            observations: vec![best],
            diagnostics: ConvergenceDiagnostics::default(),
            acquisition_history: Vec::new(),
            termination: TerminationReason::BudgetExhausted,
            iterations: 4,
            evaluations_succeeded: 1,
            evaluations_failed: 2,
            config: OptimizerConfig::default(),
            started_at: now,
            finished_at: now,
        };

        assert_eq!(result.best_objective(), Some(-0.1));
        assert_eq!(result.best_config(), Some(&config));
        assert_eq!(result.evaluations(), 3);

        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("budget_exhausted"));
    }
}
