//! JSON run description: which problem, optional space override, optimizer settings.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use bo_optimizer::Optimizer;
use bo_types::{BoError, OptimizationResult, OptimizerConfig, Space, SpaceError};

use crate::problems::Problem;

#[derive(Error, Debug)]
pub enum RunFileError {
    #[error("Failed to read run file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed run file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid space: {0}")]
    Space(#[from] SpaceError),

    #[error(transparent)]
    Optimizer(#[from] BoError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFile {
    pub problem: Problem,
    /// Replaces the problem's own space when present.
    #[serde(default)]
    pub space: Option<Space>,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

impl RunFile {
    pub fn from_json_str(json: &str) -> Result<Self, RunFileError> {
        let run: Self = serde_json::from_str(json)?;
        run.optimizer.validate()?;
        Ok(run)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RunFileError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn space(&self) -> Result<Space, RunFileError> {
        match &self.space {
            Some(space) => Ok(space.clone()),
            None => Ok(self.problem.space()?),
        }
    }

    pub fn execute(&self) -> Result<OptimizationResult, RunFileError> {
        let space = self.space()?;
        info!(
            problem = %self.problem,
            parameters = space.parameters().len(),
            acquisition = %self.optimizer.acquisition,
            "running benchmark"
        );

        let mut optimizer = Optimizer::new(space, self.optimizer.clone())?;
        let result = optimizer.optimize(&self.problem)?;

        if let Some(best) = result.best_objective() {
            info!(
                problem = %self.problem,
                best,
                regret = self.problem.optimum() - best,
                termination = %result.termination,
                "benchmark finished"
            );
        }
        Ok(result)
    }
}
