//! # bo-optimizer
//!
//! Bayesian optimization over mixed continuous, discrete and categorical
//! spaces.
//!
//! A Gaussian-process surrogate is refitted on every observation, a random
//! candidate pool is ranked with an acquisition function (EI, UCB or PI), and
//! the best candidates are evaluated, optionally in parallel. The loop stops
//! on convergence, patience, budget or cancellation.

mod acquisition;
mod convergence;
mod events;
mod gp;
mod objective;
mod optimizer;
mod search;
mod state;

pub use acquisition::{
    erf, expected_improvement, norm_cdf, norm_pdf, probability_of_improvement,
    upper_confidence_bound, Acquisition,
};
pub use convergence::{ConvergenceTracker, MIN_OBSERVATIONS};
pub use events::{OptimizerEvent, EVENT_BUFFER};
pub use gp::{GaussianProcess, KernelHyperparameters, Prediction, VARIANCE_FLOOR};
pub use objective::{evaluate_guarded, EvaluationOutcome, Objective};
pub use optimizer::Optimizer;
pub use search::{Candidate, CandidateSearcher};
pub use state::{CancellationToken, ObservationLog};
