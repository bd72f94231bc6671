//! The optimization loop: seeding, guided iterations and termination.

use chrono::{DateTime, Utc};
use crossbeam_channel::Receiver;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use bo_types::{
    AcquisitionRecord, BoError, BoResult, Configuration, ConvergenceDiagnostics, Evaluation,
    EvaluationError, Observation, OptimizationResult, OptimizerConfig, OptimizerPhase, Space,
    TerminationReason,
};

use crate::acquisition::Acquisition;
use crate::convergence::ConvergenceTracker;
use crate::events::{EventBus, OptimizerEvent};
use crate::gp::GaussianProcess;
use crate::objective::{evaluate_guarded, reject_non_finite, EvaluationOutcome, Objective};
use crate::search::CandidateSearcher;
use crate::state::{CancellationToken, ObservationLog};

/// Bayesian optimizer over a [`Space`].
///
/// The caller's thread coordinates: it refits the surrogate, searches for
/// candidates and is the only writer of optimizer state. Objective calls for
/// a batch run on a dedicated pool of `parallel_evaluations` threads, and
/// their observations are appended in the order the batch was proposed.
pub struct Optimizer {
    space: Space,
    config: OptimizerConfig,
    seed: u64,
    rng: StdRng,
    pool: ThreadPool,
    surrogate: GaussianProcess,
    searcher: CandidateSearcher,
    tracker: ConvergenceTracker,
    log: ObservationLog,
    acquisition_history: Vec<AcquisitionRecord>,
    events: EventBus,
    cancel: CancellationToken,
    phase: OptimizerPhase,
    best: Option<Observation>,
    /// Guided iterations completed in the current run.
    iteration: usize,
    stale_iterations: usize,
    succeeded: usize,
    failed: usize,
}

impl Optimizer {
    pub fn new(space: Space, config: OptimizerConfig) -> BoResult<Self> {
        config.validate()?;

        let seed = config.seed.unwrap_or_else(rand::random);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallel_evaluations)
            .thread_name(|i| format!("bo-eval-{i}"))
            .build()
            .map_err(|e| BoError::ThreadPool(e.to_string()))?;

        Ok(Self {
            rng: StdRng::seed_from_u64(seed),
            pool,
            surrogate: GaussianProcess::new(config.surrogate.clone()),
            searcher: CandidateSearcher::new(config.candidate_pool_size),
            tracker: ConvergenceTracker::new(config.convergence_window, config.min_improvement),
            log: ObservationLog::new(),
            acquisition_history: Vec::new(),
            events: EventBus::default(),
            cancel: CancellationToken::new(),
            phase: OptimizerPhase::Idle,
            best: None,
            iteration: 0,
            stale_iterations: 0,
            succeeded: 0,
            failed: 0,
            space,
            config,
            seed,
        })
    }

    // ---------- accessors ----------

    pub fn space(&self) -> &Space {
        &self.space
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Seed driving all sampling; fixed at construction.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn phase(&self) -> OptimizerPhase {
        self.phase
    }

    /// Guided iterations completed in the current run.
    pub fn iterations(&self) -> usize {
        self.iteration
    }

    pub fn get_observations(&self) -> Vec<Observation> {
        self.log.snapshot()
    }

    pub fn best_result(&self) -> Option<Observation> {
        self.best.clone()
    }

    pub fn acquisition_history(&self) -> &[AcquisitionRecord] {
        &self.acquisition_history
    }

    pub fn diagnostics(&self) -> ConvergenceDiagnostics {
        self.tracker.diagnostics(self.diversity())
    }

    /// Read handle on the observation history, usable from other threads
    /// while a run is in progress.
    pub fn observation_log(&self) -> ObservationLog {
        self.log.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Receive progress events. Each subscriber buffers up to
    /// [`EVENT_BUFFER`](crate::EVENT_BUFFER) undrained events; later ones
    /// are dropped for that subscriber.
    pub fn subscribe(&mut self) -> Receiver<OptimizerEvent> {
        self.events.subscribe()
    }

    // ---------- run ----------

    /// Run seeding and guided iterations until a stopping rule fires.
    ///
    /// Starts from an empty history. Cancellation is not an error: the
    /// result reports [`TerminationReason::Cancelled`] with everything
    /// observed so far. Fails if every seed evaluation failed, or if the
    /// surrogate cannot be fitted.
    pub fn optimize<O: Objective + ?Sized>(
        &mut self,
        objective: &O,
    ) -> BoResult<OptimizationResult> {
        self.clear_run();
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        info!(
            run_id = %run_id,
            seed = self.seed,
            max_iterations = self.config.max_iterations,
            initial_samples = self.config.n_initial_samples,
            acquisition = %self.config.acquisition,
            "optimization started"
        );
        self.events.emit(OptimizerEvent::Started {
            run_id,
            seed: self.seed,
        });

        // Seeding, one worker-sized batch at a time.
        self.phase = OptimizerPhase::Seeding;
        let mut remaining = self.config.n_initial_samples;
        while remaining > 0 {
            if self.cancel.is_cancelled() {
                return Ok(self.finish(TerminationReason::Cancelled, run_id, started_at));
            }
            let n = remaining.min(self.config.parallel_evaluations);
            let configs: Vec<Configuration> =
                (0..n).map(|_| self.space.sample(&mut self.rng)).collect();
            let batch = self.evaluate_batch(objective, configs);
            let observations = self.absorb(0, batch)?;
            self.emit_progress(0, observations);
            remaining -= n;
        }

        if self.succeeded == 0 && self.failed > 0 {
            error!(attempted = self.failed, "every seed evaluation failed");
            self.phase = OptimizerPhase::Idle;
            return Err(BoError::AllEvaluationsFailed {
                attempted: self.failed,
            });
        }

        self.phase = OptimizerPhase::Iterating;
        let batch_size = self.config.effective_batch_size();
        let reason = loop {
            if self.cancel.is_cancelled() {
                break TerminationReason::Cancelled;
            }
            // Only reachable with a zero budget.
            if self.iteration >= self.config.max_iterations {
                break TerminationReason::BudgetExhausted;
            }

            self.iteration += 1;
            let iteration = self.iteration;
            let before = self.best_oriented();

            let configs = self
                .propose(batch_size, iteration)
                .inspect_err(|e| error!(iteration, error = %e, "candidate proposal failed"))?;
            let batch = self.evaluate_batch(objective, configs);
            let observations = self.absorb(iteration, batch)?;

            let improved = match (before, self.best_oriented()) {
                (None, Some(_)) => true,
                (Some(b), Some(a)) => a - b > self.config.min_improvement,
                _ => false,
            };
            if improved {
                self.stale_iterations = 0;
            } else {
                self.stale_iterations += 1;
            }

            let score = self.tracker.score();
            debug!(
                iteration,
                best = ?self.best_objective(),
                score,
                stale = self.stale_iterations,
                "iteration complete"
            );
            self.emit_progress(iteration, observations);

            if iteration > self.config.convergence_window
                && score > 1.0 - self.config.convergence_threshold
            {
                self.events
                    .emit(OptimizerEvent::Converged { iteration, score });
                break TerminationReason::Converged;
            }
            if self.stale_iterations >= self.config.patience {
                break TerminationReason::PatienceExhausted;
            }
            if iteration >= self.config.max_iterations {
                break TerminationReason::BudgetExhausted;
            }
        };

        Ok(self.finish(reason, run_id, started_at))
    }

    // ---------- ask / tell ----------

    /// Propose up to `count` configurations to evaluate next.
    ///
    /// Samples at random until a successful observation exists; afterwards
    /// refits the surrogate and runs the acquisition search.
    pub fn suggest(&mut self, count: usize) -> BoResult<Vec<Configuration>> {
        self.propose(count, self.iteration)
    }

    /// Record an externally evaluated configuration.
    pub fn record(
        &mut self,
        config: Configuration,
        result: Result<Evaluation, EvaluationError>,
    ) -> BoResult<Observation> {
        let vector = self.space.encode(&config)?;
        let outcome = EvaluationOutcome {
            result: reject_non_finite(result),
            elapsed: 0.0,
        };
        let observation = self.observe(self.iteration, config, vector, outcome);
        self.log.extend([observation.clone()]);
        Ok(observation)
    }

    /// Forget all observations and restore the initial random state.
    pub fn reset(&mut self) {
        self.clear_run();
        self.cancel.clear();
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    // ---------- internals ----------

    fn clear_run(&mut self) {
        self.log.clear();
        self.tracker.reset();
        self.surrogate.reset();
        self.acquisition_history.clear();
        self.best = None;
        self.iteration = 0;
        self.stale_iterations = 0;
        self.succeeded = 0;
        self.failed = 0;
        self.phase = OptimizerPhase::Idle;
    }

    fn best_objective(&self) -> Option<f64> {
        self.best.as_ref().and_then(|b| b.objective)
    }

    fn best_oriented(&self) -> Option<f64> {
        self.best_objective()
            .map(|v| self.config.direction.orient(v))
    }

    fn propose(&mut self, count: usize, iteration: usize) -> BoResult<Vec<Configuration>> {
        if self.succeeded == 0 {
            debug!(count, "no successful observations, sampling at random");
            return Ok((0..count).map(|_| self.space.sample(&mut self.rng)).collect());
        }

        let direction = self.config.direction;
        let (inputs, targets) = self.log.training_data(direction);
        self.surrogate.fit(&inputs, &targets)?;

        let best = self.best_oriented().unwrap_or(0.0);
        let acquisition = Acquisition::from_config(&self.config);
        let candidates = self.searcher.search(
            &self.space,
            &self.surrogate,
            acquisition,
            best,
            count,
            &mut self.rng,
        )?;

        debug!(
            iteration,
            observations = inputs.len(),
            fit_attempts = ?self.surrogate.fit_attempts(),
            proposed = candidates.len(),
            "candidates proposed"
        );

        let mut configs = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            self.acquisition_history.push(AcquisitionRecord {
                iteration,
                vector: candidate.vector,
                config: candidate.config.clone(),
                value: candidate.score,
                predicted_mean: direction.orient(candidate.prediction.mean),
                predicted_std: candidate.prediction.std(),
                function: acquisition.kind,
                exploration: candidate.exploration,
            });
            configs.push(candidate.config);
        }
        Ok(configs)
    }

    fn evaluate_batch<O: Objective + ?Sized>(
        &self,
        objective: &O,
        configs: Vec<Configuration>,
    ) -> Vec<(Configuration, EvaluationOutcome)> {
        let run = |config: Configuration| {
            let outcome = evaluate_guarded(objective, &config);
            (config, outcome)
        };
        if configs.len() <= 1 || self.config.parallel_evaluations == 1 {
            return configs.into_iter().map(run).collect();
        }
        self.pool
            .install(|| configs.into_par_iter().map(run).collect())
    }

    /// Turn a finished batch into observations, in batch order.
    fn absorb(
        &mut self,
        iteration: usize,
        batch: Vec<(Configuration, EvaluationOutcome)>,
    ) -> BoResult<Vec<Observation>> {
        let encoded = batch
            .into_iter()
            .map(|(config, outcome)| -> BoResult<_> {
                Ok((self.space.encode(&config)?, config, outcome))
            })
            .collect::<BoResult<Vec<_>>>()?;

        let observations: Vec<Observation> = encoded
            .into_iter()
            .map(|(vector, config, outcome)| self.observe(iteration, config, vector, outcome))
            .collect();
        self.log.extend(observations.iter().cloned());
        Ok(observations)
    }

    fn observe(
        &mut self,
        iteration: usize,
        config: Configuration,
        vector: Vec<f64>,
        outcome: EvaluationOutcome,
    ) -> Observation {
        match outcome.result {
            Ok(evaluation) => {
                self.succeeded += 1;
                let value = evaluation.score;
                let observation =
                    Observation::completed(iteration, config, vector, evaluation, outcome.elapsed);
                self.tracker.observe(self.config.direction.orient(value));

                let improves = match self.best_objective() {
                    None => true,
                    Some(incumbent) => self.config.direction.improves(value, incumbent),
                };
                if improves {
                    info!(iteration, objective = value, "new best");
                    self.best = Some(observation.clone());
                    self.events.emit(OptimizerEvent::NewBest {
                        iteration,
                        observation: observation.clone(),
                    });
                }
                observation
            }
            Err(err) => {
                self.failed += 1;
                warn!(iteration, error = %err, "evaluation failed");
                Observation::failed(iteration, config, vector, &err, outcome.elapsed)
            }
        }
    }

    fn emit_progress(&mut self, iteration: usize, batch: Vec<Observation>) {
        let event = OptimizerEvent::IterationComplete {
            iteration,
            best_objective: self.best_objective(),
            convergence_score: self.tracker.score(),
            batch,
        };
        self.events.emit(event);
    }

    /// Mean pairwise distance among the last window of successful configurations.
    fn diversity(&self) -> f64 {
        let recent = self.log.recent_successes(self.config.convergence_window);
        let mut total = 0.0;
        let mut pairs = 0usize;
        for (i, a) in recent.iter().enumerate() {
            for b in &recent[i + 1..] {
                if let Ok(d) = self.space.distance(a, b) {
                    total += d;
                    pairs += 1;
                }
            }
        }
        if pairs == 0 {
            0.0
        } else {
            total / pairs as f64
        }
    }

    fn finish(
        &mut self,
        reason: TerminationReason,
        run_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> OptimizationResult {
        self.phase = OptimizerPhase::Terminated(reason);
        let diagnostics = self.diagnostics();
        let best_objective = self.best_objective();

        info!(
            run_id = %run_id,
            reason = %reason,
            iterations = self.iteration,
            best = ?best_objective,
            succeeded = self.succeeded,
            failed = self.failed,
            score = diagnostics.score,
            "optimization finished"
        );
        self.events.emit(OptimizerEvent::Finished {
            reason,
            best_objective,
            evaluations: self.succeeded + self.failed,
        });

        OptimizationResult {
            run_id,
            seed: self.seed,
            best: self.best.clone(),
            observations: self.log.snapshot(),
            diagnostics,
            acquisition_history: self.acquisition_history.clone(),
            termination: reason,
            iterations: self.iteration,
            evaluations_succeeded: self.succeeded,
            evaluations_failed: self.failed,
            config: self.config.clone(),
            started_at,
            finished_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bo_types::ParameterValue;

    fn line() -> Space {
        Space::builder().continuous("x", -1.0, 1.0).build().unwrap()
    }

    fn x_of(c: &Configuration) -> f64 {
        c["x"].as_f64().unwrap_or_default()
    }

    #[test]
    fn rejects_invalid_config() {
        let result = Optimizer::new(line(), OptimizerConfig::new().with_parallel_evaluations(0));
        assert!(matches!(result, Err(BoError::Config(_))));
    }

    #[test]
    fn seed_is_fixed_at_construction() {
        let opt = Optimizer::new(line(), OptimizerConfig::new().with_seed(99)).unwrap();
        assert_eq!(opt.seed(), 99);
        assert_eq!(opt.phase(), OptimizerPhase::Idle);
    }

    #[test]
    fn zero_budget_stops_after_seeding() {
        let config = OptimizerConfig::new()
            .with_initial_samples(4)
            .with_max_iterations(0)
            .with_seed(1);
        let mut opt = Optimizer::new(line(), config).unwrap();
        let result = opt
            .optimize(&|c: &Configuration| Ok::<f64, String>(x_of(c)))
            .unwrap();

        assert_eq!(result.termination, TerminationReason::BudgetExhausted);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.observations.len(), 4);
        assert!(result.observations.iter().all(|o| o.iteration == 0));
        assert!(result.acquisition_history.is_empty());
        assert_eq!(
            opt.phase(),
            OptimizerPhase::Terminated(TerminationReason::BudgetExhausted)
        );
    }

    #[test]
    fn ask_tell_round() {
        let config = OptimizerConfig::new().with_seed(3);
        let mut opt = Optimizer::new(line(), config).unwrap();

        // Random proposals until something succeeds.
        let first = opt.suggest(3).unwrap();
        assert_eq!(first.len(), 3);
        assert!(opt.acquisition_history().is_empty());

        for c in first {
            let score = -x_of(&c).powi(2);
            opt.record(c, Ok(Evaluation::new(score))).unwrap();
        }
        let guided = opt.suggest(2).unwrap();
        assert_eq!(guided.len(), 2);
        assert_eq!(opt.acquisition_history().len(), 2);

        assert_eq!(opt.get_observations().len(), 3);
        let best = opt.best_result().unwrap();
        assert!(opt
            .get_observations()
            .iter()
            .all(|o| o.objective.unwrap() <= best.objective.unwrap()));
    }

    #[test]
    fn record_validates_configuration() {
        let mut opt = Optimizer::new(line(), OptimizerConfig::new()).unwrap();
        let outside = Configuration::from([("x".to_string(), ParameterValue::Float(4.0))]);
        assert!(matches!(
            opt.record(outside, Ok(Evaluation::new(1.0))),
            Err(BoError::Space(_))
        ));

        let inside = Configuration::from([("x".to_string(), ParameterValue::Float(0.5))]);
        let obs = opt.record(inside, Ok(Evaluation::new(f64::INFINITY))).unwrap();
        assert!(!obs.is_completed());
        assert!(opt.best_result().is_none());
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut opt = Optimizer::new(line(), OptimizerConfig::new().with_seed(8)).unwrap();
        let before = opt.suggest(2).unwrap();
        for c in before.clone() {
            opt.record(c, Ok(Evaluation::new(1.0))).unwrap();
        }
        opt.cancellation_token().cancel();

        opt.reset();
        assert!(opt.get_observations().is_empty());
        assert!(opt.best_result().is_none());
        assert!(!opt.cancellation_token().is_cancelled());
        assert_eq!(opt.suggest(2).unwrap(), before);
    }

    #[test]
    fn cancelled_before_start_returns_empty_result() {
        let config = OptimizerConfig::new().with_seed(2);
        let mut opt = Optimizer::new(line(), config).unwrap();
        opt.cancellation_token().cancel();
        let result = opt
            .optimize(&|c: &Configuration| Ok::<f64, String>(x_of(c)))
            .unwrap();
        assert_eq!(result.termination, TerminationReason::Cancelled);
        assert!(result.observations.is_empty());
        assert!(result.best.is_none());
    }
}
