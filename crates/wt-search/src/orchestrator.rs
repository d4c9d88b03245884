//! Search orchestration: lifecycle, pacing and the candidate pipeline.

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use wt_types::{
    internal_error, EvaluationResult, ParameterCombination, ParameterSpace, Progress, SearchConfig,
    SearchError, SearchMethod, SearchResult, SearchTask,
};

use crate::cancel::CancelToken;
use crate::client::BacktestClient;
use crate::crossval::CrossValidationScorer;
use crate::evaluator::{EvaluatorConfig, RetryingEvaluator};
use crate::gate::ConcurrencyGate;
use crate::generator::{CandidateGenerator, ELITE_POOL};
use crate::progress::{ProgressReporter, ProgressUpdate};
use crate::store::ResultStore;

/// Random draws opening a randomized run before perturbation takes over
const EXPLORATION_DRAWS: usize = 10;

type EvaluationOutcome = (ParameterCombination, SearchResult<Option<EvaluationResult>>);

/// Runs whole searches against a backtest client.
///
/// A run never returns an error: configuration problems, cancellation
/// and worker failures all land in the returned task's status, so the
/// caller always gets the task back with whatever results were banked.
///
/// The orchestrator itself is cheap state (client handle plus tuning)
/// and can be shared behind an `Arc`; `cancel` targets the most
/// recently started run.
#[derive(Debug)]
pub struct SearchOrchestrator {
    client: Arc<dyn BacktestClient>,
    gate_capacity: usize,
    evaluator_config: EvaluatorConfig,
    seed: Option<u64>,
    cancel: Mutex<CancelToken>,
}

impl SearchOrchestrator {
    pub fn new(client: Arc<dyn BacktestClient>) -> Self {
        Self {
            client,
            gate_capacity: ConcurrencyGate::DEFAULT_CAPACITY,
            evaluator_config: EvaluatorConfig::default(),
            seed: None,
            cancel: Mutex::new(CancelToken::new()),
        }
    }

    pub fn with_gate_capacity(mut self, capacity: usize) -> Self {
        self.gate_capacity = capacity;
        self
    }

    pub fn with_evaluator_config(mut self, config: EvaluatorConfig) -> Self {
        self.evaluator_config = config;
        self
    }

    /// Fixes the run seed. Candidate draws and validation window
    /// placement replay exactly for a given seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Trips the active run's token. Idempotent; runs started after the
    /// call are unaffected.
    pub fn cancel(&self) {
        self.cancel.lock().cancel();
    }

    /// Runs one search to a terminal status.
    ///
    /// Starting a run trips the previous run's token, so one
    /// orchestrator drives at most one search at a time; the superseded
    /// run still returns its task with everything it banked.
    pub async fn run(
        &self,
        config: SearchConfig,
        space: ParameterSpace,
        reporter: ProgressReporter,
    ) -> SearchTask {
        let started = Instant::now();
        let gate = ConcurrencyGate::new(self.gate_capacity);
        let cancel = CancelToken::new();
        {
            let mut active = self.cancel.lock();
            active.cancel();
            *active = cancel.clone();
        }

        let mut task = SearchTask::new(config, space);
        if let Err(err) = task.config.ensure_valid().and_then(|()| task.space.ensure_valid()) {
            warn!(task = %task.id, error = %err, "rejecting invalid search request");
            task.mark_failed(err.to_string());
            reporter.emit(ProgressUpdate::from_task(&task, &gate, started.elapsed()));
            return task;
        }

        task.mark_running();
        info!(
            task = %task.id,
            method = ?task.config.method,
            objective = ?task.config.objective,
            max_iterations = task.config.max_iterations,
            client = self.client.name(),
            "search started"
        );

        let seed = self.seed.unwrap_or_else(|| rand::rng().random());
        let generator = CandidateGenerator::new(task.space.clone(), seed);
        let evaluator = RetryingEvaluator::new(
            self.client.clone(),
            gate.clone(),
            self.evaluator_config,
            task.config.objective,
            task.space.clone(),
            task.config.base_parameters.clone(),
            cancel.clone(),
        );
        let scorer = task.config.cross_validation.clone().map(|cv| {
            CrossValidationScorer::new(evaluator.clone(), cv, task.config.training_period.clone())
        });

        let (opening, random_draws, total) = plan_candidates(&generator, &task.config);
        task.progress = Progress::new(total);
        let store = ResultStore::new(task.config.top_k);

        let mut run = SearchRun {
            store,
            generator,
            evaluator,
            scorer,
            gate,
            reporter,
            cancel,
            // window placement draws from its own stream so candidate
            // generation and placement replay independently
            seeds: ChaCha8Rng::seed_from_u64(seed.wrapping_add(1)),
            started,
            opening,
            random_draws,
            issued: 0,
            task,
        };
        let outcome = run.drive().await;

        let SearchRun {
            mut task,
            store,
            gate,
            reporter,
            ..
        } = run;
        task.results = store.snapshot();
        match outcome {
            Ok(()) => {
                task.mark_completed();
                info!(
                    task = %task.id,
                    attempts = task.progress.current,
                    kept = task.results.len(),
                    best = ?task.best_objective(),
                    "search completed"
                );
            }
            Err(err) if err.is_cancelled() => {
                task.mark_cancelled();
                info!(
                    task = %task.id,
                    attempts = task.progress.current,
                    kept = task.results.len(),
                    "search cancelled"
                );
            }
            Err(err) => {
                task.mark_failed(err.to_string());
                error!(task = %task.id, error = %err, "search failed");
            }
        }
        reporter.emit(ProgressUpdate::from_task(&task, &gate, started.elapsed()));
        task
    }
}

/// Exploration plan for one run: pre-enumerated opening candidates, the
/// random draws that follow, and the attempt total.
fn plan_candidates(
    generator: &CandidateGenerator,
    config: &SearchConfig,
) -> (VecDeque<ParameterCombination>, usize, usize) {
    match config.method {
        SearchMethod::Grid => {
            let mut grid = generator.grid();
            let total = grid.len().min(config.max_iterations);
            grid.truncate(total);
            (grid.into(), 0, total)
        }
        SearchMethod::Randomized => {
            let total = config.max_iterations;
            (VecDeque::new(), EXPLORATION_DRAWS.min(total), total)
        }
        SearchMethod::Hybrid => {
            let total = config.max_iterations;
            let quota = coarse_budget(total).min(total);
            let mut coarse = generator.coarse_grid();
            coarse.truncate(quota);
            // a coarse grid smaller than the quota cedes the rest of the
            // opening phase to random draws
            let filler = quota - coarse.len();
            (coarse.into(), filler, total)
        }
    }
}

/// Share of a hybrid run spent on the coarse grid before perturbation
fn coarse_budget(total: usize) -> usize {
    (total * 3 / 10).max(1)
}

/// State for one run in flight
struct SearchRun {
    task: SearchTask,
    store: ResultStore,
    generator: CandidateGenerator,
    evaluator: RetryingEvaluator,
    scorer: Option<CrossValidationScorer>,
    gate: ConcurrencyGate,
    reporter: ProgressReporter,
    cancel: CancelToken,
    seeds: ChaCha8Rng,
    started: Instant,
    opening: VecDeque<ParameterCombination>,
    random_draws: usize,
    issued: usize,
}

impl SearchRun {
    /// Issues candidates and ingests completions until the budget is
    /// spent or the run is interrupted.
    ///
    /// The spawn window is bounded by the gate capacity and topped up
    /// one completion at a time, so perturbation always draws from a
    /// leaderboard no more than one window stale. Cancellation is
    /// checked before each candidate is issued and again before each
    /// completion is banked; work that resolves after the trip is
    /// discarded.
    async fn drive(&mut self) -> SearchResult<()> {
        let mut join_set: JoinSet<EvaluationOutcome> = JoinSet::new();
        let total = self.task.progress.total;

        while self.issued < total || !join_set.is_empty() {
            while self.issued < total
                && join_set.len() < self.gate.capacity()
                && !self.cancel.is_cancelled()
            {
                let candidate = self.next_candidate();
                self.spawn(candidate, &mut join_set);
            }
            if self.cancel.is_cancelled() {
                drain(&mut join_set).await;
                return Err(SearchError::Cancelled);
            }

            match join_set.join_next().await {
                Some(Ok((_, Err(err)))) if err.is_cancelled() => {
                    drain(&mut join_set).await;
                    return Err(SearchError::Cancelled);
                }
                Some(Ok((candidate, outcome))) => {
                    if self.cancel.is_cancelled() {
                        drain(&mut join_set).await;
                        return Err(SearchError::Cancelled);
                    }
                    self.ingest(candidate, outcome);
                }
                Some(Err(join_err)) => {
                    join_set.abort_all();
                    drain(&mut join_set).await;
                    return Err(internal_error!("evaluation worker failed: {join_err}"));
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Opening queue first, then random exploration, then perturbation
    /// around the elites.
    fn next_candidate(&mut self) -> ParameterCombination {
        if let Some(candidate) = self.opening.pop_front() {
            return candidate;
        }
        if self.random_draws > 0 {
            self.random_draws -= 1;
            return self.generator.random();
        }
        self.generator.perturb(self.store.elites(ELITE_POOL))
    }

    fn spawn(&mut self, candidate: ParameterCombination, join_set: &mut JoinSet<EvaluationOutcome>) {
        self.issued += 1;
        let seed = self.seeds.random();
        match &self.scorer {
            Some(scorer) => {
                let scorer = scorer.clone();
                join_set.spawn(async move {
                    let outcome = scorer.score(&candidate, seed).await;
                    (candidate, outcome)
                });
            }
            None => {
                let evaluator = self.evaluator.clone();
                let period = self.task.config.training_period.clone();
                join_set.spawn(async move {
                    let outcome = evaluator.evaluate(&candidate, &period).await;
                    (candidate, outcome)
                });
            }
        }
    }

    /// Books one finished attempt: skips and errors consume budget like
    /// successes, so progress always reaches the total.
    fn ingest(&mut self, candidate: ParameterCombination, outcome: SearchResult<Option<EvaluationResult>>) {
        match outcome {
            Ok(Some(result)) => {
                let leading = self
                    .store
                    .best()
                    .map_or(true, |best| result.objective_value > best.objective_value);
                if leading {
                    info!(
                        task = %self.task.id,
                        candidate = %result.combination.id,
                        objective_value = result.objective_value,
                        "new best candidate"
                    );
                }
                self.store.insert(result);
                self.task.results = self.store.snapshot();
            }
            Ok(None) => {
                debug!(task = %self.task.id, candidate = %candidate.id, "candidate skipped");
            }
            Err(err) => {
                warn!(
                    task = %self.task.id,
                    candidate = %candidate.id,
                    error = %err,
                    "evaluation error, dropping candidate"
                );
            }
        }
        self.task.progress.current += 1;
        self.reporter
            .emit(ProgressUpdate::from_task(&self.task, &self.gate, self.started.elapsed()));
    }
}

async fn drain(join_set: &mut JoinSet<EvaluationOutcome>) {
    while join_set.join_next().await.is_some() {}
}
