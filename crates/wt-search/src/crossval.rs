//! Randomized held-out validation of candidates.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Instant;
use tracing::{debug, warn};

use wt_types::{
    ConsistencyStats, CrossValidationConfig, CrossValidationResult, EvaluationResult,
    ParameterCombination, PeriodResult, SearchResult, TimePeriod,
};

use crate::evaluator::RetryingEvaluator;

/// Placement attempts per validation slot before it is abandoned
const MAX_PLACEMENT_ATTEMPTS: usize = 100;

/// Scores candidates across the training period plus randomly placed
/// held-out windows.
///
/// The composite that ranks a candidate blends the training objective
/// with the mean validation objective; the consistency block records how
/// much the objective moved across windows.
#[derive(Debug, Clone)]
pub struct CrossValidationScorer {
    evaluator: RetryingEvaluator,
    config: CrossValidationConfig,
    training: TimePeriod,
}

impl CrossValidationScorer {
    pub fn new(
        evaluator: RetryingEvaluator,
        config: CrossValidationConfig,
        training: TimePeriod,
    ) -> Self {
        Self {
            evaluator,
            config,
            training,
        }
    }

    /// Places the validation windows for one candidate.
    ///
    /// Windows never overlap each other and avoid the training period
    /// unless the config allows it. Each slot gets up to
    /// `MAX_PLACEMENT_ATTEMPTS` tries before being abandoned; a draw
    /// too long for the selection range burns an attempt like any other
    /// rejection.
    pub fn generate_validation_periods(&self, rng: &mut ChaCha8Rng) -> Vec<TimePeriod> {
        let (min_days, max_days) = self.config.window.bounds();
        let selection_days = (self.config.selection_end - self.config.selection_start).num_days();

        let mut periods: Vec<TimePeriod> = Vec::with_capacity(self.config.validation_periods);
        'slots: for slot in 0..self.config.validation_periods {
            for _ in 0..MAX_PLACEMENT_ATTEMPTS {
                let length = rng.random_range(min_days..=max_days);
                let latest_start = selection_days - length;
                if latest_start < 0 {
                    continue;
                }

                let offset = rng.random_range(0..=latest_start);
                let start = self.config.selection_start + chrono::Duration::days(offset);
                let end = start + chrono::Duration::days(length);
                let period = TimePeriod::new(start, end, format!("validation-{}", slot + 1));

                let clashes_training =
                    !self.config.allow_training_overlap && period.overlaps(&self.training);
                if !clashes_training && !periods.iter().any(|p| p.overlaps(&period)) {
                    periods.push(period);
                    continue 'slots;
                }
            }
            warn!(
                slot = slot + 1,
                attempts = MAX_PLACEMENT_ATTEMPTS,
                "could not place validation window, abandoning slot"
            );
        }
        periods
    }

    /// Cross-validated score for one candidate.
    ///
    /// `Ok(None)` when the training evaluation itself fails. Individual
    /// validation failures only drop that window; if every window fails
    /// the training result stands alone.
    pub async fn score(
        &self,
        candidate: &ParameterCombination,
        seed: u64,
    ) -> SearchResult<Option<EvaluationResult>> {
        let started = Instant::now();

        let Some(training_eval) = self.evaluator.evaluate(candidate, &self.training).await? else {
            debug!(candidate = %candidate.id, "training evaluation failed, skipping candidate");
            return Ok(None);
        };
        let training = PeriodResult {
            period: self.training.clone(),
            objective_value: training_eval.objective_value,
            metrics: training_eval.metrics,
        };

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let windows = self.generate_validation_periods(&mut rng);

        let mut validation = Vec::with_capacity(windows.len());
        for window in &windows {
            match self.evaluator.evaluate(candidate, window).await? {
                Some(result) => validation.push(PeriodResult {
                    period: window.clone(),
                    objective_value: result.objective_value,
                    metrics: result.metrics,
                }),
                None => debug!(
                    candidate = %candidate.id,
                    window = %window.label,
                    "validation window failed, dropping it"
                ),
            }
        }

        let cv = self.compose(training, validation);
        let elapsed = started.elapsed().as_millis() as u64;
        let result = EvaluationResult::new(
            candidate.clone(),
            cv.composite_score,
            cv.training.metrics.clone(),
            elapsed,
        )
        .with_cross_validation(cv);
        Ok(Some(result))
    }

    fn compose(&self, training: PeriodResult, validation: Vec<PeriodResult>) -> CrossValidationResult {
        let mut objectives = vec![training.objective_value];
        objectives.extend(validation.iter().map(|v| v.objective_value));

        let composite_score = if validation.is_empty() {
            warn!("no validation window produced a result, using the training objective alone");
            training.objective_value
        } else {
            let mean_validation = validation.iter().map(|v| v.objective_value).sum::<f64>()
                / validation.len() as f64;
            self.config.train_weight * training.objective_value
                + self.config.validation_weight * mean_validation
        };

        CrossValidationResult {
            training,
            validation,
            composite_score,
            consistency: ConsistencyStats::from_objectives(&objectives),
        }
    }
}
