//! Retrying evaluation of single candidates against the backtest
//! service.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use wt_types::{
    EvaluationResult, Objective, ParameterCombination, ParameterSpace, SearchError, SearchResult,
    TimePeriod,
};

use crate::cancel::CancelToken;
use crate::client::{BacktestClient, BacktestRequest};
use crate::gate::ConcurrencyGate;

/// Retry policy for transient evaluation failures
#[derive(Debug, Clone, Copy)]
pub struct EvaluatorConfig {
    /// Total attempts per candidate, first try included
    pub max_attempts: u32,
    /// Base backoff delay; the wait after attempt `n` is `base * n`
    pub base_delay: Duration,
}

impl EvaluatorConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Runs one candidate through validation, gate admission and the remote
/// call, absorbing transient failures.
///
/// Outcomes:
/// - `Ok(Some(result))` - the candidate scored
/// - `Ok(None)` - the candidate was skipped: validation failure, retry
///   exhaustion, or a success response with no performance block
/// - `Err(SearchError::Cancelled)` - the token tripped before or during
///   the evaluation
///
/// A failed or skipped candidate never fails the surrounding search.
#[derive(Debug, Clone)]
pub struct RetryingEvaluator {
    client: Arc<dyn BacktestClient>,
    gate: ConcurrencyGate,
    config: EvaluatorConfig,
    objective: Objective,
    space: ParameterSpace,
    base_parameters: serde_json::Value,
    cancel: CancelToken,
}

impl RetryingEvaluator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn BacktestClient>,
        gate: ConcurrencyGate,
        config: EvaluatorConfig,
        objective: Objective,
        space: ParameterSpace,
        base_parameters: serde_json::Value,
        cancel: CancelToken,
    ) -> Self {
        Self {
            client,
            gate,
            config,
            objective,
            space,
            base_parameters,
            cancel,
        }
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Evaluates one candidate over one period.
    ///
    /// The gate slot is held for the whole retry cycle, so a retrying
    /// candidate cannot be overtaken into its own slot.
    pub async fn evaluate(
        &self,
        candidate: &ParameterCombination,
        period: &TimePeriod,
    ) -> SearchResult<Option<EvaluationResult>> {
        let report = self.space.validate(candidate);
        for warning in &report.warnings {
            debug!(candidate = %candidate.id, warning, "candidate warning");
        }
        if !report.is_valid() {
            debug!(
                candidate = %candidate.id,
                errors = ?report.errors,
                "skipping invalid candidate"
            );
            return Ok(None);
        }

        if self.cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        // cancellation during the wait for a slot aborts before any
        // remote call is issued
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(SearchError::Cancelled),
            permit = self.gate.acquire() => permit,
        };

        let started = Instant::now();
        let request = BacktestRequest::new(&self.base_parameters, candidate, period);

        for attempt in 1..=self.config.max_attempts {
            if self.cancel.is_cancelled() {
                return Err(SearchError::Cancelled);
            }

            match self.client.run_backtest(&request).await {
                Ok(response) if response.success => {
                    return match response.performance() {
                        Some(metrics) => {
                            let objective_value = self.objective.score(metrics);
                            let elapsed = started.elapsed().as_millis() as u64;
                            debug!(
                                candidate = %candidate.id,
                                period = %period.label,
                                objective_value,
                                attempt,
                                "candidate evaluated"
                            );
                            Ok(Some(EvaluationResult::new(
                                candidate.clone(),
                                objective_value,
                                metrics.clone(),
                                elapsed,
                            )))
                        }
                        None => {
                            warn!(
                                candidate = %candidate.id,
                                "success response without performance block, skipping"
                            );
                            Ok(None)
                        }
                    };
                }
                Ok(response) => {
                    debug!(
                        candidate = %candidate.id,
                        attempt,
                        error = response.error.as_deref().unwrap_or("unspecified"),
                        "backtest rejected, will retry"
                    );
                }
                Err(err) => {
                    debug!(
                        candidate = %candidate.id,
                        attempt,
                        error = %err,
                        "backtest call failed, will retry"
                    );
                }
            }

            if attempt < self.config.max_attempts {
                let delay = self.config.base_delay * attempt;
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(SearchError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        warn!(
            candidate = %candidate.id,
            attempts = self.config.max_attempts,
            "retries exhausted, skipping candidate"
        );
        Ok(None)
    }
}
