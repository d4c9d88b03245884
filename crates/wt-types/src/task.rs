use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config_error;
use crate::errors::SearchResult;
use crate::period::TimePeriod;
use crate::result::{EvaluationResult, PerformanceMetrics};
use crate::space::ParameterSpace;

/// Identifier for a search task
pub type TaskId = Uuid;

/// What a search maximizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    TotalReturn,
    Sharpe,
    Calmar,
    /// Max drawdown, negated so that smaller drawdowns rank higher
    MaxDrawdown,
    /// `0.4 * sharpe + 0.3 * total_return - 0.3 * max_drawdown`
    Composite,
}

impl Objective {
    /// Maps raw metrics to the scalar being maximized. Optional metrics
    /// that the service omitted contribute zero.
    pub fn score(&self, metrics: &PerformanceMetrics) -> f64 {
        match self {
            Objective::TotalReturn => metrics.total_return,
            Objective::Sharpe => metrics.sharpe_ratio.unwrap_or(0.0),
            Objective::Calmar => metrics.calmar_ratio.unwrap_or(0.0),
            Objective::MaxDrawdown => -metrics.max_drawdown,
            Objective::Composite => {
                0.4 * metrics.sharpe_ratio.unwrap_or(0.0) + 0.3 * metrics.total_return
                    - 0.3 * metrics.max_drawdown
            }
        }
    }
}

/// How candidates are generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    /// Exhaustive enumeration of the discretized space
    Grid,
    /// Random exploration followed by perturbation around the elites
    Randomized,
    /// Coarse grid pass followed by perturbation around the elites
    Hybrid,
}

/// Validation window length policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowLength {
    Fixed { days: i64 },
    Random { min_days: i64, max_days: i64 },
}

impl WindowLength {
    pub fn bounds(&self) -> (i64, i64) {
        match self {
            WindowLength::Fixed { days } => (*days, *days),
            WindowLength::Random { min_days, max_days } => (*min_days, *max_days),
        }
    }
}

/// Randomized held-out validation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationConfig {
    /// Number of validation windows to place
    pub validation_periods: usize,
    pub window: WindowLength,
    /// Windows are placed inside [selection_start, selection_end]
    pub selection_start: NaiveDate,
    pub selection_end: NaiveDate,
    /// Allow validation windows to overlap the training period. They
    /// never overlap each other.
    pub allow_training_overlap: bool,
    pub train_weight: f64,
    pub validation_weight: f64,
}

impl CrossValidationConfig {
    pub fn new(
        validation_periods: usize,
        window: WindowLength,
        selection_start: NaiveDate,
        selection_end: NaiveDate,
    ) -> Self {
        Self {
            validation_periods,
            window,
            selection_start,
            selection_end,
            allow_training_overlap: false,
            train_weight: 0.4,
            validation_weight: 0.6,
        }
    }

    pub fn with_weights(mut self, train: f64, validation: f64) -> Self {
        self.train_weight = train;
        self.validation_weight = validation;
        self
    }

    pub fn with_training_overlap(mut self, allow: bool) -> Self {
        self.allow_training_overlap = allow;
        self
    }

    pub fn ensure_valid(&self) -> SearchResult<()> {
        if self.validation_periods == 0 {
            return Err(config_error!("validation_periods must be at least 1"));
        }
        let (min_days, max_days) = self.window.bounds();
        if min_days < 1 || min_days > max_days {
            return Err(config_error!(
                "validation window bounds must satisfy 1 <= min <= max, got [{min_days}, {max_days}]"
            ));
        }
        if self.selection_start > self.selection_end {
            return Err(config_error!(
                "validation selection range is empty: {} to {}",
                self.selection_start,
                self.selection_end
            ));
        }
        if self.train_weight < 0.0 || self.validation_weight < 0.0 {
            return Err(config_error!("cross-validation weights must be non-negative"));
        }
        if self.train_weight + self.validation_weight == 0.0 {
            return Err(config_error!("cross-validation weights must not both be zero"));
        }
        Ok(())
    }
}

/// Lifecycle of a search task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SearchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SearchStatus::Completed | SearchStatus::Failed | SearchStatus::Cancelled
        )
    }
}

/// Attempt counter for a running search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self { current: 0, total }
    }

    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.current as f64 / self.total as f64 * 100.0
        }
    }

    pub fn complete(&mut self) {
        self.current = self.total;
    }
}

/// Everything one search run needs beyond the parameter space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub method: SearchMethod,
    pub objective: Objective,
    pub max_iterations: usize,
    /// Advisory wall-clock budget surfaced to observers; never enforced
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub time_limit_secs: Option<u64>,
    /// Leaderboard capacity
    pub top_k: usize,
    /// Strategy parameters every candidate is merged into before being
    /// sent to the backtest service
    pub base_parameters: serde_json::Value,
    pub training_period: TimePeriod,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cross_validation: Option<CrossValidationConfig>,
}

impl SearchConfig {
    pub fn new(method: SearchMethod, objective: Objective, training_period: TimePeriod) -> Self {
        Self {
            method,
            objective,
            max_iterations: 100,
            time_limit_secs: None,
            top_k: 10,
            base_parameters: serde_json::json!({}),
            training_period,
            cross_validation: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_time_limit(mut self, secs: u64) -> Self {
        self.time_limit_secs = Some(secs);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_base_parameters(mut self, base: serde_json::Value) -> Self {
        self.base_parameters = base;
        self
    }

    pub fn with_cross_validation(mut self, cv: CrossValidationConfig) -> Self {
        self.cross_validation = Some(cv);
        self
    }

    pub fn ensure_valid(&self) -> SearchResult<()> {
        if self.max_iterations == 0 {
            return Err(config_error!("max_iterations must be at least 1"));
        }
        if self.top_k == 0 {
            return Err(config_error!("top_k must be at least 1"));
        }
        if !self.training_period.is_valid() {
            return Err(config_error!(
                "training period starts after it ends: {}",
                self.training_period
            ));
        }
        if let Some(cv) = &self.cross_validation {
            cv.ensure_valid()?;
        }
        Ok(())
    }
}

/// A single search run: configuration, live progress and the leaderboard
/// of best results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchTask {
    pub id: TaskId,
    pub config: SearchConfig,
    pub space: ParameterSpace,
    pub status: SearchStatus,
    pub progress: Progress,
    /// Best results so far, sorted by objective descending, capped at
    /// `config.top_k` entries
    pub results: Vec<EvaluationResult>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl SearchTask {
    pub fn new(config: SearchConfig, space: ParameterSpace) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            space,
            status: SearchStatus::Pending,
            progress: Progress::default(),
            results: Vec::new(),
            start_time: None,
            end_time: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = SearchStatus::Running;
        self.start_time = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.status = SearchStatus::Completed;
        self.end_time = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = SearchStatus::Failed;
        self.error = Some(error.into());
        self.end_time = Some(Utc::now());
    }

    pub fn mark_cancelled(&mut self) {
        self.status = SearchStatus::Cancelled;
        self.end_time = Some(Utc::now());
    }

    pub fn best(&self) -> Option<&EvaluationResult> {
        self.results.first()
    }

    pub fn best_objective(&self) -> Option<f64> {
        self.best().map(|r| r.objective_value)
    }
}
