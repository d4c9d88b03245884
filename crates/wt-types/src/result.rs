use serde::{Deserialize, Serialize};

use crate::combination::ParameterCombination;
use crate::period::TimePeriod;

/// Performance metrics returned by the backtest service for one run.
///
/// `total_return` and `max_drawdown` are always present. The remaining
/// ratios may be absent when the service cannot compute them, for
/// example a flat equity curve has no Sharpe ratio.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    /// Peak-to-trough loss, reported as a positive fraction
    pub max_drawdown: f64,
    #[serde(default)]
    pub sharpe_ratio: Option<f64>,
    #[serde(default)]
    pub calmar_ratio: Option<f64>,
    #[serde(default)]
    pub volatility: Option<f64>,
    #[serde(default)]
    pub win_rate: Option<f64>,
}

/// Objective and metrics for a single evaluation window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodResult {
    pub period: TimePeriod,
    pub objective_value: f64,
    pub metrics: PerformanceMetrics,
}

/// Dispersion of per-period objective values across the training and
/// validation windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyStats {
    pub standard_deviation: f64,
    pub range: f64,
    /// `1 / (1 + cv)` clamped to [0, 1], where cv is the coefficient of
    /// variation of the objective values. Higher is steadier.
    pub stability_score: f64,
}

impl ConsistencyStats {
    /// Computes dispersion over the objective values of every evaluated
    /// period, training included.
    ///
    /// A zero mean makes the coefficient of variation undefined; it is
    /// treated as maximally unstable (cv = 1).
    pub fn from_objectives(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                standard_deviation: 0.0,
                range: 0.0,
                stability_score: 0.0,
            };
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let standard_deviation = variance.sqrt();

        let min = values.iter().fold(f64::INFINITY, |acc, &v| acc.min(v));
        let max = values.iter().fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));

        let cv = if mean == 0.0 {
            1.0
        } else {
            standard_deviation / mean.abs()
        };

        Self {
            standard_deviation,
            range: max - min,
            stability_score: (1.0 / (1.0 + cv)).clamp(0.0, 1.0),
        }
    }
}

/// Cross-validation outcome for one candidate: the training result, the
/// per-window validation results, and the blended score used for ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationResult {
    pub training: PeriodResult,
    pub validation: Vec<PeriodResult>,
    /// Weighted blend of the training objective and the mean validation
    /// objective
    pub composite_score: f64,
    pub consistency: ConsistencyStats,
}

/// A completed evaluation of one candidate.
///
/// `objective_value` is the score used for ranking: the configured
/// objective over the training period, or the cross-validation composite
/// when cross-validation is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub combination: ParameterCombination,
    pub objective_value: f64,
    pub metrics: PerformanceMetrics,
    pub execution_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cross_validation: Option<CrossValidationResult>,
}

impl EvaluationResult {
    pub fn new(
        combination: ParameterCombination,
        objective_value: f64,
        metrics: PerformanceMetrics,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            combination,
            objective_value,
            metrics,
            execution_time_ms,
            cross_validation: None,
        }
    }

    pub fn with_cross_validation(mut self, cv: CrossValidationResult) -> Self {
        self.cross_validation = Some(cv);
        self
    }
}
