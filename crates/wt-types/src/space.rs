//! Declarative bounds for every tunable dimension of the search space.

use serde::{Deserialize, Serialize};

use crate::combination::{
    AllocationStrategy, ParameterCombination, MAX_SHORT_POSITIONS, MIN_SHORT_POSITIONS,
    WEIGHT_SUM_EPSILON,
};
use crate::config_error;
use crate::errors::SearchResult;

/// Weights below this floor on the price-change signal are flagged as
/// warnings: the signal drives short selection, so near-zero weights
/// degenerate the strategy.
pub const PRICE_CHANGE_WEIGHT_FLOOR: f64 = 0.05;

/// Inclusive bounds and grid step for the single-position ratio cap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioBounds {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl RatioBounds {
    pub fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }

    /// Grid values from `min` to `max` in `step` increments
    pub fn values(&self) -> Vec<f64> {
        let mut values = Vec::new();
        let mut v = self.min;
        while v <= self.max + 1e-9 {
            values.push(v.min(self.max));
            v += self.step;
        }
        values
    }

    /// The `{min, mid, max}` collapse used by coarse grids
    pub fn endpoints(&self) -> Vec<f64> {
        let mut points = vec![self.min, (self.min + self.max) / 2.0, self.max];
        points.dedup_by(|a, b| (*a - *b).abs() < 1e-12);
        points
    }
}

/// Bounds, steps and enabled choices for each tunable dimension.
///
/// The space is purely declarative: candidate generation reads it to
/// enumerate or sample values, and validation checks candidates against
/// it before any remote evaluation is spent on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpace {
    /// Grid step applied to each weight dimension
    pub weight_step: f64,
    /// Wider weight step used by the coarse pass of hybrid searches
    pub coarse_weight_step: f64,
    /// Clip floor applied to randomized weight draws
    pub weight_min: f64,
    /// Clip ceiling applied to randomized weight draws
    pub weight_max: f64,
    pub short_positions_min: u32,
    pub short_positions_max: u32,
    /// Enumeration step for the short position count in full grids
    pub short_positions_step: u32,
    /// Bounds for the optional per-position capital cap; `None` leaves
    /// the dimension out of the search entirely
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub position_ratio: Option<RatioBounds>,
    pub strategies: Vec<AllocationStrategy>,
}

impl Default for ParameterSpace {
    fn default() -> Self {
        Self {
            weight_step: 0.1,
            coarse_weight_step: 0.2,
            weight_min: 0.0,
            weight_max: 1.0,
            short_positions_min: 3,
            short_positions_max: 15,
            short_positions_step: 3,
            position_ratio: None,
            strategies: AllocationStrategy::ALL.to_vec(),
        }
    }
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weight_step(mut self, step: f64) -> Self {
        self.weight_step = step;
        self
    }

    pub fn with_coarse_weight_step(mut self, step: f64) -> Self {
        self.coarse_weight_step = step;
        self
    }

    pub fn with_weight_clip(mut self, min: f64, max: f64) -> Self {
        self.weight_min = min;
        self.weight_max = max;
        self
    }

    pub fn with_short_positions(mut self, min: u32, max: u32) -> Self {
        self.short_positions_min = min;
        self.short_positions_max = max;
        self
    }

    pub fn with_short_position_step(mut self, step: u32) -> Self {
        self.short_positions_step = step;
        self
    }

    pub fn with_position_ratio(mut self, bounds: RatioBounds) -> Self {
        self.position_ratio = Some(bounds);
        self
    }

    pub fn with_strategies(mut self, strategies: Vec<AllocationStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    // ---- Grid enumeration helpers ----

    /// Short position counts enumerated for the full grid
    pub fn short_position_values(&self) -> Vec<u32> {
        (self.short_positions_min..=self.short_positions_max)
            .step_by(self.short_positions_step.max(1) as usize)
            .collect()
    }

    /// The `{min, mid, max}` collapse used by coarse grids
    pub fn short_position_endpoints(&self) -> Vec<u32> {
        let mid = (self.short_positions_min + self.short_positions_max) / 2;
        let mut points = vec![self.short_positions_min, mid, self.short_positions_max];
        points.dedup();
        points
    }

    // ---- Validation ----

    /// Checks the space itself for contradictions. Run once before a
    /// search starts; a broken space is a fatal configuration error.
    pub fn ensure_valid(&self) -> SearchResult<()> {
        if self.weight_step <= 0.0 || self.weight_step > 1.0 {
            return Err(config_error!("weight_step must be in (0, 1], got {}", self.weight_step));
        }
        if self.coarse_weight_step <= 0.0 || self.coarse_weight_step > 1.0 {
            return Err(config_error!(
                "coarse_weight_step must be in (0, 1], got {}",
                self.coarse_weight_step
            ));
        }
        if self.weight_min < 0.0 || self.weight_max > 1.0 || self.weight_min >= self.weight_max {
            return Err(config_error!(
                "weight clip bounds must satisfy 0 <= min < max <= 1, got [{}, {}]",
                self.weight_min,
                self.weight_max
            ));
        }
        if self.short_positions_min > self.short_positions_max {
            return Err(config_error!(
                "short position range is empty: [{}, {}]",
                self.short_positions_min,
                self.short_positions_max
            ));
        }
        if self.short_positions_min < MIN_SHORT_POSITIONS
            || self.short_positions_max > MAX_SHORT_POSITIONS
        {
            return Err(config_error!(
                "short position range [{}, {}] exceeds the hard bounds [{}, {}]",
                self.short_positions_min,
                self.short_positions_max,
                MIN_SHORT_POSITIONS,
                MAX_SHORT_POSITIONS
            ));
        }
        if self.short_positions_step == 0 {
            return Err(config_error!("short_positions_step must be at least 1"));
        }
        if let Some(ratio) = &self.position_ratio {
            if ratio.min <= 0.0 || ratio.max > 1.0 || ratio.min > ratio.max {
                return Err(config_error!(
                    "position ratio bounds must satisfy 0 < min <= max <= 1, got [{}, {}]",
                    ratio.min,
                    ratio.max
                ));
            }
            if ratio.step <= 0.0 {
                return Err(config_error!("position ratio step must be positive"));
            }
        }
        if self.strategies.is_empty() {
            return Err(config_error!("at least one allocation strategy must be enabled"));
        }
        Ok(())
    }

    /// Validates a single candidate against the space.
    ///
    /// Hard violations land in `errors` and make the candidate
    /// unusable; `warnings` flag legal but suspicious values and never
    /// block evaluation.
    pub fn validate(&self, candidate: &ParameterCombination) -> ValidationReport {
        let mut report = ValidationReport::default();
        let weights = candidate.weights;

        for (name, value) in [
            ("price_change", weights.price_change),
            ("volume", weights.volume),
            ("volatility", weights.volatility),
            ("funding_rate", weights.funding_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                report
                    .errors
                    .push(format!("{name} weight {value} is outside [0, 1]"));
            }
        }

        let sum = weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            report
                .errors
                .push(format!("weights sum to {sum:.4}, expected 1.0 +/- {WEIGHT_SUM_EPSILON}"));
        }

        if candidate.max_short_positions < MIN_SHORT_POSITIONS
            || candidate.max_short_positions > MAX_SHORT_POSITIONS
        {
            report.errors.push(format!(
                "max_short_positions {} is outside [{}, {}]",
                candidate.max_short_positions, MIN_SHORT_POSITIONS, MAX_SHORT_POSITIONS
            ));
        }

        if let Some(ratio) = candidate.max_single_position_ratio {
            match &self.position_ratio {
                Some(bounds) if ratio < bounds.min || ratio > bounds.max => {
                    report.errors.push(format!(
                        "max_single_position_ratio {} is outside the declared bounds [{}, {}]",
                        ratio, bounds.min, bounds.max
                    ));
                }
                None if !(0.0..=1.0).contains(&ratio) || ratio == 0.0 => {
                    report.errors.push(format!(
                        "max_single_position_ratio {ratio} is outside (0, 1]"
                    ));
                }
                _ => {}
            }
        }

        if weights.price_change < PRICE_CHANGE_WEIGHT_FLOOR {
            report.warnings.push(format!(
                "price_change weight {} is below {}; the core short-selection signal is nearly muted",
                weights.price_change, PRICE_CHANGE_WEIGHT_FLOOR
            ));
        }

        report
    }
}

/// Outcome of validating one candidate against the space
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combination::ScoringWeights;

    fn candidate(weights: ScoringWeights, shorts: u32) -> ParameterCombination {
        ParameterCombination::new(weights, shorts, AllocationStrategy::EqualWeight)
    }

    #[test]
    fn test_valid_candidate_passes() {
        let space = ParameterSpace::default();
        let report = space.validate(&candidate(ScoringWeights::new(0.4, 0.3, 0.2, 0.1), 5));
        assert!(report.is_valid());
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_weight_sum_violation_is_single_error() {
        let space = ParameterSpace::default();
        let report = space.validate(&candidate(ScoringWeights::new(0.4, 0.3, 0.2, 0.05), 5));
        assert!(!report.is_valid());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("sum"));
    }

    #[test]
    fn test_weight_out_of_range() {
        let space = ParameterSpace::default();
        let report = space.validate(&candidate(ScoringWeights::new(1.2, -0.2, 0.0, 0.0), 5));
        // two range errors, and the sum happens to be 1.0 so no sum error
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn test_short_positions_hard_bounds() {
        let space = ParameterSpace::default();
        let report = space.validate(&candidate(ScoringWeights::new(0.4, 0.3, 0.2, 0.1), 80));
        assert!(!report.is_valid());
        assert!(report.errors[0].contains("max_short_positions"));

        let report = space.validate(&candidate(ScoringWeights::new(0.4, 0.3, 0.2, 0.1), 0));
        assert!(!report.is_valid());
    }

    #[test]
    fn test_price_change_floor_warning() {
        let space = ParameterSpace::default();
        let report = space.validate(&candidate(ScoringWeights::new(0.0, 0.5, 0.3, 0.2), 5));
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("price_change"));
    }

    #[test]
    fn test_ratio_against_declared_bounds() {
        let space = ParameterSpace::default().with_position_ratio(RatioBounds::new(0.1, 0.5, 0.2));
        let ok = candidate(ScoringWeights::new(0.4, 0.3, 0.2, 0.1), 5).with_position_ratio(0.3);
        assert!(space.validate(&ok).is_valid());

        let too_high = candidate(ScoringWeights::new(0.4, 0.3, 0.2, 0.1), 5).with_position_ratio(0.9);
        assert!(!space.validate(&too_high).is_valid());
    }

    #[test]
    fn test_ensure_valid_rejects_bad_bounds() {
        assert!(ParameterSpace::default().ensure_valid().is_ok());

        let empty_range = ParameterSpace::default().with_short_positions(10, 3);
        assert!(empty_range.ensure_valid().is_err());

        let over_hard_cap = ParameterSpace::default().with_short_positions(1, 80);
        assert!(over_hard_cap.ensure_valid().is_err());

        let no_strategies = ParameterSpace::default().with_strategies(vec![]);
        assert!(no_strategies.ensure_valid().is_err());

        let bad_step = ParameterSpace::default().with_weight_step(0.0);
        assert!(bad_step.ensure_valid().is_err());
    }

    #[test]
    fn test_short_position_values() {
        let space = ParameterSpace::default();
        assert_eq!(space.short_position_values(), vec![3, 6, 9, 12, 15]);
        assert_eq!(space.short_position_endpoints(), vec![3, 9, 15]);

        let single = ParameterSpace::default()
            .with_short_positions(5, 5)
            .with_short_position_step(1);
        assert_eq!(single.short_position_values(), vec![5]);
        assert_eq!(single.short_position_endpoints(), vec![5]);
    }

    #[test]
    fn test_ratio_values() {
        let bounds = RatioBounds::new(0.1, 0.5, 0.2);
        let values = bounds.values();
        assert_eq!(values.len(), 3);
        assert!((values[0] - 0.1).abs() < 1e-9);
        assert!((values[2] - 0.5).abs() < 1e-9);
        assert_eq!(bounds.endpoints().len(), 3);
    }
}
