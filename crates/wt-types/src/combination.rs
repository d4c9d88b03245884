use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Tolerance on the weight-sum invariant: the four scoring weights must
/// sum to 1.0 within this epsilon.
pub const WEIGHT_SUM_EPSILON: f64 = 0.001;

/// Hard lower bound on the short position count
pub const MIN_SHORT_POSITIONS: u32 = 1;

/// Hard upper bound on the short position count
pub const MAX_SHORT_POSITIONS: u32 = 50;

/// How capital is split across the selected short positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    /// Same notional for every position
    EqualWeight,
    /// Notional proportional to the composite short score
    ScoreWeighted,
    /// Notional inversely proportional to realized volatility
    VolatilityScaled,
}

impl AllocationStrategy {
    /// Every supported strategy, in a stable order
    pub const ALL: [AllocationStrategy; 3] = [
        AllocationStrategy::EqualWeight,
        AllocationStrategy::ScoreWeighted,
        AllocationStrategy::VolatilityScaled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationStrategy::EqualWeight => "equal_weight",
            AllocationStrategy::ScoreWeighted => "score_weighted",
            AllocationStrategy::VolatilityScaled => "volatility_scaled",
        }
    }
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Relative weights of the four signals that make up the composite
/// short score. Valid weights lie in [0, 1] and sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub price_change: f64,
    pub volume: f64,
    pub volatility: f64,
    pub funding_rate: f64,
}

impl ScoringWeights {
    pub fn new(price_change: f64, volume: f64, volatility: f64, funding_rate: f64) -> Self {
        Self {
            price_change,
            volume,
            volatility,
            funding_rate,
        }
    }

    pub fn sum(&self) -> f64 {
        self.price_change + self.volume + self.volatility + self.funding_rate
    }

    /// True when the weights satisfy the sum-to-one invariant
    pub fn is_normalized(&self) -> bool {
        (self.sum() - 1.0).abs() <= WEIGHT_SUM_EPSILON
    }

    pub fn as_array(&self) -> [f64; 4] {
        [
            self.price_change,
            self.volume,
            self.volatility,
            self.funding_rate,
        ]
    }

    pub fn from_array(values: [f64; 4]) -> Self {
        Self {
            price_change: values[0],
            volume: values[1],
            volatility: values[2],
            funding_rate: values[3],
        }
    }
}

/// One candidate parameter set for the short-side strategy.
///
/// The `id` is generated per candidate and used for logging and
/// correlation only. Equality compares the tunable fields, never the id,
/// so two independently generated candidates with the same parameters
/// compare equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterCombination {
    pub id: Uuid,
    pub weights: ScoringWeights,
    /// Number of symbols shorted at once, within [1, 50]
    pub max_short_positions: u32,
    /// Optional cap on a single position's share of total capital
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_single_position_ratio: Option<f64>,
    pub allocation_strategy: AllocationStrategy,
}

impl ParameterCombination {
    pub fn new(
        weights: ScoringWeights,
        max_short_positions: u32,
        allocation_strategy: AllocationStrategy,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            weights,
            max_short_positions,
            max_single_position_ratio: None,
            allocation_strategy,
        }
    }

    pub fn with_position_ratio(mut self, ratio: f64) -> Self {
        self.max_single_position_ratio = Some(ratio);
        self
    }
}

impl PartialEq for ParameterCombination {
    fn eq(&self, other: &Self) -> bool {
        self.weights == other.weights
            && self.max_short_positions == other.max_short_positions
            && self.max_single_position_ratio == other.max_single_position_ratio
            && self.allocation_strategy == other.allocation_strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_weights() -> ScoringWeights {
        ScoringWeights::new(0.4, 0.3, 0.2, 0.1)
    }

    #[test]
    fn test_weight_sum() {
        assert!((sample_weights().sum() - 1.0).abs() < 1e-12);
        assert!(sample_weights().is_normalized());

        let short = ScoringWeights::new(0.4, 0.3, 0.2, 0.05);
        assert!(!short.is_normalized());
    }

    #[test]
    fn test_equality_ignores_id() {
        let a = ParameterCombination::new(sample_weights(), 5, AllocationStrategy::EqualWeight);
        let b = ParameterCombination::new(sample_weights(), 5, AllocationStrategy::EqualWeight);
        assert_ne!(a.id, b.id);
        assert_eq!(a, b);
    }

    #[test]
    fn test_equality_on_tunable_fields() {
        let base = ParameterCombination::new(sample_weights(), 5, AllocationStrategy::EqualWeight);
        let mut other = base.clone();
        other.max_short_positions = 6;
        assert_ne!(base, other);

        let ratio_capped = base.clone().with_position_ratio(0.2);
        assert_ne!(base, ratio_capped);
    }

    #[test]
    fn test_serde_round_trip() {
        let combo = ParameterCombination::new(sample_weights(), 8, AllocationStrategy::ScoreWeighted)
            .with_position_ratio(0.25);
        let json = serde_json::to_string(&combo).unwrap();
        let back: ParameterCombination = serde_json::from_str(&json).unwrap();
        assert_eq!(combo, back);
        assert_eq!(combo.id, back.id);
    }

    #[test]
    fn test_strategy_round_trip() {
        for strategy in AllocationStrategy::ALL {
            let json = serde_json::to_string(&strategy).unwrap();
            let back: AllocationStrategy = serde_json::from_str(&json).unwrap();
            assert_eq!(strategy, back);
        }
        assert_eq!(
            serde_json::to_string(&AllocationStrategy::EqualWeight).unwrap(),
            "\"equal_weight\""
        );
    }
}
