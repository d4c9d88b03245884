//! Candidate generation: grid enumeration, random draws and elite
//! perturbation.

use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use wt_types::{
    AllocationStrategy, EvaluationResult, ParameterCombination, ParameterSpace, ScoringWeights,
};

/// Number of leaderboard entries perturbation draws bases from
pub const ELITE_POOL: usize = 3;

/// Chance that a perturbed candidate keeps its base's allocation strategy
const STRATEGY_CARRY_PROBABILITY: f64 = 0.7;

/// Half-width of the uniform noise added to each weight
const WEIGHT_NOISE: f64 = 0.1;

/// Half-width of the integer window around the base short count
const SHORT_POSITION_NOISE: i64 = 2;

/// Half-width of the noise added to the position ratio
const RATIO_NOISE: f64 = 0.05;

/// Deterministic candidate factory behind all three search methods.
///
/// Every random decision flows through one seeded generator, so a given
/// seed replays the exact candidate sequence.
#[derive(Debug, Clone)]
pub struct CandidateGenerator {
    space: ParameterSpace,
    rng: ChaCha8Rng,
    /// Concentration of the symmetric Dirichlet behind random weight
    /// draws. 1.0 is uniform over the simplex; larger values pull draws
    /// toward equal weights.
    alpha: f64,
}

impl CandidateGenerator {
    pub fn new(space: ParameterSpace, seed: u64) -> Self {
        Self {
            space,
            rng: ChaCha8Rng::seed_from_u64(seed),
            alpha: 1.0,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn space(&self) -> &ParameterSpace {
        &self.space
    }

    // ---- Grid generation ----

    /// Full grid: every weight tuple at `weight_step` cross-joined with
    /// every enumerated scalar dimension.
    pub fn grid(&self) -> Vec<ParameterCombination> {
        self.build_grid(
            self.space.weight_step,
            &self.space.short_position_values(),
            &self.ratio_axis(false),
        )
    }

    /// Coarse grid for the opening hybrid phase: wider weight step,
    /// scalar dimensions collapsed to their `{min, mid, max}` endpoints.
    pub fn coarse_grid(&self) -> Vec<ParameterCombination> {
        self.build_grid(
            self.space.coarse_weight_step,
            &self.space.short_position_endpoints(),
            &self.ratio_axis(true),
        )
    }

    fn ratio_axis(&self, coarse: bool) -> Vec<Option<f64>> {
        match &self.space.position_ratio {
            Some(bounds) if coarse => bounds.endpoints().into_iter().map(Some).collect(),
            Some(bounds) => bounds.values().into_iter().map(Some).collect(),
            None => vec![None],
        }
    }

    fn build_grid(
        &self,
        weight_step: f64,
        shorts: &[u32],
        ratios: &[Option<f64>],
    ) -> Vec<ParameterCombination> {
        let mut combos = Vec::new();
        for weights in weight_tuples(weight_step) {
            for &short_count in shorts {
                for &ratio in ratios {
                    for &strategy in &self.space.strategies {
                        let mut candidate =
                            ParameterCombination::new(weights, short_count, strategy);
                        if let Some(r) = ratio {
                            candidate = candidate.with_position_ratio(r);
                        }
                        combos.push(candidate);
                    }
                }
            }
        }
        combos
    }

    // ---- Random sampling ----

    /// Independent draw: Dirichlet weights, uniform scalars, uniform
    /// strategy choice.
    pub fn random(&mut self) -> ParameterCombination {
        let weights = self.random_weights();
        let short_count = self
            .rng
            .random_range(self.space.short_positions_min..=self.space.short_positions_max);
        let mut candidate = ParameterCombination::new(weights, short_count, self.random_strategy());
        if let Some(bounds) = self.space.position_ratio {
            candidate = candidate.with_position_ratio(self.rng.random_range(bounds.min..=bounds.max));
        }
        candidate
    }

    /// Weights from a symmetric Dirichlet, drawn as four normalized
    /// Gamma variates, then clipped to the configured bounds and
    /// renormalized. The second pass can leave a value marginally
    /// outside a tight clip range; validation screens those out.
    fn random_weights(&mut self) -> ScoringWeights {
        let mut draws = [0.0f64; 4];
        for draw in &mut draws {
            *draw = sample_gamma(&mut self.rng, self.alpha);
        }

        let sum: f64 = draws.iter().sum();
        if sum <= f64::MIN_POSITIVE {
            return ScoringWeights::new(0.25, 0.25, 0.25, 0.25);
        }
        for draw in &mut draws {
            *draw /= sum;
        }

        for draw in &mut draws {
            *draw = draw.clamp(self.space.weight_min, self.space.weight_max);
        }
        let sum: f64 = draws.iter().sum();
        if sum > 0.0 {
            for draw in &mut draws {
                *draw /= sum;
            }
        }

        ScoringWeights::from_array(draws)
    }

    fn random_strategy(&mut self) -> AllocationStrategy {
        self.space
            .strategies
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(AllocationStrategy::EqualWeight)
    }

    // ---- Perturbation ----

    /// A new candidate near one of the current elites. Falls back to a
    /// random draw while the leaderboard is still empty.
    pub fn perturb(&mut self, elites: &[EvaluationResult]) -> ParameterCombination {
        let pool = elites.len().min(ELITE_POOL);
        if pool == 0 {
            return self.random();
        }
        let base = elites[self.rng.random_range(0..pool)].combination.clone();

        let weights = self.perturb_weights(&base.weights);

        let delta = self
            .rng
            .random_range(-SHORT_POSITION_NOISE..=SHORT_POSITION_NOISE);
        let short_count = (base.max_short_positions as i64 + delta).clamp(
            self.space.short_positions_min as i64,
            self.space.short_positions_max as i64,
        ) as u32;

        let strategy = if self.rng.random_bool(STRATEGY_CARRY_PROBABILITY) {
            base.allocation_strategy
        } else {
            self.random_strategy()
        };

        let mut candidate = ParameterCombination::new(weights, short_count, strategy);
        match (base.max_single_position_ratio, self.space.position_ratio) {
            (Some(ratio), Some(bounds)) => {
                let jittered = (ratio + self.rng.random_range(-RATIO_NOISE..=RATIO_NOISE))
                    .clamp(bounds.min, bounds.max);
                candidate = candidate.with_position_ratio(jittered);
            }
            (Some(ratio), None) => {
                candidate = candidate.with_position_ratio(ratio);
            }
            (None, _) => {}
        }
        candidate
    }

    /// Additive uniform noise on each weight, clipped and renormalized.
    /// The float residue of the renormalization is folded into the first
    /// weight so the tuple sums to 1 exactly.
    fn perturb_weights(&mut self, base: &ScoringWeights) -> ScoringWeights {
        let lo = self.space.weight_min.max(0.0);
        let hi = self.space.weight_max.min(1.0);

        let mut values = base.as_array();
        for value in &mut values {
            *value = (*value + self.rng.random_range(-WEIGHT_NOISE..=WEIGHT_NOISE)).clamp(lo, hi);
        }

        let sum: f64 = values.iter().sum();
        if sum > 0.0 {
            for value in &mut values {
                *value /= sum;
            }
        }
        values[0] = (1.0 - (values[1] + values[2] + values[3])).max(0.0);

        ScoringWeights::from_array(values)
    }
}

/// Exact weight tuples summing to 1: all compositions of `1/step` grid
/// units into four parts. Enumerating in integer units sidesteps float
/// drift in the sum.
fn weight_tuples(step: f64) -> Vec<ScoringWeights> {
    let units = (1.0 / step).round().max(1.0) as u32;
    let step = 1.0 / units as f64;

    let mut tuples = Vec::new();
    for a in 0..=units {
        for b in 0..=(units - a) {
            for c in 0..=(units - a - b) {
                let d = units - a - b - c;
                tuples.push(ScoringWeights::new(
                    a as f64 * step,
                    b as f64 * step,
                    c as f64 * step,
                    d as f64 * step,
                ));
            }
        }
    }
    tuples
}

// ---- Distribution sampling ----

/// Standard normal via Box-Muller
fn sample_standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Gamma(shape, 1) via the Marsaglia-Tsang squeeze, with the boost
/// transform for shape < 1
fn sample_gamma<R: Rng>(rng: &mut R, shape: f64) -> f64 {
    if shape < 1.0 {
        let u: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
        return sample_gamma(rng, shape + 1.0) * u.powf(1.0 / shape);
    }

    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let x = sample_standard_normal(rng);
        let v = (1.0 + c * x).powi(3);
        if v <= 0.0 {
            continue;
        }
        let u: f64 = rng.random::<f64>().max(f64::MIN_POSITIVE);
        if u < 1.0 - 0.0331 * x.powi(4) {
            return d * v;
        }
        if u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
            return d * v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wt_types::{PerformanceMetrics, RatioBounds};

    fn elite(shorts: u32, objective: f64) -> EvaluationResult {
        let combination = ParameterCombination::new(
            ScoringWeights::new(0.4, 0.3, 0.2, 0.1),
            shorts,
            AllocationStrategy::EqualWeight,
        );
        EvaluationResult::new(combination, objective, PerformanceMetrics::default(), 50)
    }

    #[test]
    fn test_grid_counts() {
        // compositions of 10 units into 4 parts = C(13, 3) = 286,
        // crossed with 5 short counts and 3 strategies
        let generator = CandidateGenerator::new(ParameterSpace::default(), 1);
        assert_eq!(generator.grid().len(), 286 * 5 * 3);
    }

    #[test]
    fn test_coarse_grid_counts() {
        // compositions of 5 units into 4 parts = C(8, 3) = 56, crossed
        // with the 3 short endpoints and 3 strategies
        let generator = CandidateGenerator::new(ParameterSpace::default(), 1);
        assert_eq!(generator.coarse_grid().len(), 56 * 3 * 3);
    }

    #[test]
    fn test_grid_candidates_are_valid() {
        let space = ParameterSpace::default();
        let generator = CandidateGenerator::new(space.clone(), 1);
        for candidate in generator.grid() {
            assert!(candidate.weights.is_normalized(), "bad tuple: {:?}", candidate.weights);
            assert!(space.validate(&candidate).is_valid());
        }
    }

    #[test]
    fn test_grid_includes_ratio_axis() {
        let space = ParameterSpace::default()
            .with_position_ratio(RatioBounds::new(0.1, 0.5, 0.2))
            .with_strategies(vec![AllocationStrategy::EqualWeight])
            .with_short_positions(5, 5)
            .with_short_position_step(1)
            .with_weight_step(0.5);
        let generator = CandidateGenerator::new(space, 1);
        // 10 weight tuples x 1 short count x 3 ratios x 1 strategy
        let grid = generator.grid();
        assert_eq!(grid.len(), 10 * 3);
        assert!(grid.iter().all(|c| c.max_single_position_ratio.is_some()));
    }

    #[test]
    fn test_random_is_seed_deterministic() {
        let space = ParameterSpace::default();
        let mut a = CandidateGenerator::new(space.clone(), 42);
        let mut b = CandidateGenerator::new(space, 42);
        for _ in 0..20 {
            assert_eq!(a.random(), b.random());
        }
    }

    #[test]
    fn test_random_candidates_are_valid() {
        let space = ParameterSpace::default().with_position_ratio(RatioBounds::new(0.05, 0.5, 0.05));
        let mut generator = CandidateGenerator::new(space.clone(), 7);
        for _ in 0..200 {
            let candidate = generator.random();
            assert!(candidate.weights.is_normalized());
            assert!(candidate.max_short_positions >= space.short_positions_min);
            assert!(candidate.max_short_positions <= space.short_positions_max);
            assert!(space.strategies.contains(&candidate.allocation_strategy));
            let ratio = candidate.max_single_position_ratio.unwrap();
            assert!((0.05..=0.5).contains(&ratio));
        }
    }

    #[test]
    fn test_perturb_stays_near_base() {
        let space = ParameterSpace::default().with_short_positions(1, 50);
        let mut generator = CandidateGenerator::new(space, 9);
        let elites = vec![elite(10, 1.0)];

        for _ in 0..100 {
            let candidate = generator.perturb(&elites);
            let sum = candidate.weights.sum();
            assert!((sum - 1.0).abs() < 1e-9, "sum drifted: {sum}");
            assert!(candidate.max_short_positions >= 8);
            assert!(candidate.max_short_positions <= 12);
        }
    }

    #[test]
    fn test_perturb_uses_top_three_only() {
        let space = ParameterSpace::default().with_short_positions(1, 50);
        let mut generator = CandidateGenerator::new(space, 11);
        // top three sit at 3 shorts; the rest at 40 would be easy to spot
        let elites = vec![
            elite(3, 5.0),
            elite(3, 4.0),
            elite(3, 3.0),
            elite(40, 2.0),
            elite(40, 1.0),
        ];

        for _ in 0..100 {
            let candidate = generator.perturb(&elites);
            assert!(candidate.max_short_positions <= 5);
        }
    }

    #[test]
    fn test_perturb_empty_leaderboard_falls_back_to_random() {
        let space = ParameterSpace::default();
        let mut generator = CandidateGenerator::new(space.clone(), 13);
        let candidate = generator.perturb(&[]);
        assert!(space.validate(&candidate).is_valid());
    }

    #[test]
    fn test_perturb_mostly_carries_strategy() {
        let space = ParameterSpace::default();
        let mut generator = CandidateGenerator::new(space, 17);
        let elites = vec![elite(10, 1.0)];

        let carried = (0..100)
            .filter(|_| {
                generator.perturb(&elites).allocation_strategy == AllocationStrategy::EqualWeight
            })
            .count();
        // carry probability is 0.7, and a third of resamples land back on
        // the base strategy anyway
        assert!(carried > 50, "only {carried} of 100 carried the base strategy");
    }

    #[test]
    fn test_gamma_sampler_moments() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let n = 4000;
        let mean: f64 = (0..n).map(|_| sample_gamma(&mut rng, 1.0)).sum::<f64>() / n as f64;
        // Gamma(1, 1) is Exp(1) with mean 1
        assert!((mean - 1.0).abs() < 0.1, "mean drifted: {mean}");

        for _ in 0..500 {
            assert!(sample_gamma(&mut rng, 0.5) > 0.0);
            assert!(sample_gamma(&mut rng, 3.0) > 0.0);
        }
    }

    #[test]
    fn test_normal_sampler_moments() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let n = 4000;
        let samples: Vec<f64> = (0..n).map(|_| sample_standard_normal(&mut rng)).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.1, "mean drifted: {mean}");
        assert!((variance - 1.0).abs() < 0.15, "variance drifted: {variance}");
    }

    #[test]
    fn test_weight_tuples_small_step() {
        // compositions of 2 units into 4 parts = C(5, 3) = 10
        let tuples = weight_tuples(0.5);
        assert_eq!(tuples.len(), 10);
        for tuple in &tuples {
            assert!(tuple.is_normalized());
        }
    }
}
