//! Top-K leaderboard of evaluation results.

use std::cmp::Ordering;

use wt_types::EvaluationResult;

/// Keeps the best `capacity` results, sorted by objective descending.
///
/// Insertion is stable on ties: a new result with the same objective as
/// an existing one ranks after it, so earlier discoveries keep their
/// spot.
#[derive(Debug)]
pub struct ResultStore {
    capacity: usize,
    results: Vec<EvaluationResult>,
}

impl ResultStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            results: Vec::new(),
        }
    }

    /// Inserts a result and evicts everything past capacity
    pub fn insert(&mut self, result: EvaluationResult) {
        self.results.push(result);
        self.results.sort_by(|a, b| {
            b.objective_value
                .partial_cmp(&a.objective_value)
                .unwrap_or(Ordering::Equal)
        });
        self.results.truncate(self.capacity);
    }

    /// Current leaderboard, best first
    pub fn top(&self) -> &[EvaluationResult] {
        &self.results
    }

    pub fn best(&self) -> Option<&EvaluationResult> {
        self.results.first()
    }

    /// The leading results used as perturbation bases
    pub fn elites(&self, n: usize) -> &[EvaluationResult] {
        &self.results[..n.min(self.results.len())]
    }

    /// Owned copy of the leaderboard for mirroring into a task
    pub fn snapshot(&self) -> Vec<EvaluationResult> {
        self.results.clone()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wt_types::{
        AllocationStrategy, ParameterCombination, PerformanceMetrics, ScoringWeights,
    };

    fn result(objective: f64) -> EvaluationResult {
        let combination = ParameterCombination::new(
            ScoringWeights::new(0.4, 0.3, 0.2, 0.1),
            5,
            AllocationStrategy::EqualWeight,
        );
        EvaluationResult::new(combination, objective, PerformanceMetrics::default(), 100)
    }

    #[test]
    fn test_sorted_descending() {
        let mut store = ResultStore::new(10);
        for objective in [0.5, 1.5, -0.2, 1.0] {
            store.insert(result(objective));
        }
        let objectives: Vec<f64> = store.top().iter().map(|r| r.objective_value).collect();
        assert_eq!(objectives, vec![1.5, 1.0, 0.5, -0.2]);
        assert_eq!(store.best().unwrap().objective_value, 1.5);
    }

    #[test]
    fn test_capacity_evicts_worst() {
        let mut store = ResultStore::new(3);
        for objective in [0.1, 0.9, 0.5, 0.7, 0.3] {
            store.insert(result(objective));
        }
        assert_eq!(store.len(), 3);
        let objectives: Vec<f64> = store.top().iter().map(|r| r.objective_value).collect();
        assert_eq!(objectives, vec![0.9, 0.7, 0.5]);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut store = ResultStore::new(10);
        let first = result(1.0);
        let second = result(1.0);
        let first_id = first.combination.id;
        let second_id = second.combination.id;

        store.insert(first);
        store.insert(second);

        assert_eq!(store.top()[0].combination.id, first_id);
        assert_eq!(store.top()[1].combination.id, second_id);
    }

    #[test]
    fn test_tie_on_boundary_prefers_earlier() {
        let mut store = ResultStore::new(2);
        let kept = result(0.5);
        let kept_id = kept.combination.id;
        store.insert(result(1.0));
        store.insert(kept);
        // ties the current last slot; the earlier insertion survives
        store.insert(result(0.5));

        assert_eq!(store.len(), 2);
        assert_eq!(store.top()[1].combination.id, kept_id);
    }

    #[test]
    fn test_elites_bounded_by_len() {
        let mut store = ResultStore::new(10);
        store.insert(result(1.0));
        store.insert(result(2.0));
        assert_eq!(store.elites(3).len(), 2);
        assert_eq!(store.elites(1).len(), 1);
        assert_eq!(store.elites(1)[0].objective_value, 2.0);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let store = ResultStore::new(0);
        assert_eq!(store.capacity(), 1);
        assert!(store.is_empty());
    }
}
