//! Progress reporting for running searches.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use wt_types::{EvaluationResult, SearchStatus, SearchTask, TaskId};

use crate::gate::ConcurrencyGate;

/// Gate occupancy at the time of an update
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ResourceUsage {
    pub in_flight: usize,
    pub gate_capacity: usize,
}

/// One progress snapshot, emitted after every attempted candidate
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub task_id: TaskId,
    pub status: SearchStatus,
    pub current_iteration: usize,
    pub total_iterations: usize,
    pub current_best: Option<EvaluationResult>,
    /// Leaderboard snapshot, at most top-K entries
    pub recent_results: Vec<EvaluationResult>,
    pub estimated_time_remaining_secs: Option<u64>,
    pub resource_usage: ResourceUsage,
    pub timestamp: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn from_task(task: &SearchTask, gate: &ConcurrencyGate, elapsed: Duration) -> Self {
        Self {
            task_id: task.id,
            status: task.status,
            current_iteration: task.progress.current,
            total_iterations: task.progress.total,
            current_best: task.best().cloned(),
            recent_results: task.results.clone(),
            estimated_time_remaining_secs: estimate_remaining_secs(
                elapsed,
                task.progress.current,
                task.progress.total,
            ),
            resource_usage: ResourceUsage {
                in_flight: gate.in_flight(),
                gate_capacity: gate.capacity(),
            },
            timestamp: Utc::now(),
        }
    }
}

/// Linear completion-time estimate from the pace so far. `None` until
/// the first attempt lands.
pub fn estimate_remaining_secs(elapsed: Duration, current: usize, total: usize) -> Option<u64> {
    if current == 0 {
        return None;
    }
    let remaining = total.saturating_sub(current);
    let per_attempt = elapsed.as_secs_f64() / current as f64;
    Some((per_attempt * remaining as f64).round() as u64)
}

/// Fan-out side of progress reporting.
///
/// Updates flow through an unbounded channel so the search never blocks
/// on a slow observer, and a watch mirror always holds the latest
/// snapshot for pull-style consumers. A dropped receiver silently ends
/// the stream without failing the search.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<ProgressUpdate>,
    latest: Arc<watch::Sender<Option<ProgressUpdate>>>,
}

impl ProgressReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (latest, _) = watch::channel(None);
        (
            Self {
                tx,
                latest: Arc::new(latest),
            },
            rx,
        )
    }

    /// Reporter with no stream subscriber; emissions still feed the
    /// watch mirror.
    pub fn disabled() -> Self {
        Self::channel().0
    }

    pub fn emit(&self, update: ProgressUpdate) {
        self.latest.send_replace(Some(update.clone()));
        let _ = self.tx.send(update);
    }

    /// Pull-style view of the most recent update
    pub fn subscribe_latest(&self) -> watch::Receiver<Option<ProgressUpdate>> {
        self.latest.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wt_types::{Objective, ParameterSpace, Progress, SearchConfig, SearchMethod, TimePeriod};

    fn task() -> SearchTask {
        let period = TimePeriod::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            "training",
        );
        let config = SearchConfig::new(SearchMethod::Randomized, Objective::Sharpe, period);
        let mut task = SearchTask::new(config, ParameterSpace::default());
        task.mark_running();
        task.progress = Progress { current: 5, total: 20 };
        task
    }

    #[test]
    fn test_estimate_remaining() {
        assert_eq!(estimate_remaining_secs(Duration::from_secs(10), 0, 20), None);
        assert_eq!(
            estimate_remaining_secs(Duration::from_secs(10), 5, 20),
            Some(30)
        );
        assert_eq!(
            estimate_remaining_secs(Duration::from_secs(10), 20, 20),
            Some(0)
        );
    }

    #[test]
    fn test_update_from_task() {
        let task = task();
        let gate = ConcurrencyGate::new(3);
        let update = ProgressUpdate::from_task(&task, &gate, Duration::from_secs(10));

        assert_eq!(update.task_id, task.id);
        assert_eq!(update.status, SearchStatus::Running);
        assert_eq!(update.current_iteration, 5);
        assert_eq!(update.total_iterations, 20);
        assert_eq!(update.estimated_time_remaining_secs, Some(30));
        assert_eq!(update.resource_usage.gate_capacity, 3);
        assert!(update.current_best.is_none());
    }

    #[tokio::test]
    async fn test_updates_arrive_in_order() {
        let (reporter, mut rx) = ProgressReporter::channel();
        let task = task();
        let gate = ConcurrencyGate::new(3);

        for elapsed in [1, 2, 3] {
            reporter.emit(ProgressUpdate::from_task(
                &task,
                &gate,
                Duration::from_secs(elapsed),
            ));
        }

        let mut seen = Vec::new();
        while let Ok(update) = rx.try_recv() {
            seen.push(update.estimated_time_remaining_secs.unwrap());
        }
        assert_eq!(seen, vec![3, 6, 9]);
    }

    #[tokio::test]
    async fn test_dropped_receiver_does_not_panic() {
        let (reporter, rx) = ProgressReporter::channel();
        drop(rx);

        let task = task();
        let gate = ConcurrencyGate::new(3);
        reporter.emit(ProgressUpdate::from_task(&task, &gate, Duration::from_secs(1)));

        // the watch mirror still observed the emission
        let latest = reporter.subscribe_latest();
        assert!(latest.borrow().is_some());
    }
}
