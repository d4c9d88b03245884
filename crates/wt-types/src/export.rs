//! Snapshot persistence for search tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::combination::ParameterCombination;
use crate::errors::SearchResult;
use crate::result::EvaluationResult;
use crate::space::ParameterSpace;
use crate::task::{Progress, SearchConfig, SearchStatus, SearchTask, TaskId};

/// Identity and configuration portion of an exported task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub status: SearchStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub config: SearchConfig,
    pub parameter_space: ParameterSpace,
}

/// Headline numbers for an exported task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub total_combinations: usize,
    pub best_objective_value: Option<f64>,
    pub best_parameters: Option<ParameterCombination>,
}

/// Portable snapshot of a task and its leaderboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExport {
    pub task_info: TaskInfo,
    pub results: Vec<EvaluationResult>,
    pub summary: TaskSummary,
}

impl TaskExport {
    /// Snapshots a task, preserving result order
    pub fn from_task(task: &SearchTask) -> Self {
        let best = task.best();
        Self {
            task_info: TaskInfo {
                id: task.id,
                status: task.status,
                start_time: task.start_time,
                end_time: task.end_time,
                config: task.config.clone(),
                parameter_space: task.space.clone(),
            },
            results: task.results.clone(),
            summary: TaskSummary {
                total_combinations: task.progress.total,
                best_objective_value: best.map(|r| r.objective_value),
                best_parameters: best.map(|r| r.combination.clone()),
            },
        }
    }

    pub fn to_json(&self) -> SearchResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> SearchResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Rebuilds a task from a snapshot.
    ///
    /// Imported tasks are inspection artifacts, not resumable runs: they
    /// come back as completed with full progress regardless of the state
    /// they were exported in.
    pub fn into_task(self) -> SearchTask {
        let total = self.summary.total_combinations;
        SearchTask {
            id: self.task_info.id,
            config: self.task_info.config,
            space: self.task_info.parameter_space,
            status: SearchStatus::Completed,
            progress: Progress {
                current: total,
                total,
            },
            results: self.results,
            start_time: self.task_info.start_time,
            end_time: self.task_info.end_time,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combination::{AllocationStrategy, ScoringWeights};
    use crate::period::TimePeriod;
    use crate::result::PerformanceMetrics;
    use crate::task::{Objective, SearchMethod};
    use chrono::NaiveDate;

    fn finished_task() -> SearchTask {
        let period = TimePeriod::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            "training",
        );
        let config = SearchConfig::new(SearchMethod::Randomized, Objective::Sharpe, period)
            .with_max_iterations(20);
        let mut task = SearchTask::new(config, ParameterSpace::default());
        task.progress = Progress { current: 20, total: 20 };
        task.mark_running();

        for (i, sharpe) in [1.8, 1.2, 0.7].iter().enumerate() {
            let combination = ParameterCombination::new(
                ScoringWeights::new(0.4, 0.3, 0.2, 0.1),
                3 + i as u32,
                AllocationStrategy::EqualWeight,
            );
            let metrics = PerformanceMetrics {
                total_return: 0.1,
                max_drawdown: 0.05,
                sharpe_ratio: Some(*sharpe),
                ..Default::default()
            };
            task.results
                .push(EvaluationResult::new(combination, *sharpe, metrics, 1200));
        }
        task.mark_completed();
        task
    }

    #[test]
    fn test_round_trip_preserves_order_and_identity() {
        let task = finished_task();
        let json = TaskExport::from_task(&task).to_json().unwrap();
        let imported = TaskExport::from_json(&json).unwrap().into_task();

        assert_eq!(imported.id, task.id);
        assert_eq!(imported.status, SearchStatus::Completed);
        assert_eq!(imported.results.len(), 3);
        let objectives: Vec<f64> = imported.results.iter().map(|r| r.objective_value).collect();
        assert_eq!(objectives, vec![1.8, 1.2, 0.7]);
        assert_eq!(
            imported.results[0].combination.id,
            task.results[0].combination.id
        );
    }

    #[test]
    fn test_import_is_completed_at_full_progress() {
        let mut task = finished_task();
        // export a half-done cancelled task; the import still lands completed
        task.status = SearchStatus::Cancelled;
        task.progress = Progress { current: 9, total: 20 };

        let export = TaskExport::from_task(&task);
        let imported = export.into_task();
        assert_eq!(imported.status, SearchStatus::Completed);
        assert_eq!(imported.progress.current, imported.progress.total);
        assert!((imported.progress.percentage() - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_summary_tracks_best() {
        let task = finished_task();
        let export = TaskExport::from_task(&task);
        assert_eq!(export.summary.total_combinations, 20);
        assert_eq!(export.summary.best_objective_value, Some(1.8));
        assert_eq!(
            export.summary.best_parameters.as_ref().map(|p| p.id),
            Some(task.results[0].combination.id)
        );
    }

    #[test]
    fn test_summary_empty_results() {
        let mut task = finished_task();
        task.results.clear();
        let export = TaskExport::from_task(&task);
        assert!(export.summary.best_objective_value.is_none());
        assert!(export.summary.best_parameters.is_none());
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let err = TaskExport::from_json("{\"task_info\": 42}").unwrap_err();
        assert!(matches!(err, crate::SearchError::Serialization(_)));
    }

    #[test]
    fn test_export_json_uses_documented_keys() {
        let json = TaskExport::from_task(&finished_task()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let task_info = value["task_info"].as_object().unwrap();
        for key in ["id", "status", "start_time", "end_time", "config", "parameter_space"] {
            assert!(task_info.contains_key(key), "task_info is missing {key}");
        }

        let summary = value["summary"].as_object().unwrap();
        for key in ["total_combinations", "best_objective_value", "best_parameters"] {
            assert!(summary.contains_key(key), "summary is missing {key}");
        }

        assert_eq!(value["results"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_advisory_time_limit_survives_round_trip() {
        let mut task = finished_task();
        task.config = task.config.clone().with_time_limit(600);

        let json = TaskExport::from_task(&task).to_json().unwrap();
        assert!(json.contains("time_limit_secs"));

        let imported = TaskExport::from_json(&json).unwrap().into_task();
        assert_eq!(imported.config.time_limit_secs, Some(600));

        // an unset limit stays out of the serialized config entirely
        let bare = TaskExport::from_task(&finished_task()).to_json().unwrap();
        assert!(!bare.contains("time_limit_secs"));
    }
}
