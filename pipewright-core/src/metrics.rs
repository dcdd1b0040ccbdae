//! Per-run counters and timings.

use std::collections::HashMap;
use std::time::Duration;

/// Metrics collected during one run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionMetrics {
    /// Total number of tasks that were started.
    pub tasks_total: usize,
    /// Number of tasks that succeeded.
    pub tasks_succeeded: usize,
    /// Number of tasks that failed.
    pub tasks_failed: usize,
    /// Wall-clock time of the whole run.
    pub total_duration: Duration,
    /// Duration per task (task name -> duration).
    pub task_durations: HashMap<String, Duration>,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a task execution result.
    pub fn record_task(&mut self, task_name: String, duration: Duration, success: bool) {
        self.tasks_total += 1;
        if success {
            self.tasks_succeeded += 1;
        } else {
            self.tasks_failed += 1;
        }
        self.task_durations.insert(task_name, duration);
    }

    pub fn set_total_duration(&mut self, duration: Duration) {
        self.total_duration = duration;
    }

    /// Returns the slowest task, if any ran.
    pub fn slowest_task(&self) -> Option<(&str, Duration)> {
        self.task_durations
            .iter()
            .max_by_key(|(_, d)| **d)
            .map(|(name, d)| (name.as_str(), *d))
    }
}
