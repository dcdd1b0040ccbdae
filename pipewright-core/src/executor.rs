//! Single task invocation with timing and logging.

use std::time::{Duration, Instant};

use crate::error::Error;
use crate::registry::{Task, TaskOutcome};

/// Result of executing one task.
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Name of the task that was executed.
    pub task_name: String,
    /// Whether the action completed without error.
    pub success: bool,
    /// Time spent inside the action.
    pub duration: Duration,
    /// What the action produced, when it succeeded.
    pub outcome: Option<TaskOutcome>,
}

/// A finished invocation: its result plus the error when it failed.
#[derive(Debug)]
pub struct Execution {
    pub result: TaskResult,
    pub error: Option<Error>,
}

pub struct TaskExecutor;

impl TaskExecutor {
    /// Runs a task's action once. Errors are captured, never propagated, so
    /// the caller decides what a failure means for the rest of the run.
    pub async fn execute(task: &Task) -> Execution {
        tracing::info!("Starting '{}'...", task.name);
        let start = Instant::now();
        let outcome = task.action.run().await;
        let duration = start.elapsed();

        match outcome {
            Ok(outcome) => {
                tracing::info!("Finished '{}' after {:?}", task.name, duration);
                Execution {
                    result: TaskResult {
                        task_name: task.name.clone(),
                        success: true,
                        duration,
                        outcome: Some(outcome),
                    },
                    error: None,
                }
            }
            Err(error) => {
                tracing::error!("'{}' errored after {:?}: {}", task.name, duration, error);
                Execution {
                    result: TaskResult {
                        task_name: task.name.clone(),
                        success: false,
                        duration,
                        outcome: None,
                    },
                    error: Some(error),
                }
            }
        }
    }
}
