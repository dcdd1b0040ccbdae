//! Task execution engine and orchestration.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Instant;

use tokio::task::JoinSet;

use crate::error::{Error, Result};
use crate::executor::{Execution, TaskExecutor, TaskResult};
use crate::graph::TaskGraph;
use crate::metrics::ExecutionMetrics;
use crate::registry::TaskRegistry;

/// Everything that ran during one request.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Results in completion order, level by level.
    pub results: Vec<TaskResult>,
    pub metrics: ExecutionMetrics,
}

impl RunReport {
    pub fn result(&self, task_name: &str) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.task_name == task_name)
    }
}

/// Executes tasks respecting dependency order.
///
/// The graph is validated when the runner is built, so a cycle or dangling
/// reference is reported before any action runs.
#[derive(Clone)]
pub struct TaskRunner {
    registry: Arc<TaskRegistry>,
    graph: Arc<TaskGraph>,
}

impl TaskRunner {
    pub fn new(registry: TaskRegistry) -> Result<Self> {
        Self::from_shared(Arc::new(registry))
    }

    pub fn from_shared(registry: Arc<TaskRegistry>) -> Result<Self> {
        let graph = TaskGraph::new(&registry)?;
        Ok(Self {
            registry,
            graph: Arc::new(graph),
        })
    }

    #[inline]
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    #[inline]
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Runs the requested tasks and everything they depend on.
    ///
    /// Tasks in the same level run concurrently. A level starts only after
    /// every task of the previous level succeeded; on failure the run stops
    /// and the error names the failing task.
    pub async fn run(&self, requested: &[String]) -> Result<RunReport> {
        let plan = self.graph.execution_plan(requested)?;
        let start = Instant::now();
        let mut report = RunReport::default();

        tracing::debug!("execution plan for {:?}: {:?}", requested, plan);

        for level in plan {
            let mut set = JoinSet::new();
            let mut spawned: HashMap<tokio::task::Id, String> = HashMap::new();
            for task_name in level {
                let task = self.registry.resolve(&task_name)?.clone();
                let handle = set.spawn(async move { TaskExecutor::execute(&task).await });
                spawned.insert(handle.id(), task_name);
            }

            let mut failures: Vec<(String, Error)> = Vec::new();
            while let Some(joined) = set.join_next().await {
                let Execution { result, error } = match joined {
                    Ok(execution) => execution,
                    Err(e) => {
                        let task = spawned.remove(&e.id()).unwrap_or_else(|| "unknown".to_string());
                        tracing::error!("'{}' panicked or was cancelled: {}", task, e);
                        failures.push((task, Error::Join(e.to_string())));
                        continue;
                    }
                };
                report.metrics.record_task(
                    result.task_name.clone(),
                    result.duration,
                    result.success,
                );
                if let Some(error) = error {
                    failures.push((result.task_name.clone(), error));
                }
                report.results.push(result);
            }

            if !failures.is_empty() {
                report.metrics.set_total_duration(start.elapsed());
                failures.sort_by(|a, b| a.0.cmp(&b.0));
                let (task, source) = failures.remove(0);
                for (other, error) in &failures {
                    tracing::error!("'{}' also failed: {}", other, error);
                }
                return Err(Error::TaskFailed {
                    task,
                    source: Box::new(source),
                });
            }
        }

        report.metrics.set_total_duration(start.elapsed());
        Ok(report)
    }

    /// Runs a single task and its dependencies.
    pub async fn run_one(&self, task_name: &str) -> Result<RunReport> {
        self.run(&[task_name.to_string()]).await
    }

    pub fn downgrade(&self) -> WeakTaskRunner {
        WeakTaskRunner {
            registry: Arc::downgrade(&self.registry),
            graph: Arc::downgrade(&self.graph),
        }
    }
}

/// Non-owning handle to a [`TaskRunner`].
#[derive(Clone)]
pub struct WeakTaskRunner {
    registry: Weak<TaskRegistry>,
    graph: Weak<TaskGraph>,
}

impl WeakTaskRunner {
    pub fn upgrade(&self) -> Option<TaskRunner> {
        Some(TaskRunner {
            registry: self.registry.upgrade()?,
            graph: self.graph.upgrade()?,
        })
    }
}

/// Late-bound runner for actions that re-enter the graph, such as the serve
/// tasks re-running `styles` on change. Filled once the runner owning those
/// actions exists.
#[derive(Clone, Default)]
pub struct RunnerSlot(Arc<OnceLock<WeakTaskRunner>>);

impl RunnerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `runner`. Later calls are ignored.
    pub fn attach(&self, runner: &TaskRunner) {
        let _ = self.0.set(runner.downgrade());
    }

    pub fn get(&self) -> Result<TaskRunner> {
        self.0
            .get()
            .and_then(WeakTaskRunner::upgrade)
            .ok_or_else(|| Error::Session("task runner is not attached".to_string()))
    }
}
