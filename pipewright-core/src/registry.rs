//! Named build steps and the registry that owns them.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::pipeline::PipelineReport;

/// What a task action produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TaskOutcome {
    #[default]
    Done,
    Value(serde_json::Value),
    Pipeline(PipelineReport),
}

/// The work behind a task. Invoked at most once per run.
#[async_trait]
pub trait TaskAction: Send + Sync {
    async fn run(&self) -> Result<TaskOutcome>;
}

/// Adapts an async closure into a [`TaskAction`].
pub struct FnAction<F>(F);

#[async_trait]
impl<F, Fut> TaskAction for FnAction<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<TaskOutcome>> + Send + 'static,
{
    async fn run(&self) -> Result<TaskOutcome> {
        (self.0)().await
    }
}

pub fn action_fn<F, Fut>(f: F) -> FnAction<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<TaskOutcome>> + Send + 'static,
{
    FnAction(f)
}

/// An action that does nothing, for tasks that only aggregate dependencies.
pub struct NoopAction;

#[async_trait]
impl TaskAction for NoopAction {
    async fn run(&self) -> Result<TaskOutcome> {
        Ok(TaskOutcome::Done)
    }
}

#[derive(Clone)]
pub struct Task {
    pub name: String,
    pub dependencies: Vec<String>,
    pub action: Arc<dyn TaskAction>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Name-to-task table, filled during startup and read-only afterwards.
#[derive(Debug, Default, Clone)]
pub struct TaskRegistry {
    tasks: IndexMap<String, Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateTask`] if `name` is already taken.
    pub fn register<S: Into<String>>(
        &mut self,
        name: impl Into<String>,
        dependencies: impl IntoIterator<Item = S>,
        action: impl TaskAction + 'static,
    ) -> Result<()> {
        let name = name.into();
        if self.tasks.contains_key(&name) {
            return Err(Error::DuplicateTask(name));
        }
        let task = Task {
            name: name.clone(),
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            action: Arc::new(action),
        };
        tracing::trace!("registered task {} -> {:?}", name, task.dependencies);
        self.tasks.insert(name, task);
        Ok(())
    }

    /// Looks up a task by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTask`] listing the registered names.
    pub fn resolve(&self, name: &str) -> Result<&Task> {
        self.tasks.get(name).ok_or_else(|| Error::UnknownTask {
            name: name.to_string(),
            available: self.names().join(", "),
        })
    }

    /// Appends dependency edges to an existing task. Existing edges are kept.
    pub fn extend_dependencies(&mut self, name: &str, extra: &[String]) -> Result<()> {
        let available = self.names().join(", ");
        let task = self.tasks.get_mut(name).ok_or_else(|| Error::UnknownTask {
            name: name.to_string(),
            available,
        })?;
        for dep in extra {
            if !task.dependencies.contains(dep) {
                task.dependencies.push(dep.clone());
            }
        }
        Ok(())
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Registered task names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Tasks in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
