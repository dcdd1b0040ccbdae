//! Error types and result aliases.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error in {context}: {error}")]
    Toml {
        error: toml::de::Error,
        context: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid glob pattern '{pattern}': {message}")]
    Glob { pattern: String, message: String },

    #[error("Task '{0}' is already registered")]
    DuplicateTask(String),

    #[error("Task not found: {name}. Available tasks: {available}")]
    UnknownTask { name: String, available: String },

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    DanglingDependency { task: String, dependency: String },

    #[error("Circular dependency detected between tasks: {}", tasks.join(", "))]
    CyclicDependency { tasks: Vec<String> },

    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    #[error("Task '{task}' failed: {source}")]
    TaskFailed {
        task: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Task panicked or was cancelled: {0}")]
    Join(String),

    #[error("Tests failed with result code {code}")]
    TestsFailed { code: i32 },

    #[error("Test runner error: {0}")]
    TestRunner(String),

    #[error("Release error: {0}")]
    Release(String),

    #[error("Manifest error in {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Supervisor error: {0}")]
    Supervisor(String),
}

impl Error {
    /// Returns the task that caused a run to fail, following nested task failures.
    pub fn root_task(&self) -> Option<&str> {
        match self {
            Error::TaskFailed { task, source } => source.root_task().or(Some(task.as_str())),
            _ => None,
        }
    }

    pub fn stage(stage: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Error::Stage {
            stage: stage.into(),
            message: message.to_string(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Toml {
            error,
            context: "pipewright.toml".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
