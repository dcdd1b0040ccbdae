//! Core library for front-end build pipelines: a task graph, file-set
//! pipelines, watch and reload, and the serve session.

pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod fileset;
pub mod graph;
pub mod metrics;
pub mod options;
pub mod pipeline;
pub mod registry;
pub mod release;
pub mod reload;
pub mod runner;
pub mod session;
pub mod supervisor;
pub mod watch;
pub mod watcher;

pub use command::{CommandOutput, CommandSpec, ShellAction};
pub use config::{PathConfig, ProjectConfig, TaskValue, TemplateCacheConfig, WiredepConfig, CONFIG_FILE};
pub use error::{Error, Result};
pub use executor::{TaskExecutor, TaskResult};
pub use fileset::{glob_base, FileSet, MatchedPath, SourceFile};
pub use graph::TaskGraph;
pub use metrics::ExecutionMetrics;
pub use options::{BrowserSyncOptions, ProxyOptions, SupervisorOptions, TestRunnerOptions};
pub use pipeline::{DestPipeline, Filter, Pipeline, PipelineReport, Stage};
pub use registry::{action_fn, NoopAction, Task, TaskAction, TaskOutcome, TaskRegistry};
pub use release::{BumpType, BumpedManifest, ManifestAdapter, ReleaseEngine, VersionRequest};
pub use reload::{ReloadHub, ReloadKind, ReloadNotifier};
pub use runner::{RunReport, RunnerSlot, TaskRunner};
pub use session::{DevServer, Mode, ServerSession, SessionManager, SessionStart};
pub use supervisor::{Supervisor, SupervisorEvent, SupervisorHandle};
pub use watch::{ReloadPolicy, Trigger, WatchBinding, WatchController, WatchLoop, WatchState};
pub use watcher::{ChangeEvent, ChangeKind, FileWatcher};
