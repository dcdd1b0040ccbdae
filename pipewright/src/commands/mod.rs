//! Command implementations for the CLI.

mod list;
mod plan;
mod run;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use pipewright_adapters::{apply_project_tasks, standard_registry, CatalogueContext};
use pipewright_core::config::ProjectConfig;
use pipewright_core::release::VersionRequest;
use pipewright_core::runner::TaskRunner;
use tokio::sync::Notify;

pub use list::cmd_list;
pub use plan::cmd_plan;
pub use run::cmd_run;

/// Global flags every command needs to build the task graph.
pub struct ProjectArgs {
    pub config: Option<PathBuf>,
    pub verbose: bool,
    pub nosync: bool,
    pub version: VersionRequest,
}

pub struct Project {
    pub root: PathBuf,
    pub runner: TaskRunner,
    pub shutdown: Arc<Notify>,
}

/// Loads the configuration, registers the catalogue plus project tasks and
/// validates the resulting graph.
fn load_project(args: &ProjectArgs) -> Result<Project> {
    let cwd = std::env::current_dir().context("Failed to read the current directory")?;
    let (root, config) = match &args.config {
        Some(path) => {
            let path = cwd.join(path);
            let root = path.parent().map(PathBuf::from).unwrap_or_else(|| cwd.clone());
            (root, ProjectConfig::load_from(&path)?)
        }
        None => {
            let config = ProjectConfig::load(&cwd)?;
            (cwd, config)
        }
    };

    let ctx = CatalogueContext::new(&root, &config.paths)
        .with_verbose(args.verbose)
        .with_nosync(args.nosync)
        .with_version(args.version.clone());
    let slot = ctx.runner.clone();
    let shutdown = ctx.shutdown.clone();

    let mut registry = standard_registry(ctx)?;
    apply_project_tasks(&mut registry, &config.tasks, &root)?;
    let runner = TaskRunner::new(registry)?;
    slot.attach(&runner);

    tracing::debug!("loaded {} task(s) from {}", runner.registry().len(), root.display());
    Ok(Project { root, runner, shutdown })
}
