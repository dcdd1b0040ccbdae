mod commands;
mod formatting;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pipewright_core::release::{BumpType, VersionRequest};
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use commands::ProjectArgs;

#[derive(Parser)]
#[command(name = "pipewright")]
#[command(about = "Task-graph build pipeline and dev server for AngularJS front ends")]
#[command(args_conflicts_with_subcommands = true)]
#[command(disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Task to run together with its dependencies.
    #[arg(default_value = "default")]
    task: String,

    /// Path to pipewright.toml. Its directory becomes the project root.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(short, long, action, global = true)]
    quiet: bool,

    /// Serve without the live-reload session.
    #[arg(long, action)]
    nosync: bool,

    /// Version component the bump task increments.
    #[arg(long = "type", value_enum)]
    bump: Option<BumpArg>,

    /// Exact version for the bump task. Wins over --type.
    #[arg(long)]
    versions: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the registered tasks and their dependencies.
    List {
        #[arg(long, action)]
        json: bool,
    },
    /// Prints the execution levels for a task without running it.
    Plan {
        task: String,
        #[arg(long, action)]
        json: bool,
    },
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum BumpArg {
    Major,
    Minor,
    Patch,
}

impl From<BumpArg> for BumpType {
    fn from(arg: BumpArg) -> Self {
        match arg {
            BumpArg::Major => BumpType::Major,
            BumpArg::Minor => BumpType::Minor,
            BumpArg::Patch => BumpType::Patch,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(log_level).into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = ProjectArgs {
        config: cli.config,
        verbose: cli.verbose > 0,
        nosync: cli.nosync,
        version: VersionRequest::from_args(cli.bump.map(Into::into), cli.versions.as_deref())?,
    };

    match cli.command {
        Some(Commands::List { json }) => commands::cmd_list(&args, json)?,
        Some(Commands::Plan { task, json }) => commands::cmd_plan(&args, &task, json)?,
        None => commands::cmd_run(&args, &cli.task, cli.quiet).await?,
    }

    Ok(())
}
