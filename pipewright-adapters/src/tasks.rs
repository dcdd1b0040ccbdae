//! The standard task catalogue.
//!
//! ```text
//! styles        -> clean-styles
//! fonts         -> clean-fonts
//! images        -> clean-images
//! templatecache -> clean-code
//! inject        -> wiredep, styles, templatecache
//! optimize      -> inject, fonts, images
//! serve-dev     -> inject
//! serve-build   -> optimize
//! test          -> vet, templatecache
//! default       -> hello
//! ```
//!
//! `pipewright.toml` can add tasks and edges on top; it never removes any.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pipewright_core::command::{CommandSpec, ShellAction};
use pipewright_core::config::{PathConfig, TaskValue};
use pipewright_core::error::{Error, Result};
use pipewright_core::options::TestRunnerOptions;
use pipewright_core::pipeline::{Filter, Pipeline};
use pipewright_core::registry::{action_fn, NoopAction, TaskAction, TaskOutcome, TaskRegistry};
use pipewright_core::release::{ReleaseEngine, VersionRequest};
use pipewright_core::runner::RunnerSlot;
use pipewright_core::session::{DevServer, Mode};
use serde_json::json;
use tokio::sync::Notify;

use crate::clean::{clean_dirs, clean_files};
use crate::command_stage::CommandStage;
use crate::inject::Inject;
use crate::manifest::manifest_adapters;
use crate::print::Print;
use crate::rev::{Rev, RevManifest, RevReplace};
use crate::template_cache::TemplateCache;
use crate::test_runner::KarmaRunner;
use crate::useref::Useref;
use crate::wiredep::Wiredep;

/// External programs the standard tasks delegate to.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub jscs: CommandSpec,
    pub jshint: CommandSpec,
    pub lessc: CommandSpec,
    pub autoprefixer: CommandSpec,
    pub imagemin: CommandSpec,
    pub minify_html: CommandSpec,
    pub minify_js: CommandSpec,
    pub minify_css: CommandSpec,
    pub karma: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            jscs: CommandSpec::new("jscs"),
            jshint: CommandSpec::new("jshint"),
            lessc: CommandSpec::new("lessc").arg("-"),
            autoprefixer: CommandSpec::new("postcss")
                .args(["--use", "autoprefixer"])
                .env("BROWSERSLIST", "last 2 versions, > 5%"),
            imagemin: CommandSpec::new("imagemin"),
            minify_html: CommandSpec::new("html-minifier").arg("--collapse-whitespace"),
            minify_js: CommandSpec::new("uglifyjs").args(["--compress", "--mangle"]),
            minify_css: CommandSpec::new("csso"),
            karma: "karma".to_string(),
        }
    }
}

impl Toolchain {
    /// Runs every collaborator from `dir`.
    pub fn current_dir(self, dir: &Path) -> Self {
        Self {
            jscs: self.jscs.current_dir(dir),
            jshint: self.jshint.current_dir(dir),
            lessc: self.lessc.current_dir(dir),
            autoprefixer: self.autoprefixer.current_dir(dir),
            imagemin: self.imagemin.current_dir(dir),
            minify_html: self.minify_html.current_dir(dir),
            minify_js: self.minify_js.current_dir(dir),
            minify_css: self.minify_css.current_dir(dir),
            karma: self.karma,
        }
    }
}

/// Everything the standard actions read. Shared read-only by all tasks.
pub struct CatalogueContext {
    pub root: PathBuf,
    /// Paths anchored at `root`.
    pub paths: PathConfig,
    pub toolchain: Toolchain,
    pub verbose: bool,
    pub nosync: bool,
    pub version: VersionRequest,
    /// Filled once the runner exists; serve and help re-enter the graph.
    pub runner: RunnerSlot,
    pub shutdown: Arc<Notify>,
}

impl CatalogueContext {
    pub fn new(root: impl Into<PathBuf>, paths: &PathConfig) -> Self {
        let root = root.into();
        Self {
            paths: paths.rooted_at(&root),
            toolchain: Toolchain::default().current_dir(&root),
            root,
            verbose: false,
            nosync: false,
            version: VersionRequest::Bump(Default::default()),
            runner: RunnerSlot::new(),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = toolchain;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_nosync(mut self, nosync: bool) -> Self {
        self.nosync = nosync;
        self
    }

    pub fn with_version(mut self, version: VersionRequest) -> Self {
        self.version = version;
        self
    }
}

type Ctx = Arc<CatalogueContext>;

fn task<F, Fut>(ctx: &Ctx, f: F) -> impl TaskAction + 'static
where
    F: Fn(Ctx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TaskOutcome>> + Send + 'static,
{
    let ctx = ctx.clone();
    action_fn(move || f(ctx.clone()))
}

fn under(dir: &str, rest: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), rest)
}

const NO_DEPS: [&str; 0] = [];

/// Registers every standard task.
pub fn standard_registry(ctx: CatalogueContext) -> Result<TaskRegistry> {
    let ctx = Arc::new(ctx);
    let mut registry = TaskRegistry::new();

    registry.register("help", NO_DEPS, task(&ctx, help))?;
    registry.register("hello", NO_DEPS, task(&ctx, hello))?;
    registry.register("default", ["hello"], NoopAction)?;
    registry.register("vet", NO_DEPS, task(&ctx, vet))?;

    registry.register("clean", NO_DEPS, task(&ctx, clean))?;
    registry.register("clean-styles", NO_DEPS, task(&ctx, clean_styles))?;
    registry.register("clean-fonts", NO_DEPS, task(&ctx, clean_fonts))?;
    registry.register("clean-images", NO_DEPS, task(&ctx, clean_images))?;
    registry.register("clean-code", NO_DEPS, task(&ctx, clean_code))?;

    registry.register("styles", ["clean-styles"], task(&ctx, styles))?;
    registry.register("fonts", ["clean-fonts"], task(&ctx, fonts))?;
    registry.register("images", ["clean-images"], task(&ctx, images))?;
    registry.register("templatecache", ["clean-code"], task(&ctx, templatecache))?;
    registry.register("wiredep", NO_DEPS, task(&ctx, wiredep))?;
    registry.register("inject", ["wiredep", "styles", "templatecache"], task(&ctx, inject))?;
    registry.register("optimize", ["inject", "fonts", "images"], task(&ctx, optimize))?;

    registry.register("serve-dev", ["inject"], task(&ctx, |ctx| serve(ctx, Mode::Dev)))?;
    registry.register("serve-build", ["optimize"], task(&ctx, |ctx| serve(ctx, Mode::Build)))?;

    registry.register("test", ["vet", "templatecache"], task(&ctx, test))?;
    registry.register("bump", NO_DEPS, task(&ctx, bump))?;

    Ok(registry)
}

/// Adds the tasks and edges declared in `pipewright.toml`.
///
/// A new name with a command becomes a shell task; a new name without one
/// only groups its dependencies. For existing tasks `depends_on` is appended
/// and a command is rejected.
pub fn apply_project_tasks(
    registry: &mut TaskRegistry,
    tasks: &HashMap<String, TaskValue>,
    root: &Path,
) -> Result<()> {
    let mut names: Vec<&String> = tasks.keys().collect();
    names.sort();

    for name in names {
        let value = &tasks[name];
        if registry.contains(name) {
            if value.command().is_some() {
                return Err(Error::DuplicateTask(name.clone()));
            }
            registry.extend_dependencies(name, value.depends_on())?;
            tracing::debug!("'{}' extended with {:?}", name, value.depends_on());
            continue;
        }

        match value.command() {
            Some(command) => registry.register(
                name.as_str(),
                value.depends_on().iter().cloned(),
                ShellAction::new(command, root),
            )?,
            None => registry.register(name.as_str(), value.depends_on().iter().cloned(), NoopAction)?,
        }
    }
    Ok(())
}

async fn help(ctx: Ctx) -> Result<TaskOutcome> {
    let runner = ctx.runner.get()?;
    let mut listing = Vec::new();
    for name in runner.registry().names() {
        let deps = &runner.registry().resolve(&name)?.dependencies;
        if deps.is_empty() {
            tracing::info!("  {}", name);
        } else {
            tracing::info!("  {} -> {}", name, deps.join(", "));
        }
        listing.push(json!({ "name": name, "dependencies": deps }));
    }
    Ok(TaskOutcome::Value(json!(listing)))
}

async fn hello(_ctx: Ctx) -> Result<TaskOutcome> {
    tracing::info!("Hello World");
    Ok(TaskOutcome::Done)
}

async fn vet(ctx: Ctx) -> Result<TaskOutcome> {
    tracing::info!("Analyzing source with JSHint and JSCS");
    let report = Pipeline::src(ctx.paths.alljs.as_slice())
        .pipe_if(ctx.verbose, Print)
        .pipe(CommandStage::check("jscs", ctx.toolchain.jscs.clone()))
        .pipe(CommandStage::check("jshint", ctx.toolchain.jshint.clone()))
        .run_without_dest()
        .await?;
    Ok(TaskOutcome::Pipeline(report))
}

fn removed(paths: Vec<PathBuf>) -> TaskOutcome {
    TaskOutcome::Value(json!({ "removed": paths.len() }))
}

async fn clean(ctx: Ctx) -> Result<TaskOutcome> {
    let build = PathBuf::from(&ctx.paths.build);
    let tmp = PathBuf::from(&ctx.paths.tmp);
    Ok(removed(clean_dirs(&[build.as_path(), tmp.as_path()]).await?))
}

async fn clean_styles(ctx: Ctx) -> Result<TaskOutcome> {
    Ok(removed(clean_files(&[under(&ctx.paths.tmp, "**/*.css")]).await?))
}

async fn clean_fonts(ctx: Ctx) -> Result<TaskOutcome> {
    Ok(removed(clean_files(&[under(&ctx.paths.build, "fonts/**/*.*")]).await?))
}

async fn clean_images(ctx: Ctx) -> Result<TaskOutcome> {
    Ok(removed(clean_files(&[under(&ctx.paths.build, "images/**/*.*")]).await?))
}

async fn clean_code(ctx: Ctx) -> Result<TaskOutcome> {
    let patterns = [
        under(&ctx.paths.tmp, "**/*.js"),
        under(&ctx.paths.build, "**/*.html"),
        under(&ctx.paths.build, "js/**/*.js"),
    ];
    Ok(removed(clean_files(&patterns).await?))
}

async fn styles(ctx: Ctx) -> Result<TaskOutcome> {
    tracing::info!("Compiling Less --> CSS");
    let report = Pipeline::src(&[&ctx.paths.less])
        .pipe_if(ctx.verbose, Print)
        .pipe(CommandStage::transform("less", ctx.toolchain.lessc.clone()).with_extension("css"))
        .pipe(CommandStage::transform("autoprefixer", ctx.toolchain.autoprefixer.clone()))
        .dest(&ctx.paths.tmp)
        .run()
        .await?;
    Ok(TaskOutcome::Pipeline(report))
}

async fn fonts(ctx: Ctx) -> Result<TaskOutcome> {
    tracing::info!("Copying fonts");
    let report = Pipeline::src(&[&ctx.paths.fonts])
        .dest(under(&ctx.paths.build, "fonts"))
        .run()
        .await?;
    Ok(TaskOutcome::Pipeline(report))
}

async fn images(ctx: Ctx) -> Result<TaskOutcome> {
    tracing::info!("Copying and compressing the images");
    let report = Pipeline::src(&[&ctx.paths.images])
        .pipe(CommandStage::transform("imagemin", ctx.toolchain.imagemin.clone()))
        .dest(under(&ctx.paths.build, "images"))
        .run()
        .await?;
    Ok(TaskOutcome::Pipeline(report))
}

async fn templatecache(ctx: Ctx) -> Result<TaskOutcome> {
    tracing::info!("Creating AngularJS $templateCache");
    let report = Pipeline::src(&[&ctx.paths.html_templates])
        .pipe(CommandStage::transform("minify-html", ctx.toolchain.minify_html.clone()))
        .pipe(TemplateCache::new(ctx.paths.template_cache.clone()))
        .dest(&ctx.paths.tmp)
        .run()
        .await?;
    Ok(TaskOutcome::Pipeline(report))
}

async fn wiredep(ctx: Ctx) -> Result<TaskOutcome> {
    tracing::info!("Wire up the bower css js and our app js into the html");
    let report = Pipeline::src(&[&ctx.paths.index])
        .pipe(Wiredep::new(ctx.paths.wiredep.clone()))
        .pipe(Inject::new(ctx.paths.js.as_slice(), &ctx.root))
        .dest(&ctx.paths.client)
        .run()
        .await?;
    Ok(TaskOutcome::Pipeline(report))
}

async fn inject(ctx: Ctx) -> Result<TaskOutcome> {
    tracing::info!("Wire up the app css into the html, and call wiredep");
    let report = Pipeline::src(&[&ctx.paths.index])
        .pipe(Inject::new(&[&ctx.paths.css], &ctx.root))
        .dest(&ctx.paths.client)
        .run()
        .await?;
    Ok(TaskOutcome::Pipeline(report))
}

async fn optimize(ctx: Ctx) -> Result<TaskOutcome> {
    tracing::info!("Optimizing the javascript, css, html");
    let template_cache = ctx.paths.template_cache_path().to_string_lossy().to_string();
    let manifest = RevManifest::new();

    let report = Pipeline::src(&[&ctx.paths.index])
        .pipe(Inject::new(&[template_cache], &ctx.root).tag("templates"))
        .pipe(Useref::new(vec![ctx.root.clone(), PathBuf::from(&ctx.paths.client)]))
        .pipe(Filter::new(&["**/*.js"])?.pipe(CommandStage::transform("uglify", ctx.toolchain.minify_js.clone())))
        .pipe(Filter::new(&["**/*.css"])?.pipe(CommandStage::transform("csso", ctx.toolchain.minify_css.clone())))
        .pipe(Rev::new(manifest.clone()))
        .pipe(RevReplace::new(manifest.clone()))
        .dest(&ctx.paths.build)
        .run()
        .await?;

    manifest.write(Path::new(&ctx.paths.build)).await?;
    Ok(TaskOutcome::Pipeline(report))
}

async fn serve(ctx: Ctx, mode: Mode) -> Result<TaskOutcome> {
    let runner = ctx.runner.get()?;
    let shutdown = ctx.shutdown.clone();
    DevServer::new(mode, runner, &ctx.paths, ctx.nosync)
        .run(async move { shutdown.notified().await })
        .await?;
    Ok(TaskOutcome::Done)
}

async fn test(ctx: Ctx) -> Result<TaskOutcome> {
    let options = TestRunnerOptions {
        program: ctx.toolchain.karma.clone(),
        ..TestRunnerOptions::new(&ctx.paths.karma_config)
    };
    KarmaRunner::new(options).run().await?;
    Ok(TaskOutcome::Done)
}

async fn bump(ctx: Ctx) -> Result<TaskOutcome> {
    match &ctx.version {
        VersionRequest::Exact(v) => tracing::info!("Bumping versions to {}", v),
        VersionRequest::Bump(t) => tracing::info!("Bumping versions to a {}", format!("{:?}", t).to_lowercase()),
    }
    let manifests: Vec<PathBuf> = ctx.paths.package_manifests.iter().map(PathBuf::from).collect();
    let bumped = ReleaseEngine::new(manifest_adapters()).bump(&manifests, &ctx.version)?;

    Ok(TaskOutcome::Value(json!(bumped
        .iter()
        .map(|b| json!({
            "path": b.path.display().to_string(),
            "old": b.old_version,
            "new": b.new_version,
        }))
        .collect::<Vec<_>>())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::graph::TaskGraph;

    fn registry() -> TaskRegistry {
        standard_registry(CatalogueContext::new("/project", &PathConfig::default())).unwrap()
    }

    #[test]
    fn optimize_closure_is_exact() {
        let graph = TaskGraph::new(&registry()).unwrap();
        let mut closure: Vec<String> = graph
            .closure(&["optimize".to_string()])
            .unwrap()
            .into_iter()
            .collect();
        closure.sort();

        assert_eq!(
            closure,
            vec![
                "clean-code",
                "clean-fonts",
                "clean-images",
                "clean-styles",
                "fonts",
                "images",
                "inject",
                "optimize",
                "styles",
                "templatecache",
                "wiredep",
            ]
        );
    }

    #[test]
    fn inject_waits_for_its_inputs() {
        let graph = TaskGraph::new(&registry()).unwrap();
        let plan = graph.execution_plan(&["inject".to_string()]).unwrap();
        assert_eq!(plan.last().unwrap(), &vec!["inject".to_string()]);
        assert!(plan[0].contains(&"wiredep".to_string()));
        assert!(plan[0].contains(&"clean-styles".to_string()));
    }

    #[test]
    fn project_tasks_only_add() {
        let mut registry = registry();
        let tasks: HashMap<String, TaskValue> = [
            (
                "test".to_string(),
                TaskValue::Complex {
                    command: None,
                    depends_on: vec!["lint-css".to_string()],
                },
            ),
            ("lint-css".to_string(), TaskValue::Simple("stylelint '**/*.less'".to_string())),
        ]
        .into_iter()
        .collect();

        apply_project_tasks(&mut registry, &tasks, Path::new("/project")).unwrap();
        assert_eq!(
            registry.resolve("test").unwrap().dependencies,
            vec!["vet", "templatecache", "lint-css"]
        );
        assert!(registry.contains("lint-css"));
    }

    #[test]
    fn command_on_builtin_is_rejected() {
        let mut registry = registry();
        let tasks: HashMap<String, TaskValue> =
            [("vet".to_string(), TaskValue::Simple("eslint .".to_string()))].into_iter().collect();
        assert!(matches!(
            apply_project_tasks(&mut registry, &tasks, Path::new("/project")),
            Err(Error::DuplicateTask(_))
        ));
    }
}
