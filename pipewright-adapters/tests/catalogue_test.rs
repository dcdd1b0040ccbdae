use std::fs;
use std::path::Path;

use pipewright_adapters::{standard_registry, CatalogueContext, Toolchain};
use pipewright_core::command::CommandSpec;
use pipewright_core::config::{PathConfig, ProjectConfig};
use pipewright_core::error::Error;
use pipewright_core::runner::TaskRunner;
use tempfile::TempDir;

/// Every collaborator replaced by `cat`, so stages pass content through.
fn passthrough() -> Toolchain {
    let cat = CommandSpec::new("cat");
    Toolchain {
        jscs: CommandSpec::new("true"),
        jshint: CommandSpec::new("true"),
        lessc: cat.clone(),
        autoprefixer: cat.clone(),
        imagemin: cat.clone(),
        minify_html: cat.clone(),
        minify_js: cat.clone(),
        minify_css: cat,
        karma: "true".to_string(),
    }
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn runner(root: &Path) -> TaskRunner {
    let config = ProjectConfig::load(root).unwrap();
    let ctx = CatalogueContext::new(root, &config.paths).with_toolchain(passthrough());
    let slot = ctx.runner.clone();
    let mut registry = standard_registry(ctx).unwrap();
    pipewright_adapters::apply_project_tasks(&mut registry, &config.tasks, root).unwrap();
    let runner = TaskRunner::new(registry).unwrap();
    slot.attach(&runner);
    runner
}

#[cfg(unix)]
#[tokio::test]
async fn styles_compile_into_tmp_after_cleaning() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "src/client/styles/styles.less", "body { color: red; }");
    write(root, "tmp/stale.css", "old");

    let report = runner(root).run(&["styles".to_string()]).await.unwrap();

    assert!(report.result("clean-styles").unwrap().success);
    assert!(!root.join("tmp/stale.css").exists());
    assert_eq!(
        fs::read_to_string(root.join("tmp/styles.css")).unwrap(),
        "body { color: red; }"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn templatecache_registers_every_template() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "src/client/app/layout/shell.html", "<div>shell</div>");
    write(root, "src/client/app/dashboard/dashboard.html", "<h1>Hi</h1>");

    runner(root).run(&["templatecache".to_string()]).await.unwrap();

    let script = fs::read_to_string(root.join("tmp/template.js")).unwrap();
    assert!(script.starts_with("angular.module(\"app.core\")"));
    assert!(script.contains("$templateCache.put(\"app/layout/shell.html\",\"<div>shell</div>\");"));
    assert!(script.contains("$templateCache.put(\"app/dashboard/dashboard.html\",\"<h1>Hi</h1>\");"));
}

#[cfg(unix)]
#[tokio::test]
async fn project_task_runs_after_builtin_dependency() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        root,
        "pipewright.toml",
        "[tasks]\nmark = { command = \"touch marked\", depends_on = [\"hello\"] }\n",
    );

    let report = runner(root).run(&["mark".to_string()]).await.unwrap();

    assert!(root.join("marked").exists());
    let order: Vec<&str> = report.results.iter().map(|r| r.task_name.as_str()).collect();
    assert_eq!(order, vec!["hello", "mark"]);
}

const INDEX: &str = r#"<html>
<head>
    <!-- build:css styles/app.css -->
    <!-- inject:css -->
    <!-- endinject -->
    <!-- endbuild -->
</head>
<body>
    <!-- build:js js/lib.js -->
    <!-- bower:js -->
    <!-- endbower -->
    <!-- endbuild -->
    <!-- build:js js/app.js -->
    <!-- inject:js -->
    <!-- endinject -->
    <!-- templates:js -->
    <!-- endinject -->
    <!-- endbuild -->
</body>
</html>
"#;

#[cfg(unix)]
#[tokio::test]
async fn optimize_bundles_and_revisions_the_app() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "bower.json", r#"{"name": "app", "dependencies": {"angular": "~1.3"}}"#);
    write(root, "bower_components/angular/bower.json", r#"{"name": "angular", "main": "angular.js"}"#);
    write(root, "bower_components/angular/angular.js", "var angular = {};");
    write(root, "src/client/index.html", INDEX);
    write(root, "src/client/app/app.module.js", "angular.module('app', []);");
    write(root, "src/client/app/layout/shell.html", "<div>shell</div>");
    write(root, "src/client/styles/styles.less", "body { color: red; }");

    let report = runner(root).run(&["optimize".to_string()]).await.unwrap();
    assert!(report.results.iter().all(|r| r.success));

    let wired = fs::read_to_string(root.join("src/client/index.html")).unwrap();
    assert!(wired.contains(r#"<script src="/bower_components/angular/angular.js"></script>"#));
    assert!(wired.contains(r#"<script src="/src/client/app/app.module.js"></script>"#));
    assert!(wired.contains(r#"<link rel="stylesheet" href="/tmp/styles.css">"#));

    let manifest: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(root.join("build/rev-manifest.json")).unwrap()).unwrap();
    let app = manifest["js/app.js"].as_str().unwrap();
    let lib = manifest["js/lib.js"].as_str().unwrap();
    let css = manifest["styles/app.css"].as_str().unwrap();
    assert!(app.starts_with("js/app-") && app.ends_with(".js"));

    let app_bundle = fs::read_to_string(root.join("build").join(app)).unwrap();
    assert!(app_bundle.contains("angular.module('app', []);"));
    assert!(app_bundle.contains(r#"$templateCache.put("app/layout/shell.html","<div>shell</div>");"#));
    assert_eq!(fs::read_to_string(root.join("build").join(lib)).unwrap(), "var angular = {};");
    assert_eq!(fs::read_to_string(root.join("build").join(css)).unwrap(), "body { color: red; }");

    let built = fs::read_to_string(root.join("build/index.html")).unwrap();
    assert!(built.contains(&format!(r#"<script src="{}"></script>"#, app)));
    assert!(built.contains(&format!(r#"<script src="{}"></script>"#, lib)));
    assert!(built.contains(&format!(r#"<link rel="stylesheet" href="{}">"#, css)));
    assert!(!built.contains("endbuild"));
}

#[tokio::test]
async fn unknown_task_lists_the_catalogue() {
    let dir = TempDir::new().unwrap();
    let err = runner(dir.path()).run(&["deploy".to_string()]).await.unwrap_err();
    match err {
        Error::UnknownTask { name, available } => {
            assert_eq!(name, "deploy");
            assert!(available.contains("optimize"));
            assert!(available.contains("serve-dev"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn help_lists_tasks_through_the_runner() {
    let dir = TempDir::new().unwrap();
    let report = runner(dir.path()).run(&["help".to_string()]).await.unwrap();
    let outcome = report.result("help").unwrap().outcome.clone().unwrap();
    let listing = match outcome {
        pipewright_core::registry::TaskOutcome::Value(v) => v,
        other => panic!("unexpected outcome: {other:?}"),
    };
    let inject = listing
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["name"] == "inject")
        .unwrap();
    assert_eq!(
        inject["dependencies"],
        serde_json::json!(["wiredep", "styles", "templatecache"])
    );
}

#[test]
fn default_paths_are_rooted() {
    let ctx = CatalogueContext::new("/project", &PathConfig::default());
    assert_eq!(ctx.paths.less, "/project/src/client/styles/styles.less");
    assert_eq!(ctx.paths.tmp, "/project/tmp/");
}
