use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn pipewright(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pipewright"))
        .args(args)
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute pipewright")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn default_task_says_hello() {
    let dir = TempDir::new().unwrap();
    let output = pipewright(dir.path(), &[]);

    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("Hello World"));
}

#[test]
fn help_runs_the_help_task() {
    let dir = TempDir::new().unwrap();
    let output = pipewright(dir.path(), &["help"]);

    assert!(output.status.success(), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("inject -> wiredep, styles, templatecache"));
    assert!(out.contains("Finished 'help'"));
    assert!(!out.contains("Usage:"));
}

#[test]
fn list_json_includes_the_catalogue() {
    let dir = TempDir::new().unwrap();
    let output = pipewright(dir.path(), &["list", "--json"]);

    assert!(output.status.success(), "{}", stderr(&output));
    let tasks: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let optimize = tasks
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["name"] == "optimize")
        .unwrap();
    assert_eq!(
        optimize["dependencies"],
        serde_json::json!(["inject", "fonts", "images"])
    );
}

#[test]
fn plan_puts_inject_after_its_inputs() {
    let dir = TempDir::new().unwrap();
    let output = pipewright(dir.path(), &["plan", "inject", "--json"]);

    assert!(output.status.success(), "{}", stderr(&output));
    let levels: Vec<Vec<String>> = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(levels.last().unwrap(), &vec!["inject".to_string()]);
    assert_eq!(levels.len(), 3);
}

#[test]
fn unknown_task_fails() {
    let dir = TempDir::new().unwrap();
    let output = pipewright(dir.path(), &["deploy"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("deploy"));
}

#[test]
fn configured_cycle_is_rejected_before_running() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("pipewright.toml"),
        "[tasks]\nfirst = { command = \"touch ran\", depends_on = [\"second\"] }\nsecond = { depends_on = [\"first\"] }\n",
    )
    .unwrap();

    let output = pipewright(dir.path(), &["first"]);

    assert!(!output.status.success());
    assert!(!dir.path().join("ran").exists());
}

#[cfg(unix)]
#[test]
fn failing_command_names_the_task() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("pipewright.toml"), "[tasks]\nbroken = \"exit 3\"\n").unwrap();

    let output = pipewright(dir.path(), &["broken"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("broken"));
}

#[test]
fn bump_sets_an_exact_version() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("package.json"),
        "{\n  \"name\": \"app\",\n  \"version\": \"1.2.3\"\n}\n",
    )
    .unwrap();

    let output = pipewright(dir.path(), &["bump", "--versions", "2.0.0"]);

    assert!(output.status.success(), "{}", stderr(&output));
    let manifest = fs::read_to_string(dir.path().join("package.json")).unwrap();
    assert!(manifest.contains("\"version\": \"2.0.0\""));
}
