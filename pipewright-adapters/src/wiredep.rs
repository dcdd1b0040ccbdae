//! Bower dependency wiring.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use pipewright_core::config::WiredepConfig;
use pipewright_core::error::{Error, Result};
use pipewright_core::fileset::SourceFile;
use pipewright_core::pipeline::Stage;
use serde_json::Value;

use crate::inject::{reference_tag, replace_block};

/// Injects the main files of installed bower packages, dependencies first,
/// between `<!-- bower:js -->`/`<!-- bower:css -->` and `<!-- endbower -->`.
pub struct Wiredep {
    config: WiredepConfig,
}

impl Wiredep {
    pub fn new(config: WiredepConfig) -> Self {
        Self { config }
    }

    /// Main files of every installed package, in load order.
    pub fn resolve(&self) -> Result<Vec<PathBuf>> {
        let root = read_json(&self.config.bower_json)?;
        let overrides = root.get("overrides").cloned().unwrap_or(Value::Null);
        let mut visited = HashSet::new();
        let mut files = Vec::new();

        for name in dependency_names(&root) {
            self.visit(&name, &overrides, &mut visited, &mut files)?;
        }
        Ok(files)
    }

    fn visit(
        &self,
        name: &str,
        overrides: &Value,
        visited: &mut HashSet<String>,
        files: &mut Vec<PathBuf>,
    ) -> Result<()> {
        if !visited.insert(name.to_string()) {
            return Ok(());
        }

        let dir = self.config.directory.join(name);
        let Some(manifest) = [dir.join("bower.json"), dir.join(".bower.json")]
            .into_iter()
            .find(|p| p.exists())
        else {
            tracing::warn!("wiredep: {} is not installed in {}", name, self.config.directory.display());
            return Ok(());
        };
        let package = read_json(&manifest)?;

        for dep in dependency_names(&package) {
            self.visit(&dep, overrides, visited, files)?;
        }

        let main = overrides
            .get(name)
            .and_then(|o| o.get("main"))
            .or_else(|| package.get("main"));
        for entry in main_entries(main) {
            files.push(dir.join(entry));
        }
        Ok(())
    }

    fn url_for(&self, index_dir: &Path, asset: &Path) -> String {
        let relative = relative_path(index_dir, asset);
        let url = path_to_url(&relative);
        match url.strip_prefix(self.config.ignore_path.as_str()) {
            Some(rest) if !self.config.ignore_path.is_empty() => rest.to_string(),
            _ => url,
        }
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|e| Error::Manifest {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| Error::Manifest {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn dependency_names(manifest: &Value) -> Vec<String> {
    manifest
        .get("dependencies")
        .and_then(|d| d.as_object())
        .map(|d| d.keys().cloned().collect())
        .unwrap_or_default()
}

fn main_entries(main: Option<&Value>) -> Vec<String> {
    match main {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Path from directory `from` to `to`, both absolute or both relative.
pub(crate) fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().filter(|c| *c != Component::CurDir).collect();
    let to: Vec<Component> = to.components().filter(|c| *c != Component::CurDir).collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for c in &to[common..] {
        rel.push(c.as_os_str());
    }
    rel
}

fn path_to_url(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl Stage for Wiredep {
    fn name(&self) -> &str {
        "wiredep"
    }

    async fn apply(&self, files: Vec<SourceFile>) -> Result<Vec<SourceFile>> {
        let assets = self.resolve()?;
        tracing::debug!("wiredep: {} bower file(s)", assets.len());

        let mut out = Vec::with_capacity(files.len());
        for mut file in files {
            if file.extension() != Some("html") {
                out.push(file);
                continue;
            }
            let full = file.full_path();
            let index_dir = full.parent().unwrap_or(Path::new(""));
            let mut html = file.text(self.name())?.to_string();

            for ext in ["js", "css"] {
                let tags: Vec<String> = assets
                    .iter()
                    .filter(|a| a.extension().is_some_and(|e| e == ext))
                    .filter_map(|a| reference_tag(&self.url_for(index_dir, a)))
                    .collect();
                if let Some(updated) = replace_block(&html, &format!("bower:{}", ext), "endbower", &tags)? {
                    html = updated;
                }
            }
            file.contents = html.into_bytes();
            out.push(file);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "bower.json", r#"{"name": "app", "dependencies": {"angular-animate": "~1.4", "bootstrap": "~3.3"}}"#);
        write(
            root,
            "bower_components/angular/.bower.json",
            r#"{"name": "angular", "main": "./angular.js"}"#,
        );
        write(
            root,
            "bower_components/angular-animate/bower.json",
            r#"{"name": "angular-animate", "main": "./angular-animate.js", "dependencies": {"angular": "1.4"}}"#,
        );
        write(
            root,
            "bower_components/bootstrap/bower.json",
            r#"{"name": "bootstrap", "main": ["less/bootstrap.less", "dist/css/bootstrap.css", "dist/js/bootstrap.js"]}"#,
        );
        dir
    }

    fn config(root: &Path) -> WiredepConfig {
        WiredepConfig {
            bower_json: root.join("bower.json"),
            directory: root.join("bower_components"),
            ignore_path: "../..".to_string(),
        }
    }

    #[test]
    fn dependencies_load_first() {
        let dir = project();
        let files = Wiredep::new(config(dir.path())).resolve().unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["angular.js", "angular-animate.js", "bootstrap.less", "bootstrap.css", "bootstrap.js"]
        );
    }

    #[tokio::test]
    async fn injects_with_ignore_path_stripped() {
        let dir = project();
        let root = dir.path();
        let index = "<!-- bower:css -->\n<!-- endbower -->\n<!-- bower:js -->\n<!-- endbower -->";
        let file = SourceFile::new(root.join("src/client"), "index.html", index.as_bytes().to_vec());

        let out = Wiredep::new(config(root)).apply(vec![file]).await.unwrap();
        let html = String::from_utf8(out[0].contents.clone()).unwrap();

        assert!(html.contains(r#"<link rel="stylesheet" href="/bower_components/bootstrap/dist/css/bootstrap.css">"#));
        assert!(html.contains(r#"<script src="/bower_components/angular/angular.js"></script>"#));
        assert!(!html.contains("bootstrap.less"));
        let angular = html.find("angular/angular.js").unwrap();
        let animate = html.find("angular-animate.js").unwrap();
        assert!(angular < animate);
    }

    #[test]
    fn relative_path_climbs_out() {
        assert_eq!(
            relative_path(Path::new("/p/src/client"), Path::new("/p/bower_components/a/a.js")),
            PathBuf::from("../../bower_components/a/a.js")
        );
    }
}
