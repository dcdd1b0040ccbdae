use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use pipewright_core::error::{Error, Result};
use pipewright_core::release::ManifestAdapter;
use regex::Regex;
use serde_json::Value;

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""version"\s*:\s*"[^"]*""#).expect("version pattern is valid"));

/// A JSON package manifest identified by its file name (`package.json`,
/// `bower.json`). The version is rewritten textually so key order and
/// indentation survive.
pub struct JsonManifest {
    file_name: &'static str,
}

impl JsonManifest {
    pub fn package_json() -> Self {
        Self {
            file_name: "package.json",
        }
    }

    pub fn bower_json() -> Self {
        Self {
            file_name: "bower.json",
        }
    }

    fn manifest_error(path: &Path, message: impl Into<String>) -> Error {
        Error::Manifest {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

impl ManifestAdapter for JsonManifest {
    fn detect(&self, path: &Path) -> bool {
        path.file_name().is_some_and(|n| n == self.file_name)
    }

    fn read_version(&self, path: &Path) -> Result<Option<String>> {
        let content = fs::read_to_string(path)?;
        let json: Value = serde_json::from_str(&content)
            .map_err(|e| Self::manifest_error(path, format!("Failed to parse {}: {}", self.file_name, e)))?;

        Ok(json
            .get("version")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()))
    }

    fn write_version(&self, path: &Path, new_version: &str) -> Result<()> {
        let content = fs::read_to_string(path)?;
        let replacement = format!(r#""version": "{}""#, new_version);

        let top_level = VERSION_RE
            .find_iter(&content)
            .find(|m| is_top_level_key(&content, m.start()));

        let updated = if let Some(found) = top_level {
            format!("{}{}{}", &content[..found.start()], replacement, &content[found.end()..])
        } else {
            // No version yet: add one as the first key.
            let brace = content
                .find('{')
                .ok_or_else(|| Self::manifest_error(path, "not a JSON object"))?;
            let indent = detect_indent(&content);
            format!(
                "{}{{\n{}{},{}",
                &content[..brace],
                indent,
                replacement,
                &content[brace + 1..]
            )
        };

        fs::write(path, updated)?;
        Ok(())
    }
}

/// True when `offset` sits directly inside the outermost object and not
/// inside a string.
fn is_top_level_key(content: &str, offset: usize) -> bool {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for c in content[..offset].chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth == 1 && !in_string
}

fn detect_indent(content: &str) -> String {
    content
        .lines()
        .skip(1)
        .find(|l| !l.trim().is_empty())
        .map(|l| l.chars().take_while(|c| c.is_whitespace()).collect())
        .unwrap_or_else(|| "  ".to_string())
}

/// The manifests the `bump` task understands.
pub fn manifest_adapters() -> Vec<Box<dyn ManifestAdapter>> {
    vec![
        Box::new(JsonManifest::package_json()),
        Box::new(JsonManifest::bower_json()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_core::release::{BumpType, ReleaseEngine, VersionRequest};
    use tempfile::TempDir;

    #[test]
    fn rewrites_only_the_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("package.json");
        fs::write(
            &path,
            "{\n    \"name\": \"app\",\n    \"version\": \"1.2.3\",\n    \"private\": true\n}\n",
        )
        .unwrap();

        let adapter = JsonManifest::package_json();
        assert_eq!(adapter.read_version(&path).unwrap().as_deref(), Some("1.2.3"));
        adapter.write_version(&path, "1.2.4").unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "{\n    \"name\": \"app\",\n    \"version\": \"1.2.4\",\n    \"private\": true\n}\n"
        );
    }

    #[test]
    fn nested_version_keys_are_left_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("package.json");
        let before = concat!(
            "{\n",
            "  \"name\": \"app\",\n",
            "  \"description\": \"brace } inside a \\\"string\\\"\",\n",
            "  \"engines\": { \"node\": { \"version\": \"0.10.0\" } },\n",
            "  \"version\": \"1.2.3\"\n",
            "}\n"
        );
        fs::write(&path, before).unwrap();

        let adapter = JsonManifest::package_json();
        adapter.write_version(&path, "1.2.4").unwrap();

        let after = fs::read_to_string(&path).unwrap();
        assert_eq!(after, before.replace("\"1.2.3\"", "\"1.2.4\""));
        assert_eq!(adapter.read_version(&path).unwrap().as_deref(), Some("1.2.4"));
    }

    #[test]
    fn nested_version_only_gets_a_top_level_one_added() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bower.json");
        fs::write(&path, "{\n  \"name\": \"app\",\n  \"resolutions\": { \"version\": \"2.0.0\" }\n}\n").unwrap();

        let adapter = JsonManifest::bower_json();
        adapter.write_version(&path, "0.1.1").unwrap();

        let after = fs::read_to_string(&path).unwrap();
        assert!(after.contains(r#"{ "version": "2.0.0" }"#));
        assert_eq!(adapter.read_version(&path).unwrap().as_deref(), Some("0.1.1"));
    }

    #[test]
    fn adds_missing_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bower.json");
        fs::write(&path, "{\n  \"name\": \"app\"\n}\n").unwrap();

        let adapter = JsonManifest::bower_json();
        assert_eq!(adapter.read_version(&path).unwrap(), None);
        adapter.write_version(&path, "0.1.1").unwrap();
        assert_eq!(adapter.read_version(&path).unwrap().as_deref(), Some("0.1.1"));
    }

    #[test]
    fn detects_by_file_name() {
        assert!(JsonManifest::bower_json().detect(Path::new("/p/bower.json")));
        assert!(!JsonManifest::bower_json().detect(Path::new("/p/package.json")));
    }

    #[test]
    fn bumps_both_manifests() {
        let dir = TempDir::new().unwrap();
        let package = dir.path().join("package.json");
        let bower = dir.path().join("bower.json");
        fs::write(&package, r#"{"name": "app", "version": "1.2.3"}"#).unwrap();
        fs::write(&bower, r#"{"name": "app", "version": "1.2.3"}"#).unwrap();

        let engine = ReleaseEngine::new(manifest_adapters());
        let bumped = engine
            .bump(
                &[package.clone(), bower.clone(), dir.path().join("missing.json")],
                &VersionRequest::Bump(BumpType::Minor),
            )
            .unwrap();

        assert_eq!(bumped.len(), 2);
        assert!(bumped.iter().all(|b| b.new_version == "1.3.0"));
        assert!(fs::read_to_string(&bower).unwrap().contains(r#""version": "1.3.0""#));
    }
}
