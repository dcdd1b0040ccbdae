//! Path configuration and `pipewright.toml` parsing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;

pub const CONFIG_FILE: &str = "pipewright.toml";

/// Template cache generation settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateCacheConfig {
    /// Name of the generated script, written into `tmp`.
    pub file: String,
    /// Angular module the templates are registered on.
    pub module: String,
    /// Whether the generated module declares itself instead of extending `module`.
    pub standalone: bool,
    /// Prefix prepended to each template URL.
    pub root: String,
}

impl Default for TemplateCacheConfig {
    fn default() -> Self {
        Self {
            file: "template.js".to_string(),
            module: "app.core".to_string(),
            standalone: false,
            root: "app/".to_string(),
        }
    }
}

/// Bower dependency wiring settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WiredepConfig {
    pub bower_json: PathBuf,
    pub directory: PathBuf,
    /// Leading path segment stripped from injected references.
    pub ignore_path: String,
}

impl Default for WiredepConfig {
    fn default() -> Self {
        Self {
            bower_json: PathBuf::from("./bower.json"),
            directory: PathBuf::from("./bower_components/"),
            ignore_path: "../..".to_string(),
        }
    }
}

/// Logical file sets and directories used by every task.
///
/// Built once at startup and only read afterwards. A pattern that matches
/// nothing is not an error; the consuming task simply sees an empty set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub server: String,
    pub client: String,
    pub tmp: String,
    pub build: String,
    pub source: String,
    #[serde(deserialize_with = "string_or_seq")]
    pub alljs: Vec<String>,
    pub index: String,
    #[serde(deserialize_with = "string_or_seq")]
    pub js: Vec<String>,
    pub css: String,
    pub fonts: String,
    pub html: String,
    pub html_templates: String,
    pub images: String,
    pub less: String,
    pub specs: String,
    pub karma_config: String,
    #[serde(deserialize_with = "string_or_seq")]
    pub package_manifests: Vec<String>,
    pub template_cache: TemplateCacheConfig,
    pub wiredep: WiredepConfig,
    pub default_port: u16,
    pub node_server: String,
    /// Milliseconds to wait before telling browsers to reload.
    pub browser_reload_delay: u64,
    /// Quiet interval, in milliseconds, before a burst of changes fires a watch binding.
    pub watch_debounce: u64,
}

impl Default for PathConfig {
    fn default() -> Self {
        let server = "./src/server";
        let client = "./src/client";
        let client_app = format!("{}/app", client);
        let tmp = "./tmp/";

        Self {
            server: server.to_string(),
            client: client.to_string(),
            tmp: tmp.to_string(),
            build: "./build/".to_string(),
            source: "src".to_string(),
            alljs: vec!["./src/**/*.js".to_string(), "./*.js".to_string()],
            index: format!("{}/index.html", client),
            js: vec![
                format!("{}/**/*.module.js", client_app),
                format!("{}/**/*.js", client_app),
                format!("!{}/**/*.spec.js", client_app),
            ],
            css: format!("{}styles.css", tmp),
            fonts: "./bower_components/font-awesome/fonts/**/*.*".to_string(),
            html: format!("{}/**/*.html", client_app),
            html_templates: format!("{}/**/*.html", client_app),
            images: format!("{}/images/**/*.*", client),
            less: format!("{}/styles/styles.less", client),
            specs: format!("{}/**/*.spec.js", client_app),
            karma_config: "karma.conf.js".to_string(),
            package_manifests: vec!["./package.json".to_string(), "./bower.json".to_string()],
            template_cache: TemplateCacheConfig::default(),
            wiredep: WiredepConfig::default(),
            default_port: 7203,
            node_server: format!("{}/app.js", server),
            browser_reload_delay: 1000,
            watch_debounce: 500,
        }
    }
}

impl PathConfig {
    /// Port for the application server: `PORT` when set and valid, else the default.
    pub fn port(&self) -> u16 {
        std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(self.default_port)
    }

    pub fn client_app(&self) -> String {
        format!("{}/app", self.client.trim_end_matches('/'))
    }

    pub fn template_cache_path(&self) -> PathBuf {
        Path::new(&self.tmp).join(&self.template_cache.file)
    }

    /// Returns a copy with every relative path anchored at `root`.
    ///
    /// Negated patterns keep their leading `!`.
    pub fn rooted_at(&self, root: &Path) -> Self {
        let anchor = |p: &str| -> String {
            match p.strip_prefix('!') {
                Some(rest) => format!("!{}", anchor_one(root, rest)),
                None => anchor_one(root, p),
            }
        };
        let anchor_all = |ps: &[String]| ps.iter().map(|p| anchor(p)).collect::<Vec<_>>();

        let mut rooted = self.clone();
        rooted.server = anchor(&self.server);
        rooted.client = anchor(&self.client);
        rooted.tmp = anchor(&self.tmp);
        rooted.build = anchor(&self.build);
        rooted.source = anchor(&self.source);
        rooted.alljs = anchor_all(&self.alljs);
        rooted.index = anchor(&self.index);
        rooted.js = anchor_all(&self.js);
        rooted.css = anchor(&self.css);
        rooted.fonts = anchor(&self.fonts);
        rooted.html = anchor(&self.html);
        rooted.html_templates = anchor(&self.html_templates);
        rooted.images = anchor(&self.images);
        rooted.less = anchor(&self.less);
        rooted.specs = anchor(&self.specs);
        rooted.karma_config = anchor(&self.karma_config);
        rooted.package_manifests = anchor_all(&self.package_manifests);
        rooted.node_server = anchor(&self.node_server);
        rooted.wiredep.bower_json = root.join(&self.wiredep.bower_json);
        rooted.wiredep.directory = root.join(&self.wiredep.directory);
        rooted
    }
}

fn anchor_one(root: &Path, path: &str) -> String {
    if Path::new(path).is_absolute() {
        return path.to_string();
    }
    let trimmed = path.strip_prefix("./").unwrap_or(path);
    let joined = root.join(trimmed).to_string_lossy().to_string();
    if path.ends_with('/') && !joined.ends_with('/') {
        format!("{}/", joined)
    } else {
        joined
    }
}

fn string_or_seq<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskValue {
    Simple(String),
    Complex {
        #[serde(default)]
        command: Option<String>,
        #[serde(default)]
        depends_on: Vec<String>,
    },
}

impl TaskValue {
    pub fn command(&self) -> Option<&str> {
        match self {
            TaskValue::Simple(command) => Some(command),
            TaskValue::Complex { command, .. } => command.as_deref(),
        }
    }

    pub fn depends_on(&self) -> &[String] {
        match self {
            TaskValue::Simple(_) => &[],
            TaskValue::Complex { depends_on, .. } => depends_on,
        }
    }
}

/// Project configuration as defined in `pipewright.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub paths: PathConfig,
    #[serde(deserialize_with = "deserialize_tasks")]
    #[serde(default)]
    pub tasks: HashMap<String, TaskValue>,
}

impl ProjectConfig {
    /// Loads `pipewright.toml` from `root`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        Self::load_from(&root.join(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|error| crate::Error::Toml {
            error,
            context: path.display().to_string(),
        })
    }
}

pub(crate) fn deserialize_tasks<'de, D>(
    deserializer: D,
) -> std::result::Result<HashMap<String, TaskValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let map: HashMap<String, toml::Value> = HashMap::deserialize(deserializer)?;
    let mut result = HashMap::new();
    let mut dotted_deps: HashMap<String, Vec<String>> = HashMap::new();

    for (key, value) in map {
        // Dotted keys (`test.depends_on = [...]`) attach edges to a task declared elsewhere.
        if let Some((task_name, dep_key)) = key.split_once('.') {
            if dep_key == "depends_on" {
                let toml::Value::Array(arr) = value else {
                    return Err(serde::de::Error::custom(format!(
                        "Task dependency '{}' must be an array",
                        key
                    )));
                };
                dotted_deps.insert(task_name.to_string(), string_array(&arr));
                continue;
            }
        }

        match value {
            toml::Value::String(s) => {
                result.insert(key, TaskValue::Simple(s));
            }
            toml::Value::Table(t) => {
                // Nested form: `[tasks.test] depends_on = [...]` parses as a table too.
                let command = t
                    .get("command")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                let depends_on = t
                    .get("depends_on")
                    .and_then(|v| v.as_array())
                    .map(|arr| string_array(arr))
                    .unwrap_or_default();
                if command.is_none() && depends_on.is_empty() {
                    return Err(serde::de::Error::custom(format!(
                        "Task '{}' must have a 'command' or 'depends_on' field",
                        key
                    )));
                }
                result.insert(
                    key,
                    TaskValue::Complex {
                        command,
                        depends_on,
                    },
                );
            }
            _ => {
                return Err(serde::de::Error::custom(
                    "Task value must be a string or a table",
                ));
            }
        }
    }

    for (task_name, deps) in dotted_deps {
        let command = result
            .remove(&task_name)
            .and_then(|v| v.command().map(|c| c.to_string()));
        result.insert(
            task_name,
            TaskValue::Complex {
                command,
                depends_on: deps,
            },
        );
    }

    Ok(result)
}

fn string_array(arr: &[toml::Value]) -> Vec<String> {
    arr.iter()
        .filter_map(|v| v.as_str().map(|s| s.to_string()))
        .collect()
}
