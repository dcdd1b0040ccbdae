//! Typed option surfaces for the dev-server, the app-server supervisor and
//! the test runner.
//!
//! Each struct documents the collaborator's default for every field and
//! serialises with the collaborator's own (camelCase) key names.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::PathConfig;
use crate::session::Mode;

/// Control panel served on a separate port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiOptions {
    /// Default: 3001
    pub port: u16,
    /// Default: 8080
    pub weinre_port: u16,
}

impl Default for UiOptions {
    fn default() -> Self {
        Self {
            port: 3001,
            weinre_port: 8080,
        }
    }
}

/// Built-in static server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerOptions {
    pub base_dir: Vec<String>,
    pub index: Option<String>,
    pub directory: bool,
    pub routes: HashMap<String, String>,
}

/// Proxy to an existing server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyOptions {
    /// `host:port` or full URL of the proxied server.
    pub target: String,
    /// Proxy websocket upgrades too.
    pub ws: bool,
    /// Extra headers added to proxied requests.
    pub req_headers: HashMap<String, String>,
}

impl ProxyOptions {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    /// Target as an absolute URL.
    pub fn url(&self) -> String {
        if self.target.starts_with("http://") || self.target.starts_with("https://") {
            self.target.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", self.target.trim_end_matches('/'))
        }
    }
}

/// Interactions mirrored across connected browsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GhostOptions {
    pub clicks: bool,
    pub scroll: bool,
    pub location: bool,
    pub forms: bool,
}

impl Default for GhostOptions {
    fn default() -> Self {
        Self {
            clicks: true,
            scroll: true,
            location: true,
            forms: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    Debug,
    Warn,
    Silent,
}

/// Which URL to open when the server starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpenTarget {
    #[default]
    Local,
    External,
    Ui,
    UiExternal,
    Tunnel,
    /// Do not open a browser.
    None,
}

/// Additional HTML rewriting applied to proxied responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteRule {
    /// Regular expression matched against the response body.
    #[serde(rename = "match")]
    pub pattern: String,
    pub replace: String,
}

/// Snippet injection rules for proxied HTML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetOptions {
    /// URL patterns that never get the client snippet.
    pub blacklist: Vec<String>,
    /// Regular expression for the injection point; the snippet goes before it.
    pub rule_match: String,
}

impl Default for SnippetOptions {
    fn default() -> Self {
        Self {
            blacklist: Vec::new(),
            rule_match: "(?i)</body>".to_string(),
        }
    }
}

/// Socket path and namespace, to avoid collisions with the proxied app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketOptions {
    /// Default: "/browser-sync/socket.io"
    pub path: String,
    /// Default: "/browser-sync"
    pub client_path: String,
    /// Default: "/browser-sync"
    pub namespace: String,
    pub domain: Option<String>,
    pub port: Option<u16>,
    /// Default: 5000
    pub heartbeat_timeout: u64,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            path: "/browser-sync/socket.io".to_string(),
            client_path: "/browser-sync".to_string(),
            namespace: "/browser-sync".to_string(),
            domain: None,
            port: None,
            heartbeat_timeout: 5000,
        }
    }
}

/// Options for the live-reload dev server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrowserSyncOptions {
    /// Control panel; `None` disables it. Default: enabled on 3001.
    pub ui: Option<UiOptions>,
    /// Globs whose changes reload or inject into browsers. Default: none.
    pub files: Vec<String>,
    /// File events that count as changes. Default: `["change"]`.
    pub watch_events: Vec<String>,
    /// Built-in static server. Default: none.
    pub server: Option<ServerOptions>,
    /// Proxy an existing server. Default: none.
    pub proxy: Option<ProxyOptions>,
    /// Default: 3000
    pub port: u16,
    /// Extra static directories in proxy mode. Default: none.
    pub serve_static: Vec<String>,
    pub https: bool,
    pub ghost_mode: Option<GhostOptions>,
    pub log_level: LogLevel,
    /// Default: "BS"
    pub log_prefix: String,
    pub log_connections: bool,
    pub log_file_changes: bool,
    /// Default: true
    pub log_snippet: bool,
    pub snippet_options: SnippetOptions,
    pub rewrite_rules: Vec<RewriteRule>,
    pub tunnel: Option<String>,
    pub online: Option<bool>,
    pub open: OpenTarget,
    /// Default: `["default"]`
    pub browser: Vec<String>,
    pub cors: bool,
    pub xip: bool,
    pub reload_on_restart: bool,
    /// Default: true
    pub notify: bool,
    /// Default: true
    pub scroll_proportionally: bool,
    pub scroll_throttle: u64,
    /// Default: "window.name"
    pub scroll_restore_technique: String,
    pub scroll_elements: Vec<String>,
    pub scroll_element_mapping: Vec<String>,
    /// Milliseconds to wait before reloading after a change. Default: 0
    pub reload_delay: u64,
    /// Minimum milliseconds between reload broadcasts. Default: 0
    pub reload_debounce: u64,
    /// Inject CSS instead of reloading when possible. Default: true
    pub inject_changes: bool,
    pub start_path: Option<String>,
    /// Default: true
    pub minify: bool,
    pub host: Option<String>,
    /// Default: true
    pub code_sync: bool,
    /// Default: true
    pub timestamps: bool,
    pub socket: SocketOptions,
}

impl Default for BrowserSyncOptions {
    fn default() -> Self {
        Self {
            ui: Some(UiOptions::default()),
            files: Vec::new(),
            watch_events: vec!["change".to_string()],
            server: None,
            proxy: None,
            port: 3000,
            serve_static: Vec::new(),
            https: false,
            ghost_mode: Some(GhostOptions::default()),
            log_level: LogLevel::Info,
            log_prefix: "BS".to_string(),
            log_connections: false,
            log_file_changes: false,
            log_snippet: true,
            snippet_options: SnippetOptions::default(),
            rewrite_rules: Vec::new(),
            tunnel: None,
            online: None,
            open: OpenTarget::Local,
            browser: vec!["default".to_string()],
            cors: false,
            xip: false,
            reload_on_restart: false,
            notify: true,
            scroll_proportionally: true,
            scroll_throttle: 0,
            scroll_restore_technique: "window.name".to_string(),
            scroll_elements: Vec::new(),
            scroll_element_mapping: Vec::new(),
            reload_delay: 0,
            reload_debounce: 0,
            inject_changes: true,
            start_path: None,
            minify: true,
            host: None,
            code_sync: true,
            timestamps: true,
            socket: SocketOptions::default(),
        }
    }
}

impl BrowserSyncOptions {
    /// Options for a serve session proxying the app server on `port`.
    ///
    /// Dev mode watches client sources (minus the Less entry, which goes
    /// through `styles`) and the compiled CSS. Build mode watches nothing
    /// itself; `optimize` owns that watch.
    pub fn for_session(mode: Mode, paths: &PathConfig, port: u16) -> Self {
        let files = match mode {
            Mode::Dev => vec![
                format!("{}/**/*.*", paths.client.trim_end_matches('/')),
                format!("!{}", paths.less),
                format!("{}/**/*.css", paths.tmp.trim_end_matches('/')),
            ],
            Mode::Build => Vec::new(),
        };

        Self {
            proxy: Some(ProxyOptions::new(format!("localhost:{}", port))),
            port: 3000,
            files,
            ghost_mode: Some(GhostOptions {
                clicks: true,
                location: false,
                forms: true,
                scroll: true,
            }),
            inject_changes: true,
            log_file_changes: true,
            log_level: LogLevel::Debug,
            log_prefix: "pipewright".to_string(),
            notify: true,
            reload_delay: paths.browser_reload_delay,
            ..Self::default()
        }
    }

    pub fn reload_delay(&self) -> Duration {
        Duration::from_millis(self.reload_delay)
    }

    /// JSON in the collaborator's own key names.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Options for the app-server supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// Interpreter used to run `script`. Default: "node"
    pub exec: String,
    pub script: PathBuf,
    /// Quiet period after a server-side change before restarting. Default: 1s
    pub delay: Duration,
    pub env: HashMap<String, String>,
    /// Directories whose changes restart the server.
    pub watch: Vec<PathBuf>,
}

impl SupervisorOptions {
    /// Supervisor settings for the configured node server in `mode`.
    pub fn for_session(mode: Mode, paths: &PathConfig, port: u16) -> Self {
        let mut env = HashMap::new();
        env.insert("PORT".to_string(), port.to_string());
        env.insert("NODE_ENV".to_string(), mode.as_str().to_string());

        Self {
            exec: "node".to_string(),
            script: PathBuf::from(&paths.node_server),
            delay: Duration::from_secs(1),
            env,
            watch: vec![PathBuf::from(&paths.server)],
        }
    }
}

/// Options for the delegated test runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRunnerOptions {
    /// Default: "karma"
    pub program: String,
    pub config_file: PathBuf,
    /// Files left out of the run.
    pub exclude: Vec<String>,
    /// Run once and exit instead of watching. Default: true
    pub single_run: bool,
}

impl TestRunnerOptions {
    pub fn new(config_file: impl Into<PathBuf>) -> Self {
        Self {
            program: "karma".to_string(),
            config_file: config_file.into(),
            exclude: Vec::new(),
            single_run: true,
        }
    }

    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    pub fn with_single_run(mut self, single_run: bool) -> Self {
        self.single_run = single_run;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_session_watches_client_and_css() {
        let paths = PathConfig::default();
        let options = BrowserSyncOptions::for_session(Mode::Dev, &paths, 7203);
        assert_eq!(options.proxy.as_ref().unwrap().url(), "http://localhost:7203");
        assert_eq!(
            options.files,
            vec![
                "./src/client/**/*.*",
                "!./src/client/styles/styles.less",
                "./tmp/**/*.css"
            ]
        );
        assert_eq!(options.reload_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn build_session_defers_watching() {
        let options = BrowserSyncOptions::for_session(Mode::Build, &PathConfig::default(), 7203);
        assert!(options.files.is_empty());
    }

    #[test]
    fn serialises_with_tool_key_names() {
        let json = BrowserSyncOptions::default().to_json().unwrap();
        assert!(json.contains("\"injectChanges\": true"));
        assert!(json.contains("\"scrollRestoreTechnique\": \"window.name\""));
    }

    #[test]
    fn supervisor_env_carries_mode_and_port() {
        let options = SupervisorOptions::for_session(Mode::Build, &PathConfig::default(), 8080);
        assert_eq!(options.env["NODE_ENV"], "build");
        assert_eq!(options.env["PORT"], "8080");
    }
}
