//! Serve sessions: the live-reload server, the watch loop and the app
//! server supervisor, tied together by one control loop.

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::PathConfig;
use crate::error::{Error, Result};
use crate::options::{BrowserSyncOptions, SupervisorOptions};
use crate::reload::{schedule_reload, HubHandle, ReloadHub, ReloadKind};
use crate::runner::TaskRunner;
use crate::supervisor::{Supervisor, SupervisorEvent};
use crate::watch::{session_bindings, WatchBinding, WatchController, WatchLoop};
use crate::watcher::FileWatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Serve sources as-is from the client and tmp directories.
    Dev,
    /// Serve the optimised build output.
    Build,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Dev => "dev",
            Mode::Build => "build",
        }
    }

    #[inline]
    pub fn is_dev(self) -> bool {
        self == Mode::Dev
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSession {
    pub mode: Mode,
    pub proxy_target: String,
    pub port: u16,
    pub watched_asset_patterns: Vec<String>,
    pub reload_delay: Duration,
}

impl ServerSession {
    pub fn new(mode: Mode, options: &BrowserSyncOptions) -> Self {
        Self {
            mode,
            proxy_target: options
                .proxy
                .as_ref()
                .map(|p| p.target.clone())
                .unwrap_or_default(),
            port: options.port,
            watched_asset_patterns: options.files.clone(),
            reload_delay: options.reload_delay(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStart {
    Started,
    /// A session is already running; nothing was started.
    AlreadyActive,
    /// Sessions are turned off (`--nosync`).
    Disabled,
}

/// At most one session per process.
#[derive(Debug, Default)]
pub struct SessionManager {
    nosync: bool,
    active: Mutex<Option<ServerSession>>,
}

impl SessionManager {
    pub fn new(nosync: bool) -> Self {
        Self {
            nosync,
            active: Mutex::new(None),
        }
    }

    pub fn start(&self, session: ServerSession) -> SessionStart {
        if self.nosync {
            return SessionStart::Disabled;
        }
        let Ok(mut active) = self.active.lock() else {
            return SessionStart::AlreadyActive;
        };
        if active.is_some() {
            return SessionStart::AlreadyActive;
        }

        tracing::info!(
            "Starting {} session on port {} proxying {}",
            session.mode,
            session.port,
            session.proxy_target
        );
        *active = Some(session);
        SessionStart::Started
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().map(|a| a.is_some()).unwrap_or(false)
    }

    pub fn current(&self) -> Option<ServerSession> {
        self.active.lock().ok().and_then(|a| a.clone())
    }

    pub fn end(&self) {
        if let Ok(mut active) = self.active.lock() {
            *active = None;
        }
    }
}

struct Live {
    hub: Arc<ReloadHub>,
    server: HubHandle,
    watch: tokio::task::JoinHandle<Result<crate::watch::WatchSummary>>,
    _watcher: FileWatcher,
}

impl Live {
    fn shutdown(self) {
        self.watch.abort();
        self.server.shutdown();
    }
}

/// Serves the app in `mode`: supervised app server, proxying reload server
/// and the mode's watch bindings.
pub struct DevServer {
    mode: Mode,
    runner: TaskRunner,
    browser_sync: BrowserSyncOptions,
    supervisor: SupervisorOptions,
    bindings: Vec<WatchBinding>,
    manager: SessionManager,
    debounce: Duration,
    hub_addr: SocketAddr,
}

impl DevServer {
    pub fn new(mode: Mode, runner: TaskRunner, paths: &PathConfig, nosync: bool) -> Self {
        let port = paths.port();
        let browser_sync = BrowserSyncOptions::for_session(mode, paths, port);
        let bindings = session_bindings(mode, paths, &browser_sync);
        let hub_addr = SocketAddr::from(([0, 0, 0, 0], browser_sync.port));

        Self {
            mode,
            runner,
            supervisor: SupervisorOptions::for_session(mode, paths, port),
            browser_sync,
            bindings,
            manager: SessionManager::new(nosync),
            debounce: Duration::from_millis(paths.watch_debounce),
            hub_addr,
        }
    }

    pub fn with_supervisor(mut self, supervisor: SupervisorOptions) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn with_hub_addr(mut self, addr: SocketAddr) -> Self {
        self.hub_addr = addr;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn browser_sync(&self) -> &BrowserSyncOptions {
        &self.browser_sync
    }

    /// Runs until the app server exits, crashes or `shutdown` resolves.
    ///
    /// A crash ends the session with [`Error::Supervisor`].
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tracing::info!("Starting {} server", self.mode);
        let mut supervisor = Supervisor::spawn(self.supervisor.clone())?;
        let mut live: Option<Live> = None;
        tokio::pin!(shutdown);

        let outcome = loop {
            let event = tokio::select! {
                event = supervisor.next_event() => event,
                _ = &mut shutdown => {
                    tracing::info!("Stopping {} server", self.mode);
                    break Ok(());
                }
            };

            match event {
                Some(SupervisorEvent::Started) => {
                    tracing::info!("*** app server started");
                    if let Err(e) = self.on_started(&mut live).await {
                        break Err(e);
                    }
                }
                Some(SupervisorEvent::Restarted(paths)) => {
                    tracing::info!("*** app server restarted");
                    let files: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
                    tracing::info!("files changed on restart:\n{}", files.join("\n"));
                    self.on_restarted(live.as_ref()).await;
                }
                Some(SupervisorEvent::Crashed(code)) => {
                    tracing::error!("*** app server crashed: script crashed for some reason");
                    break Err(Error::Supervisor(match code {
                        Some(code) => format!("app server exited with code {}", code),
                        None => "app server was killed by a signal".to_string(),
                    }));
                }
                Some(SupervisorEvent::Exited) | None => {
                    tracing::info!("*** app server exited cleanly");
                    break Ok(());
                }
            }
        };

        if let Some(live) = live.take() {
            live.shutdown();
        }
        self.manager.end();
        supervisor.stop().await?;
        outcome
    }

    async fn on_started(&self, live: &mut Option<Live>) -> Result<()> {
        let session = ServerSession::new(self.mode, &self.browser_sync);
        match self.manager.start(session) {
            SessionStart::Started => {}
            SessionStart::AlreadyActive => return Ok(()),
            SessionStart::Disabled => {
                tracing::info!("Live reload is disabled (--nosync)");
                return Ok(());
            }
        }

        let hub = Arc::new(ReloadHub::new(&self.browser_sync)?);
        let server = hub.serve(self.hub_addr).await?;

        let (mut watcher, changes) = FileWatcher::new()?;
        let controller = WatchController::new(self.bindings.clone(), self.debounce)?;
        watcher.watch_patterns(&controller.patterns())?;
        let watch = tokio::spawn(
            WatchLoop::new(controller, self.runner.clone())
                .with_notifier(hub.clone(), self.browser_sync.reload_delay())
                .run(changes),
        );

        *live = Some(Live {
            hub,
            server,
            watch,
            _watcher: watcher,
        });
        Ok(())
    }

    /// Re-lints through the graph, then reloads browsers after the delay.
    async fn on_restarted(&self, live: Option<&Live>) {
        if self.runner.registry().contains("vet") {
            if let Err(e) = self.runner.run_one("vet").await {
                tracing::warn!("vet failed after restart: {}", e);
            }
        }
        if let Some(live) = live {
            schedule_reload(live.hub.clone(), ReloadKind::Full, self.browser_sync.reload_delay());
        }
    }
}
