//! Supervision of the app server subprocess.
//!
//! The supervisor starts the server, restarts it when server-side files
//! change and reports lifecycle events on a channel. A crash is reported
//! and ends supervision; the server is not restarted automatically.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::command::CommandSpec;
use crate::error::{Error, Result};
use crate::options::SupervisorOptions;
use crate::watcher::{ChangeEvent, FileWatcher};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Started,
    /// Restarted because these files changed.
    Restarted(Vec<PathBuf>),
    /// Exited with a non-zero code, or by signal when `None`.
    Crashed(Option<i32>),
    Exited,
}

pub struct Supervisor;

impl Supervisor {
    /// Starts the server and returns a handle streaming its events.
    ///
    /// The first event is always [`SupervisorEvent::Started`].
    pub fn spawn(options: SupervisorOptions) -> Result<SupervisorHandle> {
        let (mut watcher, changes) = FileWatcher::new()?;
        for dir in &options.watch {
            if dir.exists() {
                watcher.watch_dir(dir.clone())?;
            } else {
                tracing::warn!("not watching {}: directory does not exist", dir.display());
            }
        }

        let child = start(&options)?;
        let (events_tx, events) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        let task = tokio::spawn(supervise(options, child, watcher, changes, events_tx, stop_rx));

        Ok(SupervisorHandle {
            events,
            stop: Some(stop_tx),
            task,
        })
    }
}

pub struct SupervisorHandle {
    events: mpsc::UnboundedReceiver<SupervisorEvent>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl SupervisorHandle {
    /// Next lifecycle event; `None` once supervision has ended and every
    /// event was consumed.
    pub async fn next_event(&mut self) -> Option<SupervisorEvent> {
        self.events.recv().await
    }

    /// Kills the server and waits for supervision to end.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.task.await.map_err(|e| Error::Join(e.to_string()))?
    }
}

fn start(options: &SupervisorOptions) -> Result<Child> {
    let spec = options
        .env
        .iter()
        .fold(
            CommandSpec::new(&options.exec).arg(options.script.to_string_lossy()),
            |spec, (k, v)| spec.env(k, v),
        );

    tracing::info!("Starting {}", spec.display());
    spec.to_command()
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Supervisor(format!("Failed to start {}: {}", spec.display(), e)))
}

async fn supervise(
    options: SupervisorOptions,
    mut child: Child,
    _watcher: FileWatcher,
    mut changes: mpsc::UnboundedReceiver<ChangeEvent>,
    events: mpsc::UnboundedSender<SupervisorEvent>,
    mut stop: oneshot::Receiver<()>,
) -> Result<()> {
    let _ = events.send(SupervisorEvent::Started);

    loop {
        tokio::select! {
            status = child.wait() => {
                let status = status?;
                let event = match status.code() {
                    Some(0) => SupervisorEvent::Exited,
                    code => SupervisorEvent::Crashed(code),
                };
                let _ = events.send(event);
                return Ok(());
            }
            Some(first) = changes.recv() => {
                let paths = settle(first, &mut changes, options.delay).await;
                child.kill().await?;
                child = start(&options)?;
                let _ = events.send(SupervisorEvent::Restarted(paths));
            }
            _ = &mut stop => {
                child.kill().await?;
                let _ = events.send(SupervisorEvent::Exited);
                return Ok(());
            }
        }
    }
}

/// Collects changes until none arrived for `delay`.
async fn settle(
    first: ChangeEvent,
    changes: &mut mpsc::UnboundedReceiver<ChangeEvent>,
    delay: std::time::Duration,
) -> Vec<PathBuf> {
    let mut paths = vec![first.path];
    loop {
        match tokio::time::timeout(delay, changes.recv()).await {
            Ok(Some(event)) => {
                if !paths.contains(&event.path) {
                    paths.push(event.path);
                }
            }
            Ok(None) | Err(_) => return paths,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn options(script: PathBuf, watch: Vec<PathBuf>) -> SupervisorOptions {
        SupervisorOptions {
            exec: "sh".to_string(),
            script,
            delay: Duration::from_millis(50),
            env: HashMap::new(),
            watch,
        }
    }

    fn script(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("server.sh");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn crash_is_reported_without_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = Supervisor::spawn(options(script(dir.path(), "exit 3"), vec![])).unwrap();

        assert_eq!(handle.next_event().await, Some(SupervisorEvent::Started));
        assert_eq!(handle.next_event().await, Some(SupervisorEvent::Crashed(Some(3))));
        assert_eq!(handle.next_event().await, None);
    }

    #[tokio::test]
    async fn clean_exit() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = Supervisor::spawn(options(script(dir.path(), "exit 0"), vec![])).unwrap();

        assert_eq!(handle.next_event().await, Some(SupervisorEvent::Started));
        assert_eq!(handle.next_event().await, Some(SupervisorEvent::Exited));
    }

    #[tokio::test]
    async fn server_change_restarts() {
        let bin = tempfile::tempdir().unwrap();
        let server = tempfile::tempdir().unwrap();
        let server_dir = server.path().canonicalize().unwrap();
        let mut handle = Supervisor::spawn(options(
            script(bin.path(), "sleep 30"),
            vec![server_dir.clone()],
        ))
        .unwrap();
        assert_eq!(handle.next_event().await, Some(SupervisorEvent::Started));

        tokio::fs::write(server_dir.join("app.js"), "x").await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), handle.next_event())
            .await
            .unwrap();
        match event {
            Some(SupervisorEvent::Restarted(paths)) => {
                assert!(paths.iter().any(|p| p.ends_with("app.js")));
            }
            other => panic!("expected restart, got {:?}", other),
        }

        handle.stop().await.unwrap();
    }
}
