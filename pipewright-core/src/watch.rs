//! Watch bindings, debounce and the re-run loop.
//!
//! A [`WatchController`] is a pure state machine fed with change events and
//! clock readings; [`WatchLoop`] drives it from a watcher channel and runs
//! the bound tasks through the graph.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::config::PathConfig;
use crate::error::Result;
use crate::fileset::FileSet;
use crate::options::BrowserSyncOptions;
use crate::reload::{schedule_reload, ReloadKind, ReloadNotifier};
use crate::runner::TaskRunner;
use crate::session::Mode;
use crate::watcher::{ChangeEvent, ChangeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    ChangeDetected,
    TaskTriggered,
}

/// How a binding turns changed paths into a browser reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadPolicy {
    /// Always reload the page.
    Full,
    /// Inject stylesheets when only CSS changed, reload otherwise.
    CssAware,
}

impl ReloadPolicy {
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Dev => ReloadPolicy::CssAware,
            Mode::Build => ReloadPolicy::Full,
        }
    }

    pub fn reload_for(self, paths: &[PathBuf]) -> ReloadKind {
        let all_css = !paths.is_empty()
            && paths
                .iter()
                .all(|p| p.extension().is_some_and(|ext| ext == "css"));

        match self {
            ReloadPolicy::CssAware if all_css => ReloadKind::InjectCss {
                paths: paths.to_vec(),
            },
            _ => ReloadKind::Full,
        }
    }
}

/// Patterns to observe, the tasks they re-run and the reload they cause.
#[derive(Debug, Clone)]
pub struct WatchBinding {
    pub name: String,
    pub patterns: Vec<String>,
    pub tasks: Vec<String>,
    pub reload: Option<ReloadPolicy>,
}

impl WatchBinding {
    pub fn new<S: Into<String>>(name: impl Into<String>, patterns: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            patterns: patterns.into_iter().map(Into::into).collect(),
            tasks: Vec::new(),
            reload: None,
        }
    }

    pub fn run<S: Into<String>>(mut self, tasks: impl IntoIterator<Item = S>) -> Self {
        self.tasks = tasks.into_iter().map(Into::into).collect();
        self
    }

    pub fn reload(mut self, policy: ReloadPolicy) -> Self {
        self.reload = Some(policy);
        self
    }
}

/// Bindings a serve session installs for `mode`.
///
/// Dev recompiles Less on change and lets the compiled CSS reach browsers
/// through the dev-server's own file list. Build re-runs the whole
/// optimisation on any source change and reloads the page.
pub fn session_bindings(mode: Mode, paths: &PathConfig, browser_sync: &BrowserSyncOptions) -> Vec<WatchBinding> {
    match mode {
        Mode::Dev => {
            let mut bindings = vec![WatchBinding::new("styles", [paths.less.clone()]).run(["styles"])];
            if !browser_sync.files.is_empty() {
                bindings.push(
                    WatchBinding::new("browser", browser_sync.files.clone())
                        .reload(ReloadPolicy::for_mode(mode)),
                );
            }
            bindings
        }
        Mode::Build => {
            let mut patterns = vec![paths.less.clone()];
            patterns.extend(paths.js.iter().cloned());
            patterns.push(paths.html.clone());
            vec![WatchBinding::new("optimize", patterns)
                .run(["optimize"])
                .reload(ReloadPolicy::for_mode(mode))]
        }
    }
}

/// A binding whose quiet interval elapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub binding: String,
    pub tasks: Vec<String>,
    pub paths: Vec<PathBuf>,
    pub reload: Option<ReloadKind>,
}

struct CompiledBinding {
    binding: WatchBinding,
    files: FileSet,
    pending: Option<Pending>,
}

struct Pending {
    last_event: Instant,
    paths: Vec<PathBuf>,
}

/// Debounces change events per binding.
///
/// Each binding fires once its patterns have been quiet for `debounce`,
/// however many events arrived before that.
pub struct WatchController {
    bindings: Vec<CompiledBinding>,
    debounce: Duration,
    state: WatchState,
}

impl WatchController {
    pub fn new(bindings: Vec<WatchBinding>, debounce: Duration) -> Result<Self> {
        let bindings = bindings
            .into_iter()
            .map(|binding| {
                Ok(CompiledBinding {
                    files: FileSet::new(&binding.patterns)?,
                    binding,
                    pending: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            bindings,
            debounce,
            state: WatchState::Idle,
        })
    }

    #[inline]
    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Every pattern any binding observes.
    pub fn patterns(&self) -> Vec<String> {
        self.bindings
            .iter()
            .flat_map(|b| b.binding.patterns.iter().cloned())
            .collect()
    }

    pub fn start(&mut self) {
        if self.state == WatchState::Idle {
            self.state = WatchState::Watching;
        }
    }

    /// Records a change. Returns true when some binding matched.
    ///
    /// Events are ignored until [`start`](Self::start). While tasks run they
    /// are queued and fire after [`complete`](Self::complete).
    pub fn on_event(&mut self, event: &ChangeEvent, now: Instant) -> bool {
        if self.state == WatchState::Idle {
            return false;
        }

        let mut matched = false;
        for compiled in &mut self.bindings {
            if !compiled.files.matches(&event.path) {
                continue;
            }
            matched = true;
            let pending = compiled.pending.get_or_insert_with(|| Pending {
                last_event: now,
                paths: Vec::new(),
            });
            pending.last_event = now;
            if !pending.paths.contains(&event.path) {
                pending.paths.push(event.path.clone());
            }
        }

        if matched {
            tracing::info!("File {} was {}", event.path.display(), describe(event.kind));
            if self.state == WatchState::Watching {
                self.state = WatchState::ChangeDetected;
            }
        }
        matched
    }

    /// Earliest instant at which [`poll`](Self::poll) can fire something.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.state == WatchState::TaskTriggered {
            return None;
        }
        self.bindings
            .iter()
            .filter_map(|b| b.pending.as_ref())
            .map(|p| p.last_event + self.debounce)
            .min()
    }

    /// Fires every binding that has been quiet for the debounce interval.
    pub fn poll(&mut self, now: Instant) -> Vec<Trigger> {
        if self.state != WatchState::ChangeDetected {
            return Vec::new();
        }

        let debounce = self.debounce;
        let mut triggers = Vec::new();
        for compiled in &mut self.bindings {
            let due = compiled
                .pending
                .as_ref()
                .is_some_and(|p| now.duration_since(p.last_event) >= debounce);
            if !due {
                continue;
            }
            if let Some(pending) = compiled.pending.take() {
                let binding = &compiled.binding;
                triggers.push(Trigger {
                    binding: binding.name.clone(),
                    tasks: binding.tasks.clone(),
                    reload: binding.reload.map(|policy| policy.reload_for(&pending.paths)),
                    paths: pending.paths,
                });
            }
        }

        if !triggers.is_empty() {
            self.state = WatchState::TaskTriggered;
        }
        triggers
    }

    /// Marks the fired tasks as finished.
    pub fn complete(&mut self) {
        if self.state != WatchState::TaskTriggered {
            return;
        }
        self.state = if self.bindings.iter().any(|b| b.pending.is_some()) {
            WatchState::ChangeDetected
        } else {
            WatchState::Watching
        };
    }
}

fn describe(kind: ChangeKind) -> &'static str {
    match kind {
        ChangeKind::Added => "added",
        ChangeKind::Changed => "changed",
        ChangeKind::Removed => "deleted",
    }
}

/// Totals for a finished loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub triggers: usize,
    pub failures: usize,
}

/// Drives a [`WatchController`] until its event channel closes.
pub struct WatchLoop {
    controller: WatchController,
    runner: TaskRunner,
    notifier: Option<Arc<dyn ReloadNotifier>>,
    reload_delay: Duration,
}

impl WatchLoop {
    pub fn new(controller: WatchController, runner: TaskRunner) -> Self {
        Self {
            controller,
            runner,
            notifier: None,
            reload_delay: Duration::ZERO,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ReloadNotifier>, reload_delay: Duration) -> Self {
        self.notifier = Some(notifier);
        self.reload_delay = reload_delay;
        self
    }

    /// A failing task is logged and the loop keeps watching; its binding
    /// sends no reload.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<ChangeEvent>) -> Result<WatchSummary> {
        let mut summary = WatchSummary::default();
        self.controller.start();

        loop {
            let deadline = self.controller.next_deadline();
            let sleep = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        self.controller.on_event(&event, Instant::now());
                    }
                    None => break,
                },
                _ = sleep => {
                    for trigger in self.controller.poll(Instant::now()) {
                        summary.triggers += 1;
                        if !self.fire(trigger).await {
                            summary.failures += 1;
                        }
                    }
                    self.controller.complete();
                }
            }
        }

        tracing::debug!("watch loop ended after {} trigger(s)", summary.triggers);
        Ok(summary)
    }

    async fn fire(&self, trigger: Trigger) -> bool {
        if !trigger.tasks.is_empty() {
            tracing::info!("'{}' changed, running {:?}", trigger.binding, trigger.tasks);
            if let Err(e) = self.runner.run(&trigger.tasks).await {
                tracing::error!("watch '{}': {}", trigger.binding, e);
                return false;
            }
        }

        if let (Some(kind), Some(notifier)) = (trigger.reload, &self.notifier) {
            schedule_reload(notifier.clone(), kind, self.reload_delay);
        }
        true
    }
}
