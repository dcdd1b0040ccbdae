//! Filesystem notifications, reduced to add/change/remove events.

use std::collections::BTreeSet;
use std::path::PathBuf;

use notify::event::{ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::fileset::glob_base;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
}

/// One file touched on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Keeps the OS watch alive; events arrive on the receiver handed out by
/// [`FileWatcher::new`]. Dropping the watcher closes that channel.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    roots: Vec<PathBuf>,
}

impl FileWatcher {
    pub fn new() -> Result<(Self, mpsc::UnboundedReceiver<ChangeEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for change in translate(&event) {
                        // Receiver gone means the loop ended; nothing left to tell.
                        let _ = tx.send(change);
                    }
                }
                Err(e) => tracing::warn!("watcher error: {}", e),
            },
            NotifyConfig::default(),
        )
        .map_err(|e| Error::Watch(format!("Failed to create watcher: {}", e)))?;

        Ok((
            Self {
                watcher,
                roots: Vec::new(),
            },
            rx,
        ))
    }

    /// Watches the directories under which `patterns` can match.
    ///
    /// Roots that do not exist yet are skipped with a warning.
    pub fn watch_patterns<S: AsRef<str>>(&mut self, patterns: &[S]) -> Result<()> {
        for root in watch_roots(patterns) {
            if !root.exists() {
                tracing::warn!("not watching {}: directory does not exist", root.display());
                continue;
            }
            self.watch_dir(root)?;
        }
        Ok(())
    }

    pub fn watch_dir(&mut self, dir: PathBuf) -> Result<()> {
        if self.roots.iter().any(|r| dir.starts_with(r)) {
            return Ok(());
        }
        self.watcher
            .watch(&dir, RecursiveMode::Recursive)
            .map_err(|e| Error::Watch(format!("Failed to watch {}: {}", dir.display(), e)))?;
        tracing::debug!("watching {}", dir.display());
        self.roots.push(dir);
        Ok(())
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }
}

fn translate(event: &Event) -> Vec<ChangeEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Added,
        EventKind::Remove(_) => ChangeKind::Removed,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Removed,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Added,
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => ChangeKind::Changed,
        EventKind::Access(_) | EventKind::Any | EventKind::Other => return Vec::new(),
    };

    event
        .paths
        .iter()
        .map(|path| ChangeEvent::new(path.clone(), kind))
        .collect()
}

/// Minimal set of recursive watch roots covering `patterns`.
///
/// Negated patterns never widen the watch. A root nested in another root is
/// dropped because the outer watch is recursive.
pub fn watch_roots<S: AsRef<str>>(patterns: &[S]) -> Vec<PathBuf> {
    let bases: BTreeSet<PathBuf> = patterns
        .iter()
        .map(AsRef::as_ref)
        .filter(|p| !p.starts_with('!'))
        .map(glob_base)
        .collect();

    let mut roots: Vec<PathBuf> = Vec::new();
    for base in bases {
        if roots.last().is_some_and(|last| base.starts_with(last)) {
            continue;
        }
        roots.push(base);
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};

    #[test]
    fn nested_roots_collapse() {
        let roots = watch_roots(&[
            "/p/src/client/**/*.js",
            "/p/src/client/app/**/*.html",
            "!/p/src/client/styles/styles.less",
            "/p/tmp/**/*.css",
        ]);
        assert_eq!(roots, vec![PathBuf::from("/p/src/client"), PathBuf::from("/p/tmp")]);
    }

    #[test]
    fn sibling_prefixes_stay_separate() {
        let roots = watch_roots(&["/p/app/*.js", "/p/app-extra/*.js"]);
        assert_eq!(roots.len(), 2);
    }

    #[test]
    fn literal_file_watches_its_directory() {
        assert_eq!(
            watch_roots(&["/p/src/client/styles/styles.less"]),
            vec![PathBuf::from("/p/src/client/styles")]
        );
    }

    #[test]
    fn notify_kinds_map_to_changes() {
        let event = |kind| Event::new(kind).add_path(PathBuf::from("/p/a.css"));

        assert_eq!(
            translate(&event(EventKind::Create(CreateKind::File)))[0].kind,
            ChangeKind::Added
        );
        assert_eq!(
            translate(&event(EventKind::Modify(ModifyKind::Data(DataChange::Content))))[0].kind,
            ChangeKind::Changed
        );
        assert_eq!(
            translate(&event(EventKind::Remove(RemoveKind::File)))[0].kind,
            ChangeKind::Removed
        );
        assert!(translate(&event(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)))).is_empty());
    }

    #[tokio::test]
    async fn reports_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let (mut watcher, mut rx) = FileWatcher::new().unwrap();
        watcher.watch_dir(root.clone()).unwrap();

        tokio::fs::write(root.join("app.js"), "x").await.unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .expect("no event within timeout")
            .unwrap();
        assert_eq!(event.path.file_name().unwrap(), "app.js");
    }
}
