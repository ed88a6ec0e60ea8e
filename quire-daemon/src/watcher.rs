//! Live-tree change watcher.
//!
//! One non-recursive watch per directory under a site's live root. New
//! subdirectories (created or moved in) are registered as they appear, and any files already in
//! them are queued, so a directory created with content still publishes.
//! Events for the same path inside [`COALESCE_WINDOW`] collapse into a
//! single upload task, emitted once the path has been quiet for the window
//! or [`MAX_DELAY_WINDOWS`] windows after its first event, whichever comes
//! first. Directories that disappear are dropped from the watched set.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;

use quire_core::{is_hidden_or_temp, HostName, PublishCredentials};
use quire_publish::UploadTask;

use crate::error::{io_err, DaemonError};

pub const COALESCE_WINDOW: Duration = Duration::from_millis(200);

/// A path under continuous writes still flushes this many windows after
/// its first event.
pub const MAX_DELAY_WINDOWS: u32 = 2;

#[derive(Debug, Clone, Copy)]
struct Pending {
    first: Instant,
    due: Instant,
}

type PendingMap = HashMap<PathBuf, Pending>;

pub struct ChangeWatcher {
    host: HostName,
    root: PathBuf,
    credentials: PublishCredentials,
    uploads: mpsc::Sender<UploadTask>,
    window: Duration,
    watcher: RecommendedWatcher,
    watched: HashSet<PathBuf>,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl ChangeWatcher {
    /// Create the live root if needed and register every directory under
    /// it. Setup failures surface here, before any task is spawned.
    pub fn start(
        host: HostName,
        live_root: &Path,
        credentials: PublishCredentials,
        uploads: mpsc::Sender<UploadTask>,
    ) -> Result<Self, DaemonError> {
        fs::create_dir_all(live_root).map_err(|e| io_err(live_root, e))?;
        let root = fs::canonicalize(live_root).map_err(|e| io_err(live_root, e))?;

        let (event_tx, events) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let watcher = recommended_watcher(move |event| {
            let _ = event_tx.send(event);
        })?;

        let mut this = Self {
            host,
            root,
            credentials,
            uploads,
            window: COALESCE_WINDOW,
            watcher,
            watched: HashSet::new(),
            events,
        };
        let root = this.root.clone();
        this.register_tree(&root)?;
        tracing::info!(host = %this.host, root = %this.root.display(), dirs = this.watched.len(), "watching live tree");
        Ok(this)
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Forward coalesced changes to the upload queue until the event
    /// stream ends or the queue's worker is gone.
    pub async fn run(mut self) -> Result<(), DaemonError> {
        let mut pending = PendingMap::new();
        loop {
            let next_due = pending.values().map(|p| p.due).min();
            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    match event {
                        Ok(event) => self.handle_event(event, &mut pending),
                        Err(err) => {
                            tracing::warn!(host = %self.host, error = %err, "watcher event error");
                        }
                    }
                }
                _ = sleep_until(next_due) => {
                    self.flush_due(&mut pending).await?;
                }
            }
        }
        tracing::info!(host = %self.host, "watcher stopped");
        Ok(())
    }

    fn handle_event(&mut self, event: Event, pending: &mut PendingMap) {
        if removes_paths(&event.kind) {
            for path in &event.paths {
                self.forget_removed(path);
            }
        }
        if !is_relevant_event_kind(&event.kind) {
            return;
        }
        let now = Instant::now();
        for path in event.paths {
            let Some(rel) = self.relative(&path) else { continue };
            if is_hidden_or_temp(&rel) {
                continue;
            }
            if path.is_dir() {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_))) {
                    self.adopt_directory(&path, now, pending);
                }
                continue;
            }
            schedule(pending, path, now, self.window);
        }
    }

    /// Stop tracking a deleted or moved-away directory and everything below
    /// it. The kernel watch went with the directory.
    fn forget_removed(&mut self, path: &Path) {
        let before = self.watched.len();
        self.watched.retain(|watched| !watched.starts_with(path));
        let dropped = before - self.watched.len();
        if dropped > 0 {
            tracing::debug!(host = %self.host, path = %path.display(), dirs = dropped, "directory gone; no longer watched");
        }
    }

    /// Watch a directory that appeared after startup and queue whatever it
    /// already holds.
    fn adopt_directory(&mut self, dir: &Path, now: Instant, pending: &mut PendingMap) {
        // A re-created directory needs a fresh watch even if the old one is remembered.
        self.watched.retain(|watched| !watched.starts_with(dir));
        if let Err(err) = self.register_tree(dir) {
            tracing::warn!(host = %self.host, dir = %dir.display(), error = %err, "cannot watch new directory");
            return;
        }
        match collect_files(dir) {
            Ok(files) => {
                for file in files {
                    let visible = self
                        .relative(&file)
                        .map(|rel| !is_hidden_or_temp(&rel))
                        .unwrap_or(false);
                    if visible {
                        schedule(pending, file, now, self.window);
                    }
                }
            }
            Err(err) => {
                tracing::warn!(host = %self.host, dir = %dir.display(), error = %err, "cannot list new directory");
            }
        }
    }

    async fn flush_due(&mut self, pending: &mut PendingMap) -> Result<(), DaemonError> {
        let now = Instant::now();
        let mut due: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, entry)| entry.due <= now)
            .map(|(path, _)| path.clone())
            .collect();
        due.sort();
        for path in due {
            pending.remove(&path);
            // Renamed away or deleted since the event; deletions are not published.
            if !path.is_file() {
                continue;
            }
            let Some(task) = UploadTask::new(&self.root, &path, &self.credentials) else {
                continue;
            };
            tracing::debug!(host = %self.host, key = %task.key(), "change queued for upload");
            if self.uploads.send(task).await.is_err() {
                return Err(DaemonError::ChannelClosed("upload queue"));
            }
        }
        Ok(())
    }

    fn relative(&self, path: &Path) -> Option<PathBuf> {
        let rel = path.strip_prefix(&self.root).ok()?;
        if rel.as_os_str().is_empty() {
            return None;
        }
        Some(rel.to_path_buf())
    }

    fn register_tree(&mut self, root: &Path) -> Result<(), DaemonError> {
        for dir in collect_dirs(root)? {
            let canonical = match fs::canonicalize(&dir) {
                Ok(path) => path,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(io_err(&dir, err)),
            };
            if canonical != self.root {
                let hidden = self
                    .relative(&canonical)
                    .map(|rel| is_hidden_or_temp(&rel))
                    .unwrap_or(true);
                if hidden {
                    continue;
                }
            }
            if self.watched.insert(canonical.clone()) {
                self.watcher.watch(&canonical, RecursiveMode::NonRecursive)?;
                tracing::debug!(host = %self.host, path = %canonical.display(), "watching directory");
            }
        }
        Ok(())
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Push a path's flush back to one window from now, but never past
/// [`MAX_DELAY_WINDOWS`] windows from the event that first queued it.
fn schedule(pending: &mut PendingMap, path: PathBuf, now: Instant, window: Duration) {
    let entry = pending.entry(path).or_insert(Pending { first: now, due: now });
    entry.due = (now + window).min(entry.first + window * MAX_DELAY_WINDOWS);
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn removes_paths(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From))
    )
}

fn collect_dirs(root: &Path) -> Result<Vec<PathBuf>, DaemonError> {
    let mut dirs = vec![root.to_path_buf()];
    let mut cursor = 0;
    while cursor < dirs.len() {
        let current = dirs[cursor].clone();
        cursor += 1;
        let entries = match fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&current, err)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&current, e))?;
            let ty = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
            if ty.is_dir() {
                dirs.push(entry.path());
            }
        }
    }
    dirs.sort();
    dirs.dedup();
    Ok(dirs)
}

fn collect_files(root: &Path) -> Result<Vec<PathBuf>, DaemonError> {
    let mut files = Vec::new();
    for dir in collect_dirs(root)? {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&dir, err)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let ty = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
            if !ty.is_dir() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}
