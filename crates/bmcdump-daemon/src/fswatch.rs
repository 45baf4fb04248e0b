//! Filesystem watch backend.
//!
//! The reconciler in `bmcdump_core` decides which directories to watch; this
//! module only adds and removes OS watches and turns raw `notify` events
//! into [`StorageEvent`]s.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use bmcdump_core::StorageEvent;
use notify::event::{AccessKind, AccessMode, CreateKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::error::DaemonResult;

/// Adds and removes non-recursive directory watches.
pub trait WatchBackend: Send {
    /// Starts watching `path`. Watching an already watched path is a no-op.
    fn add_watch(&mut self, path: &Path) -> DaemonResult<()>;

    /// Stops watching `path`. Unknown paths are ignored.
    fn remove_watch(&mut self, path: &Path) -> DaemonResult<()>;
}

/// Watch backend built on the platform's recommended `notify` watcher
/// (inotify on Linux).
pub struct NotifyWatchBackend {
    watcher: RecommendedWatcher,
    watched: BTreeSet<PathBuf>,
}

impl NotifyWatchBackend {
    /// Creates the backend; every mapped event is passed to `sink` on the
    /// watcher's own thread.
    pub fn new<F>(sink: F) -> DaemonResult<Self>
    where
        F: Fn(StorageEvent) + Send + 'static,
    {
        let watcher = notify::recommended_watcher(move |event: notify::Result<Event>| match event {
            Ok(event) => {
                for storage_event in map_notify_event(event) {
                    sink(storage_event);
                }
            }
            Err(error) => warn!(%error, "watch backend error"),
        })?;
        Ok(Self {
            watcher,
            watched: BTreeSet::new(),
        })
    }

    /// Paths currently watched.
    pub fn watched(&self) -> impl Iterator<Item = &Path> {
        self.watched.iter().map(PathBuf::as_path)
    }
}

impl WatchBackend for NotifyWatchBackend {
    fn add_watch(&mut self, path: &Path) -> DaemonResult<()> {
        if self.watched.contains(path) {
            return Ok(());
        }
        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        self.watched.insert(path.to_path_buf());
        debug!(path = %path.display(), "watch added");
        Ok(())
    }

    fn remove_watch(&mut self, path: &Path) -> DaemonResult<()> {
        if !self.watched.remove(path) {
            return Ok(());
        }
        match self.watcher.unwatch(path) {
            Ok(()) => {
                debug!(path = %path.display(), "watch removed");
                Ok(())
            }
            // The kernel drops the watch itself when the directory goes away.
            Err(error) if !path.exists() => {
                debug!(path = %path.display(), %error, "watch already gone");
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }
}

/// Maps a raw `notify` event to the storage events the reconciler consumes.
///
/// Only close-after-write and directory creation are of interest; every
/// other event kind maps to nothing.
pub fn map_notify_event(event: Event) -> Vec<StorageEvent> {
    let Event { kind, paths, .. } = event;
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            paths.into_iter().map(StorageEvent::closed).collect()
        }
        EventKind::Create(CreateKind::Folder) => {
            paths.into_iter().map(StorageEvent::dir_created).collect()
        }
        _ => Vec::new(),
    }
}
