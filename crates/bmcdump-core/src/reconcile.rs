//! Filesystem watch reconciliation.
//!
//! The reconciler turns raw storage events from a dump root into watch
//! bookkeeping and finished-artifact notices. It never touches the
//! registry; the manager applies [`WatchAction::Artifact`] itself.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::filename::DumpFilenameParser;

/// Name of the per-dump metadata directory, never an artifact.
pub const PRESERVE_DIR: &str = ".preserve";

/// Kind of a storage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageEventKind {
    /// A file opened for writing was closed.
    FileClosedForWrite,
    /// A directory was created.
    DirectoryCreated,
}

/// One event reported by the watch backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Path the event refers to.
    pub path: PathBuf,
    /// What happened.
    pub kind: StorageEventKind,
}

impl StorageEvent {
    /// Close-after-write event for `path`.
    pub fn closed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: StorageEventKind::FileClosedForWrite,
        }
    }

    /// Directory-created event for `path`.
    pub fn dir_created(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: StorageEventKind::DirectoryCreated,
        }
    }
}

/// A finished dump file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Id parsed from the file name.
    pub id: u32,
    /// Timestamp parsed from the file name, in microseconds.
    pub timestamp_us: u64,
    /// File size in bytes.
    pub size: u64,
    /// Full path of the file.
    pub path: PathBuf,
}

/// What the caller must do in response to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    /// Start watching a new id directory.
    AddWatch(PathBuf),
    /// Stop watching an id directory.
    RemoveWatch(PathBuf),
    /// Complete or create the entry for this artifact.
    Artifact(Artifact),
}

/// Result of scanning a dump root at startup.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreScan {
    /// Every numeric directory name found, ascending.
    pub dir_ids: Vec<u32>,
    /// Artifacts found inside those directories.
    pub artifacts: Vec<Artifact>,
}

/// Watch state of one dump root.
#[derive(Debug)]
pub struct WatchReconciler {
    root: PathBuf,
    parser: DumpFilenameParser,
    child_watches: BTreeSet<PathBuf>,
}

impl WatchReconciler {
    /// Creates a reconciler for `root`.
    pub fn new(root: PathBuf, parser: DumpFilenameParser) -> Self {
        Self {
            root,
            parser,
            child_watches: BTreeSet::new(),
        }
    }

    /// Watched dump root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Id directories currently watched.
    pub fn child_watches(&self) -> impl Iterator<Item = &Path> {
        self.child_watches.iter().map(PathBuf::as_path)
    }

    /// Whether `path` belongs to this root.
    pub fn owns(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// Reacts to one storage event.
    pub fn handle(&mut self, event: &StorageEvent) -> Vec<WatchAction> {
        match event.kind {
            StorageEventKind::DirectoryCreated => self.on_directory_created(&event.path),
            StorageEventKind::FileClosedForWrite => self.on_file_closed(&event.path),
        }
    }

    fn on_directory_created(&mut self, path: &Path) -> Vec<WatchAction> {
        if !path.is_dir() || is_preserve(path) {
            return Vec::new();
        }
        if !self.child_watches.insert(path.to_path_buf()) {
            return Vec::new();
        }
        debug!(path = %path.display(), "watching new dump directory");
        let mut actions = vec![WatchAction::AddWatch(path.to_path_buf())];
        // the file may have been closed before the watch existed; the watch
        // stays so a later close still reports the final size
        if let Some(artifact) = first_file(path).and_then(|f| self.parse_artifact(&f)) {
            actions.push(WatchAction::Artifact(artifact));
        }
        actions
    }

    /// Settles an id directory whose writer has finished.
    ///
    /// Drops its watch and reports the artifact inside, if any. Used when
    /// the packaging tool exits, so a close event that was never seen
    /// cannot leave the dump unfinished.
    pub fn sweep(&mut self, dir: &Path) -> Vec<WatchAction> {
        let mut actions: Vec<WatchAction> = self.drop_watch(dir).into_iter().collect();
        match first_file(dir) {
            Some(file) => {
                if let Some(artifact) = self.parse_artifact(&file) {
                    actions.push(WatchAction::Artifact(artifact));
                }
            }
            None => debug!(path = %dir.display(), "no dump file after writer finished"),
        }
        actions
    }

    fn on_file_closed(&mut self, path: &Path) -> Vec<WatchAction> {
        if path.is_dir() {
            return self.drop_watch(path).into_iter().collect();
        }
        let Some(parent) = path.parent() else {
            return Vec::new();
        };
        if is_preserve(parent) {
            return Vec::new();
        }
        let mut actions: Vec<WatchAction> = self.drop_watch(parent).into_iter().collect();
        if let Some(artifact) = self.parse_artifact(path) {
            actions.push(WatchAction::Artifact(artifact));
        }
        actions
    }

    fn drop_watch(&mut self, dir: &Path) -> Option<WatchAction> {
        if self.child_watches.remove(dir) {
            debug!(path = %dir.display(), "dropping dump directory watch");
            Some(WatchAction::RemoveWatch(dir.to_path_buf()))
        } else {
            None
        }
    }

    /// Parses a dump file; unparseable names are logged and skipped.
    pub fn parse_artifact(&self, path: &Path) -> Option<Artifact> {
        let name = path.file_name()?.to_string_lossy();
        let parsed = match self.parser.parse(&name) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "invalid dump file name");
                return None;
            }
        };
        let size = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "cannot stat dump file");
                return None;
            }
        };
        info!(
            id = parsed.id,
            timestamp_us = parsed.timestamp_us,
            size,
            file = %path.display(),
            "dump file found"
        );
        Some(Artifact {
            id: parsed.id,
            timestamp_us: parsed.timestamp_us,
            size,
            path: path.to_path_buf(),
        })
    }

    /// Scans the root for id directories left by a previous run.
    ///
    /// The first regular file (by name) of each numeric directory is parsed
    /// as its artifact; directories without one are interrupted dumps.
    pub fn restore_scan(&self) -> RestoreScan {
        let mut scan = RestoreScan::default();
        let read = match std::fs::read_dir(&self.root) {
            Ok(read) => read,
            Err(e) => {
                debug!(root = %self.root.display(), error = %e, "nothing to restore");
                return scan;
            }
        };
        let mut dirs: Vec<(u32, PathBuf)> = read
            .filter_map(Result::ok)
            .filter(|d| d.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|d| {
                let name = d.file_name();
                let id = name.to_str()?.parse::<u32>().ok()?;
                Some((id, d.path()))
            })
            .collect();
        dirs.sort();

        for (id, dir) in dirs {
            scan.dir_ids.push(id);
            match first_file(&dir) {
                Some(file) => {
                    if let Some(artifact) = self.parse_artifact(&file) {
                        scan.artifacts.push(artifact);
                    }
                }
                None => debug!(id, "skipping dump directory without a file"),
            }
        }
        scan
    }
}

fn is_preserve(path: &Path) -> bool {
    path.file_name().map(|n| n == PRESERVE_DIR).unwrap_or(false)
}

fn first_file(dir: &Path) -> Option<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .filter(|d| d.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|d| d.path())
        .collect();
    files.sort();
    files.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn reconciler(root: &Path) -> WatchReconciler {
        WatchReconciler::new(root.to_path_buf(), DumpFilenameParser::bmc_default().unwrap())
    }

    #[test]
    fn test_directory_created_adds_watch_once() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rec = reconciler(tmp.path());
        let dir = tmp.path().join("3");
        fs::create_dir(&dir).unwrap();

        let actions = rec.handle(&StorageEvent::dir_created(&dir));
        assert_eq!(actions, vec![WatchAction::AddWatch(dir.clone())]);
        assert!(rec.handle(&StorageEvent::dir_created(&dir)).is_empty());
        assert_eq!(rec.child_watches().count(), 1);
    }

    #[test]
    fn test_directory_created_for_vanished_path_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rec = reconciler(tmp.path());
        let actions = rec.handle(&StorageEvent::dir_created(tmp.path().join("gone")));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_preserve_dir_not_watched() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rec = reconciler(tmp.path());
        let dir = tmp.path().join("3").join(PRESERVE_DIR);
        fs::create_dir_all(&dir).unwrap();
        assert!(rec.handle(&StorageEvent::dir_created(&dir)).is_empty());
    }

    #[test]
    fn test_file_close_removes_watch_and_reports_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rec = reconciler(tmp.path());
        let dir = tmp.path().join("7");
        fs::create_dir(&dir).unwrap();
        rec.handle(&StorageEvent::dir_created(&dir));

        let file = dir.join("obmcdump_7_1700000000.tar");
        fs::write(&file, vec![1u8; 300]).unwrap();
        let actions = rec.handle(&StorageEvent::closed(&file));

        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0], WatchAction::RemoveWatch(dir.clone()));
        match &actions[1] {
            WatchAction::Artifact(a) => {
                assert_eq!(a.id, 7);
                assert_eq!(a.timestamp_us, 1_700_000_000_000_000);
                assert_eq!(a.size, 300);
                assert_eq!(a.path, file);
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert_eq!(rec.child_watches().count(), 0);
    }

    #[test]
    fn test_bad_file_name_still_drops_watch() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rec = reconciler(tmp.path());
        let dir = tmp.path().join("8");
        fs::create_dir(&dir).unwrap();
        rec.handle(&StorageEvent::dir_created(&dir));

        let file = dir.join("notes.txt");
        fs::write(&file, b"hello").unwrap();
        let actions = rec.handle(&StorageEvent::closed(&file));
        assert_eq!(actions, vec![WatchAction::RemoveWatch(dir)]);
    }

    #[test]
    fn test_closed_directory_drops_its_watch() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rec = reconciler(tmp.path());
        let dir = tmp.path().join("9");
        fs::create_dir(&dir).unwrap();
        rec.handle(&StorageEvent::dir_created(&dir));
        let actions = rec.handle(&StorageEvent::closed(&dir));
        assert_eq!(actions, vec![WatchAction::RemoveWatch(dir)]);
    }

    #[test]
    fn test_preserve_file_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rec = reconciler(tmp.path());
        let dir = tmp.path().join("2").join(PRESERVE_DIR);
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("obmcdump_2_1.tar");
        fs::write(&file, b"x").unwrap();
        assert!(rec.handle(&StorageEvent::closed(&file)).is_empty());
    }

    #[test]
    fn test_directory_created_reports_file_already_there() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rec = reconciler(tmp.path());
        let dir = tmp.path().join("4");
        fs::create_dir(&dir).unwrap();
        let file = dir.join("obmcdump_4_1700000000.tar");
        fs::write(&file, vec![0u8; 64]).unwrap();

        let actions = rec.handle(&StorageEvent::dir_created(&dir));
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0], WatchAction::AddWatch(dir.clone()));
        assert!(matches!(&actions[1], WatchAction::Artifact(a) if a.id == 4 && a.size == 64));
        assert_eq!(rec.child_watches().count(), 1);

        // the late close still lands and releases the watch
        let actions = rec.handle(&StorageEvent::closed(&file));
        assert_eq!(actions[0], WatchAction::RemoveWatch(dir));
        assert_eq!(rec.child_watches().count(), 0);
    }

    #[test]
    fn test_sweep_releases_watch_and_reports_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rec = reconciler(tmp.path());
        let dir = tmp.path().join("6");
        fs::create_dir(&dir).unwrap();
        rec.handle(&StorageEvent::dir_created(&dir));
        let file = dir.join("obmcdump_6_1700000000.tar");
        fs::write(&file, vec![0u8; 10]).unwrap();

        let actions = rec.sweep(&dir);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0], WatchAction::RemoveWatch(dir.clone()));
        assert!(matches!(&actions[1], WatchAction::Artifact(a) if a.path == file));
        assert!(rec.sweep(&dir).iter().all(|a| !matches!(a, WatchAction::RemoveWatch(_))));
    }

    #[test]
    fn test_sweep_of_missing_directory_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rec = reconciler(tmp.path());
        assert!(rec.sweep(&tmp.path().join("11")).is_empty());
    }

    #[test]
    fn test_restore_scan() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("2")).unwrap();
        fs::write(root.join("2").join("obmcdump_2_1600000000.tar"), b"abc").unwrap();
        fs::create_dir_all(root.join("5").join(PRESERVE_DIR)).unwrap();
        fs::create_dir_all(root.join("junk")).unwrap();
        fs::write(root.join("loose_file"), b"x").unwrap();

        let rec = reconciler(root);
        let scan = rec.restore_scan();
        assert_eq!(scan.dir_ids, vec![2, 5]);
        assert_eq!(scan.artifacts.len(), 1);
        assert_eq!(scan.artifacts[0].id, 2);
        assert_eq!(scan.artifacts[0].size, 3);
    }

    #[test]
    fn test_restore_scan_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let rec = reconciler(&tmp.path().join("absent"));
        assert_eq!(rec.restore_scan(), RestoreScan::default());
    }
}
