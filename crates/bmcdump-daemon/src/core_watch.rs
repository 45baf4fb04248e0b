//! Recognizing core files written by the system's coredump handler.

use std::path::{Path, PathBuf};

use bmcdump_core::{StorageEvent, StorageEventKind};

/// Name prefix of core files.
pub const CORE_FILE_PREFIX: &str = "core.";

/// Selects finished core files in one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreFileFilter {
    dir: PathBuf,
}

impl CoreFileFilter {
    /// Filter for core files written into `dir`.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Watched directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether the event belongs to the core directory at all.
    pub fn owns(&self, event: &StorageEvent) -> bool {
        event.path.parent() == Some(self.dir.as_path()) || event.path == self.dir
    }

    /// The core file a storage event finished writing, if any.
    pub fn core_file<'a>(&self, event: &'a StorageEvent) -> Option<&'a Path> {
        if event.kind != StorageEventKind::FileClosedForWrite || !self.owns(event) {
            return None;
        }
        let name = event.path.file_name()?.to_str()?;
        name.starts_with(CORE_FILE_PREFIX).then_some(event.path.as_path())
    }
}
