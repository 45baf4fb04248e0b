//! Authoritative id → entry map for one manager.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::entry::DumpEntry;
use crate::error::{DumpError, DumpResult};
use crate::types::{DumpKind, OperationStatus, INVALID_SOURCE_ID};

/// Owns every entry of a manager and the id high-water mark.
///
/// Entries are kept in id order, so every scan visits them oldest first.
#[derive(Debug, Default)]
pub struct Registry {
    entries: BTreeMap<u32, DumpEntry>,
    last_entry_id: u32,
    storage_root: Option<PathBuf>,
}

impl Registry {
    /// Creates an empty registry. Local managers pass their dump root so
    /// that erasing an entry also removes `<root>/<id>`.
    pub fn new(storage_root: Option<PathBuf>) -> Self {
        Self {
            entries: BTreeMap::new(),
            last_entry_id: 0,
            storage_root,
        }
    }

    /// Allocates the next id by pre-incrementing the high-water mark.
    pub fn allocate_id(&mut self) -> DumpResult<u32> {
        let next = self
            .last_entry_id
            .checked_add(1)
            .ok_or_else(|| DumpError::internal("dump id space exhausted"))?;
        self.last_entry_id = next;
        Ok(next)
    }

    /// Raises the high-water mark to at least `id`.
    pub fn raise_high_water(&mut self, id: u32) {
        if id > self.last_entry_id {
            debug!(id, previous = self.last_entry_id, "raising dump id high-water mark");
            self.last_entry_id = id;
        }
    }

    /// Current high-water mark.
    pub fn last_entry_id(&self) -> u32 {
        self.last_entry_id
    }

    /// Dump root of this registry, if it stores artifacts locally.
    pub fn storage_root(&self) -> Option<&Path> {
        self.storage_root.as_deref()
    }

    /// Directory owned by entry `id`, for local registries.
    pub fn entry_dir(&self, id: u32) -> Option<PathBuf> {
        self.storage_root.as_ref().map(|root| root.join(id.to_string()))
    }

    /// Inserts an entry, replacing any entry with the same id.
    pub fn insert(&mut self, entry: DumpEntry) -> Option<DumpEntry> {
        self.raise_high_water(entry.id);
        self.entries.insert(entry.id, entry)
    }

    /// Looks up an entry by id.
    pub fn get(&self, id: u32) -> Option<&DumpEntry> {
        self.entries.get(&id)
    }

    /// Looks up an entry by id for mutation.
    pub fn get_mut(&mut self, id: u32) -> Option<&mut DumpEntry> {
        self.entries.get_mut(&id)
    }

    /// Whether an entry with this id exists.
    pub fn contains(&self, id: u32) -> bool {
        self.entries.contains_key(&id)
    }

    /// First entry of `kind` carrying `source_id`.
    pub fn find_by_source_id(&self, kind: DumpKind, source_id: u32) -> Option<&DumpEntry> {
        if source_id == INVALID_SOURCE_ID {
            return None;
        }
        self.entries
            .values()
            .find(|e| e.kind == kind && e.source_id == source_id)
    }

    /// Id of the oldest entry.
    pub fn lowest_id(&self) -> Option<u32> {
        self.entries.keys().next().copied()
    }

    /// Whether an uncorrelated in-progress entry of `kind` exists.
    pub fn has_placeholder(&self, kind: DumpKind) -> bool {
        self.entries
            .values()
            .any(|e| e.kind == kind && e.is_placeholder())
    }

    /// Number of entries of `kind` still in progress.
    pub fn in_progress_count(&self, kind: DumpKind) -> usize {
        self.entries
            .values()
            .filter(|e| e.kind == kind && e.status == OperationStatus::InProgress)
            .count()
    }

    /// Removes an entry and its storage directory.
    ///
    /// Filesystem errors are logged and otherwise ignored; the directory may
    /// legitimately be gone already.
    pub fn erase(&mut self, id: u32) -> Option<DumpEntry> {
        let entry = self.entries.remove(&id)?;
        if let Some(dir) = self.entry_dir(id) {
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => info!(id, path = %dir.display(), "removed dump directory"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(id, path = %dir.display(), "dump directory already absent")
                }
                Err(e) => warn!(id, path = %dir.display(), error = %e, "failed to remove dump directory"),
            }
        }
        Some(entry)
    }

    /// Iterates entries in id order.
    pub fn iter(&self) -> impl Iterator<Item = &DumpEntry> {
        self.entries.values()
    }

    /// Ids in ascending order.
    pub fn ids(&self) -> Vec<u32> {
        self.entries.keys().copied().collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
