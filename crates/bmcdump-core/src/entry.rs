//! Dump entry value and its state transitions.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{DumpKind, OperationStatus, OriginatorType, INVALID_SOURCE_ID};

/// Current wall-clock time in microseconds since the Unix epoch.
pub fn now_us() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_micros()).unwrap_or(0)
}

/// One dump known to a manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpEntry {
    /// Category of the dump.
    pub kind: DumpKind,
    /// Registry-unique id; also the name of the storage directory.
    pub id: u32,
    /// Host-side id, or [`INVALID_SOURCE_ID`] until correlated.
    pub source_id: u32,
    /// Artifact size in bytes; zero until completed.
    pub size: u64,
    /// Lifecycle status.
    pub status: OperationStatus,
    /// Creation time in microseconds.
    pub start_time_us: u64,
    /// Completion (or failure) time in microseconds; zero while in progress.
    pub completed_time_us: u64,
    /// Artifact location for local dumps; `None` while in progress.
    pub file_path: Option<PathBuf>,
    /// Opaque originator id.
    pub originator_id: String,
    /// Originator type.
    pub originator_type: OriginatorType,
    /// Destination of the current or last offload.
    pub offload_uri: Option<String>,
    /// Set once an offload finished successfully.
    pub offloaded: bool,
    /// Correlation token supplied with host notifications.
    pub token: u32,
}

impl DumpEntry {
    /// Creates an entry waiting for its artifact.
    pub fn in_progress(
        kind: DumpKind,
        id: u32,
        start_time_us: u64,
        originator_id: String,
        originator_type: OriginatorType,
    ) -> Self {
        Self {
            kind,
            id,
            source_id: INVALID_SOURCE_ID,
            size: 0,
            status: OperationStatus::InProgress,
            start_time_us,
            completed_time_us: 0,
            file_path: None,
            originator_id,
            originator_type,
            offload_uri: None,
            offloaded: false,
            token: 0,
        }
    }

    /// Creates an entry for an artifact that already exists.
    pub fn completed(kind: DumpKind, id: u32, timestamp_us: u64, size: u64) -> Self {
        let mut entry = Self::in_progress(
            kind,
            id,
            timestamp_us,
            String::new(),
            OriginatorType::Internal,
        );
        entry.status = OperationStatus::Completed;
        entry.size = size;
        entry.completed_time_us = timestamp_us;
        entry
    }

    /// Whether this entry awaits correlation with a host notification.
    pub fn is_placeholder(&self) -> bool {
        self.status == OperationStatus::InProgress && self.source_id == INVALID_SOURCE_ID
    }

    /// Records the finished artifact written for this entry.
    pub fn mark_complete(&mut self, timestamp_us: u64, size: u64, file: PathBuf) {
        self.completed_time_us = timestamp_us;
        self.size = size;
        self.file_path = Some(file);
        self.status = OperationStatus::Completed;
    }

    /// Completes the entry from a host notification.
    ///
    /// The source id is stamped only if the entry was not yet correlated.
    pub fn update(&mut self, timestamp_us: u64, size: u64, source_id: u32) {
        self.completed_time_us = timestamp_us;
        self.size = size;
        self.status = OperationStatus::Completed;
        if self.source_id == INVALID_SOURCE_ID {
            self.source_id = source_id;
        }
    }

    /// Moves an in-progress entry to `Failed`. Returns false if it was not in progress.
    pub fn mark_failed(&mut self, timestamp_us: u64) -> bool {
        if self.status != OperationStatus::InProgress {
            debug!(id = self.id, status = ?self.status, "ignoring failure for settled entry");
            return false;
        }
        self.status = OperationStatus::Failed;
        self.completed_time_us = timestamp_us;
        self.size = 0;
        true
    }

    /// Records the start of an offload to `uri`.
    pub fn begin_offload(&mut self, uri: &str) {
        self.offload_uri = Some(uri.to_string());
        self.offloaded = false;
    }

    /// Records the end of an offload.
    pub fn finish_offload(&mut self, success: bool) {
        if success {
            self.offloaded = true;
        } else {
            self.offload_uri = None;
        }
    }

    /// Artifact file name, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.file_path
            .as_deref()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
    }
}
