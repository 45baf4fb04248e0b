//! Versioned on-disk records of entry metadata.
//!
//! Layout: 4-byte magic `BDRC`, little-endian `u16` schema version, then the
//! bincode encoding of [`EntryRecord`]. Schema v1 field order is fixed:
//! `kind, id, source_id, size, status, start_time_us, completed_time_us,
//! originator_id, originator_type, offload_uri, offloaded, token, file_name`.
//! Any change to that order or to a field type needs a new schema version.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entry::DumpEntry;
use crate::error::{DumpError, DumpResult};
use crate::reconcile::PRESERVE_DIR;
use crate::types::{DumpKind, OperationStatus, OriginatorType};

/// Record file magic.
pub const RECORD_MAGIC: [u8; 4] = *b"BDRC";
/// Current schema version.
pub const RECORD_SCHEMA_VERSION: u16 = 1;

const HEADER_LEN: usize = 6;
const LOCAL_RECORD_NAME: &str = "entry.bin";

/// Persisted form of a [`DumpEntry`], schema v1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Dump kind.
    pub kind: DumpKind,
    /// Dump id.
    pub id: u32,
    /// Host-side id.
    pub source_id: u32,
    /// Size in bytes.
    pub size: u64,
    /// Lifecycle status.
    pub status: OperationStatus,
    /// Creation time, microseconds.
    pub start_time_us: u64,
    /// Completion time, microseconds.
    pub completed_time_us: u64,
    /// Originator id.
    pub originator_id: String,
    /// Originator type.
    pub originator_type: OriginatorType,
    /// Last offload destination.
    pub offload_uri: Option<String>,
    /// Offload finished.
    pub offloaded: bool,
    /// Host correlation token.
    pub token: u32,
    /// Artifact file name relative to the id directory.
    pub file_name: Option<String>,
}

impl EntryRecord {
    /// Snapshot of `entry`.
    pub fn from_entry(entry: &DumpEntry) -> Self {
        Self {
            kind: entry.kind,
            id: entry.id,
            source_id: entry.source_id,
            size: entry.size,
            status: entry.status,
            start_time_us: entry.start_time_us,
            completed_time_us: entry.completed_time_us,
            originator_id: entry.originator_id.clone(),
            originator_type: entry.originator_type,
            offload_uri: entry.offload_uri.clone(),
            offloaded: entry.offloaded,
            token: entry.token,
            file_name: entry.file_name().map(str::to_string),
        }
    }

    /// Rebuilds an entry; `dir` is the directory the artifact lives in.
    pub fn into_entry(self, dir: Option<&Path>) -> DumpEntry {
        let file_path = match (dir, self.file_name) {
            (Some(dir), Some(name)) => Some(dir.join(name)),
            _ => None,
        };
        DumpEntry {
            kind: self.kind,
            id: self.id,
            source_id: self.source_id,
            size: self.size,
            status: self.status,
            start_time_us: self.start_time_us,
            completed_time_us: self.completed_time_us,
            file_path,
            originator_id: self.originator_id,
            originator_type: self.originator_type,
            offload_uri: self.offload_uri,
            offloaded: self.offloaded,
            token: self.token,
        }
    }

    /// Encodes header and body.
    pub fn encode(&self) -> DumpResult<Vec<u8>> {
        let body = bincode::serialize(self).map_err(|e| DumpError::Record {
            reason: format!("failed to serialize entry {}: {}", self.id, e),
        })?;
        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(&RECORD_MAGIC);
        out.extend_from_slice(&RECORD_SCHEMA_VERSION.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decodes a record, checking magic and schema version.
    pub fn decode(data: &[u8]) -> DumpResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(DumpError::Record {
                reason: format!("record too short: {} bytes", data.len()),
            });
        }
        if data[..4] != RECORD_MAGIC {
            return Err(DumpError::Record {
                reason: "invalid record magic".to_string(),
            });
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != RECORD_SCHEMA_VERSION {
            return Err(DumpError::Record {
                reason: format!(
                    "unsupported record version: expected {}, got {}",
                    RECORD_SCHEMA_VERSION, version
                ),
            });
        }
        bincode::deserialize(&data[HEADER_LEN..]).map_err(|e| DumpError::Record {
            reason: format!("failed to deserialize record: {}", e),
        })
    }

    /// Writes the record to `path` through a temporary file and rename.
    pub fn write_to(&self, path: &Path) -> DumpResult<()> {
        let encoded = self.encode()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp_path = path.to_path_buf();
        tmp_path.set_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&encoded)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        debug!(id = self.id, path = %path.display(), "entry record written");
        Ok(())
    }

    /// Reads and decodes the record at `path`.
    pub fn read_from(path: &Path) -> DumpResult<Self> {
        let data = fs::read(path)?;
        Self::decode(&data)
    }
}

/// Record location of a local dump: `<root>/<id>/.preserve/entry.bin`.
pub fn local_record_path(root: &Path, id: u32) -> PathBuf {
    root.join(id.to_string())
        .join(PRESERVE_DIR)
        .join(LOCAL_RECORD_NAME)
}

/// Record location of a host dump: `<persist_dir>/<manager>/<id>.bin`.
pub fn host_record_path(persist_dir: &Path, manager: &str, id: u32) -> PathBuf {
    persist_dir.join(manager).join(format!("{id}.bin"))
}
