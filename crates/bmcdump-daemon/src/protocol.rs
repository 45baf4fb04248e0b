//! Control socket messages, one JSON document per line.

use bmcdump_core::{CreateParams, DumpEntry, DumpKind, ErrorKind, HostState};
use serde::{Deserialize, Serialize};

use crate::error::DaemonError;

/// Request sent by a control client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Lists entries of one manager, or of all of them.
    List {
        /// Restrict to this manager.
        #[serde(default)]
        manager: Option<String>,
    },
    /// Requests a new dump.
    Create {
        /// Manager to create in.
        manager: String,
        /// Create parameters.
        #[serde(default)]
        params: CreateParams,
    },
    /// Deletes one entry.
    Delete {
        /// Manager holding the entry.
        manager: String,
        /// Entry id.
        id: u32,
    },
    /// Deletes every entry that may be deleted.
    DeleteAll {
        /// Manager to clear.
        manager: String,
    },
    /// Copies a completed dump to a destination.
    Offload {
        /// Manager holding the entry.
        manager: String,
        /// Entry id.
        id: u32,
        /// Destination.
        uri: String,
    },
    /// Host "dump ready" notification.
    Notify {
        /// Kind of the host dump.
        kind: DumpKind,
        /// Host-side id.
        source_id: u32,
        /// Size in bytes.
        size: u64,
        /// Host-supplied token.
        #[serde(default)]
        token: u32,
    },
    /// Records a new host state.
    SetHostState {
        /// New state.
        state: HostState,
    },
}

/// One listed entry with the manager that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedEntry {
    /// Owning manager.
    pub manager: String,
    /// The entry.
    pub entry: DumpEntry,
}

/// Payload of a successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Nothing to report.
    Done,
    /// Listing result.
    Entries {
        /// Listed entries, grouped by manager in configuration order.
        entries: Vec<ListedEntry>,
    },
    /// A dump was created.
    Created {
        /// Manager that created it.
        manager: String,
        /// New entry id.
        id: u32,
        /// Size budget handed to the packaging tool, for local dumps.
        #[serde(default)]
        size_budget_kb: Option<u64>,
    },
    /// Result of a delete-all.
    DeletedAll {
        /// Ids deleted.
        deleted: Vec<u32>,
        /// Ids skipped, with the reason.
        skipped: Vec<(u32, String)>,
    },
    /// Result of a notification.
    Notified {
        /// Manager that took it.
        manager: String,
        /// Entry that now represents the host dump.
        id: u32,
        /// The notification repeated an already completed dump.
        duplicate: bool,
        /// Stale entries replaced.
        stale: Vec<u32>,
    },
}

/// Response to one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ControlResponse {
    /// The request succeeded.
    Ok {
        /// Result payload.
        body: ResponseBody,
    },
    /// The request failed.
    Error {
        /// Error category.
        kind: ErrorKind,
        /// Human-readable cause.
        message: String,
    },
}

impl ControlResponse {
    /// Success without a payload.
    pub fn done() -> Self {
        ControlResponse::Ok {
            body: ResponseBody::Done,
        }
    }

    /// Success carrying `body`.
    pub fn ok(body: ResponseBody) -> Self {
        ControlResponse::Ok { body }
    }

    /// Whether the request succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, ControlResponse::Ok { .. })
    }
}

impl From<DaemonError> for ControlResponse {
    fn from(err: DaemonError) -> Self {
        ControlResponse::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<Result<ResponseBody, DaemonError>> for ControlResponse {
    fn from(result: Result<ResponseBody, DaemonError>) -> Self {
        match result {
            Ok(body) => ControlResponse::ok(body),
            Err(err) => err.into(),
        }
    }
}
