//! Matching of asynchronous host notifications to registry entries.
//!
//! The host may report the same dump twice, report a new generation of a
//! source id it reported before, or report the dump a local placeholder is
//! waiting for. The whole registry is scanned before anything is decided:
//! an exact duplicate anywhere wins over a placeholder seen earlier.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::entry::DumpEntry;
use crate::error::{DumpError, DumpResult};
use crate::registry::Registry;
use crate::types::{DumpKind, OperationStatus, OriginatorType, INVALID_SOURCE_ID};

/// A "dump is ready" notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyRequest {
    /// Kind of the reported dump.
    pub kind: DumpKind,
    /// Host-side id of the dump.
    pub source_id: u32,
    /// Size in bytes.
    pub size: u64,
    /// Correlation token echoed by the host.
    pub token: u32,
}

/// What a notification did to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Already known; nothing changed.
    Duplicate {
        /// Id of the existing entry.
        id: u32,
    },
    /// A placeholder was completed.
    Merged {
        /// Id of the placeholder.
        id: u32,
        /// Entries deleted as stale generations of the source id.
        stale: Vec<u32>,
    },
    /// A new completed entry was created.
    Created {
        /// Id of the new entry.
        id: u32,
        /// Entries deleted as stale generations of the source id.
        stale: Vec<u32>,
    },
}

impl NotifyOutcome {
    /// Id of the entry the notification ended up on.
    pub fn id(&self) -> u32 {
        match self {
            NotifyOutcome::Duplicate { id }
            | NotifyOutcome::Merged { id, .. }
            | NotifyOutcome::Created { id, .. } => *id,
        }
    }

    /// Entries removed as stale.
    pub fn stale(&self) -> &[u32] {
        match self {
            NotifyOutcome::Duplicate { .. } => &[],
            NotifyOutcome::Merged { stale, .. } | NotifyOutcome::Created { stale, .. } => stale,
        }
    }
}

#[derive(Debug, Default)]
struct NotifyPlan {
    duplicate: Option<u32>,
    stale: Vec<u32>,
    merge_target: Option<u32>,
}

fn plan(registry: &Registry, req: &NotifyRequest) -> NotifyPlan {
    let mut plan = NotifyPlan::default();
    for entry in registry.iter().filter(|e| e.kind == req.kind) {
        if entry.source_id == req.source_id {
            if entry.size == req.size && entry.status == OperationStatus::Completed {
                plan.duplicate.get_or_insert(entry.id);
            } else {
                plan.stale.push(entry.id);
            }
        } else if entry.is_placeholder() && plan.merge_target.is_none() {
            plan.merge_target = Some(entry.id);
        }
    }
    plan
}

/// Applies a notification to `registry`.
///
/// Stale entries are erased (including their storage directories) after the
/// scan. The caller is responsible for any persisted records of the ids
/// reported in the outcome.
pub fn apply_notify(
    registry: &mut Registry,
    req: &NotifyRequest,
    now_us: u64,
) -> DumpResult<NotifyOutcome> {
    if req.source_id == INVALID_SOURCE_ID {
        return Err(DumpError::invalid_argument(
            "SOURCE_ID",
            format!("{:#x}", req.source_id),
        ));
    }

    let plan = plan(registry, req);
    if let Some(id) = plan.duplicate {
        info!(
            id,
            source_id = req.source_id,
            size = req.size,
            "duplicate dump notification ignored"
        );
        return Ok(NotifyOutcome::Duplicate { id });
    }

    for &id in &plan.stale {
        warn!(
            id,
            source_id = req.source_id,
            "replacing stale dump entry for reused source id"
        );
        registry.erase(id);
    }

    if let Some(id) = plan.merge_target {
        if let Some(entry) = registry.get_mut(id) {
            entry.update(now_us, req.size, req.source_id);
            entry.token = req.token;
            info!(
                id,
                source_id = req.source_id,
                size = req.size,
                "placeholder completed by notification"
            );
            return Ok(NotifyOutcome::Merged {
                id,
                stale: plan.stale,
            });
        }
    }

    let id = registry.allocate_id()?;
    let mut entry = DumpEntry::completed(req.kind, id, now_us, req.size);
    entry.source_id = req.source_id;
    entry.token = req.token;
    entry.originator_type = OriginatorType::Internal;
    registry.insert(entry);
    info!(
        id,
        source_id = req.source_id,
        size = req.size,
        kind = %req.kind,
        "dump entry created from notification"
    );
    Ok(NotifyOutcome::Created {
        id,
        stale: plan.stale,
    })
}
