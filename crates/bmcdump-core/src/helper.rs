//! Contracts for out-of-process helpers and the table of running ones.
//!
//! The manager never spawns processes itself. A [`DumpPackager`] or
//! [`DumpOffloader`] launches the helper and hands back its pid together with
//! a future that resolves when the helper exits; whoever drives that future
//! reports the outcome back through `DumpManager::on_helper_exit`.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tracing::debug;

use crate::error::{DumpError, DumpResult};
use crate::types::{BmcDumpType, DumpKind};

/// How a helper process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelperOutcome {
    /// Exited with this status code.
    Exited(i32),
    /// Killed by this signal.
    Signaled(i32),
    /// Killed after exceeding the configured timeout.
    TimedOut,
    /// Waiting on the process failed.
    WaitFailed(String),
}

impl HelperOutcome {
    /// Whether the helper exited with status zero.
    pub fn success(&self) -> bool {
        matches!(self, HelperOutcome::Exited(0))
    }
}

impl fmt::Display for HelperOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HelperOutcome::Exited(code) => write!(f, "exited with status {code}"),
            HelperOutcome::Signaled(sig) => write!(f, "killed by signal {sig}"),
            HelperOutcome::TimedOut => f.write_str("timed out"),
            HelperOutcome::WaitFailed(e) => write!(f, "wait failed: {e}"),
        }
    }
}

/// Future resolving to a helper's outcome.
pub type HelperExit = Pin<Box<dyn Future<Output = HelperOutcome> + Send + 'static>>;

/// A helper that has been started.
pub struct LaunchedHelper {
    /// Process id.
    pub pid: u32,
    /// Completion of the process.
    pub exit: HelperExit,
}

impl fmt::Debug for LaunchedHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchedHelper").field("pid", &self.pid).finish()
    }
}

/// Input of a packaging tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    /// Kind being collected.
    pub kind: DumpKind,
    /// Id the artifact must carry.
    pub dump_id: u32,
    /// Directory the tool writes into, `<root>/<id>`.
    pub dest_dir: PathBuf,
    /// Advisory size budget.
    pub size_budget_kb: u64,
    /// Optional source file the tool should include.
    pub source_hint: Option<PathBuf>,
    /// Value of `-t`.
    pub type_tag: String,
    /// Value of `-n`, when the tool names artifacts with a custom prefix.
    pub name_prefix: Option<String>,
}

impl PackageRequest {
    /// Tool arguments, without the program name.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-d".to_string(),
            self.dest_dir.display().to_string(),
            "-i".to_string(),
            self.dump_id.to_string(),
            "-s".to_string(),
            self.size_budget_kb.to_string(),
            "-q".to_string(),
            "-v".to_string(),
            "-p".to_string(),
            self.source_hint
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            "-t".to_string(),
            self.type_tag.clone(),
        ];
        if let Some(prefix) = &self.name_prefix {
            args.push("-n".to_string());
            args.push(prefix.clone());
        }
        args
    }
}

/// Input of an offload helper run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffloadRequest {
    /// Dump being offloaded.
    pub dump_id: u32,
    /// Artifact path.
    pub path: PathBuf,
    /// Destination.
    pub uri: String,
}

impl OffloadRequest {
    /// Helper arguments, without the program name.
    pub fn args(&self) -> Vec<String> {
        vec![
            "--id".to_string(),
            self.dump_id.to_string(),
            "--path".to_string(),
            self.path.display().to_string(),
            "--uri".to_string(),
            self.uri.clone(),
        ]
    }
}

/// Starts packaging tools.
pub trait DumpPackager: Send {
    /// Launches the tool. Fork, exec or registration failures are errors.
    fn package(&self, req: &PackageRequest) -> DumpResult<LaunchedHelper>;
}

/// Starts offload helpers.
pub trait DumpOffloader: Send {
    /// Launches the helper.
    fn offload(&self, req: &OffloadRequest) -> DumpResult<LaunchedHelper>;
}

/// Why a tracked helper is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperPurpose {
    /// Collecting dump `dump_id`.
    Package {
        /// Dump being collected.
        dump_id: u32,
        /// Kind being collected.
        kind: DumpKind,
        /// BMC collection subtype.
        bmc_type: Option<BmcDumpType>,
    },
    /// Offloading dump `dump_id`.
    Offload {
        /// Dump being offloaded.
        dump_id: u32,
    },
}

/// Running helpers of one manager, keyed by pid.
#[derive(Debug, Default)]
pub struct ChildTracker {
    children: BTreeMap<u32, HelperPurpose>,
}

impl ChildTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly launched helper.
    pub fn track(&mut self, pid: u32, purpose: HelperPurpose) -> DumpResult<()> {
        if self.children.contains_key(&pid) {
            return Err(DumpError::internal(format!(
                "pid {pid} is already tracked"
            )));
        }
        debug!(pid, ?purpose, "tracking helper");
        self.children.insert(pid, purpose);
        Ok(())
    }

    /// Removes and returns a finished helper.
    pub fn finish(&mut self, pid: u32) -> Option<HelperPurpose> {
        self.children.remove(&pid)
    }

    /// Whether a user-requested BMC dump is being packaged.
    pub fn user_dump_in_progress(&self) -> bool {
        self.children.values().any(|p| {
            matches!(
                p,
                HelperPurpose::Package {
                    bmc_type: Some(BmcDumpType::User),
                    ..
                }
            )
        })
    }

    /// Whether an offload of `dump_id` is running.
    pub fn offload_running(&self, dump_id: u32) -> bool {
        self.children
            .values()
            .any(|p| matches!(p, HelperPurpose::Offload { dump_id: d } if *d == dump_id))
    }

    /// Number of running helpers.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether no helper is running.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
