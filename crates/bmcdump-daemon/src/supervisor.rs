//! Launching packaging and offload helpers as child processes.
//!
//! Children are spawned through `tokio::process`, which reaps them from the
//! runtime's SIGCHLD handler. The returned exit future is driven by the event
//! loop and reports back through `DumpManager::on_helper_exit`.

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use bmcdump_core::{
    DumpError, DumpOffloader, DumpPackager, DumpResult, HelperOutcome, LaunchedHelper,
    OffloadRequest, PackageRequest,
};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Runs the configured packaging tool for each dump.
#[derive(Debug, Clone)]
pub struct ProcessPackager {
    tool: PathBuf,
    timeout: Option<Duration>,
}

impl ProcessPackager {
    /// Creates a launcher for `tool`.
    pub fn new(tool: PathBuf, timeout: Option<Duration>) -> Self {
        Self { tool, timeout }
    }
}

impl DumpPackager for ProcessPackager {
    fn package(&self, req: &PackageRequest) -> DumpResult<LaunchedHelper> {
        spawn_helper(&self.tool, &req.args(), self.timeout)
    }
}

/// Runs the offload handler for each offload request.
#[derive(Debug, Clone)]
pub struct ProcessOffloader {
    handler: PathBuf,
    timeout: Option<Duration>,
}

impl ProcessOffloader {
    /// Creates a launcher for `handler`.
    pub fn new(handler: PathBuf, timeout: Option<Duration>) -> Self {
        Self { handler, timeout }
    }
}

impl DumpOffloader for ProcessOffloader {
    fn offload(&self, req: &OffloadRequest) -> DumpResult<LaunchedHelper> {
        spawn_helper(&self.handler, &req.args(), self.timeout)
    }
}

fn spawn_helper(
    program: &Path,
    args: &[String],
    timeout: Option<Duration>,
) -> DumpResult<LaunchedHelper> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .spawn()
        .map_err(|e| DumpError::internal(format!("failed to launch {}: {e}", program.display())))?;
    let pid = child
        .id()
        .ok_or_else(|| DumpError::internal(format!("{} exited before start", program.display())))?;
    info!(pid, program = %program.display(), "helper started");
    Ok(LaunchedHelper {
        pid,
        exit: Box::pin(wait_child(child, pid, timeout)),
    })
}

async fn wait_child(mut child: Child, pid: u32, timeout: Option<Duration>) -> HelperOutcome {
    let status = match timeout {
        Some(limit) => {
            let waited = tokio::time::timeout(limit, child.wait()).await;
            match waited {
                Ok(status) => status,
                Err(_) => {
                    warn!(pid, timeout_secs = limit.as_secs_f64(), "helper timed out, killing");
                    if let Err(e) = child.kill().await {
                        warn!(pid, error = %e, "failed to kill helper");
                    }
                    return HelperOutcome::TimedOut;
                }
            }
        }
        None => child.wait().await,
    };
    match status {
        Ok(status) => {
            let outcome = outcome_from_status(status);
            debug!(pid, %outcome, "helper exited");
            outcome
        }
        Err(e) => HelperOutcome::WaitFailed(e.to_string()),
    }
}

/// Classifies a child's exit status.
pub fn outcome_from_status(status: ExitStatus) -> HelperOutcome {
    if let Some(code) = status.code() {
        HelperOutcome::Exited(code)
    } else if let Some(signal) = status.signal() {
        HelperOutcome::Signaled(signal)
    } else {
        HelperOutcome::WaitFailed(format!("unrecognized exit status {status}"))
    }
}
