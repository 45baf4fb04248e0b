//! Common fixtures for dump manager integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use bmcdump_core::{
    CreateRequest, DumpError, DumpKind, DumpManager, DumpOffloader, DumpPackager, DumpResult,
    HelperOutcome, HostState, HostTransport, LaunchedHelper, ManagerConfig, OffloadRequest,
    PackageRequest, QuotaPolicy, StaticHostMonitor, UnsupportedHostTransport,
};
use parking_lot::Mutex;

/// Packaging tool stand-in that records requests and never touches disk.
#[derive(Clone, Default)]
pub struct ScriptedPackager {
    pub requests: Arc<Mutex<Vec<PackageRequest>>>,
    next_pid: Arc<AtomicU32>,
    pub fail_launch: bool,
}

impl ScriptedPackager {
    pub fn new() -> Self {
        Self {
            next_pid: Arc::new(AtomicU32::new(1000)),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::new()
        }
    }

    pub fn last_request(&self) -> Option<PackageRequest> {
        self.requests.lock().last().cloned()
    }
}

impl DumpPackager for ScriptedPackager {
    fn package(&self, req: &PackageRequest) -> DumpResult<LaunchedHelper> {
        if self.fail_launch {
            return Err(DumpError::internal("exec failed: No such file or directory"));
        }
        self.requests.lock().push(req.clone());
        Ok(LaunchedHelper {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            exit: Box::pin(std::future::ready(HelperOutcome::Exited(0))),
        })
    }
}

/// Offload helper stand-in.
#[derive(Clone, Default)]
pub struct ScriptedOffloader {
    pub requests: Arc<Mutex<Vec<OffloadRequest>>>,
    next_pid: Arc<AtomicU32>,
}

impl ScriptedOffloader {
    pub fn new() -> Self {
        Self {
            next_pid: Arc::new(AtomicU32::new(5000)),
            ..Self::default()
        }
    }
}

impl DumpOffloader for ScriptedOffloader {
    fn offload(&self, req: &OffloadRequest) -> DumpResult<LaunchedHelper> {
        self.requests.lock().push(req.clone());
        Ok(LaunchedHelper {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            exit: Box::pin(std::future::ready(HelperOutcome::Exited(0))),
        })
    }
}

/// Host transport that records calls and can be told to refuse them.
#[derive(Default)]
pub struct RecordingTransport {
    pub dumps: Mutex<Vec<(DumpKind, u32)>>,
    pub offloads: Mutex<Vec<(u32, String)>>,
    pub deletes: Mutex<Vec<(u32, DumpKind)>>,
    pub refuse: Mutex<bool>,
}

impl RecordingTransport {
    fn check(&self) -> DumpResult<()> {
        if *self.refuse.lock() {
            Err(DumpError::internal("host transport refused"))
        } else {
            Ok(())
        }
    }
}

impl HostTransport for RecordingTransport {
    fn request_dump(&self, kind: DumpKind, dump_id: u32, _req: &CreateRequest) -> DumpResult<()> {
        self.check()?;
        self.dumps.lock().push((kind, dump_id));
        Ok(())
    }

    fn request_offload(&self, source_id: u32, uri: &str) -> DumpResult<()> {
        self.check()?;
        self.offloads.lock().push((source_id, uri.to_string()));
        Ok(())
    }

    fn request_delete(&self, source_id: u32, kind: DumpKind) -> DumpResult<()> {
        self.check()?;
        self.deletes.lock().push((source_id, kind));
        Ok(())
    }
}

/// Local BMC manager over `root` with a scripted packager and offloader.
pub struct BmcFixture {
    pub manager: DumpManager,
    pub packager: ScriptedPackager,
    pub offloader: ScriptedOffloader,
    pub root: PathBuf,
}

pub fn bmc_config(root: &Path, quota: QuotaPolicy) -> ManagerConfig {
    let mut config = ManagerConfig::bmc_default();
    config.dump_dir = Some(root.to_path_buf());
    config.quota = quota;
    config
}

pub fn bmc_fixture(root: &Path, quota: QuotaPolicy) -> BmcFixture {
    let packager = ScriptedPackager::new();
    let offloader = ScriptedOffloader::new();
    let manager = DumpManager::new(
        bmc_config(root, quota),
        Arc::new(StaticHostMonitor::new(HostState::Running)),
        Arc::new(UnsupportedHostTransport),
    )
    .unwrap()
    .with_packager(Box::new(packager.clone()))
    .with_offloader(Box::new(offloader.clone()));
    BmcFixture {
        manager,
        packager,
        offloader,
        root: root.to_path_buf(),
    }
}

/// Host-stored manager with a recording transport.
pub struct HostFixture {
    pub manager: DumpManager,
    pub monitor: Arc<StaticHostMonitor>,
    pub transport: Arc<RecordingTransport>,
}

pub fn host_fixture(persist_dir: &Path, state: HostState) -> HostFixture {
    let monitor = Arc::new(StaticHostMonitor::new(state));
    let transport = Arc::new(RecordingTransport::default());
    let manager = DumpManager::new(
        ManagerConfig::host_default(),
        monitor.clone(),
        transport.clone(),
    )
    .unwrap()
    .with_persist_dir(persist_dir.to_path_buf());
    HostFixture {
        manager,
        monitor,
        transport,
    }
}

/// Writes `<root>/<id>/<name>` with `len` bytes and returns its path.
pub fn write_dump_file(root: &Path, id: u32, name: &str, len: usize) -> PathBuf {
    let dir = root.join(id.to_string());
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, vec![0xABu8; len]).unwrap();
    path
}

/// Locally packaged host-firmware manager of `kind` over `root`, reading host
/// data from `input`.
pub fn firmware_fixture(root: &Path, input: &Path, kind: DumpKind, prefix: &str) -> BmcFixture {
    let mut config = ManagerConfig::firmware_default(kind, prefix);
    config.dump_dir = Some(root.to_path_buf());
    if let Some(packager) = config.packager.as_mut() {
        packager.input_dir = Some(input.to_path_buf());
    }
    let packager = ScriptedPackager::new();
    let offloader = ScriptedOffloader::new();
    let manager = DumpManager::new(
        config,
        Arc::new(StaticHostMonitor::new(HostState::Running)),
        Arc::new(UnsupportedHostTransport),
    )
    .unwrap()
    .with_packager(Box::new(packager.clone()))
    .with_offloader(Box::new(offloader.clone()));
    BmcFixture {
        manager,
        packager,
        offloader,
        root: root.to_path_buf(),
    }
}
