//! Common fixtures for daemon integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bmcdump_core::{
    DumpKind, DumpManager, DumpPackager, DumpResult, HelperOutcome, HostState, LaunchedHelper,
    ManagerConfig, PackageRequest, StaticHostMonitor, UnsupportedHostTransport,
};
use bmcdump_daemon::{
    ControlRequest, ControlResponse, DaemonResult, DumpService, ListedEntry, ResponseBody,
    ServiceHandle, WatchBackend,
};
use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Packaging tool stand-in whose helpers run until the test finishes them.
#[derive(Clone)]
pub struct ScriptedPackager {
    pub requests: Arc<Mutex<Vec<PackageRequest>>>,
    exits: Arc<Mutex<BTreeMap<u32, oneshot::Sender<HelperOutcome>>>>,
    next_pid: Arc<AtomicU32>,
}

impl ScriptedPackager {
    pub fn new() -> Self {
        Self {
            requests: Arc::default(),
            exits: Arc::default(),
            next_pid: Arc::new(AtomicU32::new(1000)),
        }
    }

    /// Ends the helper with `pid`.
    pub fn finish(&self, pid: u32, outcome: HelperOutcome) {
        let tx = self.exits.lock().remove(&pid).expect("unknown helper pid");
        tx.send(outcome).expect("helper exit dropped");
    }

    pub fn running(&self) -> Vec<u32> {
        self.exits.lock().keys().copied().collect()
    }

    pub fn last_request(&self) -> Option<PackageRequest> {
        self.requests.lock().last().cloned()
    }
}

impl DumpPackager for ScriptedPackager {
    fn package(&self, req: &PackageRequest) -> DumpResult<LaunchedHelper> {
        self.requests.lock().push(req.clone());
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.exits.lock().insert(pid, tx);
        Ok(LaunchedHelper {
            pid,
            exit: Box::pin(async move {
                rx.await
                    .unwrap_or_else(|_| HelperOutcome::WaitFailed("test dropped helper".into()))
            }),
        })
    }
}

/// Watch call seen by [`RecordingWatchBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCall {
    Add(PathBuf),
    Remove(PathBuf),
}

/// Watch backend that only records calls.
#[derive(Clone, Default)]
pub struct RecordingWatchBackend {
    pub calls: Arc<Mutex<Vec<WatchCall>>>,
}

impl WatchBackend for RecordingWatchBackend {
    fn add_watch(&mut self, path: &Path) -> DaemonResult<()> {
        self.calls.lock().push(WatchCall::Add(path.to_path_buf()));
        Ok(())
    }

    fn remove_watch(&mut self, path: &Path) -> DaemonResult<()> {
        self.calls.lock().push(WatchCall::Remove(path.to_path_buf()));
        Ok(())
    }
}

/// Running service with its collaborators.
pub struct ServiceFixture {
    pub handle: ServiceHandle,
    pub packager: ScriptedPackager,
    pub watches: RecordingWatchBackend,
    pub host: Arc<StaticHostMonitor>,
    pub root: PathBuf,
    pub core_dir: PathBuf,
    pub pstore_dir: PathBuf,
}

/// Starts a service with a BMC manager over `<base>/dumps`, a host manager
/// persisting under `<base>/persist`, a core-file watch on `<base>/core` and
/// ramoops collection from `<base>/pstore`.
pub fn start_service(base: &Path) -> ServiceFixture {
    let root = base.join("dumps");
    let core_dir = base.join("core");
    let pstore_dir = base.join("pstore");
    let host = Arc::new(StaticHostMonitor::new(HostState::Running));
    let packager = ScriptedPackager::new();
    let watches = RecordingWatchBackend::default();

    let mut bmc_config = ManagerConfig::bmc_default();
    bmc_config.dump_dir = Some(root.clone());
    let bmc = DumpManager::new(bmc_config, host.clone(), Arc::new(UnsupportedHostTransport))
        .unwrap()
        .with_packager(Box::new(packager.clone()));
    let hostdumps = DumpManager::new(
        ManagerConfig::host_default(),
        host.clone(),
        Arc::new(UnsupportedHostTransport),
    )
    .unwrap()
    .with_persist_dir(base.join("persist"));

    let (handle, events) = ServiceHandle::channel();
    let mut service = DumpService::new(
        vec![bmc, hostdumps],
        host.clone(),
        Box::new(watches.clone()),
        Some(core_dir.clone()),
        handle.clone(),
    )
    .with_ramoops_dir(Some(pstore_dir.clone()));
    service.start().unwrap();
    tokio::spawn(service.run(events));

    ServiceFixture {
        handle,
        packager,
        watches,
        host,
        root,
        core_dir,
        pstore_dir,
    }
}

/// Starts a service with a single locally packaged hardware dump manager
/// over `<base>/hw`.
pub fn start_hardware_service(base: &Path) -> ServiceFixture {
    let root = base.join("hw");
    let host = Arc::new(StaticHostMonitor::new(HostState::Running));
    let packager = ScriptedPackager::new();
    let watches = RecordingWatchBackend::default();

    let mut config = ManagerConfig::firmware_default(DumpKind::Hardware, "hwdump");
    config.dump_dir = Some(root.clone());
    let hardware = DumpManager::new(config, host.clone(), Arc::new(UnsupportedHostTransport))
        .unwrap()
        .with_packager(Box::new(packager.clone()));

    let (handle, events) = ServiceHandle::channel();
    let mut service = DumpService::new(
        vec![hardware],
        host.clone(),
        Box::new(watches.clone()),
        None,
        handle.clone(),
    );
    service.start().unwrap();
    tokio::spawn(service.run(events));

    ServiceFixture {
        handle,
        packager,
        watches,
        host,
        root,
        core_dir: base.join("core"),
        pstore_dir: base.join("pstore"),
    }
}

pub async fn call_ok(handle: &ServiceHandle, request: ControlRequest) -> ResponseBody {
    match handle.call(request).await.unwrap() {
        ControlResponse::Ok { body } => body,
        other => panic!("request failed: {other:?}"),
    }
}

pub async fn list(handle: &ServiceHandle, manager: &str) -> Vec<ListedEntry> {
    match call_ok(
        handle,
        ControlRequest::List {
            manager: Some(manager.to_string()),
        },
    )
    .await
    {
        ResponseBody::Entries { entries } => entries,
        other => panic!("unexpected body {other:?}"),
    }
}

/// Polls the listing of `manager` until `pred` holds.
pub async fn wait_for<F>(handle: &ServiceHandle, manager: &str, pred: F) -> Vec<ListedEntry>
where
    F: Fn(&[ListedEntry]) -> bool,
{
    for _ in 0..200 {
        let entries = list(handle, manager).await;
        if pred(&entries) {
            return entries;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached for manager {manager}");
}

/// Writes `<root>/<id>/<name>` with `len` bytes and returns its path.
pub fn write_dump_file(root: &Path, id: u32, name: &str, len: usize) -> PathBuf {
    let dir = root.join(id.to_string());
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, vec![0xCDu8; len]).unwrap();
    path
}
