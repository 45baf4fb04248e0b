//! The dump service event loop.
//!
//! One task owns every [`DumpManager`]. Control requests, storage events and
//! helper exits all arrive on a single unbounded queue and are handled one
//! at a time, so manager state never needs a lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bmcdump_core::{
    BmcDumpType, DumpError, DumpKind, DumpManager, HelperOutcome, HostMonitor, HostTransport,
    LaunchedHelper, NotifyOutcome, NotifyRequest, StaticHostMonitor, StorageEvent, WatchAction,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::DaemonConfig;
use crate::core_watch::CoreFileFilter;
use crate::error::{DaemonError, DaemonResult};
use crate::fswatch::WatchBackend;
use crate::protocol::{ControlRequest, ControlResponse, ListedEntry, ResponseBody};
use crate::supervisor::{ProcessOffloader, ProcessPackager};

/// Input to the event loop.
#[derive(Debug)]
pub enum ServiceEvent {
    /// Control request awaiting a reply.
    Request {
        /// The request.
        request: ControlRequest,
        /// Where the response goes.
        reply: oneshot::Sender<ControlResponse>,
    },
    /// Filesystem change from the watch backend.
    Storage(StorageEvent),
    /// A helper process ended.
    HelperExited {
        /// Manager that launched it.
        manager: String,
        /// Process id.
        pid: u32,
        /// How it ended.
        outcome: HelperOutcome,
    },
    /// Stop the loop.
    Shutdown,
}

/// Receiving end of the event queue.
pub type ServiceEvents = mpsc::UnboundedReceiver<ServiceEvent>;

/// Cloneable sender side of the event queue.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    tx: mpsc::UnboundedSender<ServiceEvent>,
}

impl ServiceHandle {
    /// Creates the event queue.
    pub fn channel() -> (Self, ServiceEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Sends a control request and waits for its response.
    pub async fn call(&self, request: ControlRequest) -> DaemonResult<ControlResponse> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(ServiceEvent::Request { request, reply })
            .map_err(|_| DaemonError::ServiceStopped)?;
        response.await.map_err(|_| DaemonError::ServiceStopped)
    }

    /// Queues a storage event.
    pub fn storage_event(&self, event: StorageEvent) -> DaemonResult<()> {
        self.tx
            .send(ServiceEvent::Storage(event))
            .map_err(|_| DaemonError::ServiceStopped)
    }

    /// Asks the loop to stop.
    pub fn shutdown(&self) {
        if self.tx.send(ServiceEvent::Shutdown).is_err() {
            debug!("dump service already stopped");
        }
    }

    fn helper_exited(&self, manager: String, pid: u32, outcome: HelperOutcome) {
        if self
            .tx
            .send(ServiceEvent::HelperExited {
                manager,
                pid,
                outcome,
            })
            .is_err()
        {
            debug!(pid, "helper exit dropped because the service stopped");
        }
    }
}

/// Builds every configured manager with process-backed helpers.
pub fn build_managers(
    config: &DaemonConfig,
    host: Arc<dyn HostMonitor>,
    transport: Arc<dyn HostTransport>,
) -> DaemonResult<Vec<DumpManager>> {
    config.validate()?;
    let timeout = config.helper_timeout();
    config
        .managers
        .iter()
        .map(|mc| -> DaemonResult<DumpManager> {
            let mut manager = DumpManager::new(mc.clone(), host.clone(), transport.clone())?
                .with_persist_dir(config.persist_dir.clone());
            if let Some(packager) = &mc.packager {
                manager =
                    manager.with_packager(Box::new(ProcessPackager::new(packager.tool.clone(), timeout)));
            }
            if manager.root().is_some() {
                manager = manager.with_offloader(Box::new(ProcessOffloader::new(
                    config.offload_handler.clone(),
                    timeout,
                )));
            }
            Ok(manager)
        })
        .collect()
}

/// Owner of all managers; see the module docs.
pub struct DumpService {
    managers: Vec<DumpManager>,
    host: Arc<StaticHostMonitor>,
    watcher: Box<dyn WatchBackend>,
    core_files: Option<CoreFileFilter>,
    ramoops_dir: Option<PathBuf>,
    handle: ServiceHandle,
}

impl DumpService {
    /// Creates the service. `handle` must belong to the queue later passed to [`run`](Self::run).
    pub fn new(
        managers: Vec<DumpManager>,
        host: Arc<StaticHostMonitor>,
        watcher: Box<dyn WatchBackend>,
        core_watch_dir: Option<PathBuf>,
        handle: ServiceHandle,
    ) -> Self {
        Self {
            managers,
            host,
            watcher,
            core_files: core_watch_dir.map(CoreFileFilter::new),
            ramoops_dir: None,
            handle,
        }
    }

    /// Sets the pstore directory checked for ramoops at start.
    pub fn with_ramoops_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.ramoops_dir = dir;
        self
    }

    /// Restores every manager from disk and installs the initial watches.
    pub fn start(&mut self) -> DaemonResult<()> {
        for manager in &mut self.managers {
            if let Some(root) = manager.root() {
                std::fs::create_dir_all(root)?;
            }
            manager.restore()?;
            for path in manager.watch_paths() {
                self.watcher.add_watch(&path)?;
            }
            info!(
                manager = manager.name(),
                entries = manager.registry().len(),
                last_id = manager.registry().last_entry_id(),
                "dump manager ready"
            );
        }
        if let Some(filter) = &self.core_files {
            let watched = std::fs::create_dir_all(filter.dir())
                .map_err(DaemonError::from)
                .and_then(|()| self.watcher.add_watch(filter.dir()));
            if let Err(e) = watched {
                warn!(dir = %filter.dir().display(), error = %e, "core file watch disabled");
            }
        }
        self.collect_ramoops();
        Ok(())
    }

    /// Requests a ramoops dump when the pstore directory holds anything.
    fn collect_ramoops(&mut self) {
        let Some(dir) = self.ramoops_dir.clone() else {
            return;
        };
        let has_files = match std::fs::read_dir(&dir) {
            Ok(mut read) => read.next().is_some(),
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "no pstore directory");
                false
            }
        };
        if has_files {
            info!(dir = %dir.display(), "ramoops found");
            self.request_internal(BmcDumpType::Ramoops, dir);
        }
    }

    /// Processes events until a shutdown event arrives.
    pub async fn run(mut self, mut events: ServiceEvents) {
        while let Some(event) = events.recv().await {
            match event {
                ServiceEvent::Shutdown => {
                    info!("dump service stopping");
                    break;
                }
                ServiceEvent::Request { request, reply } => {
                    let response = ControlResponse::from(self.dispatch(request));
                    if let ControlResponse::Error { kind, message } = &response {
                        info!(%kind, %message, "request rejected");
                    }
                    if reply.send(response).is_err() {
                        debug!("control client went away before the reply");
                    }
                }
                ServiceEvent::Storage(event) => self.on_storage_event(event),
                ServiceEvent::HelperExited {
                    manager,
                    pid,
                    outcome,
                } => match self.manager_index(&manager) {
                    Ok(idx) => {
                        let changes = self.managers[idx].on_helper_exit(pid, outcome);
                        self.apply_watch_changes(changes);
                    }
                    Err(e) => warn!(pid, error = %e, "helper exit for unknown manager"),
                },
            }
        }
    }

    fn dispatch(&mut self, request: ControlRequest) -> DaemonResult<ResponseBody> {
        match request {
            ControlRequest::List { manager } => {
                let managers = match manager {
                    Some(name) => {
                        let idx = self.manager_index(&name)?;
                        &self.managers[idx..=idx]
                    }
                    None => &self.managers[..],
                };
                let entries = managers
                    .iter()
                    .flat_map(|m| {
                        m.list().into_iter().map(|entry| ListedEntry {
                            manager: m.name().to_string(),
                            entry,
                        })
                    })
                    .collect();
                Ok(ResponseBody::Entries { entries })
            }
            ControlRequest::Create { manager, params } => {
                let idx = self.manager_index(&manager)?;
                let created = self.managers[idx].create_dump(&params)?;
                if let Some(helper) = created.helper {
                    self.supervise(&manager, helper);
                }
                Ok(ResponseBody::Created {
                    manager,
                    id: created.id,
                    size_budget_kb: created.size_budget_kb,
                })
            }
            ControlRequest::Delete { manager, id } => {
                let idx = self.manager_index(&manager)?;
                self.managers[idx].delete(id)?;
                Ok(ResponseBody::Done)
            }
            ControlRequest::DeleteAll { manager } => {
                let idx = self.manager_index(&manager)?;
                let report = self.managers[idx].delete_all();
                Ok(ResponseBody::DeletedAll {
                    deleted: report.deleted,
                    skipped: report.skipped,
                })
            }
            ControlRequest::Offload { manager, id, uri } => {
                let idx = self.manager_index(&manager)?;
                if let Some(helper) = self.managers[idx].initiate_offload(id, &uri)? {
                    self.supervise(&manager, helper);
                }
                Ok(ResponseBody::Done)
            }
            ControlRequest::Notify {
                kind,
                source_id,
                size,
                token,
            } => {
                let idx = self
                    .managers
                    .iter()
                    .position(|m| m.serves(kind))
                    .ok_or_else(|| DumpError::invalid_argument("NOTIFY_TYPE", kind.to_string()))?;
                let req = NotifyRequest {
                    kind,
                    source_id,
                    size,
                    token,
                };
                if kind.capabilities().packaged_on_notify {
                    let manager = self.managers[idx].name().to_string();
                    let created = self.managers[idx].notify_packaging(req)?;
                    if let Some(helper) = created.helper {
                        self.supervise(&manager, helper);
                    }
                    return Ok(ResponseBody::Created {
                        manager,
                        id: created.id,
                        size_budget_kb: created.size_budget_kb,
                    });
                }
                let outcome = self.managers[idx].notify(req)?;
                Ok(ResponseBody::Notified {
                    manager: self.managers[idx].name().to_string(),
                    id: outcome.id(),
                    duplicate: matches!(outcome, NotifyOutcome::Duplicate { .. }),
                    stale: outcome.stale().to_vec(),
                })
            }
            ControlRequest::SetHostState { state } => {
                self.host.set(state);
                Ok(ResponseBody::Done)
            }
        }
    }

    fn on_storage_event(&mut self, event: StorageEvent) {
        if let Some(filter) = &self.core_files {
            if filter.owns(&event) {
                let core = filter.core_file(&event).map(Path::to_path_buf);
                if let Some(core) = core {
                    self.on_core_file(core);
                }
                return;
            }
        }
        let Some(idx) = self.managers.iter().position(|m| m.owns_path(&event.path)) else {
            debug!(path = %event.path.display(), "storage event outside every dump root");
            return;
        };
        let changes = self.managers[idx].on_storage_event(&event);
        self.apply_watch_changes(changes);
    }

    fn apply_watch_changes(&mut self, changes: Vec<WatchAction>) {
        for change in changes {
            let result = match &change {
                WatchAction::AddWatch(path) => self.watcher.add_watch(path),
                WatchAction::RemoveWatch(path) => self.watcher.remove_watch(path),
                WatchAction::Artifact(_) => Ok(()),
            };
            if let Err(e) = result {
                warn!(?change, error = %e, "watch update failed");
            }
        }
    }

    fn on_core_file(&mut self, core: PathBuf) {
        self.request_internal(BmcDumpType::Core, core);
    }

    fn request_internal(&mut self, bmc_type: BmcDumpType, source: PathBuf) {
        let Some(idx) = self.managers.iter().position(|m| m.serves(DumpKind::Bmc)) else {
            warn!(source = %source.display(), ?bmc_type, "no BMC dump manager");
            return;
        };
        match self.managers[idx].create_internal(bmc_type, std::slice::from_ref(&source)) {
            Ok(created) => {
                info!(id = created.id, source = %source.display(), ?bmc_type, "internal dump requested");
                if let Some(helper) = created.helper {
                    let manager = self.managers[idx].name().to_string();
                    self.supervise(&manager, helper);
                }
            }
            Err(e) => warn!(source = %source.display(), ?bmc_type, error = %e, "internal dump not collected"),
        }
    }

    fn supervise(&self, manager: &str, helper: LaunchedHelper) {
        let LaunchedHelper { pid, exit } = helper;
        let handle = self.handle.clone();
        let manager = manager.to_string();
        tokio::spawn(async move {
            let outcome = exit.await;
            handle.helper_exited(manager, pid, outcome);
        });
    }

    fn manager_index(&self, name: &str) -> DaemonResult<usize> {
        self.managers
            .iter()
            .position(|m| m.name() == name)
            .ok_or_else(|| DaemonError::UnknownManager {
                name: name.to_string(),
            })
    }
}
