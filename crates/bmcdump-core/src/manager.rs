//! Dump manager: one registry plus the operations callers invoke on it.
//!
//! A manager serves one or more [`DumpKind`]s that share a storage class.
//! Local managers own a dump root, a watch reconciler and a packaging tool;
//! host managers keep metadata only and talk to the host transport. All
//! methods are synchronous and expect to be called from a single task.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::ManagerConfig;
use crate::entry::{now_us, DumpEntry};
use crate::error::{DumpError, DumpResult};
use crate::helper::{
    ChildTracker, DumpOffloader, DumpPackager, HelperOutcome, HelperPurpose, LaunchedHelper,
    OffloadRequest, PackageRequest,
};
use crate::host::{HostMonitor, HostTransport};
use crate::notify::{apply_notify, NotifyOutcome, NotifyRequest};
use crate::params::{CreateParams, CreateRequest, DumpTypeRequest};
use crate::quota::{allowed_size_kb, directory_size_kb};
use crate::reconcile::{Artifact, StorageEvent, WatchAction, WatchReconciler, PRESERVE_DIR};
use crate::record::{host_record_path, local_record_path, EntryRecord};
use crate::registry::Registry;
use crate::types::{
    BmcDumpType, DeleteRoute, DumpKind, HostRequirement, HostState, OffloadRoute,
    OperationStatus, OriginatorType, StorageClass, INVALID_SOURCE_ID,
};

/// Result of a successful create request.
#[derive(Debug)]
pub struct CreatedDump {
    /// Id of the new in-progress entry.
    pub id: u32,
    /// Size budget handed to the packaging tool, for local dumps.
    pub size_budget_kb: Option<u64>,
    /// Packaging helper to be awaited, for local dumps.
    pub helper: Option<LaunchedHelper>,
}

/// Result of a delete-all request.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteAllReport {
    /// Ids deleted.
    pub deleted: Vec<u32>,
    /// Ids kept, with the reason.
    pub skipped: Vec<(u32, String)>,
}

/// Entry lifecycle engine for one group of dump kinds.
pub struct DumpManager {
    config: ManagerConfig,
    storage: StorageClass,
    registry: Registry,
    reconciler: Option<WatchReconciler>,
    children: ChildTracker,
    packager: Option<Box<dyn DumpPackager>>,
    offloader: Option<Box<dyn DumpOffloader>>,
    host: Arc<dyn HostMonitor>,
    transport: Arc<dyn HostTransport>,
    persist_dir: Option<PathBuf>,
}

impl std::fmt::Debug for DumpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumpManager")
            .field("name", &self.config.name)
            .field("kinds", &self.config.kinds)
            .field("entries", &self.registry.len())
            .field("helpers", &self.children.len())
            .finish()
    }
}

impl DumpManager {
    /// Builds a manager from a validated configuration.
    pub fn new(
        config: ManagerConfig,
        host: Arc<dyn HostMonitor>,
        transport: Arc<dyn HostTransport>,
    ) -> DumpResult<Self> {
        config.validate()?;
        let storage = config.storage_class()?;
        let (registry, reconciler) = match (storage, &config.dump_dir) {
            (StorageClass::Local, Some(root)) => (
                Registry::new(Some(root.clone())),
                Some(WatchReconciler::new(root.clone(), config.filename_parser()?)),
            ),
            _ => (Registry::new(None), None),
        };
        Ok(Self {
            config,
            storage,
            registry,
            reconciler,
            children: ChildTracker::new(),
            packager: None,
            offloader: None,
            host,
            transport,
            persist_dir: None,
        })
    }

    /// Sets the packaging tool launcher.
    pub fn with_packager(mut self, packager: Box<dyn DumpPackager>) -> Self {
        self.packager = Some(packager);
        self
    }

    /// Sets the offload helper launcher.
    pub fn with_offloader(mut self, offloader: Box<dyn DumpOffloader>) -> Self {
        self.offloader = Some(offloader);
        self
    }

    /// Sets the directory host-dump records are kept in.
    pub fn with_persist_dir(mut self, dir: PathBuf) -> Self {
        self.persist_dir = Some(dir);
        self
    }

    /// Manager name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Kinds served.
    pub fn kinds(&self) -> &[DumpKind] {
        &self.config.kinds
    }

    /// Whether `kind` is served here.
    pub fn serves(&self, kind: DumpKind) -> bool {
        self.config.kinds.contains(&kind)
    }

    /// Dump root, for local managers.
    pub fn root(&self) -> Option<&Path> {
        self.reconciler.as_ref().map(WatchReconciler::root)
    }

    /// Read access to the registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Running helpers.
    pub fn children(&self) -> &ChildTracker {
        &self.children
    }

    /// Looks up one entry.
    pub fn entry(&self, id: u32) -> Option<&DumpEntry> {
        self.registry.get(id)
    }

    /// Snapshot of every entry, in id order.
    pub fn list(&self) -> Vec<DumpEntry> {
        self.registry.iter().cloned().collect()
    }

    /// Directories the watch backend must watch right now.
    pub fn watch_paths(&self) -> Vec<PathBuf> {
        match &self.reconciler {
            Some(rec) => std::iter::once(rec.root().to_path_buf())
                .chain(rec.child_watches().map(Path::to_path_buf))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Whether a storage event path belongs to this manager.
    pub fn owns_path(&self, path: &Path) -> bool {
        self.reconciler
            .as_ref()
            .map(|rec| rec.owns(path))
            .unwrap_or(false)
    }

    fn primary_kind(&self) -> DumpKind {
        // validate() guarantees at least one kind
        self.config.kinds.first().copied().unwrap_or(DumpKind::Bmc)
    }

    // ---- restore ----

    /// Rebuilds registry state from disk. Running it twice is harmless.
    pub fn restore(&mut self) -> DumpResult<()> {
        match self.storage {
            StorageClass::Local => self.restore_local(),
            StorageClass::Host => self.restore_host(),
        }
    }

    fn restore_local(&mut self) -> DumpResult<()> {
        let Some(rec) = &self.reconciler else {
            return Ok(());
        };
        let root = rec.root().to_path_buf();
        let scan = rec.restore_scan();
        for &id in &scan.dir_ids {
            self.registry.raise_high_water(id);
        }
        for artifact in scan.artifacts {
            self.apply_artifact(artifact, false);
        }
        for &id in &scan.dir_ids {
            self.refine_from_record(&root, id);
        }
        info!(
            manager = %self.config.name,
            entries = self.registry.len(),
            last_id = self.registry.last_entry_id(),
            "restored local dumps"
        );
        Ok(())
    }

    fn refine_from_record(&mut self, root: &Path, id: u32) {
        let path = local_record_path(root, id);
        if !path.exists() {
            return;
        }
        let record = match EntryRecord::read_from(&path) {
            Ok(record) if record.id == id => record,
            Ok(record) => {
                warn!(id, record_id = record.id, "dump record id mismatch, discarding");
                discard_preserve(root, id);
                return;
            }
            Err(e) => {
                warn!(id, error = %e, "unreadable dump record, discarding");
                discard_preserve(root, id);
                return;
            }
        };
        if let Some(entry) = self.registry.get_mut(id) {
            entry.originator_id = record.originator_id;
            entry.originator_type = record.originator_type;
            entry.start_time_us = record.start_time_us;
            entry.source_id = record.source_id;
            entry.token = record.token;
            entry.offload_uri = record.offload_uri;
            entry.offloaded = record.offloaded;
        }
    }

    fn restore_host(&mut self) -> DumpResult<()> {
        let Some(dir) = self.host_record_dir() else {
            return Ok(());
        };
        let read = match std::fs::read_dir(&dir) {
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let mut paths: Vec<PathBuf> = read
            .filter_map(Result::ok)
            .map(|d| d.path())
            .filter(|p| p.extension().map(|e| e == "bin").unwrap_or(false))
            .collect();
        paths.sort();
        for path in paths {
            let expected = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u32>().ok());
            match EntryRecord::read_from(&path) {
                Ok(record) if Some(record.id) == expected && self.serves(record.kind) => {
                    debug!(id = record.id, kind = %record.kind, "restored host dump record");
                    self.registry.insert(record.into_entry(None));
                }
                Ok(record) => {
                    warn!(path = %path.display(), id = record.id, "discarding mismatched host dump record");
                    remove_quietly(&path);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "discarding unreadable host dump record");
                    remove_quietly(&path);
                }
            }
        }
        info!(
            manager = %self.config.name,
            entries = self.registry.len(),
            last_id = self.registry.last_entry_id(),
            "restored host dumps"
        );
        Ok(())
    }

    // ---- watcher ----

    /// Feeds one storage event through the reconciler.
    ///
    /// Finished artifacts are applied to the registry here; the returned
    /// actions are the watch changes the backend must carry out.
    pub fn on_storage_event(&mut self, event: &StorageEvent) -> Vec<WatchAction> {
        let Some(rec) = self.reconciler.as_mut() else {
            return Vec::new();
        };
        let mut watch_changes = Vec::new();
        for action in rec.handle(event) {
            match action {
                WatchAction::Artifact(artifact) => self.apply_artifact(artifact, true),
                other => watch_changes.push(other),
            }
        }
        watch_changes
    }

    fn apply_artifact(&mut self, artifact: Artifact, persist: bool) {
        let Artifact {
            id,
            timestamp_us,
            size,
            path,
        } = artifact;
        match self.registry.get_mut(id) {
            Some(entry) => {
                entry.mark_complete(timestamp_us, size, path);
                info!(id, size, "dump completed");
            }
            None => {
                let mut entry = DumpEntry::completed(self.primary_kind(), id, timestamp_us, size);
                entry.file_path = Some(path);
                self.registry.insert(entry);
                info!(id, size, "dump entry created for untracked file");
            }
        }
        if persist {
            self.persist(id);
        }
    }

    // ---- create ----

    /// Handles a create request from a caller.
    pub fn create_dump(&mut self, params: &CreateParams) -> DumpResult<CreatedDump> {
        let req = CreateRequest::from_params(params)?;
        let kind = match req.dump_type {
            Some(DumpTypeRequest { kind, .. }) if self.serves(kind) => kind,
            Some(_) => {
                return Err(DumpError::invalid_argument("BMC_DUMP_TYPE", "INVALID INPUT"));
            }
            None => self.primary_kind(),
        };
        self.create_for(kind, req)
    }

    /// Requests a BMC dump on behalf of the BMC itself, e.g. for a core file.
    pub fn create_internal(
        &mut self,
        bmc_type: BmcDumpType,
        paths: &[PathBuf],
    ) -> DumpResult<CreatedDump> {
        if !self.serves(DumpKind::Bmc) {
            return Err(DumpError::invalid_argument("BMC_DUMP_TYPE", "INVALID INPUT"));
        }
        let req = CreateRequest {
            originator_type: OriginatorType::Internal,
            dump_type: Some(DumpTypeRequest {
                kind: DumpKind::Bmc,
                bmc_type: Some(bmc_type),
            }),
            file_path: paths.first().cloned(),
            ..CreateRequest::default()
        };
        self.create_for(DumpKind::Bmc, req)
    }

    fn create_for(&mut self, kind: DumpKind, req: CreateRequest) -> DumpResult<CreatedDump> {
        let requirement = kind.capabilities().host_requirement;
        if requirement != HostRequirement::None {
            let state = self.host.host_state().map_err(|e| {
                DumpError::unavailable(format!("cannot read host state: {e}"))
            })?;
            if !requirement.permits(state) {
                warn!(kind = %kind, ?state, "dump not allowed in current host state");
                return Err(DumpError::not_allowed(format!(
                    "{kind} dump not allowed while host is {state:?}"
                )));
            }
        }
        match self.storage {
            StorageClass::Local => self.create_local(kind, req),
            StorageClass::Host => self.create_host(kind, req),
        }
    }

    fn next_id(&self) -> DumpResult<u32> {
        self.registry
            .last_entry_id()
            .checked_add(1)
            .ok_or_else(|| DumpError::internal("dump id space exhausted"))
    }

    fn create_local(&mut self, kind: DumpKind, req: CreateRequest) -> DumpResult<CreatedDump> {
        let bmc_type = (kind == DumpKind::Bmc).then(|| req.bmc_type());
        if bmc_type == Some(BmcDumpType::User) && self.children.user_dump_in_progress() {
            return Err(DumpError::unavailable("Dump in progress"));
        }
        let root = self
            .root()
            .map(Path::to_path_buf)
            .ok_or_else(|| DumpError::internal("local manager without dump root"))?;
        if self.packager.is_none() {
            return Err(DumpError::internal("no packaging tool configured"));
        }

        let size_budget_kb = self.allowed_size(&root)?;
        let id = self.next_id()?;
        let (type_tag, name_prefix) = match &self.config.packager {
            Some(p) => (
                p.type_tag
                    .clone()
                    .or_else(|| bmc_type.map(|t| t.tag().to_string()))
                    .unwrap_or_else(|| kind.as_str().to_string()),
                p.name_prefix.clone(),
            ),
            None => (kind.as_str().to_string(), None),
        };
        let package = PackageRequest {
            kind,
            dump_id: id,
            dest_dir: root.join(id.to_string()),
            size_budget_kb,
            source_hint: req.file_path.clone(),
            type_tag,
            name_prefix,
        };
        let launched = match &self.packager {
            Some(packager) => packager.package(&package)?,
            None => return Err(DumpError::internal("no packaging tool configured")),
        };
        self.children.track(
            launched.pid,
            HelperPurpose::Package {
                dump_id: id,
                kind,
                bmc_type,
            },
        )?;

        let allocated = self.registry.allocate_id()?;
        debug_assert_eq!(allocated, id);
        self.registry.insert(DumpEntry::in_progress(
            kind,
            id,
            now_us(),
            req.originator_id,
            req.originator_type,
        ));
        info!(
            id,
            kind = %kind,
            pid = launched.pid,
            size_budget_kb,
            tag = %package.type_tag,
            "dump collection started"
        );
        Ok(CreatedDump {
            id,
            size_budget_kb: Some(size_budget_kb),
            helper: Some(launched),
        })
    }

    fn allowed_size(&mut self, root: &Path) -> DumpResult<u64> {
        let used = directory_size_kb(root);
        let registry = &mut self.registry;
        let children = &self.children;
        let mut evicted = Vec::new();
        let result = allowed_size_kb(&self.config.quota, used, || {
            let id = registry
                .iter()
                .find(|e| e.status != OperationStatus::InProgress && !children.offload_running(e.id))
                .map(|e| e.id)?;
            let freed = directory_size_kb(&root.join(id.to_string()));
            registry.erase(id);
            evicted.push(id);
            Some(freed)
        });
        for id in evicted {
            info!(id, manager = %self.config.name, "dump rotated out to free space");
        }
        result
    }

    fn create_host(&mut self, kind: DumpKind, req: CreateRequest) -> DumpResult<CreatedDump> {
        if self.registry.has_placeholder(kind) {
            return Err(DumpError::unavailable(format!(
                "a {kind} dump is already in progress"
            )));
        }
        let id = self.next_id()?;
        self.transport.request_dump(kind, id, &req)?;
        let allocated = self.registry.allocate_id()?;
        debug_assert_eq!(allocated, id);
        self.registry.insert(DumpEntry::in_progress(
            kind,
            id,
            now_us(),
            req.originator_id,
            req.originator_type,
        ));
        self.persist(id);
        info!(id, kind = %kind, "host dump requested");
        Ok(CreatedDump {
            id,
            size_budget_kb: None,
            helper: None,
        })
    }

    // ---- helper completion ----

    /// Handles the exit of a helper this manager launched.
    ///
    /// The entry the helper worked on may have been deleted meanwhile. After
    /// a successful packaging run the id directory is swept, so the returned
    /// watch changes must be applied like those of
    /// [`on_storage_event`](Self::on_storage_event).
    pub fn on_helper_exit(&mut self, pid: u32, outcome: HelperOutcome) -> Vec<WatchAction> {
        let Some(purpose) = self.children.finish(pid) else {
            debug!(pid, "exit of untracked helper");
            return Vec::new();
        };
        match purpose {
            HelperPurpose::Package { dump_id, .. } => {
                if outcome.success() {
                    info!(id = dump_id, pid, "packaging tool finished");
                    return self.sweep_dump_dir(dump_id);
                }
                match self.registry.get_mut(dump_id) {
                    Some(entry) => {
                        if entry.mark_failed(now_us()) {
                            error!(id = dump_id, pid, %outcome, "dump collection failed");
                        }
                    }
                    None => warn!(id = dump_id, pid, %outcome, "packaging tool ended for deleted dump"),
                }
            }
            HelperPurpose::Offload { dump_id } => {
                if outcome.success() {
                    info!(id = dump_id, pid, "offload finished");
                } else {
                    error!(id = dump_id, pid, %outcome, "offload failed");
                }
                self.complete_offload(dump_id, outcome.success());
            }
        }
        Vec::new()
    }

    fn sweep_dump_dir(&mut self, id: u32) -> Vec<WatchAction> {
        let Some(rec) = self.reconciler.as_mut() else {
            return Vec::new();
        };
        let dir = rec.root().join(id.to_string());
        let mut watch_changes = Vec::new();
        for action in rec.sweep(&dir) {
            match action {
                WatchAction::Artifact(artifact) => self.apply_artifact(artifact, true),
                other => watch_changes.push(other),
            }
        }
        watch_changes
    }

    /// Records the end of an offload of `id`; a vanished entry is ignored.
    pub fn complete_offload(&mut self, id: u32, success: bool) {
        match self.registry.get_mut(id) {
            Some(entry) => {
                entry.finish_offload(success);
                self.persist(id);
            }
            None => debug!(id, "offload ended for deleted dump"),
        }
    }

    // ---- notify ----

    /// Applies a host "dump ready" notification.
    pub fn notify(&mut self, req: NotifyRequest) -> DumpResult<NotifyOutcome> {
        if !self.serves(req.kind) || !req.kind.capabilities().source_correlated {
            return Err(DumpError::invalid_argument("NOTIFY_TYPE", req.kind.as_str()));
        }
        let outcome = apply_notify(&mut self.registry, &req, now_us())?;
        for &stale in outcome.stale() {
            self.forget_record(stale);
        }
        if !matches!(outcome, NotifyOutcome::Duplicate { .. }) {
            self.persist(outcome.id());
        }
        Ok(outcome)
    }

    /// Packages host data announced by a notification.
    ///
    /// Used for kinds whose host hands over raw data for local packaging
    /// instead of a finished dump. The new entry carries the host's id as
    /// its source id; a second notification for a source id still being
    /// packaged is refused.
    pub fn notify_packaging(&mut self, req: NotifyRequest) -> DumpResult<CreatedDump> {
        if !self.serves(req.kind) || !req.kind.capabilities().packaged_on_notify {
            return Err(DumpError::invalid_argument("NOTIFY_TYPE", req.kind.as_str()));
        }
        let busy = self.registry.iter().any(|e| {
            e.kind == req.kind
                && e.source_id == req.source_id
                && e.status == OperationStatus::InProgress
        });
        if busy {
            return Err(DumpError::unavailable(format!(
                "{} dump {:#x} is already being packaged",
                req.kind, req.source_id
            )));
        }
        let input_dir = self
            .config
            .packager
            .as_ref()
            .and_then(|p| p.input_dir.clone());
        let create = CreateRequest {
            originator_type: OriginatorType::Internal,
            file_path: input_dir,
            ..CreateRequest::default()
        };
        let created = self.create_for(req.kind, create)?;
        if let Some(entry) = self.registry.get_mut(created.id) {
            entry.source_id = req.source_id;
        }
        info!(
            id = created.id,
            kind = %req.kind,
            source_id = req.source_id,
            size = req.size,
            "packaging host data"
        );
        Ok(created)
    }

    // ---- delete ----

    /// Deletes one entry, honoring the per-kind guards.
    pub fn delete(&mut self, id: u32) -> DumpResult<()> {
        let entry = self.registry.get(id).ok_or(DumpError::NotFound { id })?;
        match entry.kind.capabilities().delete {
            DeleteRoute::LocalArtifact => {
                if self.children.offload_running(id) {
                    return Err(DumpError::unavailable(format!(
                        "dump {id} is being offloaded"
                    )));
                }
            }
            DeleteRoute::HostThenRegistry => {
                let state = self.host.host_state().map_err(|e| {
                    DumpError::unavailable(format!("cannot read host state: {e}"))
                })?;
                if entry.offload_uri.is_some() && state == HostState::Running {
                    return Err(DumpError::unavailable(format!(
                        "dump {id} has an offload in flight"
                    )));
                }
                if entry.source_id != INVALID_SOURCE_ID && state == HostState::Running {
                    self.transport
                        .request_delete(entry.source_id, entry.kind)
                        .map_err(|e| {
                            DumpError::unavailable(format!("host refused to delete dump {id}: {e}"))
                        })?;
                }
                self.forget_record(id);
            }
        }
        self.registry.erase(id);
        info!(id, manager = %self.config.name, "dump deleted");
        Ok(())
    }

    /// Deletes every entry that passes its guard.
    pub fn delete_all(&mut self) -> DeleteAllReport {
        let mut report = DeleteAllReport::default();
        for id in self.registry.ids() {
            match self.delete(id) {
                Ok(()) => report.deleted.push(id),
                Err(e) => {
                    warn!(id, error = %e, "dump kept during delete-all");
                    report.skipped.push((id, e.to_string()));
                }
            }
        }
        report
    }

    // ---- offload ----

    /// Starts offloading a completed dump to `uri`.
    ///
    /// Local dumps return the offload helper to be awaited.
    pub fn initiate_offload(&mut self, id: u32, uri: &str) -> DumpResult<Option<LaunchedHelper>> {
        if uri.is_empty() {
            return Err(DumpError::invalid_argument("OFFLOAD_URI", "INVALID INPUT"));
        }
        let entry = self.registry.get(id).ok_or(DumpError::NotFound { id })?;
        if entry.status != OperationStatus::Completed {
            return Err(DumpError::unavailable(format!("dump {id} is not completed")));
        }
        let launched = match entry.kind.capabilities().offload {
            OffloadRoute::LocalHelper => {
                if self.children.offload_running(id) {
                    return Err(DumpError::unavailable(format!(
                        "dump {id} is already being offloaded"
                    )));
                }
                let path = entry
                    .file_path
                    .clone()
                    .ok_or_else(|| DumpError::unavailable(format!("dump {id} has no artifact")))?;
                let offloader = self
                    .offloader
                    .as_ref()
                    .ok_or_else(|| DumpError::internal("no offload handler configured"))?;
                let launched = offloader.offload(&OffloadRequest {
                    dump_id: id,
                    path,
                    uri: uri.to_string(),
                })?;
                self.children
                    .track(launched.pid, HelperPurpose::Offload { dump_id: id })?;
                Some(launched)
            }
            OffloadRoute::HostTransport => {
                let state = self.host.host_state().map_err(|e| {
                    DumpError::unavailable(format!("cannot read host state: {e}"))
                })?;
                if state != HostState::Running {
                    return Err(DumpError::not_allowed(format!(
                        "host dump offload needs a running host, host is {state:?}"
                    )));
                }
                self.transport.request_offload(entry.source_id, uri)?;
                None
            }
        };
        if let Some(entry) = self.registry.get_mut(id) {
            entry.begin_offload(uri);
        }
        self.persist(id);
        info!(id, uri, "offload started");
        Ok(launched)
    }

    /// Opens the artifact of `id` read-only.
    pub fn get_file_handle(&self, id: u32) -> DumpResult<File> {
        let entry = self.registry.get(id).ok_or(DumpError::NotFound { id })?;
        let path = entry
            .file_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| DumpError::unavailable(format!("dump {id} has no artifact")))?;
        File::open(path).map_err(|e| {
            error!(id, path = %path.display(), error = %e, "failed to open dump file");
            DumpError::internal(format!("failed to open {}: {e}", path.display()))
        })
    }

    // ---- persistence ----

    fn host_record_dir(&self) -> Option<PathBuf> {
        self.persist_dir
            .as_ref()
            .map(|dir| dir.join(&self.config.name))
    }

    fn record_path(&self, id: u32) -> Option<PathBuf> {
        match self.storage {
            StorageClass::Local => self.root().map(|root| local_record_path(root, id)),
            StorageClass::Host => self
                .persist_dir
                .as_ref()
                .map(|dir| host_record_path(dir, &self.config.name, id)),
        }
    }

    fn persist(&self, id: u32) {
        let Some(entry) = self.registry.get(id) else {
            return;
        };
        // local records live next to the artifact; nothing to describe before it exists
        if self.storage == StorageClass::Local && entry.status != OperationStatus::Completed {
            return;
        }
        let Some(path) = self.record_path(id) else {
            return;
        };
        if let Err(e) = EntryRecord::from_entry(entry).write_to(&path) {
            warn!(id, path = %path.display(), error = %e, "failed to persist dump record");
        }
    }

    fn forget_record(&self, id: u32) {
        if self.storage == StorageClass::Host {
            if let Some(path) = self.record_path(id) {
                remove_quietly(&path);
            }
        }
    }
}

fn discard_preserve(root: &Path, id: u32) {
    let dir = root.join(id.to_string()).join(PRESERVE_DIR);
    if let Err(e) = std::fs::remove_dir_all(&dir) {
        debug!(path = %dir.display(), error = %e, "could not remove preserve directory");
    }
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed dump record"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove dump record"),
    }
}
