#![warn(missing_docs)]

//! bmcdump core: dump entry lifecycle, storage quota, watcher reconciliation and notify matching
//!
//! This crate holds every piece of dump bookkeeping that does not need an
//! async runtime. Helpers (packaging tools, offload handlers) and the host
//! are reached through the traits in [`helper`] and [`host`]; the daemon
//! crate supplies the process- and socket-backed implementations.

pub mod config;
pub mod entry;
pub mod error;
pub mod filename;
pub mod helper;
pub mod host;
pub mod manager;
pub mod notify;
pub mod params;
pub mod quota;
pub mod reconcile;
pub mod record;
pub mod registry;
pub mod types;

pub use config::{ManagerConfig, PackagerConfig, QuotaPolicy};
pub use entry::DumpEntry;
pub use error::{DumpError, DumpResult, ErrorKind};
pub use filename::{DumpFilenameParser, ParsedDumpFile, TimestampFormat};
pub use helper::{
    ChildTracker, DumpOffloader, DumpPackager, HelperExit, HelperOutcome, HelperPurpose,
    LaunchedHelper, OffloadRequest, PackageRequest,
};
pub use host::{HostMonitor, HostTransport, StaticHostMonitor, UnsupportedHostTransport};
pub use manager::{CreatedDump, DeleteAllReport, DumpManager};
pub use notify::{NotifyOutcome, NotifyRequest};
pub use params::{CreateParams, CreateRequest, DumpTypeRequest, ParamValue};
pub use quota::{allowed_size_kb, directory_size_kb};
pub use reconcile::{
    Artifact, RestoreScan, StorageEvent, StorageEventKind, WatchAction, WatchReconciler,
};
pub use record::{EntryRecord, RECORD_MAGIC, RECORD_SCHEMA_VERSION};
pub use registry::Registry;
pub use types::{
    BmcDumpType, Capabilities, DeleteRoute, DumpKind, HostRequirement, HostState, OffloadRoute,
    OperationStatus, OriginatorType, StorageClass, INVALID_SOURCE_ID,
};
