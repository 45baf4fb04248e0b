#![warn(missing_docs)]

//! bmcdump daemon subsystem: the single-threaded event loop that owns every
//! dump manager, the helper process launcher, the filesystem watch backend,
//! the core-file watch, the JSON-lines control socket and the standalone
//! offload helper.

pub mod cli;
pub mod config;
pub mod control;
pub mod core_watch;
pub mod error;
pub mod fswatch;
pub mod offload;
pub mod protocol;
pub mod service;
pub mod supervisor;

pub use config::DaemonConfig;
pub use control::ControlServer;
pub use core_watch::CoreFileFilter;
pub use error::{DaemonError, DaemonResult};
pub use fswatch::{map_notify_event, NotifyWatchBackend, WatchBackend};
pub use offload::{offload_file, Destination};
pub use protocol::{ControlRequest, ControlResponse, ListedEntry, ResponseBody};
pub use service::{build_managers, DumpService, ServiceEvent, ServiceEvents, ServiceHandle};
pub use supervisor::{outcome_from_status, ProcessOffloader, ProcessPackager};
