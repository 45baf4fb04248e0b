//! Host state and host transport abstractions.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::error::{DumpError, DumpResult};
use crate::params::CreateRequest;
use crate::types::{DumpKind, HostState};

/// Source of the managed host's state.
pub trait HostMonitor: Send + Sync {
    /// Current host state.
    fn host_state(&self) -> DumpResult<HostState>;
}

impl<T: HostMonitor + ?Sized> HostMonitor for Arc<T> {
    fn host_state(&self) -> DumpResult<HostState> {
        (**self).host_state()
    }
}

/// Host monitor holding a settable state.
///
/// The daemon updates it from its control socket; tests set it directly.
#[derive(Debug, Default)]
pub struct StaticHostMonitor {
    state: RwLock<HostState>,
}

impl StaticHostMonitor {
    /// Creates a monitor reporting `state`.
    pub fn new(state: HostState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Replaces the reported state.
    pub fn set(&self, state: HostState) {
        let mut guard = self.state.write();
        if *guard != state {
            info!(from = ?*guard, to = ?state, "host state changed");
        }
        *guard = state;
    }
}

impl HostMonitor for StaticHostMonitor {
    fn host_state(&self) -> DumpResult<HostState> {
        Ok(*self.state.read())
    }
}

/// Requests sent to the host on behalf of host-stored dumps.
///
/// Every method defaults to refusing, so a deployment without a transport
/// fails loudly instead of silently dropping requests.
pub trait HostTransport: Send + Sync {
    /// Asks the host to start collecting dump `dump_id`.
    fn request_dump(&self, kind: DumpKind, dump_id: u32, req: &CreateRequest) -> DumpResult<()> {
        let _ = (kind, dump_id, req);
        Err(DumpError::internal("method not specified"))
    }

    /// Asks the host to stream dump `source_id` to `uri`.
    fn request_offload(&self, source_id: u32, uri: &str) -> DumpResult<()> {
        let _ = (source_id, uri);
        Err(DumpError::internal("method not specified"))
    }

    /// Asks the host to delete dump `source_id`.
    fn request_delete(&self, source_id: u32, kind: DumpKind) -> DumpResult<()> {
        let _ = (source_id, kind);
        Err(DumpError::internal("method not specified"))
    }
}

impl<T: HostTransport + ?Sized> HostTransport for Arc<T> {
    fn request_dump(&self, kind: DumpKind, dump_id: u32, req: &CreateRequest) -> DumpResult<()> {
        (**self).request_dump(kind, dump_id, req)
    }

    fn request_offload(&self, source_id: u32, uri: &str) -> DumpResult<()> {
        (**self).request_offload(source_id, uri)
    }

    fn request_delete(&self, source_id: u32, kind: DumpKind) -> DumpResult<()> {
        (**self).request_delete(source_id, kind)
    }
}

/// Transport for deployments without a host link.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedHostTransport;

impl HostTransport for UnsupportedHostTransport {}
