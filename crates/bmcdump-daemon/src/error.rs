//! Error types for the bmcdump daemon.

use bmcdump_core::{DumpError, ErrorKind};
use thiserror::Error;

/// Result type alias for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Errors raised by the daemon outside the dump managers themselves.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// A dump manager rejected or failed the request.
    #[error(transparent)]
    Dump(#[from] DumpError),

    /// The daemon configuration is unusable.
    #[error("Configuration error: {reason}")]
    Config {
        /// What is wrong.
        reason: String,
    },

    /// No configured manager has this name.
    #[error("Unknown dump manager: {name}")]
    UnknownManager {
        /// Requested manager name.
        name: String,
    },

    /// A filesystem watch could not be added or removed.
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// A control message could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] serde_json::Error),

    /// The event loop has stopped and no longer accepts input.
    #[error("Dump service stopped")]
    ServiceStopped,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    /// Error category reported to control clients.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DaemonError::Dump(e) => e.kind(),
            DaemonError::Config { .. }
            | DaemonError::UnknownManager { .. }
            | DaemonError::Protocol(_) => ErrorKind::InvalidArgument,
            DaemonError::ServiceStopped => ErrorKind::Unavailable,
            DaemonError::Watch(_) | DaemonError::Io(_) => ErrorKind::InternalFailure,
        }
    }
}
