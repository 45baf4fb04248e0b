//! Error types for the dump subsystem.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for dump operations.
pub type DumpResult<T> = Result<T, DumpError>;

/// Caller-visible error category.
///
/// Synchronous callers (create, delete, offload) branch on this rather than
/// on the concrete [`DumpError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No space left for a new dump.
    QuotaExceeded,
    /// A conflicting operation is in flight.
    Unavailable,
    /// The host is not in a state that permits the request.
    NotAllowed,
    /// Malformed request input.
    InvalidArgument,
    /// A helper or the filesystem failed underneath the request.
    InternalFailure,
    /// The referenced dump entry does not exist.
    NotFound,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::QuotaExceeded => "QuotaExceeded",
            ErrorKind::Unavailable => "Unavailable",
            ErrorKind::NotAllowed => "NotAllowed",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::InternalFailure => "InternalFailure",
            ErrorKind::NotFound => "NotFound",
        };
        f.write_str(name)
    }
}

/// Error variants for dump operations.
#[derive(Debug, Error)]
pub enum DumpError {
    /// Not enough space for a new dump and rotation could not free any.
    #[error("Not enough space: {reason}")]
    QuotaExceeded {
        /// Description of the shortfall.
        reason: String,
    },

    /// A conflicting operation is already in progress.
    #[error("Unavailable: {reason}")]
    Unavailable {
        /// What is in the way.
        reason: String,
    },

    /// Host state does not permit the request.
    #[error("Not allowed: {reason}")]
    NotAllowed {
        /// Why the request was refused.
        reason: String,
    },

    /// A create parameter had the wrong type or an unrecognized value.
    #[error("Invalid argument {name}: {value}")]
    InvalidArgument {
        /// Parameter name.
        name: String,
        /// Offending value, or a placeholder when the value is secret.
        value: String,
    },

    /// Spawning or talking to a helper failed.
    #[error("Internal failure: {reason}")]
    InternalFailure {
        /// Description of the failure.
        reason: String,
    },

    /// No entry with this id is registered.
    #[error("Dump entry not found: {id}")]
    NotFound {
        /// The dump id that was looked up.
        id: u32,
    },

    /// Wraps standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted entry record could not be encoded or decoded.
    #[error("Record error: {reason}")]
    Record {
        /// Description of the problem.
        reason: String,
    },

    /// Configuration is unusable.
    #[error("Configuration error: {reason}")]
    Config {
        /// Description of the problem.
        reason: String,
    },
}

impl DumpError {
    /// Returns the caller-visible category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DumpError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            DumpError::Unavailable { .. } => ErrorKind::Unavailable,
            DumpError::NotAllowed { .. } => ErrorKind::NotAllowed,
            DumpError::InvalidArgument { .. } | DumpError::Config { .. } => {
                ErrorKind::InvalidArgument
            }
            DumpError::NotFound { .. } => ErrorKind::NotFound,
            DumpError::InternalFailure { .. } | DumpError::Io(_) | DumpError::Record { .. } => {
                ErrorKind::InternalFailure
            }
        }
    }

    /// Shorthand for [`DumpError::Unavailable`].
    pub fn unavailable(reason: impl Into<String>) -> Self {
        DumpError::Unavailable {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`DumpError::NotAllowed`].
    pub fn not_allowed(reason: impl Into<String>) -> Self {
        DumpError::NotAllowed {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`DumpError::InternalFailure`].
    pub fn internal(reason: impl Into<String>) -> Self {
        DumpError::InternalFailure {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`DumpError::InvalidArgument`].
    pub fn invalid_argument(name: impl Into<String>, value: impl Into<String>) -> Self {
        DumpError::InvalidArgument {
            name: name.into(),
            value: value.into(),
        }
    }
}
