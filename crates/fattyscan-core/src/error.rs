/// Error types for scan session operations.
use std::path::PathBuf;

use thiserror::Error;

use crate::session::ScanState;

/// Errors returned by the scan session and its collaborators.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A path argument was empty, relative, or outside the scanned tree.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The operation is not allowed in the session's current state.
    #[error("Cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: ScanState,
    },

    /// The walk observed a stop request. Never surfaced to callers.
    #[error("Scan cancelled")]
    Cancelled,

    /// A failure with no better classification, such as a panic caught
    /// while walking.
    #[error("Internal scan failure: {message}")]
    Internal { message: String },

    /// I/O error with path context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` for the cooperative-stop marker.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
