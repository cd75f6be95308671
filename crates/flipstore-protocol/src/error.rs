//! Error types for the storage protocol.

use std::fmt;
use std::io;

use thiserror::Error;

/// A failure reported by the device on its ordinary response channel.
///
/// The device has no separate error channel: a line containing
/// `Storage error` replaces whatever payload the command would have
/// produced, and the human-readable text follows the first `": "`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    /// Message text extracted from the error line.
    pub message: String,
}

impl ErrorReport {
    /// Create a report from a message.
    pub fn new(message: impl Into<String>) -> Self {
        ErrorReport {
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Errors that can occur while talking to the device.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The byte stream failed (open, read or write). The session is no
    /// longer trustworthy and should be closed.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// The device reported a failure for the current command. The session
    /// is still synchronized and may be used for further commands.
    #[error("device error: {0}")]
    Device(ErrorReport),

    /// A response line did not have the expected shape.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// An operation was attempted on a session that is not open.
    #[error("session is not open")]
    NotOpen,

    /// A host-side reader or writer failed during a transfer.
    #[error("local I/O error: {0}")]
    Local(#[source] io::Error),
}

impl StorageError {
    /// Whether this error leaves the session usable for further commands.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StorageError::Device(_) | StorageError::Local(_)
        )
    }

    /// Get the device report if this is a device-reported failure.
    pub fn as_device_report(&self) -> Option<&ErrorReport> {
        match self {
            StorageError::Device(report) => Some(report),
            _ => None,
        }
    }
}

impl From<ErrorReport> for StorageError {
    fn from(report: ErrorReport) -> Self {
        StorageError::Device(report)
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
