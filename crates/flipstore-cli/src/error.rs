//! Error types for the command-line client.

use std::io;
use std::path::PathBuf;

use flipstore_protocol::StorageError;
use thiserror::Error;

/// Errors that end a `flipstore` invocation.
#[derive(Debug, Error)]
pub enum CliError {
    /// The storage session failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The configuration file could not be read.
    #[error("failed to read config {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid YAML for a session config.
    #[error("invalid config {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A host file could not be opened or created.
    #[error("{}: {source}", .path.display())]
    LocalFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing to stdout failed.
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),

    /// Writing JSON output failed.
    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The requested port type was not compiled in.
    #[error("unsupported port {0}: {1}")]
    UnsupportedPort(String, &'static str),

    /// The logging subscriber could not be installed.
    #[error("failed to initialize logging: {0}")]
    Logging(String),
}

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;
