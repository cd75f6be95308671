//! Storage commands understood by the device CLI.
//!
//! Every command is a single text line of the form
//! `storage <verb> "<path>" [args]` terminated with `\r`. Paths are quoted
//! so names containing spaces survive the device's argument splitter.

use crate::constants::CMD_TERMINATOR;
use crate::path::normalize;

/// Commands that can be sent to the storage CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List the direct children of a directory.
    List {
        /// Directory to list.
        path: String,
    },

    /// Remove a file or an empty directory.
    Remove {
        /// Path to remove.
        path: String,
    },

    /// Create a directory.
    Mkdir {
        /// Directory to create.
        path: String,
    },

    /// Compute the MD5 digest of a file.
    Md5 {
        /// File to hash.
        path: String,
    },

    /// Report the type and size of a path.
    Stat {
        /// Path to inspect.
        path: String,
    },

    /// Move or rename a file or directory.
    Rename {
        /// Existing path.
        from: String,
        /// New path.
        to: String,
    },

    /// Append one raw chunk to a file.
    ///
    /// The device answers `Ready`, then expects exactly `size` raw bytes.
    WriteChunk {
        /// File to append to.
        path: String,
        /// Number of raw bytes that will follow.
        size: usize,
    },

    /// Stream a file back in chunks.
    ///
    /// The device reports the total size, then gates each chunk on a
    /// `Ready?` / `y` exchange.
    ReadChunks {
        /// File to read.
        path: String,
        /// Bytes per chunk.
        chunk_size: usize,
    },
}

impl Command {
    /// Encode the command as a line to send to the device.
    /// Returns the bytes to send (including the `\r` terminator).
    pub fn encode(&self) -> Vec<u8> {
        encode_command(&self.to_command_string())
    }

    /// Get the command string without the terminator.
    pub fn to_command_string(&self) -> String {
        match self {
            Command::List { path } => format!("storage list \"{}\"", normalize(path)),
            Command::Remove { path } => format!("storage remove \"{}\"", normalize(path)),
            Command::Mkdir { path } => format!("storage mkdir \"{}\"", normalize(path)),
            Command::Md5 { path } => format!("storage md5 \"{}\"", normalize(path)),
            Command::Stat { path } => format!("storage stat \"{}\"", normalize(path)),
            Command::Rename { from, to } => {
                format!("storage rename \"{}\" \"{}\"", normalize(from), normalize(to))
            }
            Command::WriteChunk { path, size } => {
                format!("storage write_chunk \"{}\" {}", normalize(path), size)
            }
            Command::ReadChunks { path, chunk_size } => {
                format!("storage read_chunks \"{}\" {}", normalize(path), chunk_size)
            }
        }
    }
}

/// Append the command terminator to a command line.
pub fn encode_command(cmd: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(cmd.len() + 1);
    buf.extend_from_slice(cmd.as_bytes());
    buf.push(CMD_TERMINATOR);
    buf
}
