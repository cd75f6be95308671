//! Protocol constants for the storage CLI.
//!
//! These values are fixed by the device firmware; changing any of them
//! breaks compatibility with real hardware.

/// Start-of-heading byte that wakes the device CLI and requests a prompt.
pub const CLI_SOH: u8 = 0x01;

/// Prompt marker printed when the CLI is ready for the next command.
pub const CLI_PROMPT: &[u8] = b">: ";

/// End-of-line sequence used by the device for all response lines.
pub const CLI_EOL: &[u8] = b"\r\n";

/// Terminator appended to every command sent to the device.
pub const CMD_TERMINATOR: u8 = b'\r';

/// Substring that marks a response line as a device-reported failure.
pub const STORAGE_ERROR_MARKER: &str = "Storage error";

/// Separator between a label and its value in response lines.
pub const FIELD_SEPARATOR: &str = ": ";

/// Line sent by the device before it accepts a raw upload chunk.
pub const READY_MARKER: &str = "Ready";

/// Line sent by the device before it streams a raw download chunk.
pub const READY_QUERY_MARKER: &str = "Ready?";

/// Byte the host answers `Ready?` with (no terminator).
pub const READY_ACK: u8 = b'y';

/// Listing line for a directory with no children.
pub const EMPTY_LISTING: &str = "Empty";

/// Listing tag for a directory entry.
pub const DIR_TAG: &str = "[D]";

/// Listing tag for a file entry.
pub const FILE_TAG: &str = "[F]";

/// Default chunk size for uploads and downloads.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default per-poll read timeout in milliseconds.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 2_000;
