//! Storage protocol session.
//!
//! A session owns one transport and one line buffer and drives the strictly
//! half-duplex command/response cycle:
//!
//! ```text
//! Idle -> CommandSent -> AwaitingResponseLine
//!      -> (ErrorReported | AwaitingDataMarker -> DataExchange)
//!      -> AwaitingPrompt -> Idle
//! ```
//!
//! Every operation starts and ends with the device sitting at its prompt.
//! Device-reported failures are drained up to the prompt before being
//! returned, so the session stays usable after a `StorageError::Device`.

use std::io::{self, Read, Write};

use bytes::Bytes;
use log::{debug, trace, warn};

use crate::commands::Command;
use crate::config::SessionConfig;
use crate::constants::{CLI_EOL, CLI_PROMPT, CLI_SOH, READY_ACK, READY_MARKER, READY_QUERY_MARKER};
use crate::error::{StorageError, StorageResult};
use crate::line_buffer::LineBuffer;
use crate::path::normalize;
use crate::progress::{Direction, TransferProgress};
use crate::responses::{
    classify, error_report, parse_size_report, split_lines, Line, Listing, StatInfo,
};
use crate::transport::Transport;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport not open.
    Closed,
    /// Transport open and the device is at its prompt.
    Ready,
}

/// A session with the device's storage CLI.
///
/// Only one command may be outstanding at a time; callers sharing a session
/// across threads must serialize access themselves.
pub struct StorageSession<T: Transport> {
    transport: T,
    lines: LineBuffer,
    config: SessionConfig,
    state: SessionState,
}

impl<T: Transport> StorageSession<T> {
    /// Create a closed session over `transport`.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        StorageSession {
            transport,
            lines: LineBuffer::new(),
            config,
            state: SessionState::Closed,
        }
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session is open and ready for commands.
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Get the configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get the underlying transport mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open the transport and wait for the device prompt.
    ///
    /// If the handshake fails the transport is closed again before the
    /// error is returned.
    pub fn open(&mut self) -> StorageResult<()> {
        if self.is_open() {
            return Ok(());
        }

        self.transport.open()?;
        self.lines.clear();

        if let Err(e) = self.send_and_wait_prompt([CLI_SOH]) {
            let _ = self.transport.close();
            return Err(e);
        }

        debug!("Session ready");
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Close the transport. Safe to call on a closed session.
    pub fn close(&mut self) -> StorageResult<()> {
        self.state = SessionState::Closed;
        self.lines.clear();
        self.transport.close()?;
        Ok(())
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StorageError::NotOpen)
        }
    }

    // ========================================================================
    // Command primitives
    // ========================================================================

    fn send(&mut self, data: &[u8]) -> StorageResult<()> {
        self.transport.write_all(data)?;
        Ok(())
    }

    /// Write `line`, then read one record terminated by `\r\n`.
    ///
    /// For commands this record is the device's echo of the command line.
    pub fn send_and_wait_eol(&mut self, line: impl AsRef<[u8]>) -> StorageResult<Bytes> {
        self.send(line.as_ref())?;
        self.read_line()
    }

    /// Write `line`, then read everything up to the next prompt marker.
    pub fn send_and_wait_prompt(&mut self, line: impl AsRef<[u8]>) -> StorageResult<Bytes> {
        self.send(line.as_ref())?;
        self.wait_prompt()
    }

    fn send_command(&mut self, command: &Command) -> StorageResult<Bytes> {
        debug!("-> {}", command.to_command_string());
        self.send_and_wait_eol(command.encode())
    }

    fn read_line(&mut self) -> StorageResult<Bytes> {
        Ok(self.lines.until(&mut self.transport, CLI_EOL, true)?)
    }

    fn read_classified_line(&mut self) -> StorageResult<Line> {
        let line = self.read_line()?;
        Ok(classify(&String::from_utf8_lossy(&line)))
    }

    fn wait_prompt(&mut self) -> StorageResult<Bytes> {
        Ok(self.lines.until(&mut self.transport, CLI_PROMPT, true)?)
    }

    /// Drain to the prompt, failing if an error line was printed before it.
    ///
    /// The prompt is always consumed, so the session stays synchronized.
    fn wait_prompt_checked(&mut self) -> StorageResult<()> {
        let raw = self.wait_prompt()?;
        let report = split_lines(&raw)
            .find_map(|line| error_report(&String::from_utf8_lossy(line)));
        match report {
            Some(report) => {
                debug!("<- error before prompt: {}", report);
                Err(StorageError::Device(report))
            }
            None => Ok(()),
        }
    }

    /// Send a single-line query: echo, one response line, drain to prompt.
    ///
    /// The prompt is drained even when the line is an error, so the next
    /// command starts from a synchronized state.
    fn query(&mut self, command: Command) -> StorageResult<Line> {
        self.ensure_open()?;
        self.send_command(&command)?;
        let line = self.read_classified_line()?;
        self.wait_prompt()?;
        if let Line::Error(report) = &line {
            debug!("<- error: {}", report);
        }
        Ok(line)
    }

    // ========================================================================
    // Single-line queries
    // ========================================================================

    /// Check whether a path exists. A device error means "no".
    pub fn exist(&mut self, path: &str) -> StorageResult<bool> {
        let line = self.query(Command::Stat {
            path: path.to_string(),
        })?;
        Ok(!line.is_error())
    }

    /// Check whether a path exists and is a directory.
    pub fn exist_dir(&mut self, path: &str) -> StorageResult<bool> {
        match self.stat(path) {
            Ok(info) => Ok(info.is_dir()),
            Err(StorageError::Device(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Check whether a path exists and is a regular file.
    pub fn exist_file(&mut self, path: &str) -> StorageResult<bool> {
        match self.stat(path) {
            Ok(info) => Ok(info.file_size().is_some()),
            Err(StorageError::Device(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Get type and size information for a path.
    pub fn stat(&mut self, path: &str) -> StorageResult<StatInfo> {
        let text = self
            .query(Command::Stat {
                path: path.to_string(),
            })?
            .into_result()?;
        StatInfo::parse(&text)
    }

    /// Create a directory.
    pub fn mkdir(&mut self, path: &str) -> StorageResult<()> {
        self.query(Command::Mkdir {
            path: path.to_string(),
        })?
        .into_result()?;
        Ok(())
    }

    /// Remove a file or empty directory.
    pub fn remove(&mut self, path: &str) -> StorageResult<()> {
        self.query(Command::Remove {
            path: path.to_string(),
        })?
        .into_result()?;
        Ok(())
    }

    /// Rename or move a path.
    pub fn rename(&mut self, from: &str, to: &str) -> StorageResult<()> {
        self.query(Command::Rename {
            from: from.to_string(),
            to: to.to_string(),
        })?
        .into_result()?;
        Ok(())
    }

    /// Get the device-computed MD5 digest of a file as hex text.
    pub fn hash(&mut self, path: &str) -> StorageResult<String> {
        let digest = self
            .query(Command::Md5 {
                path: path.to_string(),
            })?
            .into_result()?;
        if digest.is_empty() {
            return Err(StorageError::Parse(format!(
                "empty digest for {}",
                normalize(path)
            )));
        }
        Ok(digest)
    }

    // ========================================================================
    // Listing
    // ========================================================================

    /// List the direct children of a directory.
    ///
    /// A device error is returned inside the listing rather than as `Err`,
    /// together with any entries printed before it.
    pub fn list(&mut self, path: &str) -> StorageResult<Listing> {
        self.ensure_open()?;
        self.send_command(&Command::List {
            path: path.to_string(),
        })?;
        let raw = self.wait_prompt()?;
        let listing = Listing::parse(&raw);
        if let Some(report) = &listing.error {
            debug!("<- error listing {}: {}", normalize(path), report);
        }
        Ok(listing)
    }

    // ========================================================================
    // Chunked transfers
    // ========================================================================

    /// Upload `source` to `remote_path` in fixed-size chunks.
    ///
    /// Any existing remote file is removed first (a failed removal is
    /// ignored). If the device rejects a chunk, either before `Ready` or
    /// after storing its bytes, the upload stops there and that chunk is not
    /// counted. Chunks already written stay on the device, so the remote
    /// file may be left truncated.
    ///
    /// `total_size` only drives progress reporting; a source that ends early
    /// or runs long is uploaded as read, with a warning.
    pub fn send_file<R: Read>(
        &mut self,
        source: &mut R,
        total_size: u64,
        remote_path: &str,
        mut on_progress: impl FnMut(&TransferProgress),
    ) -> StorageResult<TransferProgress> {
        self.ensure_open()?;
        let remote_path = normalize(remote_path);

        match self.remove(&remote_path) {
            Ok(()) => debug!("Removed existing {}", remote_path),
            Err(StorageError::Device(report)) => trace!("remove before upload: {}", report),
            Err(e) => return Err(e),
        }

        let chunk_size = self.config.effective_chunk_size();
        let mut progress = TransferProgress::new(Direction::Upload, total_size, chunk_size);
        let mut chunk = vec![0u8; chunk_size];

        loop {
            let size = read_chunk(source, &mut chunk).map_err(StorageError::Local)?;
            if size == 0 {
                break;
            }

            self.send_command(&Command::WriteChunk {
                path: remote_path.clone(),
                size,
            })?;
            self.wait_marker(READY_MARKER)?;

            self.send(&chunk[..size])?;
            self.wait_prompt_checked()?;

            progress.advance(size);
            on_progress(&progress);
        }

        if progress.transferred != total_size {
            warn!(
                "upload of {} declared {} bytes but the source held {}",
                remote_path, total_size, progress.transferred
            );
        }

        debug!(
            "Uploaded {} bytes to {} in {} chunks",
            progress.transferred,
            remote_path,
            progress.current_chunk()
        );
        Ok(progress)
    }

    /// Download a file and return its contents.
    pub fn read_file(
        &mut self,
        remote_path: &str,
        on_progress: impl FnMut(&TransferProgress),
    ) -> StorageResult<Vec<u8>> {
        let mut data = Vec::new();
        self.receive_file(remote_path, &mut data, on_progress)?;
        Ok(data)
    }

    /// Download a file into `sink`, returning the byte count.
    ///
    /// If `sink` fails, the rest of the transfer is still drained from the
    /// device before the error is returned, keeping the session usable.
    pub fn receive_file<W: Write>(
        &mut self,
        remote_path: &str,
        sink: &mut W,
        mut on_progress: impl FnMut(&TransferProgress),
    ) -> StorageResult<u64> {
        self.ensure_open()?;
        let remote_path = normalize(remote_path);
        let chunk_size = self.config.effective_chunk_size();

        self.send_command(&Command::ReadChunks {
            path: remote_path.clone(),
            chunk_size,
        })?;

        let size_line = match self.read_classified_line()? {
            Line::Payload(text) => text,
            Line::Error(report) => {
                self.wait_prompt()?;
                debug!("<- error reading {}: {}", remote_path, report);
                return Err(StorageError::Device(report));
            }
        };
        let total_size = parse_size_report(&size_line)?;

        let mut progress = TransferProgress::new(Direction::Download, total_size, chunk_size);
        let mut sink_error: Option<io::Error> = None;

        while progress.transferred < total_size {
            self.wait_marker(READY_QUERY_MARKER)?;
            self.send(&[READY_ACK])?;

            let wanted = (total_size - progress.transferred).min(chunk_size as u64) as usize;
            let chunk = self.lines.take(&mut self.transport, wanted)?;

            if sink_error.is_none() {
                if let Err(e) = sink.write_all(&chunk) {
                    warn!("local write failed, draining transfer: {}", e);
                    sink_error = Some(e);
                }
            }

            progress.advance(chunk.len());
            on_progress(&progress);
        }

        self.wait_prompt_checked()?;

        if let Some(e) = sink_error {
            return Err(StorageError::Local(e));
        }
        sink.flush().map_err(StorageError::Local)?;

        debug!("Downloaded {} bytes from {}", total_size, remote_path);
        Ok(total_size)
    }

    /// Read lines until `marker` arrives on a line of its own.
    ///
    /// An error line aborts the wait; the prompt is drained first.
    fn wait_marker(&mut self, marker: &str) -> StorageResult<()> {
        loop {
            match self.read_classified_line()? {
                Line::Payload(text) if text == marker => return Ok(()),
                Line::Payload(text) => trace!("waiting for {:?}, skipped {:?}", marker, text),
                Line::Error(report) => {
                    self.wait_prompt()?;
                    debug!("<- error while waiting for {:?}: {}", marker, report);
                    return Err(StorageError::Device(report));
                }
            }
        }
    }
}

impl<T: Transport> Drop for StorageSession<T> {
    fn drop(&mut self) {
        if self.is_open() {
            let _ = self.close();
        }
    }
}

/// Fill `buf` from `source`, stopping early only at end of input.
fn read_chunk<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Open a session, run `f`, and close the session on every exit path.
///
/// `f` may return any error type a `StorageError` converts into. If both
/// `f` and the close fail, the error from `f` is returned.
pub fn with_session<T, R, E, F>(transport: T, config: SessionConfig, f: F) -> Result<R, E>
where
    T: Transport,
    E: From<StorageError>,
    F: FnOnce(&mut StorageSession<T>) -> Result<R, E>,
{
    let mut session = StorageSession::new(transport, config);
    session.open()?;
    let result = f(&mut session);
    let closed = session.close();
    let value = result?;
    closed?;
    Ok(value)
}
