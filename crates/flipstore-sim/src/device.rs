//! Simulated device implementing the storage CLI over `Transport`.
//!
//! The simulator consumes host bytes exactly as the firmware CLI would:
//! command lines are echoed and executed on `\r`, upload chunks are taken
//! as raw bytes after `Ready`, and download chunks are released one `y` at a
//! time. Output is handed back in pseudo-random fragment sizes so the host's
//! reassembly is exercised on every read.

use std::collections::{BTreeSet, VecDeque};
use std::io;

use flipstore_protocol::path::{join, normalize};
use flipstore_protocol::{
    Transport, CLI_SOH, DIR_TAG, EMPTY_LISTING, FILE_TAG, READY_ACK, READY_MARKER,
    READY_QUERY_MARKER, STORAGE_ERROR_MARKER,
};
use log::trace;
use md5::{Digest, Md5};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::fs::{FsError, Node, SimFs};

/// Banner printed when the host wakes the CLI.
const BANNER: &str = "Welcome to the flipstore simulator";

/// Prompt sequence printed after every command.
const PROMPT: &[u8] = b"\r\n>: ";

/// Name bytes printed for entries registered as unreadable.
const UNREADABLE_NAME: &[u8] = &[0xff, 0xfe, 0xfd];

/// What the simulated CLI expects next from the host.
#[derive(Debug)]
enum Mode {
    /// Accumulating a command line.
    Command,
    /// Collecting raw bytes for a `write_chunk`.
    ReceivingChunk {
        path: String,
        remaining: usize,
        data: Vec<u8>,
    },
    /// Waiting for `y` before streaming the next download chunk.
    AwaitingAck {
        data: Vec<u8>,
        offset: usize,
        chunk_size: usize,
        sent: usize,
    },
}

/// An in-memory device speaking the storage CLI.
pub struct SimulatedDevice {
    fs: SimFs,
    rng: ChaCha8Rng,
    mode: Mode,
    line: Vec<u8>,
    output: VecDeque<u8>,
    open: bool,
    max_fragment: usize,
    stall_limit: usize,
    idle_polls: usize,
    fail_writes_after: Option<usize>,
    fail_stores_after: Option<usize>,
    fail_reads_after: Option<usize>,
    chunks_written: usize,
    failing_listings: BTreeSet<String>,
    unreadable: BTreeSet<String>,
    commands: Vec<String>,
}

impl SimulatedDevice {
    /// Create a device with empty `/ext` and `/int` storages.
    ///
    /// `seed` drives the output fragmentation, so runs are reproducible.
    pub fn new(seed: u64) -> Self {
        SimulatedDevice {
            fs: SimFs::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            mode: Mode::Command,
            line: Vec::new(),
            output: VecDeque::new(),
            open: false,
            max_fragment: 64,
            stall_limit: 3,
            idle_polls: 0,
            fail_writes_after: None,
            fail_stores_after: None,
            fail_reads_after: None,
            chunks_written: 0,
            failing_listings: BTreeSet::new(),
            unreadable: BTreeSet::new(),
            commands: Vec::new(),
        }
    }

    /// Set the largest fragment a single read may return.
    pub fn with_max_fragment(mut self, max_fragment: usize) -> Self {
        self.max_fragment = max_fragment.max(1);
        self
    }

    /// Set how many consecutive empty polls are tolerated before reads
    /// fail with `TimedOut`.
    pub fn with_stall_limit(mut self, stall_limit: usize) -> Self {
        self.stall_limit = stall_limit;
        self
    }

    /// Reject every `write_chunk` after `chunks` have been accepted.
    pub fn fail_writes_after(&mut self, chunks: usize) {
        self.fail_writes_after = Some(chunks);
    }

    /// Take the bytes of every chunk after `chunks` have been stored, then
    /// report a storage error instead of storing them.
    pub fn fail_stores_after(&mut self, chunks: usize) {
        self.fail_stores_after = Some(chunks);
    }

    /// End every download with a storage error once `chunks` chunks have
    /// been streamed, in place of the next `Ready?`.
    pub fn fail_reads_after(&mut self, chunks: usize) {
        self.fail_reads_after = Some(chunks);
    }

    /// Make listings of `path` end in a storage error.
    pub fn fail_listing(&mut self, path: &str) {
        self.failing_listings.insert(normalize(path));
    }

    /// Add a file whose name is printed as non-text bytes in listings.
    pub fn insert_unreadable_file(&mut self, path: &str, data: &[u8]) {
        self.fs.insert_file(path, data);
        self.unreadable.insert(normalize(path));
    }

    /// Add a file, creating parent directories.
    pub fn insert_file(&mut self, path: &str, data: &[u8]) {
        self.fs.insert_file(path, data);
    }

    /// Add a directory, creating parent directories.
    pub fn insert_dir(&mut self, path: &str) {
        self.fs.mkdir_all(path);
    }

    /// Get the backing storage tree.
    pub fn fs(&self) -> &SimFs {
        &self.fs
    }

    /// Get a file's current contents.
    pub fn file(&self, path: &str) -> Option<&[u8]> {
        self.fs.file(path)
    }

    /// Command lines received so far.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Number of `write_chunk` payloads stored so far.
    pub fn chunks_written(&self) -> usize {
        self.chunks_written
    }

    /// Whether the transport side is open.
    pub fn is_open(&self) -> bool {
        self.open
    }

    // ========================================================================
    // Output helpers
    // ========================================================================

    fn emit(&mut self, bytes: &[u8]) {
        self.output.extend(bytes.iter().copied());
    }

    fn emit_line(&mut self, text: &str) {
        self.emit(text.as_bytes());
        self.emit(b"\r\n");
    }

    fn emit_error(&mut self, error: FsError) {
        let line = format!("{}: {}", STORAGE_ERROR_MARKER, error.message());
        self.emit_line(&line);
    }

    fn emit_internal_error(&mut self) {
        self.emit_line(&format!("{}: internal error", STORAGE_ERROR_MARKER));
    }

    fn prompt(&mut self) {
        self.emit(PROMPT);
    }

    // ========================================================================
    // Input handling
    // ========================================================================

    fn feed(&mut self, byte: u8) {
        match &mut self.mode {
            Mode::Command => self.feed_command(byte),
            Mode::ReceivingChunk {
                remaining, data, ..
            } => {
                data.push(byte);
                *remaining -= 1;
                if *remaining == 0 {
                    self.finish_chunk();
                }
            }
            Mode::AwaitingAck { .. } => {
                if byte == READY_ACK {
                    self.send_next_chunk();
                }
            }
        }
    }

    fn feed_command(&mut self, byte: u8) {
        match byte {
            CLI_SOH => {
                self.line.clear();
                self.emit(b"\r\n");
                self.emit_line(BANNER);
                self.prompt();
            }
            b'\r' => {
                let line = String::from_utf8_lossy(&self.line).into_owned();
                self.line.clear();
                self.emit_line(&line);
                self.execute(&line);
            }
            b'\n' => {}
            _ => self.line.push(byte),
        }
    }

    fn finish_chunk(&mut self) {
        let Mode::ReceivingChunk { path, data, .. } =
            std::mem::replace(&mut self.mode, Mode::Command)
        else {
            return;
        };
        if matches!(self.fail_stores_after, Some(limit) if self.chunks_written >= limit) {
            self.emit_internal_error();
            self.prompt();
            return;
        }
        match self.fs.append(&path, &data) {
            Ok(()) => self.chunks_written += 1,
            Err(e) => self.emit_error(e),
        }
        self.prompt();
    }

    fn send_next_chunk(&mut self) {
        let Mode::AwaitingAck {
            data,
            offset,
            chunk_size,
            sent,
        } = std::mem::replace(&mut self.mode, Mode::Command)
        else {
            return;
        };
        let end = (offset + chunk_size).min(data.len());
        self.emit(&data[offset..end]);
        let sent = sent + 1;

        if end == data.len() {
            self.prompt();
        } else if matches!(self.fail_reads_after, Some(limit) if sent >= limit) {
            self.emit_internal_error();
            self.prompt();
        } else {
            self.emit_line(READY_QUERY_MARKER);
            self.mode = Mode::AwaitingAck {
                data,
                offset: end,
                chunk_size,
                sent,
            };
        }
    }

    // ========================================================================
    // Command execution
    // ========================================================================

    fn execute(&mut self, line: &str) {
        let args = split_args(line);
        if args.is_empty() {
            self.prompt();
            return;
        }
        self.commands.push(line.to_string());
        trace!("sim executing: {}", line);

        if args[0] != "storage" || args.len() < 3 {
            self.emit_line(&format!("`{}` command not found", args[0]));
            self.prompt();
            return;
        }

        let path = normalize(&args[2]);
        match (args[1].as_str(), args.get(3)) {
            ("list", _) => self.cmd_list(&path),
            ("remove", _) => {
                let result = self.fs.remove(&path);
                self.finish(result);
            }
            ("mkdir", _) => {
                let result = self.fs.mkdir(&path);
                self.finish(result);
            }
            ("md5", _) => self.cmd_md5(&path),
            ("stat", _) => match self.fs.stat(&path) {
                Ok(text) => {
                    self.emit_line(&text);
                    self.prompt();
                }
                Err(e) => self.finish(Err(e)),
            },
            ("rename", Some(to)) => {
                let to = normalize(to);
                let result = self.fs.rename(&path, &to);
                self.finish(result);
            }
            ("write_chunk", Some(size)) => match size.parse::<usize>() {
                Ok(size) => self.cmd_write_chunk(path, size),
                Err(_) => self.finish(Err(FsError::InvalidName)),
            },
            ("read_chunks", Some(chunk)) => match chunk.parse::<usize>() {
                Ok(chunk) if chunk > 0 => self.cmd_read_chunks(&path, chunk),
                _ => self.finish(Err(FsError::InvalidName)),
            },
            (verb, _) => {
                self.emit_line(&format!("Wrong storage command: {}", verb));
                self.prompt();
            }
        }
    }

    fn finish(&mut self, result: Result<(), FsError>) {
        if let Err(e) = result {
            self.emit_error(e);
        }
        self.prompt();
    }

    fn cmd_list(&mut self, path: &str) {
        if !self.fs.is_dir(path) {
            self.finish(Err(FsError::NotExist));
            return;
        }

        let mut listing: Vec<u8> = Vec::new();
        let children = self.fs.children(path);
        if children.is_empty() {
            listing.extend_from_slice(b"\t");
            listing.extend_from_slice(EMPTY_LISTING.as_bytes());
            listing.extend_from_slice(b"\r\n");
        }
        for (name, node) in children {
            let name_bytes = if self.unreadable.contains(&join(path, &name)) {
                UNREADABLE_NAME.to_vec()
            } else {
                name.into_bytes()
            };
            listing.push(b'\t');
            match node {
                Node::Dir => {
                    listing.extend_from_slice(DIR_TAG.as_bytes());
                    listing.push(b' ');
                    listing.extend_from_slice(&name_bytes);
                }
                Node::File(data) => {
                    listing.extend_from_slice(FILE_TAG.as_bytes());
                    listing.push(b' ');
                    listing.extend_from_slice(&name_bytes);
                    listing.extend_from_slice(format!(" {}b", data.len()).as_bytes());
                }
            }
            listing.extend_from_slice(b"\r\n");
        }

        if self.failing_listings.contains(path) {
            listing.clear();
            listing.extend_from_slice(
                format!("{}: internal error\r\n", STORAGE_ERROR_MARKER).as_bytes(),
            );
        }

        self.emit(&listing);
        self.prompt();
    }

    fn cmd_md5(&mut self, path: &str) {
        match self.fs.get(path) {
            Some(Node::File(data)) => {
                let digest = hex::encode(Md5::digest(data));
                self.emit_line(&digest);
                self.prompt();
            }
            Some(Node::Dir) => self.finish(Err(FsError::InvalidName)),
            None => self.finish(Err(FsError::NotExist)),
        }
    }

    fn cmd_write_chunk(&mut self, path: String, size: usize) {
        if let Some(limit) = self.fail_writes_after {
            if self.chunks_written >= limit {
                self.emit_internal_error();
                self.prompt();
                return;
            }
        }
        if let Err(e) = self.fs.check_writable(&path) {
            self.finish(Err(e));
            return;
        }

        self.emit_line(READY_MARKER);
        if size == 0 {
            self.prompt();
            return;
        }
        self.mode = Mode::ReceivingChunk {
            path,
            remaining: size,
            data: Vec::with_capacity(size),
        };
    }

    fn cmd_read_chunks(&mut self, path: &str, chunk_size: usize) {
        let Some(data) = self.fs.file(path).map(<[u8]>::to_vec) else {
            let error = if self.fs.is_dir(path) {
                FsError::InvalidName
            } else {
                FsError::NotExist
            };
            self.finish(Err(error));
            return;
        };

        self.emit_line(&format!("Size: {}", data.len()));
        if data.is_empty() {
            self.prompt();
            return;
        }
        self.emit_line(READY_QUERY_MARKER);
        self.mode = Mode::AwaitingAck {
            data,
            offset: 0,
            chunk_size,
            sent: 0,
        };
    }
}

impl Transport for SimulatedDevice {
    fn open(&mut self) -> io::Result<()> {
        self.open = true;
        self.mode = Mode::Command;
        self.line.clear();
        self.output.clear();
        self.idle_polls = 0;
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.open = false;
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "device not open"));
        }
        for &byte in data {
            self.feed(byte);
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "device not open"));
        }
        if self.output.is_empty() {
            self.idle_polls += 1;
            if self.idle_polls > self.stall_limit {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "device is not responding"));
            }
            return Ok(0);
        }
        self.idle_polls = 0;

        let fragment = self.rng.gen_range(1..=self.max_fragment);
        let n = buf.len().min(self.output.len()).min(fragment);
        for (slot, byte) in buf.iter_mut().zip(self.output.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "device not open"));
        }
        // Sometimes under-report, as a UART driver does between interrupts.
        if self.rng.gen_bool(0.25) {
            return Ok(0);
        }
        let len = self.output.len();
        Ok(if len == 0 { 0 } else { self.rng.gen_range(1..=len) })
    }
}

/// Split a command line into arguments, honoring double quotes.
fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            ' ' | '\t' if !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            _ => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drain everything the device has queued.
    fn drain(device: &mut SimulatedDevice) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = [0u8; 256];
        while !device.output.is_empty() {
            let n = device.read(&mut buf).unwrap();
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    fn open_device() -> SimulatedDevice {
        let mut device = SimulatedDevice::new(7);
        device.open().unwrap();
        device
    }

    #[test]
    fn test_split_args() {
        assert_eq!(
            split_args("storage write_chunk \"/ext/a b\" 12"),
            vec!["storage", "write_chunk", "/ext/a b", "12"]
        );
        assert_eq!(split_args("storage list \"\""), vec!["storage", "list", ""]);
        assert!(split_args("   ").is_empty());
    }

    #[test]
    fn test_soh_prints_prompt() {
        let mut device = open_device();
        device.write_all(&[CLI_SOH]).unwrap();
        let out = drain(&mut device);
        assert!(out.ends_with(b">: "));
    }

    #[test]
    fn test_echo_and_error() {
        let mut device = open_device();
        device.write_all(b"storage remove \"/ext/x\"\r").unwrap();
        let out = String::from_utf8(drain(&mut device)).unwrap();
        assert_eq!(
            out,
            "storage remove \"/ext/x\"\r\nStorage error: file/dir not exist\r\n\r\n>: "
        );
    }

    #[test]
    fn test_list_format() {
        let mut device = open_device();
        device.insert_file("/ext/dir/file name.txt", b"12345");
        device.insert_dir("/ext/dir/sub");
        device.write_all(b"storage list \"/ext/dir\"\r").unwrap();
        let out = String::from_utf8(drain(&mut device)).unwrap();
        assert_eq!(
            out,
            "storage list \"/ext/dir\"\r\n\t[F] file name.txt 5b\r\n\t[D] sub\r\n\r\n>: "
        );
    }

    #[test]
    fn test_write_chunk_flow() {
        let mut device = open_device();
        device.write_all(b"storage write_chunk \"/ext/f\" 3\r").unwrap();
        let out = drain(&mut device);
        assert!(out.ends_with(b"Ready\r\n"));

        device.write_all(b"abc").unwrap();
        assert_eq!(drain(&mut device), PROMPT);
        assert_eq!(device.file("/ext/f"), Some(&b"abc"[..]));
        assert_eq!(device.chunks_written(), 1);
    }

    #[test]
    fn test_read_chunks_flow() {
        let mut device = open_device();
        device.insert_file("/ext/f", b"abcdef");
        device.write_all(b"storage read_chunks \"/ext/f\" 4\r").unwrap();
        let out = String::from_utf8(drain(&mut device)).unwrap();
        assert!(out.ends_with("Size: 6\r\nReady?\r\n"));

        device.write_all(b"y").unwrap();
        assert_eq!(drain(&mut device), b"abcdReady?\r\n");
        device.write_all(b"y").unwrap();
        assert_eq!(drain(&mut device), b"ef\r\n>: ");
    }

    #[test]
    fn test_store_fault_after_chunk_bytes() {
        let mut device = open_device();
        device.fail_stores_after(0);
        device.write_all(b"storage write_chunk \"/ext/f\" 3\r").unwrap();
        assert!(drain(&mut device).ends_with(b"Ready\r\n"));

        device.write_all(b"abc").unwrap();
        assert_eq!(drain(&mut device), b"Storage error: internal error\r\n\r\n>: ");
        assert_eq!(device.file("/ext/f"), None);
        assert_eq!(device.chunks_written(), 0);
    }

    #[test]
    fn test_read_fault_replaces_ready_query() {
        let mut device = open_device();
        device.insert_file("/ext/f", b"abcdef");
        device.fail_reads_after(1);
        device.write_all(b"storage read_chunks \"/ext/f\" 4\r").unwrap();
        drain(&mut device);

        device.write_all(b"y").unwrap();
        assert_eq!(drain(&mut device), b"abcdStorage error: internal error\r\n\r\n>: ");
        device.write_all(b"y").unwrap();
        assert!(drain(&mut device).is_empty());
    }

    #[test]
    fn test_md5() {
        let mut device = open_device();
        device.insert_file("/ext/empty", b"");
        device.write_all(b"storage md5 \"/ext/empty\"\r").unwrap();
        let out = String::from_utf8(drain(&mut device)).unwrap();
        assert!(out.contains("d41d8cd98f00b204e9800998ecf8427e\r\n"));
    }

    #[test]
    fn test_stalls_after_limit() {
        let mut device = open_device();
        let mut buf = [0u8; 8];
        for _ in 0..3 {
            assert_eq!(device.read(&mut buf).unwrap(), 0);
        }
        let err = device.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_closed_device_rejects_io() {
        let mut device = SimulatedDevice::new(1);
        let err = device.write_all(b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
