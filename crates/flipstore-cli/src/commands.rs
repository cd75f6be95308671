//! Subcommand execution.
//!
//! Each invocation opens one session, runs exactly one storage operation
//! and closes the session again, whatever the outcome.

use std::fmt::Display;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use flipstore_protocol::{
    measure, with_session, EntryKind, SessionConfig, StatInfo, StorageSession, TcpTransport,
    TransferProgress, Transport, TreeEntry, TreeEvent,
};
use flipstore_sim::SimulatedDevice;
use tracing::{debug, info, warn};

use crate::cli::{Cli, Command, PortSpec};
use crate::error::{CliError, CliResult};

/// Seed for the `sim` port's output fragmentation.
const SIM_SEED: u64 = 0x5eed;

/// Run the command line: build the transport, then execute in a session.
pub fn run(cli: &Cli) -> CliResult<()> {
    let config = cli.session_config()?;
    debug!(?config, "session config");

    let transport = build_transport(&cli.port, &config)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    with_session(transport, config, |session| {
        execute(session, &cli.command, &mut out)
    })
}

/// Create the transport for a port. Nothing is opened yet.
pub fn build_transport(port: &PortSpec, config: &SessionConfig) -> CliResult<Box<dyn Transport>> {
    match port {
        PortSpec::Serial(name) => serial_transport(name, config),
        PortSpec::Tcp(address) => Ok(Box::new(TcpTransport::new(
            address.clone(),
            config.read_timeout(),
        ))),
        PortSpec::Sim => Ok(Box::new(SimulatedDevice::new(SIM_SEED))),
    }
}

#[cfg(feature = "serial")]
fn serial_transport(name: &str, config: &SessionConfig) -> CliResult<Box<dyn Transport>> {
    Ok(Box::new(flipstore_protocol::SerialTransport::new(
        name,
        config.baud_rate,
        config.read_timeout(),
    )))
}

#[cfg(not(feature = "serial"))]
fn serial_transport(name: &str, _config: &SessionConfig) -> CliResult<Box<dyn Transport>> {
    Err(CliError::UnsupportedPort(
        name.to_string(),
        "built without serial support",
    ))
}

/// Execute one subcommand on an open session, writing results to `out`.
pub fn execute<T: Transport, W: Write>(
    session: &mut StorageSession<T>,
    command: &Command,
    out: &mut W,
) -> CliResult<()> {
    let path = command.flipper_path();

    match command {
        Command::Mkdir(_) => {
            debug!(path, "creating directory");
            session.mkdir(path)?;
        }
        Command::Remove(_) => {
            debug!(path, "removing");
            session.remove(path)?;
        }
        Command::Read(_) => {
            let mut progress = ProgressLine::default();
            let timed = measure("read", || session.read_file(path, |p| progress.update(p)));
            progress.finish();
            let elapsed_ms = timed.elapsed_ms();
            let data = timed.value?;
            info!(path, bytes = data.len(), elapsed_ms, "read complete");
            out.write_all(&data).map_err(CliError::Output)?;
            out.flush().map_err(CliError::Output)?;
        }
        Command::Receive(args) => {
            let file = File::create(&args.local_path).map_err(|source| CliError::LocalFile {
                path: args.local_path.clone(),
                source,
            })?;
            let mut sink = BufWriter::new(file);
            let mut progress = ProgressLine::default();
            let timed = measure("receive", || {
                session.receive_file(path, &mut sink, |p| progress.update(p))
            });
            progress.finish();
            let elapsed_ms = timed.elapsed_ms();
            drop(sink);
            match timed.value {
                Ok(bytes) => info!(
                    from = path,
                    to = %args.local_path.display(),
                    bytes,
                    elapsed_ms,
                    "receive complete"
                ),
                Err(e) => {
                    discard_partial(&args.local_path);
                    return Err(e.into());
                }
            }
        }
        Command::Send(args) => {
            let local = |source| CliError::LocalFile {
                path: args.local_path.clone(),
                source,
            };
            let file = File::open(&args.local_path).map_err(local)?;
            let size = file.metadata().map_err(local)?.len();
            let mut source = BufReader::new(file);
            let mut progress = ProgressLine::default();
            let timed = measure("send", || {
                session.send_file(&mut source, size, path, |p| progress.update(p))
            });
            progress.finish();
            let elapsed_ms = timed.elapsed_ms();
            let transfer = timed.value?;
            info!(
                from = %args.local_path.display(),
                to = path,
                bytes = transfer.transferred,
                chunks = transfer.current_chunk(),
                elapsed_ms,
                "send complete"
            );
        }
        Command::List(args) => list_tree(session, path, args.json, out)?,
        Command::Hash(_) => {
            let digest = session.hash(path)?;
            emit(out, digest)?;
        }
        Command::Exist(_) => {
            let exists = session.exist(path)?;
            emit(out, exists)?;
        }
        Command::Stat(_) => {
            let info = session.stat(path)?;
            emit(out, describe_stat(&info))?;
        }
    }

    Ok(())
}

/// Walk the tree under `root` and print it.
///
/// Directories that cannot be listed are reported inline and do not fail
/// the command; a transport failure does.
fn list_tree<T: Transport, W: Write>(
    session: &mut StorageSession<T>,
    root: &str,
    json: bool,
    out: &mut W,
) -> CliResult<()> {
    let mut unlisted = 0usize;

    for event in session.walk(root) {
        match event {
            TreeEvent::Entry(entry) => {
                if json {
                    emit(out, serde_json::to_string(&entry)?)?;
                } else {
                    emit(out, format!("{}{}", indent(entry.depth), describe_entry(&entry)))?;
                }
            }
            TreeEvent::Error {
                path,
                depth,
                report,
            } => {
                unlisted += 1;
                warn!(path = %path, "cannot list: {}", report);
                if json {
                    let value = serde_json::json!({
                        "path": path,
                        "depth": depth,
                        "error": report.message,
                    });
                    emit(out, value)?;
                } else {
                    emit(out, format!("{}Error: {}", indent(depth), report))?;
                }
            }
            TreeEvent::Failed(e) => return Err(e.into()),
        }
    }

    if unlisted > 0 {
        warn!(unlisted, "some directories could not be listed");
    }
    Ok(())
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

/// Text form of a tree entry: `/name` for directories, `name, size N` for files.
fn describe_entry(entry: &TreeEntry) -> String {
    match (entry.kind, entry.size) {
        (EntryKind::Directory, _) => format!("/{}", entry.name()),
        (EntryKind::File, Some(size)) => format!("{}, size {}", entry.name(), size),
        (EntryKind::File, None) => entry.name().to_string(),
    }
}

fn describe_stat(info: &StatInfo) -> String {
    match info {
        StatInfo::File { size } => format!("file, {} bytes", size),
        StatInfo::Directory => "directory".to_string(),
        StatInfo::Storage { description } => format!("storage, {}", description),
    }
}

fn emit<W: Write>(out: &mut W, line: impl Display) -> CliResult<()> {
    writeln!(out, "{}", line).map_err(CliError::Output)
}

/// Remove a local file left incomplete by a failed download.
fn discard_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => warn!(path = %path.display(), "removed incomplete download"),
        Err(e) => warn!(path = %path.display(), "could not remove incomplete download: {}", e),
    }
}

/// `NN%, chunk i of n` progress line on stderr, redrawn in place.
#[derive(Default)]
struct ProgressLine {
    shown: bool,
}

impl ProgressLine {
    fn update(&mut self, progress: &TransferProgress) {
        eprint!(
            "\r{}%, chunk {} of {}",
            progress.percent(),
            progress.current_chunk(),
            progress.total_chunks()
        );
        self.shown = true;
    }

    fn finish(self) {
        if self.shown {
            eprintln!();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_entry() {
        let file = TreeEntry {
            path: "/ext/a b.txt".to_string(),
            kind: EntryKind::File,
            size: Some(12),
            depth: 1,
        };
        let dir = TreeEntry {
            path: "/ext/apps".to_string(),
            kind: EntryKind::Directory,
            size: None,
            depth: 0,
        };
        assert_eq!(describe_entry(&file), "a b.txt, size 12");
        assert_eq!(describe_entry(&dir), "/apps");
        assert_eq!(indent(2), "    ");
    }

    #[test]
    fn test_describe_stat() {
        assert_eq!(describe_stat(&StatInfo::File { size: 3 }), "file, 3 bytes");
        assert_eq!(describe_stat(&StatInfo::Directory), "directory");
    }

    #[test]
    fn test_sim_port_builds_transport() {
        let config = SessionConfig::default();
        let mut transport = build_transport(&PortSpec::Sim, &config).unwrap();
        assert!(transport.open().is_ok());
        assert!(transport.close().is_ok());
    }
}
