//! Command-line argument parsing.

use std::fmt;
use std::fs;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use flipstore_protocol::SessionConfig;

use crate::error::{CliError, CliResult};

/// Port value selecting the built-in simulated device.
pub const SIM_PORT: &str = "sim";

/// Prefix selecting a UART bridged over TCP.
pub const TCP_PORT_PREFIX: &str = "tcp:";

/// flipstore - manage files on a device over its storage CLI.
#[derive(Debug, Parser)]
#[command(
    name = "flipstore",
    version,
    about = "Manage files on a device over its storage CLI"
)]
pub struct Cli {
    /// Serial port, `tcp:<host>:<port>`, or `sim`
    #[arg(short = 'p', long = "port", value_name = "PORT", value_parser = parse_port)]
    pub port: PortSpec,

    /// Enable debug logging
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// Session configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Serial baud rate (overrides the config file)
    #[arg(long = "baud", value_name = "N")]
    pub baud: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Build the session configuration from `--config` and `--baud`.
    pub fn session_config(&self) -> CliResult<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
                    path: path.clone(),
                    source,
                })?;
                serde_yaml::from_str(&text).map_err(|source| CliError::ConfigParse {
                    path: path.clone(),
                    source,
                })?
            }
            None => SessionConfig::default(),
        };
        if let Some(baud) = self.baud {
            config.baud_rate = baud;
        }
        Ok(config)
    }
}

/// Storage operations, one per invocation.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a directory
    Mkdir(RemoteArgs),
    /// Remove a file or empty directory
    Remove(RemoteArgs),
    /// Print a file's contents to stdout
    Read(RemoteArgs),
    /// Download a file to the host
    Receive(TransferArgs),
    /// Upload a host file
    Send(TransferArgs),
    /// List a directory tree
    List(ListArgs),
    /// Print a file's MD5 digest as computed by the device
    Hash(RemoteArgs),
    /// Report whether a path exists
    Exist(RemoteArgs),
    /// Show type and size of a path
    Stat(RemoteArgs),
}

impl Command {
    /// Get the device path the command operates on.
    pub fn flipper_path(&self) -> &str {
        match self {
            Command::Mkdir(args)
            | Command::Remove(args)
            | Command::Read(args)
            | Command::Hash(args)
            | Command::Exist(args)
            | Command::Stat(args) => &args.flipper_path,
            Command::Receive(args) | Command::Send(args) => &args.flipper_path,
            Command::List(args) => &args.flipper_path,
        }
    }
}

/// Arguments naming a single device path.
#[derive(Debug, Args)]
pub struct RemoteArgs {
    /// Path on the device
    #[arg(short = 'f', long = "flipper-path", value_name = "PATH")]
    pub flipper_path: String,
}

/// Arguments for transfers between host and device.
#[derive(Debug, Args)]
pub struct TransferArgs {
    /// Path on the device
    #[arg(short = 'f', long = "flipper-path", value_name = "PATH")]
    pub flipper_path: String,

    /// Path on the host
    #[arg(short = 'l', long = "local-path", value_name = "PATH")]
    pub local_path: PathBuf,
}

/// Arguments for `list`.
#[derive(Debug, Args)]
pub struct ListArgs {
    /// Directory on the device
    #[arg(short = 'f', long = "flipper-path", value_name = "PATH", default_value = "/")]
    pub flipper_path: String,

    /// Print one JSON object per line instead of an indented tree
    #[arg(long = "json")]
    pub json: bool,
}

/// Where the device is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    /// A serial port by name (`/dev/ttyACM0`, `COM3`).
    Serial(String),
    /// A UART bridged over TCP, as `host:port`.
    Tcp(String),
    /// The built-in simulated device.
    Sim,
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::Serial(name) => write!(f, "{}", name),
            PortSpec::Tcp(address) => write!(f, "{}{}", TCP_PORT_PREFIX, address),
            PortSpec::Sim => write!(f, "{}", SIM_PORT),
        }
    }
}

/// Parse a `--port` value.
pub fn parse_port(s: &str) -> Result<PortSpec, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("port must not be empty".to_string());
    }
    if s == SIM_PORT {
        return Ok(PortSpec::Sim);
    }
    if let Some(address) = s.strip_prefix(TCP_PORT_PREFIX) {
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| format!("expected tcp:<host>:<port>, got {}", s))?;
        if host.is_empty() {
            return Err(format!("missing host in {}", s));
        }
        if port.parse::<u16>().is_err() {
            return Err(format!("invalid TCP port: {}", port));
        }
        return Ok(PortSpec::Tcp(address.to_string()));
    }
    Ok(PortSpec::Serial(s.to_string()))
}
