//! Command-line client for device storage.
//!
//! The binary parses arguments ([`cli`]), sets up logging ([`logging`]),
//! picks a transport, and runs exactly one storage operation per
//! invocation ([`commands`]).

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;

pub use cli::{Cli, Command, PortSpec};
pub use commands::{build_transport, execute, run};
pub use error::{CliError, CliResult};
