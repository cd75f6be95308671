//! flipstore binary entry point.

use clap::Parser;
use tracing::{debug, error};

use flipstore_cli::{logging, run, Cli};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(cli.debug) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    debug!(version = env!("CARGO_PKG_VERSION"), port = %cli.port, "flipstore starting");

    if let Err(e) = run(&cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}
