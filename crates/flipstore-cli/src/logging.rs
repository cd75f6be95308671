//! Logging setup.
//!
//! Logs go to stderr so stdout stays clean for file contents and listings.
//! The protocol crates log through the `log` facade; the subscriber's
//! `log` bridge forwards those records here as well.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{CliError, CliResult};

/// Crates whose output the default filter lets through.
const LOG_TARGETS: &[&str] = &["flipstore", "flipstore_cli", "flipstore_protocol", "flipstore_sim"];

/// Build the filter directive for a level.
fn default_directive(level: &str) -> String {
    LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize the logging system.
///
/// `debug` selects the debug level; otherwise info. `RUST_LOG` overrides
/// both.
pub fn init_logging(debug: bool) -> CliResult<()> {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(debug)
                .with_file(debug)
                .with_line_number(debug),
        )
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_covers_all_crates() {
        assert_eq!(
            default_directive("debug"),
            "flipstore=debug,flipstore_cli=debug,flipstore_protocol=debug,flipstore_sim=debug"
        );
    }
}
