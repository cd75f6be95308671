//! Flipper Storage CLI Protocol
//!
//! This crate implements the host side of the storage commands exposed by
//! Flipper-style firmware on its serial CLI. The device speaks plain text:
//! the host types a command, the device echoes it and prints its answer,
//! then prints a `>: ` prompt when it is ready for the next one.
//!
//! # Protocol Overview
//!
//! - **Session start**: the host sends `0x01`; the device answers with its prompt
//! - **Commands** (host → device): `storage <verb> "<path>" [args]` terminated with `\r`
//! - **Responses** (device → host): lines terminated with `\r\n`, then `>: `
//! - **Errors**: any line containing `Storage error`, message after the first `": "`
//! - **Uploads**: `write_chunk` → `Ready` → raw bytes → prompt, once per chunk
//! - **Downloads**: `read_chunks` → `Size: N` → (`Ready?` → `y` → raw bytes) per chunk
//!
//! There is no length-prefixed envelope: framing relies entirely on the
//! delimiters above, which is why the [`LineBuffer`] keeps every byte it has
//! read until a caller consumes it.
//!
//! # Example
//!
//! ```rust,ignore
//! use flipstore_protocol::{with_session, SerialTransport, SessionConfig};
//!
//! let config = SessionConfig::default();
//! let transport = SerialTransport::new("/dev/ttyACM0", config.baud_rate, config.read_timeout());
//! let digest = with_session(transport, config, |session| {
//!     session.mkdir("/ext/apps_data/demo")?;
//!     session.hash("/ext/apps_data/demo/config.txt")
//! })?;
//! ```

mod commands;
mod config;
mod constants;
mod error;
mod line_buffer;
pub mod path;
mod progress;
mod responses;
#[cfg(feature = "serial")]
mod serial;
mod session;
mod timing;
mod transport;
mod tree;

pub use commands::*;
pub use config::*;
pub use constants::*;
pub use error::*;
pub use line_buffer::*;
pub use progress::*;
pub use responses::*;
#[cfg(feature = "serial")]
pub use serial::*;
pub use session::*;
pub use timing::*;
pub use transport::*;
pub use tree::*;
