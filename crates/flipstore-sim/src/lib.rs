//! Simulated storage device.
//!
//! [`SimulatedDevice`] implements [`flipstore_protocol::Transport`] and
//! answers the storage CLI from an in-memory tree ([`SimFs`]). It is used by
//! the protocol integration tests and by the CLI's `--port sim` mode, so the
//! whole stack can be exercised without hardware.
//!
//! Output is returned in seeded, pseudo-random fragment sizes, and faults
//! can be injected:
//!
//! - [`SimulatedDevice::fail_writes_after`] rejects chunks after a count
//! - [`SimulatedDevice::fail_listing`] makes one directory's listing fail
//! - [`SimulatedDevice::insert_unreadable_file`] prints a name that is not text

mod device;
mod fs;

pub use device::*;
pub use fs::*;
