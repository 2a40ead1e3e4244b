//! Resource probing.
//!
//! The controller and the strategy selector never talk to the operating
//! system directly; they read through a [`ResourceProbe`]. Two probes ship
//! with the crate:
//!
//! - [`SysinfoProbe`]: live readings via `sysinfo`. Process CPU usage is
//!   derived by `sysinfo` from successive CPU-time deltas, so the first
//!   reading after construction reports 0.
//! - [`StaticProbe`]: fixed, externally adjustable readings. Useful when
//!   the host already tracks memory pressure, and in tests.

mod probe;

pub use probe::{ResourceProbe, StaticProbe, SysinfoProbe};
