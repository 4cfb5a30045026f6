//! Test environment plumbing for UniFi controller acceptance runs.
//!
//! This crate brings a controller under test to a usable state and hands out
//! the resources that tests share:
//!
//! - [`ReadinessPoller`] repeatedly probes a freshly started controller until
//!   it answers, a deadline passes, or the poll is cancelled
//! - [`ControllerProbe`] is the HTTP [`Probe`] that logs in and reads the
//!   controller's reported version
//! - [`VlanAllocator`] hands out unique VLAN IDs and matching subnets to
//!   concurrently running tests
//! - [`HarnessConfig`] carries connection settings loaded from `UNIFI_*`
//!   environment variables
//!
//! # Example
//!
//! ```no_run
//! use unifi_harness_core::VersionGate;
//! use unifi_harness_env::{ControllerProbe, HarnessConfig, ReadinessPoller, VlanAllocator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarnessConfig::from_env();
//! let probe = ControllerProbe::new(&config)?;
//!
//! let report = ReadinessPoller::new(config.readiness)?
//!     .poll_until_ready(&probe)
//!     .await?;
//! VersionGate::compiled().check_minimum(report.version.as_deref().unwrap_or(""))?;
//!
//! let vlans = VlanAllocator::default();
//! let allocation = vlans.allocate()?;
//! println!("vlan {} uses {}", allocation.vlan_id, allocation.subnet);
//! # Ok(())
//! # }
//! ```
//!
//! # Testing
//!
//! Enable the `test-utils` feature to get `ScriptedProbe`, a [`Probe`] that
//! replays a fixed sequence of results.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod controller;
pub mod error;
pub mod probe;
pub mod readiness;
pub mod vlan;

pub use config::{acceptance_enabled, HarnessConfig, ReadinessConfig, REQUIRED_ACCEPTANCE_VARS};
pub use controller::{ControllerProbe, Site};
pub use error::{HarnessError, Result};
pub use probe::{Probe, ProbeResult};
pub use readiness::{
    is_valid_transition, poll_until_ready, PollProgress, ReadinessPoller, ReadinessState, ReadyReport,
};
pub use vlan::{VlanAllocation, VlanAllocator, VlanAllocatorConfig, DEFAULT_BASE};

#[cfg(any(test, feature = "test-utils"))]
pub use probe::mock::ScriptedProbe;
