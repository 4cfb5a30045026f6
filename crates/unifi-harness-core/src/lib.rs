//! Controller version parsing and capability gates for unifi-harness.
//!
//! This crate provides the version-facing building blocks used by the rest of
//! the harness:
//!
//! - **Versions**: [`ControllerVersion`], parsed strictly or leniently from
//!   whatever the controller reports
//! - **Constraints**: [`VersionConstraint`], go-version style predicates such
//!   as `>= 6.0.0, < 7.0.0`
//! - **Gates**: [`VersionGate`], the minimum-version check and per-feature
//!   availability table
//! - **Error types**: [`GateError`] and the shared [`ErrorKind`] taxonomy
//!
//! # Example
//!
//! ```
//! use unifi_harness_core::{Feature, VersionGate};
//!
//! let gate = VersionGate::default();
//!
//! // An unknown version never blocks the minimum check...
//! assert!(gate.check_minimum("").is_ok());
//! // ...but an old controller does.
//! assert!(gate.check_minimum("5.14.23").is_err());
//!
//! assert!(gate.is_feature_available("6.1.61", Feature::Wpa3));
//! assert!(!gate.is_feature_available("garbage", Feature::Wpa3));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod constraint;
pub mod error;
pub mod gate;
pub mod version;

pub use constraint::VersionConstraint;
pub use error::{ErrorKind, GateError, Result};
pub use gate::{
    default_network_name, precheck_constraint, precheck_min_version, Feature, PreCheck,
    Requirement, VersionGate,
};
pub use version::{
    parse_version, ControllerVersion, ParseMode, CONTROLLER_V6, CONTROLLER_V7, CONTROLLER_WPA3,
};
