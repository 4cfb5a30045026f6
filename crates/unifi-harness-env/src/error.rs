//! Error types for the environment crate.

use std::time::Duration;

use thiserror::Error;
use unifi_harness_core::{ErrorKind, GateError};

/// Errors that can occur while bringing up or using a test environment.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// The controller did not become ready before the deadline.
    #[error(
        "timed out waiting for controller to be ready after {:.1}s ({ticks} probes){}",
        .elapsed.as_secs_f64(),
        last_error_suffix(.last_error.as_deref())
    )]
    ReadinessTimeout {
        /// How long the poll waited in total.
        elapsed: Duration,
        /// Number of probes issued.
        ticks: u32,
        /// The most recent probe failure, if any.
        last_error: Option<String>,
    },

    /// The readiness poll was cancelled before the controller became ready.
    #[error("readiness poll cancelled after {ticks} probes")]
    Cancelled {
        /// Number of probes issued before cancellation.
        ticks: u32,
    },

    /// Every VLAN ID in the allocator's range has been handed out.
    #[error("VLAN allocator exhausted: every ID in [{vlan_min}, {vlan_max}) is in use")]
    AllocatorExhausted {
        /// First allocatable VLAN ID.
        vlan_min: u16,
        /// One past the last allocatable VLAN ID.
        vlan_max: u16,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The controller answered but refused the request.
    #[error("controller rejected {endpoint}: {reason}")]
    Rejected {
        /// Path of the rejected request.
        endpoint: String,
        /// Status or `meta.msg` reported by the controller.
        reason: String,
    },

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Version gate error.
    #[error(transparent)]
    Gate(#[from] GateError),
}

fn last_error_suffix(last_error: Option<&str>) -> String {
    last_error.map_or_else(String::new, |e| format!(", last error: {e}"))
}

impl HarnessError {
    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ReadinessTimeout { .. } => ErrorKind::ReadinessTimeout,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::AllocatorExhausted { .. } => ErrorKind::AllocatorExhausted,
            Self::Config(_) => ErrorKind::Config,
            Self::Rejected { .. } | Self::Http(_) => ErrorKind::Http,
            Self::Gate(e) => e.kind(),
        }
    }

    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::ReadinessTimeout { .. } | Self::Rejected { .. } | Self::Http(_) => true,
            Self::Gate(e) => e.is_retriable(),
            Self::Cancelled { .. } | Self::AllocatorExhausted { .. } | Self::Config(_) => false,
        }
    }
}

/// A specialized Result type for environment operations.
pub type Result<T> = std::result::Result<T, HarnessError>;
