//! Error types for version parsing and gating.
//!
//! [`ErrorKind`] is shared with the environment crate so callers can branch on
//! the kind of failure without matching on every concrete error enum.

use thiserror::Error;

use crate::version::ControllerVersion;

/// A result type using `GateError`.
pub type Result<T> = std::result::Result<T, GateError>;

/// Coarse classification of every failure the harness can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A version was required but the controller did not report one.
    MissingVersion,
    /// A version string did not match the version grammar.
    MalformedVersion,
    /// The controller is older than the minimum supported version.
    UnsupportedControllerVersion,
    /// A constraint string could not be parsed.
    InvalidConstraint,
    /// The controller did not become ready before the deadline.
    ReadinessTimeout,
    /// The readiness poll was cancelled.
    Cancelled,
    /// The VLAN allocator has no identifiers left.
    AllocatorExhausted,
    /// Invalid or missing configuration.
    Config,
    /// HTTP transport failure talking to the controller.
    Http,
}

/// Errors produced while parsing versions and evaluating gates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// Strict parsing was requested but the version string was empty.
    #[error("controller version is not available")]
    MissingVersion,

    /// The version string is not a recognizable version.
    #[error("malformed controller version {raw:?}: {reason}")]
    MalformedVersion {
        /// The string as it was received.
        raw: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The controller reports a version below the supported minimum.
    #[error("controller version {required:?} or greater is required, found {actual:?}")]
    UnsupportedControllerVersion {
        /// The minimum supported version.
        required: String,
        /// The version the controller reported.
        actual: String,
    },

    /// A constraint string could not be parsed.
    #[error("invalid version constraint {raw:?}: {reason}")]
    InvalidConstraint {
        /// The constraint as it was received.
        raw: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl GateError {
    pub(crate) fn malformed(raw: &str, reason: impl Into<String>) -> Self {
        Self::MalformedVersion {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(required: &ControllerVersion, actual: &ControllerVersion) -> Self {
        Self::UnsupportedControllerVersion {
            required: required.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingVersion => ErrorKind::MissingVersion,
            Self::MalformedVersion { .. } => ErrorKind::MalformedVersion,
            Self::UnsupportedControllerVersion { .. } => ErrorKind::UnsupportedControllerVersion,
            Self::InvalidConstraint { .. } => ErrorKind::InvalidConstraint,
        }
    }

    /// Returns true if this error might be resolved by retrying.
    ///
    /// A missing version usually means the controller is still starting up;
    /// everything else is a property of the reported value.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::MissingVersion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_names_both_versions() {
        let err = GateError::unsupported(
            &ControllerVersion::new(6, 0, 0),
            &ControllerVersion::new(5, 14, 23),
        );
        let msg = err.to_string();
        assert!(msg.contains("\"6.0.0\""), "{msg}");
        assert!(msg.contains("\"5.14.23\""), "{msg}");
        assert_eq!(err.kind(), ErrorKind::UnsupportedControllerVersion);
    }

    #[test]
    fn malformed_carries_original_string() {
        let err = GateError::malformed("six.oh", "bad segment");
        assert!(err.to_string().contains("six.oh"));
        assert_eq!(err.kind(), ErrorKind::MalformedVersion);
    }

    #[test]
    fn retriable() {
        assert!(GateError::MissingVersion.is_retriable());
        assert!(!GateError::malformed("x", "y").is_retriable());
    }
}
