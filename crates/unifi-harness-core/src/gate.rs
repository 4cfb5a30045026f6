//! Version gates.
//!
//! [`VersionGate`] answers two questions about a raw controller version:
//!
//! - may the harness talk to this controller at all
//!   ([`VersionGate::check_minimum`]), and
//! - is a given capability available ([`VersionGate::is_feature_available`]).
//!
//! The two use different parse policies on purpose. The minimum check is a
//! hard gate: a controller that genuinely reports an old or garbled version
//! gets an actionable error, while a controller that reports nothing is let
//! through. Feature checks are advisory: anything that cannot be parsed
//! simply reports the feature as unavailable.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use crate::constraint::VersionConstraint;
use crate::error::{GateError, Result};
use crate::version::{
    parse_version, ControllerVersion, ParseMode, CONTROLLER_V6, CONTROLLER_V7, CONTROLLER_WPA3,
};

/// Capabilities whose availability depends on the controller version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// WPA3 security on wireless networks.
    Wpa3,
    /// The built-in network is called `Default`.
    DefaultNetworkNamedDefault,
    /// The built-in network is called `LAN`.
    LegacyLanNaming,
}

impl Feature {
    /// Every known feature, in display order.
    pub const ALL: [Self; 3] = [
        Self::Wpa3,
        Self::DefaultNetworkNamedDefault,
        Self::LegacyLanNaming,
    ];

    /// Short machine-friendly name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Wpa3 => "wpa3",
            Self::DefaultNetworkNamedDefault => "default-network-named-default",
            Self::LegacyLanNaming => "legacy-lan-naming",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a feature needs from the controller version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Available from this version onwards.
    Threshold(ControllerVersion),
    /// Available from the first version up to, but not including, the
    /// second. Uses plain version ordering, so pre-releases inside the
    /// window count.
    Window(ControllerVersion, ControllerVersion),
    /// Available wherever the constraint holds.
    Constraint(VersionConstraint),
}

impl Requirement {
    /// Check whether `version` meets this requirement.
    #[must_use]
    pub fn is_met_by(&self, version: &ControllerVersion) -> bool {
        match self {
            Self::Threshold(threshold) => version.at_least(threshold),
            Self::Window(min, max) => version.at_least(min) && version < max,
            Self::Constraint(constraint) => constraint.matches(version),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Threshold(threshold) => write!(f, ">= {threshold}"),
            Self::Window(min, max) => write!(f, ">= {min}, < {max}"),
            Self::Constraint(constraint) => constraint.fmt(f),
        }
    }
}

/// Minimum-version enforcement plus a per-feature requirement table.
///
/// Immutable once built; share it freely across threads.
#[derive(Debug, Clone)]
pub struct VersionGate {
    minimum: ControllerVersion,
    requirements: HashMap<Feature, Requirement>,
}

impl Default for VersionGate {
    fn default() -> Self {
        Self::new(CONTROLLER_V6)
            .with_threshold(Feature::Wpa3, CONTROLLER_WPA3)
            .with_threshold(Feature::DefaultNetworkNamedDefault, CONTROLLER_V7)
            .with_window(Feature::LegacyLanNaming, CONTROLLER_V6, CONTROLLER_V7)
    }
}

impl VersionGate {
    /// Create a gate with the given minimum and no feature requirements.
    #[must_use]
    pub fn new(minimum: ControllerVersion) -> Self {
        Self {
            minimum,
            requirements: HashMap::new(),
        }
    }

    /// The process-wide gate with the compiled-in thresholds.
    #[must_use]
    pub fn compiled() -> &'static Self {
        static COMPILED: OnceLock<VersionGate> = OnceLock::new();
        COMPILED.get_or_init(Self::default)
    }

    /// Register a simple "at least" requirement for `feature`.
    #[must_use]
    pub fn with_threshold(mut self, feature: Feature, threshold: ControllerVersion) -> Self {
        self.requirements
            .insert(feature, Requirement::Threshold(threshold));
        self
    }

    /// Register a `[min, max)` window for `feature`.
    #[must_use]
    pub fn with_window(
        mut self,
        feature: Feature,
        min: ControllerVersion,
        max: ControllerVersion,
    ) -> Self {
        self.requirements
            .insert(feature, Requirement::Window(min, max));
        self
    }

    /// Register a constraint requirement for `feature`.
    #[must_use]
    pub fn with_constraint(mut self, feature: Feature, constraint: VersionConstraint) -> Self {
        self.requirements
            .insert(feature, Requirement::Constraint(constraint));
        self
    }

    /// The minimum supported controller version.
    #[must_use]
    pub const fn minimum(&self) -> &ControllerVersion {
        &self.minimum
    }

    /// The requirement registered for `feature`, if any.
    #[must_use]
    pub fn requirement(&self, feature: Feature) -> Option<&Requirement> {
        self.requirements.get(&feature)
    }

    /// Check that the controller is new enough to be used at all.
    ///
    /// An empty `raw` means the version is unknown and the check is skipped.
    ///
    /// # Errors
    ///
    /// Returns `GateError::MalformedVersion` if `raw` is not a version and
    /// `GateError::UnsupportedControllerVersion` if it is below the minimum.
    pub fn check_minimum(&self, raw: &str) -> Result<()> {
        if raw.trim().is_empty() {
            tracing::debug!("Controller version not available, skipping minimum check");
            return Ok(());
        }

        let version = parse_version(raw, ParseMode::Strict)?;
        if version < self.minimum {
            return Err(GateError::unsupported(&self.minimum, &version));
        }
        Ok(())
    }

    /// Check whether `feature` is available on a controller reporting `raw`.
    ///
    /// Empty or malformed versions, and features without a registered
    /// requirement, report `false`.
    #[must_use]
    pub fn is_feature_available(&self, raw: &str, feature: Feature) -> bool {
        let version = ControllerVersion::lenient(raw);
        if version.is_unknown() {
            return false;
        }
        self.requirements
            .get(&feature)
            .is_some_and(|requirement| requirement.is_met_by(&version))
    }

    /// All features available on a controller reporting `raw`.
    #[must_use]
    pub fn available_features(&self, raw: &str) -> Vec<Feature> {
        Feature::ALL
            .into_iter()
            .filter(|feature| self.is_feature_available(raw, *feature))
            .collect()
    }
}

/// Outcome of an acceptance-test precheck.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreCheck {
    /// The test can run against this controller.
    Run,
    /// The test does not apply; the reason is meant for the test log.
    Skip(String),
}

impl PreCheck {
    /// Check if the test should run.
    #[must_use]
    pub const fn is_run(&self) -> bool {
        matches!(self, Self::Run)
    }
}

/// Decide whether a test needing at least `min` can run.
///
/// # Errors
///
/// Returns `GateError::MalformedVersion` if `raw` is non-empty but not a version.
pub fn precheck_min_version(raw: &str, min: &ControllerVersion) -> Result<PreCheck> {
    let Some(version) = reported_version(raw)? else {
        return Ok(unavailable());
    };
    if version < *min {
        return Ok(PreCheck::Skip(format!(
            "controller version {:?} is older than required {:?}",
            version.to_string(),
            min.to_string()
        )));
    }
    Ok(PreCheck::Run)
}

/// Decide whether a test constrained to `constraint` can run.
///
/// # Errors
///
/// Returns `GateError::MalformedVersion` if `raw` is non-empty but not a
/// version and `GateError::InvalidConstraint` if `constraint` does not parse.
pub fn precheck_constraint(raw: &str, constraint: &str) -> Result<PreCheck> {
    let Some(version) = reported_version(raw)? else {
        return Ok(unavailable());
    };
    let constraint: VersionConstraint = constraint.parse()?;
    if !constraint.matches(&version) {
        return Ok(PreCheck::Skip(format!(
            "controller version {:?} is outside {:?}",
            version.to_string(),
            constraint.to_string()
        )));
    }
    Ok(PreCheck::Run)
}

/// Name of the network every controller creates out of the box.
///
/// Controllers before 7.0 call it `LAN`. When the version is not reported
/// the current name is assumed.
///
/// # Errors
///
/// Returns `GateError::MalformedVersion` if `raw` is non-empty but not a version.
pub fn default_network_name(raw: &str) -> Result<&'static str> {
    match reported_version(raw)? {
        Some(version) if version < CONTROLLER_V7 => Ok("LAN"),
        _ => Ok("Default"),
    }
}

fn reported_version(raw: &str) -> Result<Option<ControllerVersion>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    parse_version(raw, ParseMode::Strict).map(Some)
}

fn unavailable() -> PreCheck {
    PreCheck::Skip("controller version not available".to_string())
}
