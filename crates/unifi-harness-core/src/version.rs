//! Controller version values.
//!
//! Controllers report their version as a free-form string that is usually,
//! but not always, semver-like. It may also be empty while the controller is
//! still starting or when the deployment hides it. [`ControllerVersion`]
//! normalizes whatever was reported into a well-formed semantic version.
//!
//! Two parse modes exist. [`ParseMode::Strict`] surfaces problems as errors;
//! [`ParseMode::Lenient`] degrades to the `0.0.0` sentinel
//! ([`ControllerVersion::UNKNOWN`]) so best-effort callers never fail.

use std::fmt;
use std::str::FromStr;

use semver::{BuildMetadata, Prerelease, Version};
use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};

/// First controller release supported by the harness.
pub const CONTROLLER_V6: ControllerVersion = ControllerVersion::new(6, 0, 0);

/// Controller release that renamed the default network from `LAN` to `Default`.
pub const CONTROLLER_V7: ControllerVersion = ControllerVersion::new(7, 0, 0);

/// Controller release that added WPA3 to wireless networks.
pub const CONTROLLER_WPA3: ControllerVersion = ControllerVersion::new(6, 1, 61);

/// How strictly a version string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Empty and malformed input are errors.
    Strict,
    /// Empty and malformed input yield [`ControllerVersion::UNKNOWN`].
    Lenient,
}

/// A normalized controller version.
///
/// Ordering is total: `(major, minor, patch)` first, then pre-release
/// precedence (a pre-release sorts before the release of the same triple),
/// then build metadata as a final tiebreak.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ControllerVersion(Version);

impl ControllerVersion {
    /// The sentinel used when no usable version is known.
    pub const UNKNOWN: Self = Self::new(0, 0, 0);

    /// Create a release version from its numeric components.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(Version::new(major, minor, patch))
    }

    /// Parse a version the way a best-effort caller wants it.
    ///
    /// Never fails: empty or unparsable input yields [`Self::UNKNOWN`].
    #[must_use]
    pub fn lenient(raw: &str) -> Self {
        match parse_strict(raw) {
            Ok(version) => version,
            Err(e) => {
                tracing::debug!(raw, error = %e, "Treating controller version as unknown");
                Self::UNKNOWN
            }
        }
    }

    /// Major version component.
    #[must_use]
    pub const fn major(&self) -> u64 {
        self.0.major
    }

    /// Minor version component.
    #[must_use]
    pub const fn minor(&self) -> u64 {
        self.0.minor
    }

    /// Patch version component.
    #[must_use]
    pub const fn patch(&self) -> u64 {
        self.0.patch
    }

    /// Pre-release identifiers, empty for a release.
    #[must_use]
    pub fn pre(&self) -> &str {
        self.0.pre.as_str()
    }

    /// Build metadata, empty when none was reported.
    #[must_use]
    pub fn build(&self) -> &str {
        self.0.build.as_str()
    }

    /// Check if this is the `0.0.0` sentinel.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }

    /// Check if this version is greater than or equal to `threshold`.
    #[must_use]
    pub fn at_least(&self, threshold: &Self) -> bool {
        self >= threshold
    }

    /// Return the underlying semver value.
    #[must_use]
    pub const fn as_semver(&self) -> &Version {
        &self.0
    }
}

/// Parse `raw` into a version using `mode`.
///
/// # Errors
///
/// In [`ParseMode::Strict`], returns `GateError::MissingVersion` for empty
/// input and `GateError::MalformedVersion` for anything that is not a
/// version. [`ParseMode::Lenient`] never returns an error.
pub fn parse_version(raw: &str, mode: ParseMode) -> Result<ControllerVersion> {
    match mode {
        ParseMode::Strict => parse_strict(raw),
        ParseMode::Lenient => Ok(ControllerVersion::lenient(raw)),
    }
}

/// Accepts an optional leading `v`, one to four numeric segments, then
/// optional `-pre` and `+build` suffixes. Missing minor and patch default to
/// zero; a fourth segment is kept as build metadata.
fn parse_strict(raw: &str) -> Result<ControllerVersion> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(GateError::MissingVersion);
    }

    let unprefixed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let (rest, build) = match unprefixed.split_once('+') {
        Some((rest, build)) => (rest, Some(build)),
        None => (unprefixed, None),
    };
    let (core, pre) = match rest.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (rest, None),
    };

    let segments: Vec<&str> = core.split('.').collect();
    if segments.len() > 4 {
        return Err(GateError::malformed(raw, "too many version segments"));
    }

    let mut numbers = [0u64; 3];
    for (slot, segment) in numbers.iter_mut().zip(&segments) {
        *slot = parse_segment(raw, segment)?;
    }

    let mut build_ids = Vec::new();
    if let Some(extra) = segments.get(3) {
        parse_segment(raw, extra)?;
        build_ids.push(*extra);
    }
    if let Some(build) = build {
        if build.is_empty() {
            return Err(GateError::malformed(raw, "empty build metadata"));
        }
        build_ids.push(build);
    }

    let pre = match pre {
        Some("") => return Err(GateError::malformed(raw, "empty pre-release")),
        Some(pre) => Prerelease::new(pre).map_err(|e| GateError::malformed(raw, e.to_string()))?,
        None => Prerelease::EMPTY,
    };
    let build = if build_ids.is_empty() {
        BuildMetadata::EMPTY
    } else {
        BuildMetadata::new(&build_ids.join("."))
            .map_err(|e| GateError::malformed(raw, e.to_string()))?
    };

    Ok(ControllerVersion(Version {
        major: numbers[0],
        minor: numbers[1],
        patch: numbers[2],
        pre,
        build,
    }))
}

fn parse_segment(raw: &str, segment: &str) -> Result<u64> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(GateError::malformed(
            raw,
            format!("invalid version segment {segment:?}"),
        ));
    }
    segment
        .parse()
        .map_err(|_| GateError::malformed(raw, format!("version segment {segment:?} overflows")))
}

impl fmt::Debug for ControllerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ControllerVersion({})", self.0)
    }
}

impl fmt::Display for ControllerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ControllerVersion {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        parse_strict(s)
    }
}

impl TryFrom<String> for ControllerVersion {
    type Error = GateError;

    fn try_from(value: String) -> Result<Self> {
        parse_strict(&value)
    }
}

impl From<ControllerVersion> for String {
    fn from(version: ControllerVersion) -> Self {
        version.to_string()
    }
}

impl From<Version> for ControllerVersion {
    fn from(version: Version) -> Self {
        Self(version)
    }
}
