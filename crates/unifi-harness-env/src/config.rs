//! Configuration for the test environment.

use std::fmt;
use std::time::Duration;

use crate::{HarnessError, Result};

/// Variables an acceptance run cannot do without, in the order they are checked.
pub const REQUIRED_ACCEPTANCE_VARS: [&str; 3] = ["UNIFI_USERNAME", "UNIFI_PASSWORD", "UNIFI_API"];

/// Timing budget for the readiness poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessConfig {
    /// Total wall-clock time allowed before giving up. Anything past 30
    /// years, `Duration::MAX` included, means no practical limit.
    pub deadline: Duration,
    /// Spacing between probes.
    pub interval: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(300),
            interval: Duration::from_secs(10),
        }
    }
}

impl ReadinessConfig {
    /// Create a readiness config with the given deadline and interval.
    #[must_use]
    pub const fn new(deadline: Duration, interval: Duration) -> Self {
        Self { deadline, interval }
    }

    /// Validate the timing values.
    ///
    /// # Errors
    ///
    /// Returns an error if the interval is zero.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(HarnessError::Config(
                "readiness interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Connection and timing settings for a controller under test.
#[derive(Clone)]
pub struct HarnessConfig {
    /// Base URL of the controller API (e.g., `https://localhost:8443`).
    pub api_url: String,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Skip TLS certificate verification.
    pub insecure: bool,
    /// Timeout for each individual HTTP request made by a probe.
    pub request_timeout: Duration,
    /// Readiness poll timing.
    pub readiness: ReadinessConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            api_url: "https://localhost:8443".to_string(),
            username: "admin".to_string(),
            password: "admin".to_string(),
            insecure: true,
            request_timeout: Duration::from_secs(5),
            readiness: ReadinessConfig::default(),
        }
    }
}

impl fmt::Debug for HarnessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarnessConfig")
            .field("api_url", &self.api_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("insecure", &self.insecure)
            .field("request_timeout", &self.request_timeout)
            .field("readiness", &self.readiness)
            .finish()
    }
}

impl HarnessConfig {
    /// Create a config pointing at the given controller URL.
    #[must_use]
    pub fn with_api_url(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `UNIFI_API`: Base URL of the controller API
    /// - `UNIFI_USERNAME`: Login user
    /// - `UNIFI_PASSWORD`: Login password
    /// - `UNIFI_INSECURE`: Skip TLS verification (`true`/`1` or `false`/`0`)
    /// - `UNIFI_READY_TIMEOUT_SECS`: Readiness deadline in seconds
    /// - `UNIFI_READY_INTERVAL_SECS`: Seconds between readiness probes
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Values that fail to parse leave the default in place.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("UNIFI_API") {
            config.api_url = val.trim_end_matches('/').to_string();
        }
        if let Some(val) = lookup("UNIFI_USERNAME") {
            config.username = val;
        }
        if let Some(val) = lookup("UNIFI_PASSWORD") {
            config.password = val;
        }
        if let Some(val) = lookup("UNIFI_INSECURE") {
            config.insecure = match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => config.insecure,
            };
        }
        if let Some(val) = lookup("UNIFI_READY_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                config.readiness.deadline = Duration::from_secs(n);
            }
        }
        if let Some(val) = lookup("UNIFI_READY_INTERVAL_SECS") {
            if let Ok(n) = val.parse() {
                config.readiness.interval = Duration::from_secs(n);
            }
        }

        config
    }

    /// Check that every variable an acceptance run needs is set.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first missing variable.
    pub fn require_acceptance_env() -> Result<()> {
        Self::require_acceptance_vars(|key| std::env::var(key).ok())
    }

    /// Check required acceptance variables through an arbitrary lookup.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first missing or empty variable.
    pub fn require_acceptance_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        for var in REQUIRED_ACCEPTANCE_VARS {
            if lookup(var).map_or(true, |v| v.is_empty()) {
                return Err(HarnessError::Config(format!(
                    "`{var}` must be set for acceptance tests"
                )));
            }
        }
        Ok(())
    }

    /// The variables a test process needs to reach this controller.
    #[must_use]
    pub fn env_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("UNIFI_USERNAME", self.username.clone()),
            ("UNIFI_PASSWORD", self.password.clone()),
            ("UNIFI_INSECURE", self.insecure.to_string()),
            ("UNIFI_API", self.api_url.clone()),
        ]
    }
}

/// Check whether acceptance tests were requested (`UNIFI_ACC` is non-empty).
#[must_use]
pub fn acceptance_enabled() -> bool {
    std::env::var("UNIFI_ACC").is_ok_and(|v| !v.is_empty())
}
