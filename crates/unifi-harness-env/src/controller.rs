//! HTTP probe against a live UniFi controller.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::probe::{Probe, ProbeResult};

/// Envelope wrapped around every controller API response.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    meta: Meta,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    #[serde(default)]
    rc: String,
    #[serde(default)]
    server_version: Option<String>,
    #[serde(default)]
    msg: Option<String>,
}

impl Meta {
    fn is_ok(&self) -> bool {
        self.rc == "ok"
    }

    fn reason(&self) -> String {
        self.msg.clone().unwrap_or_else(|| format!("rc={:?}", self.rc))
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// A site known to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Site {
    /// Short site identifier (e.g., `default`).
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub desc: String,
}

/// Probes a controller by logging in and asking for its version.
///
/// The client keeps the session cookie from the login, so later requests on
/// the same probe are authenticated.
pub struct ControllerProbe {
    client: reqwest::Client,
    api_url: String,
    username: String,
    password: String,
}

impl ControllerProbe {
    /// Create a probe from the harness configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &HarnessConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(config.insecure)
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout.min(Duration::from_secs(5)))
            .build()?;

        Ok(Self::with_client(client, config))
    }

    /// Create a probe with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: &HarnessConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }

    /// Log in with the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller cannot be reached or rejects the login.
    #[instrument(skip(self), fields(api = %self.api_url))]
    pub async fn login(&self) -> Result<()> {
        let response = self
            .client
            .post(self.url("/api/login"))
            .json(&LoginRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(rejected("/api/login", format!("HTTP {status}")));
        }
        Ok(())
    }

    /// Read the version the controller reports on its status endpoint.
    ///
    /// Returns `None` when the controller does not report one.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body is not a status envelope.
    pub async fn server_version(&self) -> Result<Option<String>> {
        let response = self.client.get(self.url("/status")).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(rejected("/status", format!("HTTP {status}")));
        }

        let envelope: Envelope<serde_json::Value> = response.json().await?;
        Ok(envelope
            .meta
            .server_version
            .filter(|v| !v.trim().is_empty()))
    }

    /// List the sites visible to the logged-in user.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the controller answers with
    /// anything other than `rc == "ok"`.
    pub async fn list_sites(&self) -> Result<Vec<Site>> {
        let response = self.client.get(self.url("/api/self/sites")).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(rejected("/api/self/sites", format!("HTTP {status}")));
        }

        let envelope: Envelope<Site> = response.json().await?;
        if !envelope.meta.is_ok() {
            return Err(rejected("/api/self/sites", envelope.meta.reason()));
        }
        Ok(envelope.data)
    }
}

#[async_trait]
impl Probe for ControllerProbe {
    async fn probe(&self) -> ProbeResult {
        if let Err(e) = self.login().await {
            return ProbeResult::Unreachable(e.to_string());
        }

        match self.server_version().await {
            Ok(Some(version)) => return ProbeResult::ReachableWithVersion(version),
            Ok(None) => debug!("controller reported no version, falling back to site list"),
            Err(e) => debug!(error = %e, "status check failed, falling back to site list"),
        }

        match self.list_sites().await {
            Ok(sites) => {
                debug!(sites = sites.len(), "controller answered site list");
                ProbeResult::ReachableNoVersion
            }
            Err(e) => ProbeResult::Unreachable(e.to_string()),
        }
    }
}

fn rejected(endpoint: &str, reason: String) -> HarnessError {
    HarnessError::Rejected {
        endpoint: endpoint.to_string(),
        reason,
    }
}
