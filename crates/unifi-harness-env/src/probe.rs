//! The probe seam between the readiness poller and a controller.

use async_trait::async_trait;

/// Outcome of a single readiness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The controller could not be reached or refused the login.
    Unreachable(String),
    /// The controller answered but did not report a version.
    ReachableNoVersion,
    /// The controller answered and reported this version string.
    ReachableWithVersion(String),
}

impl ProbeResult {
    /// Whether this result ends a readiness poll.
    ///
    /// An empty version string counts as a failed probe.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        match self {
            Self::ReachableNoVersion => true,
            Self::ReachableWithVersion(v) => !v.trim().is_empty(),
            Self::Unreachable(_) => false,
        }
    }
}

/// Something that can check whether a controller is up.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Probe the controller once.
    async fn probe(&self) -> ProbeResult;
}

/// Mock probe for testing.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::{async_trait, Probe, ProbeResult};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// A probe that replays scripted results, then repeats a fallback.
    pub struct ScriptedProbe {
        script: Mutex<VecDeque<ProbeResult>>,
        fallback: ProbeResult,
        delay: Option<Duration>,
        calls: AtomicU32,
    }

    impl ScriptedProbe {
        /// Create a probe that returns `script` in order, then `fallback` forever.
        #[must_use]
        pub fn new(script: impl IntoIterator<Item = ProbeResult>, fallback: ProbeResult) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                fallback,
                delay: None,
                calls: AtomicU32::new(0),
            }
        }

        /// A probe that is never ready.
        #[must_use]
        pub fn unreachable(reason: &str) -> Self {
            Self::new(Vec::new(), ProbeResult::Unreachable(reason.to_string()))
        }

        /// A probe that fails `failures` times, then reports `version`.
        #[must_use]
        pub fn ready_after(failures: usize, version: &str) -> Self {
            Self::new(
                std::iter::repeat_with(|| ProbeResult::Unreachable("connection refused".into()))
                    .take(failures),
                ProbeResult::ReachableWithVersion(version.to_string()),
            )
        }

        /// Sleep for `delay` inside every probe.
        #[must_use]
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Number of probes issued so far.
        #[must_use]
        pub fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Probe for ScriptedProbe {
        async fn probe(&self) -> ProbeResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self.script.lock().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }
}
