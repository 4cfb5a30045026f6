//! Readiness polling.
//!
//! A freshly started controller takes a while before it accepts logins. The
//! [`ReadinessPoller`] probes it on a fixed interval until it answers, the
//! deadline passes, or the poll is cancelled.
//!
//! # State Machine
//!
//! ```text
//!        ┌───────────┐  tick   ┌───────────┐  ready   ┌─────────┐
//!   ────▶│  Waiting  │────────▶│  Probing  │─────────▶│  Ready  │
//!        └─────┬─────┘◀────────└─────┬─────┘          └─────────┘
//!              │       failed        │
//!              │                     │ deadline
//!              │ cancel              ▼
//!              │               ┌───────────┐
//!              │               │ TimedOut  │◀── deadline (from Waiting)
//!              ▼               └───────────┘
//!        ┌───────────┐
//!        │ Cancelled │
//!        └───────────┘
//! ```
//!
//! The first probe is issued immediately; probe `k` starts at
//! `(k - 1) * interval`. Cancellation is observed between probes only.

use std::time::Duration;

use tokio::time::{interval_at, sleep_until, timeout_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ReadinessConfig;
use crate::error::{HarnessError, Result};
use crate::probe::{Probe, ProbeResult};

/// Budgets beyond this are treated as "wait forever".
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// State of a readiness poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadinessState {
    /// Waiting for the next tick.
    Waiting,
    /// A probe is in flight.
    Probing,
    /// The controller answered.
    Ready,
    /// The deadline passed first.
    TimedOut,
    /// The poll was cancelled.
    Cancelled,
}

impl ReadinessState {
    /// Whether the poll ends in this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::TimedOut | Self::Cancelled)
    }
}

/// Check if a state transition is valid according to the state machine.
#[must_use]
pub const fn is_valid_transition(from: ReadinessState, to: ReadinessState) -> bool {
    use ReadinessState::{Cancelled, Probing, Ready, TimedOut, Waiting};

    matches!(
        (from, to),
        (Waiting, Probing | TimedOut | Cancelled) | (Probing, Ready | Waiting | TimedOut)
    )
}

/// Snapshot of a poll, handed to observers after every probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollProgress {
    /// Probes issued so far.
    pub tick: u32,
    /// State after the latest probe.
    pub state: ReadinessState,
    /// Time since the poll started.
    pub elapsed: Duration,
    /// Time left before the deadline.
    pub remaining: Duration,
    /// Most recent probe failure.
    pub last_error: Option<String>,
}

/// Result of a successful poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyReport {
    /// Version reported by the controller, if any.
    pub version: Option<String>,
    /// Probes issued, including the successful one.
    pub ticks: u32,
    /// Time from the start of the poll to readiness.
    pub elapsed: Duration,
}

struct PollSession {
    state: ReadinessState,
    started: Instant,
    deadline: Instant,
    ticks: u32,
    last_error: Option<String>,
}

impl PollSession {
    fn new(budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            state: ReadinessState::Waiting,
            started,
            deadline: started
                .checked_add(budget.min(FAR_FUTURE))
                .unwrap_or(started),
            ticks: 0,
            last_error: None,
        }
    }

    fn transition(&mut self, to: ReadinessState) {
        debug_assert!(
            is_valid_transition(self.state, to),
            "invalid readiness transition {:?} -> {to:?}",
            self.state
        );
        self.state = to;
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn progress(&self) -> PollProgress {
        PollProgress {
            tick: self.ticks,
            state: self.state,
            elapsed: self.elapsed(),
            remaining: self.deadline.saturating_duration_since(Instant::now()),
            last_error: self.last_error.clone(),
        }
    }

    fn timed_out(&mut self) -> HarnessError {
        self.transition(ReadinessState::TimedOut);
        let elapsed = self.elapsed();
        warn!(
            elapsed_ms = elapsed.as_millis(),
            ticks = self.ticks,
            last_error = self.last_error.as_deref().unwrap_or("none"),
            "controller did not become ready before the deadline"
        );
        HarnessError::ReadinessTimeout {
            elapsed,
            ticks: self.ticks,
            last_error: self.last_error.take(),
        }
    }
}

/// Polls a [`Probe`] until the controller is ready.
#[derive(Debug, Clone)]
pub struct ReadinessPoller {
    config: ReadinessConfig,
    cancel: CancellationToken,
}

impl ReadinessPoller {
    /// Create a poller with the given timing.
    ///
    /// # Errors
    ///
    /// Returns an error if the interval is zero.
    pub fn new(config: ReadinessConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Use an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels this poller at its next tick.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The timing this poller runs with.
    #[must_use]
    pub const fn config(&self) -> &ReadinessConfig {
        &self.config
    }

    /// Poll until the controller is ready.
    ///
    /// # Errors
    ///
    /// Returns `ReadinessTimeout` if the deadline passes first, or
    /// `Cancelled` if the cancellation token fires first.
    pub async fn poll_until_ready<P>(&self, probe: &P) -> Result<ReadyReport>
    where
        P: Probe + ?Sized,
    {
        self.poll_until_ready_with(probe, |_| {}).await
    }

    /// Poll until the controller is ready, reporting progress after every probe.
    ///
    /// # Errors
    ///
    /// Same as [`ReadinessPoller::poll_until_ready`].
    pub async fn poll_until_ready_with<P, F>(&self, probe: &P, mut observe: F) -> Result<ReadyReport>
    where
        P: Probe + ?Sized,
        F: FnMut(&PollProgress),
    {
        let mut session = PollSession::new(self.config.deadline);
        let mut ticker = interval_at(session.started, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            deadline_secs = self.config.deadline.as_secs(),
            interval_secs = self.config.interval.as_secs(),
            "waiting for controller to become ready"
        );

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    session.transition(ReadinessState::Cancelled);
                    info!(ticks = session.ticks, "readiness poll cancelled");
                    return Err(HarnessError::Cancelled { ticks: session.ticks });
                }
                () = sleep_until(session.deadline) => {
                    return Err(session.timed_out());
                }
                _ = ticker.tick() => {}
            }

            session.transition(ReadinessState::Probing);
            session.ticks += 1;
            debug!(tick = session.ticks, "probing controller");

            let Ok(result) = timeout_at(session.deadline, probe.probe()).await else {
                session.last_error = Some("probe still running at deadline".to_string());
                return Err(session.timed_out());
            };

            let version = match result {
                ProbeResult::ReachableNoVersion => Some(None),
                ProbeResult::ReachableWithVersion(v) if !v.trim().is_empty() => Some(Some(v)),
                ProbeResult::ReachableWithVersion(_) => {
                    session.last_error = Some("controller reported an empty version".to_string());
                    None
                }
                ProbeResult::Unreachable(reason) => {
                    warn!(tick = session.ticks, error = %reason, "controller not ready");
                    session.last_error = Some(reason);
                    None
                }
            };

            if let Some(version) = version {
                session.transition(ReadinessState::Ready);
                observe(&session.progress());
                let report = ReadyReport {
                    version,
                    ticks: session.ticks,
                    elapsed: session.elapsed(),
                };
                info!(
                    ticks = report.ticks,
                    elapsed_ms = report.elapsed.as_millis(),
                    version = report.version.as_deref().unwrap_or("unknown"),
                    "controller is ready"
                );
                return Ok(report);
            }

            session.transition(ReadinessState::Waiting);
            observe(&session.progress());
        }
    }
}

/// Poll `probe` every `interval` until it reports ready or `deadline` elapses.
///
/// # Errors
///
/// Returns `ReadinessTimeout` if the deadline passes first, or a
/// configuration error if `interval` is zero.
pub async fn poll_until_ready<P>(probe: &P, deadline: Duration, interval: Duration) -> Result<ReadyReport>
where
    P: Probe + ?Sized,
{
    ReadinessPoller::new(ReadinessConfig::new(deadline, interval))?
        .poll_until_ready(probe)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::mock::ScriptedProbe;
    use unifi_harness_core::ErrorKind;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn poller(deadline: u64, interval: u64) -> ReadinessPoller {
        ReadinessPoller::new(ReadinessConfig::new(secs(deadline), secs(interval))).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn ready_on_the_tick_after_failures() {
        let probe = ScriptedProbe::ready_after(3, "7.3.83");
        let report = poller(300, 10).poll_until_ready(&probe).await.unwrap();

        assert_eq!(report.ticks, 4);
        assert_eq!(report.version.as_deref(), Some("7.3.83"));
        assert!(report.elapsed >= secs(30) && report.elapsed < secs(31));
        assert_eq!(probe.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn first_probe_is_immediate() {
        let probe = ScriptedProbe::new(Vec::new(), ProbeResult::ReachableNoVersion);
        let report = poller(300, 10).poll_until_ready(&probe).await.unwrap();
        assert_eq!(report.ticks, 1);
        assert_eq!(report.version, None);
        assert!(report.elapsed < secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_version_is_not_ready() {
        let probe = ScriptedProbe::new(
            vec![ProbeResult::ReachableWithVersion(String::new())],
            ProbeResult::ReachableWithVersion("6.5.55".into()),
        );
        let report = poller(300, 10).poll_until_ready(&probe).await.unwrap();
        assert_eq!(report.ticks, 2);
        assert_eq!(report.version.as_deref(), Some("6.5.55"));
    }

    #[tokio::test(start_paused = true)]
    async fn always_unreachable_times_out_at_deadline() {
        let probe = ScriptedProbe::unreachable("connection refused");
        let start = Instant::now();
        let err = poller(45, 10).poll_until_ready(&probe).await.unwrap_err();

        assert!(start.elapsed() >= secs(45));
        assert_eq!(err.kind(), ErrorKind::ReadinessTimeout);
        match err {
            HarnessError::ReadinessTimeout {
                elapsed,
                ticks,
                last_error,
            } => {
                assert!(elapsed >= secs(45) && elapsed < secs(46));
                assert_eq!(ticks, 5);
                assert_eq!(last_error.as_deref(), Some("connection refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_probe_is_abandoned_at_deadline() {
        let probe = ScriptedProbe::new(Vec::new(), ProbeResult::ReachableNoVersion)
            .with_delay(secs(3600));
        let err = poller(30, 10).poll_until_ready(&probe).await.unwrap_err();

        let HarnessError::ReadinessTimeout { elapsed, ticks, .. } = err else {
            panic!("expected timeout, got {err}");
        };
        assert!(elapsed >= secs(30) && elapsed < secs(31));
        assert_eq!(ticks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_at_next_tick() {
        let probe = ScriptedProbe::unreachable("connection refused");
        let poller = poller(300, 10);
        let token = poller.cancellation_token();

        tokio::spawn(async move {
            tokio::time::sleep(secs(25)).await;
            token.cancel();
        });

        let err = poller.poll_until_ready(&probe).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_issues_no_probes() {
        let probe = ScriptedProbe::ready_after(0, "7.0.0");
        let token = CancellationToken::new();
        token.cancel();

        let err = poller(300, 10)
            .with_cancellation(token)
            .poll_until_ready(&probe)
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Cancelled { ticks: 0 }));
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn observer_sees_every_probe() {
        let probe = ScriptedProbe::ready_after(2, "6.1.61");
        let mut seen = Vec::new();
        poller(300, 10)
            .poll_until_ready_with(&probe, |p| seen.push((p.tick, p.state)))
            .await
            .unwrap();

        assert_eq!(
            seen,
            [
                (1, ReadinessState::Waiting),
                (2, ReadinessState::Waiting),
                (3, ReadinessState::Ready),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn free_function_rejects_zero_interval() {
        let probe = ScriptedProbe::ready_after(0, "7.0.0");
        let err = poll_until_ready(&probe, secs(10), Duration::ZERO)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_deadline_waits_instead_of_overflowing() {
        let probe = ScriptedProbe::ready_after(2, "7.0.0");
        let report = poll_until_ready(&probe, Duration::MAX, secs(10))
            .await
            .unwrap();
        assert_eq!(report.ticks, 3);

        let probe = ScriptedProbe::ready_after(0, "7.0.0");
        let report = poll_until_ready(&probe, secs(u64::MAX), secs(10))
            .await
            .unwrap();
        assert_eq!(report.ticks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_mid_check_lets_it_finish() {
        let probe = ScriptedProbe::unreachable("connection refused").with_delay(secs(5));
        let poller = poller(300, 10);
        let token = poller.cancellation_token();

        tokio::spawn(async move {
            tokio::time::sleep(secs(2)).await;
            token.cancel();
        });

        let start = Instant::now();
        let err = poller.poll_until_ready(&probe).await.unwrap_err();
        assert!(matches!(err, HarnessError::Cancelled { ticks: 1 }), "{err}");
        assert_eq!(probe.calls(), 1);
        assert!(start.elapsed() >= secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_result_wins_over_mid_check_cancel() {
        let probe = ScriptedProbe::new(
            Vec::new(),
            ProbeResult::ReachableWithVersion("7.3.83".into()),
        )
        .with_delay(secs(5));
        let poller = poller(300, 10);
        let token = poller.cancellation_token();

        tokio::spawn(async move {
            tokio::time::sleep(secs(2)).await;
            token.cancel();
        });

        let report = poller.poll_until_ready(&probe).await.unwrap();
        assert_eq!(report.ticks, 1);
        assert_eq!(report.version.as_deref(), Some("7.3.83"));
        assert_eq!(probe.calls(), 1);
    }

    #[test]
    fn valid_transitions() {
        use ReadinessState::*;

        assert!(is_valid_transition(Waiting, Probing));
        assert!(is_valid_transition(Probing, Waiting));
        assert!(is_valid_transition(Probing, Ready));
        assert!(is_valid_transition(Waiting, TimedOut));
        assert!(is_valid_transition(Probing, TimedOut));
        assert!(is_valid_transition(Waiting, Cancelled));
    }

    #[test]
    fn terminal_states_are_final() {
        use ReadinessState::*;

        assert!(!is_valid_transition(Probing, Cancelled));
        for terminal in [Ready, TimedOut, Cancelled] {
            assert!(terminal.is_terminal());
            for to in [Waiting, Probing, Ready, TimedOut, Cancelled] {
                assert!(!is_valid_transition(terminal, to));
            }
        }
        assert!(!Waiting.is_terminal());
    }
}
