//! Poll session driver

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::types::PollSettings;

use super::observer::{NoOpPollObserver, PollObserver};

/// Verdict of one check, carrying the observed value either way
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    /// The condition holds
    Ready(T),
    /// The condition does not hold yet
    Pending(T),
}

impl<T> PollStatus<T> {
    /// Build a status from a done flag and a value
    pub fn from_flag(done: bool, value: T) -> Self {
        if done {
            PollStatus::Ready(value)
        } else {
            PollStatus::Pending(value)
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, PollStatus::Ready(_))
    }

    pub fn into_value(self) -> T {
        match self {
            PollStatus::Ready(value) | PollStatus::Pending(value) => value,
        }
    }
}

/// Interval growth between checks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollBackoff {
    pub multiplier: f64,
    pub max_interval: Duration,
}

/// Timing of a poll session
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Delay after a pending check
    pub interval: Duration,
    /// Total time budget measured from the start of the session
    pub max_wait: Duration,
    /// Optional growth of `interval` after every wait
    pub backoff: Option<PollBackoff>,
}

impl PollConfig {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self {
            interval,
            max_wait,
            backoff: None,
        }
    }

    pub fn with_backoff(mut self, multiplier: f64, max_interval: Duration) -> Self {
        self.backoff = Some(PollBackoff {
            multiplier,
            max_interval,
        });
        self
    }

    /// Interval to use after `current`
    pub fn next_interval(&self, current: Duration) -> Duration {
        match self.backoff {
            Some(backoff) if backoff.multiplier > 1.0 => {
                Duration::try_from_secs_f64(current.as_secs_f64() * backoff.multiplier)
                    .unwrap_or(backoff.max_interval)
                    .min(backoff.max_interval)
                    .max(current)
            }
            _ => current,
        }
    }
}

impl From<&PollSettings> for PollConfig {
    fn from(settings: &PollSettings) -> Self {
        let config = PollConfig::new(
            Duration::from_millis(settings.interval_ms),
            Duration::from_millis(settings.max_wait_ms),
        );
        if settings.backoff_multiplier > 1.0 {
            config.with_backoff(
                settings.backoff_multiplier,
                Duration::from_millis(settings.max_interval_ms),
            )
        } else {
            config
        }
    }
}

/// Phase of a poll session
///
/// `Idle -> Checking -> (Completed | Waiting -> Checking) -> (Completed | TimedOut | Cancelled)`.
/// Terminal phases have no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PollPhase {
    Idle,
    Checking,
    Waiting,
    Completed,
    TimedOut,
    Cancelled,
}

impl PollPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PollPhase::Completed | PollPhase::TimedOut | PollPhase::Cancelled
        )
    }

    pub fn can_transition_to(self, next: PollPhase) -> bool {
        use PollPhase::*;
        matches!(
            (self, next),
            (Idle, Checking)
                | (Idle, Cancelled)
                | (Checking, Completed)
                | (Checking, Waiting)
                | (Checking, TimedOut)
                | (Checking, Cancelled)
                | (Waiting, Checking)
                | (Waiting, TimedOut)
                | (Waiting, Cancelled)
        )
    }
}

impl fmt::Display for PollPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PollPhase::Idle => "idle",
            PollPhase::Checking => "checking",
            PollPhase::Waiting => "waiting",
            PollPhase::Completed => "completed",
            PollPhase::TimedOut => "timed-out",
            PollPhase::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Result of a poll session
#[derive(Debug, Clone)]
pub struct PollOutcome<T> {
    /// Value observed by the last check; `None` if no check ran
    pub value: Option<T>,
    /// Number of checks performed
    pub checks: u32,
    /// Time from session start to the terminal phase
    pub elapsed: Duration,
    /// Terminal phase
    pub state: PollPhase,
}

impl<T> PollOutcome<T> {
    pub fn completed(&self) -> bool {
        self.state == PollPhase::Completed
    }

    pub fn timed_out(&self) -> bool {
        self.state == PollPhase::TimedOut
    }

    pub fn cancelled(&self) -> bool {
        self.state == PollPhase::Cancelled
    }
}

/// Drives poll sessions
///
/// The service holds no per-session state; one instance can run any number
/// of concurrent sessions.
#[derive(Debug, Clone, Default)]
pub struct PollingService<O = NoOpPollObserver> {
    observer: O,
}

impl PollingService<NoOpPollObserver> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<O: PollObserver> PollingService<O> {
    pub fn with_observer(observer: O) -> Self {
        Self { observer }
    }

    /// Run `check` until it is ready or `config.max_wait` elapses
    ///
    /// At least one check is always performed. Each check is responsible for
    /// bounding its own duration.
    pub async fn poll<F, Fut, T>(&self, config: &PollConfig, check: F) -> PollOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PollStatus<T>>,
    {
        self.run(config, check, None).await
    }

    /// Like [`PollingService::poll`], stopping early when `cancel` fires
    ///
    /// A check in flight when the token fires is dropped.
    pub async fn poll_with_cancel<F, Fut, T>(
        &self,
        config: &PollConfig,
        check: F,
        cancel: &CancellationToken,
    ) -> PollOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PollStatus<T>>,
    {
        self.run(config, check, Some(cancel)).await
    }

    async fn run<F, Fut, T>(
        &self,
        config: &PollConfig,
        mut check: F,
        cancel: Option<&CancellationToken>,
    ) -> PollOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PollStatus<T>>,
    {
        let start = Instant::now();
        let deadline = start
            .checked_add(config.max_wait)
            .unwrap_or_else(|| start + Duration::from_secs(u64::from(u32::MAX)));
        let mut session = Session::new();
        let mut value = None;
        let mut checks = 0u32;
        let mut interval = config.interval;

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                session.advance(PollPhase::Cancelled);
                break;
            }

            session.advance(PollPhase::Checking);
            let status = tokio::select! {
                biased;
                _ = wait_cancelled(cancel) => None,
                status = check() => Some(status),
            };
            let Some(status) = status else {
                session.advance(PollPhase::Cancelled);
                break;
            };

            checks += 1;
            let ready = status.is_ready();
            value = Some(status.into_value());
            self.observer.on_check(checks, ready, start.elapsed());

            if ready {
                session.advance(PollPhase::Completed);
                break;
            }

            let now = Instant::now();
            if now >= deadline {
                session.advance(PollPhase::TimedOut);
                break;
            }

            session.advance(PollPhase::Waiting);
            let pause = interval.min(deadline - now);
            let cancelled = tokio::select! {
                biased;
                _ = wait_cancelled(cancel) => true,
                _ = tokio::time::sleep(pause) => false,
            };
            if cancelled {
                session.advance(PollPhase::Cancelled);
                break;
            }
            if Instant::now() >= deadline {
                session.advance(PollPhase::TimedOut);
                break;
            }

            interval = config.next_interval(interval);
        }

        let elapsed = start.elapsed();
        self.observer.on_finish(session.phase, checks, elapsed);

        PollOutcome {
            value,
            checks,
            elapsed,
            state: session.phase,
        }
    }
}

/// Phase tracker enforcing the session state machine
struct Session {
    phase: PollPhase,
}

impl Session {
    fn new() -> Self {
        Self {
            phase: PollPhase::Idle,
        }
    }

    fn advance(&mut self, next: PollPhase) {
        debug_assert!(
            self.phase.can_transition_to(next),
            "invalid poll transition {} -> {}",
            self.phase,
            next
        );
        self.phase = next;
    }
}

async fn wait_cancelled(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}
