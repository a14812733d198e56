//! Poll session observation

use std::sync::Arc;
use std::time::Duration;

use super::service::PollPhase;

/// Observer for poll session events
pub trait PollObserver: Send + Sync {
    /// Called after every check with its 1-indexed number and verdict
    fn on_check(&self, check: u32, ready: bool, elapsed: Duration);

    /// Called once when the session reaches a terminal phase
    fn on_finish(&self, phase: PollPhase, checks: u32, elapsed: Duration);
}

/// A no-op poll observer
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpPollObserver;

impl PollObserver for NoOpPollObserver {
    fn on_check(&self, _check: u32, _ready: bool, _elapsed: Duration) {}

    fn on_finish(&self, _phase: PollPhase, _checks: u32, _elapsed: Duration) {}
}

/// Logs poll events through `tracing`
///
/// Checks are logged at DEBUG. Completion and cancellation are logged at
/// INFO; a session that runs out of time is logged at WARN.
#[derive(Debug, Clone)]
pub struct TracingPollObserver {
    operation: String,
}

impl TracingPollObserver {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Default for TracingPollObserver {
    fn default() -> Self {
        Self::new("poll")
    }
}

impl PollObserver for TracingPollObserver {
    fn on_check(&self, check: u32, ready: bool, elapsed: Duration) {
        tracing::debug!(
            operation = %self.operation,
            check = check,
            ready = ready,
            elapsed_ms = elapsed.as_millis() as u64,
            "poll check"
        );
    }

    fn on_finish(&self, phase: PollPhase, checks: u32, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        match phase {
            PollPhase::TimedOut => tracing::warn!(
                operation = %self.operation,
                checks = checks,
                elapsed_ms = elapsed_ms,
                "condition not met before deadline"
            ),
            _ => tracing::info!(
                operation = %self.operation,
                phase = %phase,
                checks = checks,
                elapsed_ms = elapsed_ms,
                "poll finished"
            ),
        }
    }
}

impl<T: PollObserver + ?Sized> PollObserver for Arc<T> {
    fn on_check(&self, check: u32, ready: bool, elapsed: Duration) {
        (**self).on_check(check, ready, elapsed)
    }

    fn on_finish(&self, phase: PollPhase, checks: u32, elapsed: Duration) {
        (**self).on_finish(phase, checks, elapsed)
    }
}
