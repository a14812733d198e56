//! Retry observation and logging
//!
//! This module provides the `RetryObserver` trait for monitoring retry attempts
//! and a `TracingObserver` implementation that logs using the `tracing` crate.

use std::error::Error;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Details of a failed attempt that is about to be retried
#[derive(Debug, Clone, Copy)]
pub struct AttemptRecord<'a> {
    /// The attempt number that failed (1-indexed)
    pub attempt: u32,
    /// The maximum number of attempts configured
    pub max_attempts: u32,
    /// The error that caused the failure
    pub error: &'a dyn Error,
    /// The delay before the next attempt
    pub delay: Duration,
}

/// Observer trait for retry attempt events
///
/// Implement this trait to receive callbacks during retry execution.
/// This is useful for logging, metrics collection, or debugging.
///
/// # Example
///
/// ```rust
/// use cliorch_core::retry::{AttemptRecord, RetryObserver};
/// use std::error::Error;
/// use std::time::Duration;
///
/// struct AuditObserver;
///
/// impl RetryObserver for AuditObserver {
///     fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {}
///
///     fn on_attempt_failed(&self, record: &AttemptRecord<'_>) {
///         eprintln!("attempt {} failed: {}", record.attempt, record.error);
///     }
///
///     fn on_success(&self, attempt: u32, total_duration: Duration) {}
///
///     fn on_exhausted(&self, attempts: u32, final_error: &dyn Error) {}
/// }
/// ```
pub trait RetryObserver: Send + Sync {
    /// Called when an attempt is about to start
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32);

    /// Called when an attempt fails and will be retried
    fn on_attempt_failed(&self, record: &AttemptRecord<'_>);

    /// Called when the operation succeeds
    fn on_success(&self, attempt: u32, total_duration: Duration);

    /// Called when all retry attempts are exhausted
    fn on_exhausted(&self, attempts: u32, final_error: &dyn Error);

    /// Called when the predicate classifies an error as fatal
    fn on_non_retryable(&self, attempt: u32, error: &dyn Error) {
        let _ = (attempt, error);
    }

    /// Called when the caller cancels the retry loop
    fn on_cancelled(&self, attempts: u32) {
        let _ = attempts;
    }
}

/// A no-op observer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RetryObserver for NoOpObserver {
    fn on_attempt_start(&self, _attempt: u32, _max_attempts: u32) {}

    fn on_attempt_failed(&self, _record: &AttemptRecord<'_>) {}

    fn on_success(&self, _attempt: u32, _total_duration: Duration) {}

    fn on_exhausted(&self, _attempts: u32, _final_error: &dyn Error) {}
}

/// An observer that logs retry events using the `tracing` crate
///
/// # Log Levels
///
/// - `on_attempt_start`: DEBUG
/// - `on_attempt_failed`: WARN
/// - `on_success`: INFO (if > 1 attempt) or DEBUG (first attempt)
/// - `on_exhausted`: ERROR
/// - `on_non_retryable`: WARN
/// - `on_cancelled`: INFO
#[derive(Debug, Clone)]
pub struct TracingObserver {
    /// Name of the operation being retried (for log context)
    operation: String,
}

impl TracingObserver {
    /// Create a new tracing observer for the named operation
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    /// Get the operation name
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new("retry")
    }
}

impl RetryObserver for TracingObserver {
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {
        tracing::debug!(
            operation = %self.operation,
            attempt = attempt,
            max_attempts = max_attempts,
            "starting attempt"
        );
    }

    fn on_attempt_failed(&self, record: &AttemptRecord<'_>) {
        tracing::warn!(
            operation = %self.operation,
            attempt = record.attempt,
            max_attempts = record.max_attempts,
            error = %record.error,
            delay_ms = record.delay.as_millis() as u64,
            "attempt failed, will retry"
        );
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        if attempt > 1 {
            tracing::info!(
                operation = %self.operation,
                attempt = attempt,
                total_duration_ms = total_duration.as_millis() as u64,
                "succeeded after retry"
            );
        } else {
            tracing::debug!(
                operation = %self.operation,
                duration_ms = total_duration.as_millis() as u64,
                "succeeded on first attempt"
            );
        }
    }

    fn on_exhausted(&self, attempts: u32, final_error: &dyn Error) {
        tracing::error!(
            operation = %self.operation,
            attempts = attempts,
            error = %final_error,
            "all retry attempts exhausted"
        );
    }

    fn on_non_retryable(&self, attempt: u32, error: &dyn Error) {
        tracing::warn!(
            operation = %self.operation,
            attempt = attempt,
            error = %error,
            "giving up on non-retryable error"
        );
    }

    fn on_cancelled(&self, attempts: u32) {
        tracing::info!(
            operation = %self.operation,
            attempts = attempts,
            "retry cancelled"
        );
    }
}

/// An observer that counts retry events
///
/// Useful for testing and metrics collection.
#[derive(Debug, Default)]
pub struct StatsObserver {
    attempt_starts: AtomicU32,
    failures: AtomicU32,
    successes: AtomicU32,
    exhaustions: AtomicU32,
    non_retryable: AtomicU32,
    cancellations: AtomicU32,
    /// Sum of all scheduled delays, in milliseconds
    total_delay_ms: AtomicU32,
}

impl StatsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempt_starts(&self) -> u32 {
        self.attempt_starts.load(Ordering::SeqCst)
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn exhaustions(&self) -> u32 {
        self.exhaustions.load(Ordering::SeqCst)
    }

    pub fn non_retryable(&self) -> u32 {
        self.non_retryable.load(Ordering::SeqCst)
    }

    pub fn cancellations(&self) -> u32 {
        self.cancellations.load(Ordering::SeqCst)
    }

    pub fn total_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.total_delay_ms.load(Ordering::SeqCst)))
    }
}

impl RetryObserver for StatsObserver {
    fn on_attempt_start(&self, _attempt: u32, _max_attempts: u32) {
        self.attempt_starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_attempt_failed(&self, record: &AttemptRecord<'_>) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        let delay_ms = u32::try_from(record.delay.as_millis()).unwrap_or(u32::MAX);
        self.total_delay_ms.fetch_add(delay_ms, Ordering::SeqCst);
    }

    fn on_success(&self, _attempt: u32, _total_duration: Duration) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_exhausted(&self, _attempts: u32, _final_error: &dyn Error) {
        self.exhaustions.fetch_add(1, Ordering::SeqCst);
    }

    fn on_non_retryable(&self, _attempt: u32, _error: &dyn Error) {
        self.non_retryable.fetch_add(1, Ordering::SeqCst);
    }

    fn on_cancelled(&self, _attempts: u32) {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
    }
}

impl<T: RetryObserver + ?Sized> RetryObserver for Arc<T> {
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {
        (**self).on_attempt_start(attempt, max_attempts)
    }

    fn on_attempt_failed(&self, record: &AttemptRecord<'_>) {
        (**self).on_attempt_failed(record)
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        (**self).on_success(attempt, total_duration)
    }

    fn on_exhausted(&self, attempts: u32, final_error: &dyn Error) {
        (**self).on_exhausted(attempts, final_error)
    }

    fn on_non_retryable(&self, attempt: u32, error: &dyn Error) {
        (**self).on_non_retryable(attempt, error)
    }

    fn on_cancelled(&self, attempts: u32) {
        (**self).on_cancelled(attempts)
    }
}

impl<T: RetryObserver + ?Sized> RetryObserver for Box<T> {
    fn on_attempt_start(&self, attempt: u32, max_attempts: u32) {
        (**self).on_attempt_start(attempt, max_attempts)
    }

    fn on_attempt_failed(&self, record: &AttemptRecord<'_>) {
        (**self).on_attempt_failed(record)
    }

    fn on_success(&self, attempt: u32, total_duration: Duration) {
        (**self).on_success(attempt, total_duration)
    }

    fn on_exhausted(&self, attempts: u32, final_error: &dyn Error) {
        (**self).on_exhausted(attempts, final_error)
    }

    fn on_non_retryable(&self, attempt: u32, error: &dyn Error) {
        (**self).on_non_retryable(attempt, error)
    }

    fn on_cancelled(&self, attempts: u32) {
        (**self).on_cancelled(attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn record(error: &io::Error, delay_ms: u64) -> AttemptRecord<'_> {
        AttemptRecord {
            attempt: 1,
            max_attempts: 3,
            error,
            delay: Duration::from_millis(delay_ms),
        }
    }

    #[test]
    fn test_stats_observer_counts_events() {
        let observer = StatsObserver::new();
        let error = io::Error::other("test");

        observer.on_attempt_start(1, 3);
        observer.on_attempt_failed(&record(&error, 100));
        observer.on_attempt_start(2, 3);
        observer.on_attempt_failed(&record(&error, 200));
        observer.on_attempt_start(3, 3);
        observer.on_exhausted(3, &error);

        assert_eq!(observer.attempt_starts(), 3);
        assert_eq!(observer.failures(), 2);
        assert_eq!(observer.exhaustions(), 1);
        assert_eq!(observer.total_delay(), Duration::from_millis(300));
    }

    #[test]
    fn test_stats_observer_separates_fatal_from_cancelled() {
        let observer = StatsObserver::new();
        let error = io::Error::other("forbidden");

        observer.on_non_retryable(1, &error);
        observer.on_cancelled(2);

        assert_eq!(observer.non_retryable(), 1);
        assert_eq!(observer.cancellations(), 1);
    }

    #[test]
    fn test_tracing_observer_creation() {
        assert_eq!(TracingObserver::new("org-select").operation(), "org-select");
        assert_eq!(TracingObserver::default().operation(), "retry");
    }

    #[test]
    fn test_boxed_observer_delegates() {
        let stats = Arc::new(StatsObserver::new());
        let boxed: Box<dyn RetryObserver> = Box::new(stats.clone());

        boxed.on_attempt_start(1, 1);
        boxed.on_success(1, Duration::from_millis(3));

        assert_eq!(stats.attempt_starts(), 1);
        assert_eq!(stats.successes(), 1);
    }
}
