//! Retry delay strategies and predicates
//!
//! This module implements the backoff schedule and the trait callers use to
//! classify an error as retryable or fatal.

use crate::types::{RetryPolicy, RetryStrategy};
use rand::Rng;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

/// Calculate the delay before the next retry attempt
///
/// `attempt` is the 1-indexed attempt that just failed. The raw delay is
/// capped at `max_delay_ms`; when `jitter` is set the capped value is then
/// multiplied by a random factor in `[1, 1 + jitter_fraction]`, so a delay
/// never exceeds `initial * multiplier^(attempt-1) * (1 + jitter_fraction)`.
///
/// Unjittered delays never decrease. Jittered delays never decrease while
/// the schedule is below the cap, provided the jitter band is narrower than
/// one growth step. Once the cap is reached each delay is drawn
/// independently from `[cap, cap * (1 + jitter_fraction)]`, so one delay may
/// be shorter than the one before it.
///
/// # Example
///
/// ```rust
/// use cliorch_core::retry::calculate_delay;
/// use cliorch_core::types::{RetryPolicy, RetryStrategy};
///
/// let policy = RetryPolicy {
///     max_attempts: 3,
///     strategy: RetryStrategy::ExponentialBackoff,
///     backoff_multiplier: 2.0,
///     initial_delay_ms: 1000,
///     max_delay_ms: 30000,
///     jitter_fraction: 0.25,
/// };
///
/// assert_eq!(calculate_delay(&policy, 1, false).as_millis(), 1000);
/// assert_eq!(calculate_delay(&policy, 2, false).as_millis(), 2000);
/// ```
pub fn calculate_delay(policy: &RetryPolicy, attempt: u32, jitter: bool) -> Duration {
    let capped_delay_ms = base_delay_ms(policy, attempt).min(policy.max_delay_ms);

    let final_delay_ms = if jitter && capped_delay_ms > 0 {
        let fraction = jitter_fraction(policy);
        if fraction > 0.0 {
            let factor = 1.0 + rand::rng().random_range(0.0..=fraction);
            (capped_delay_ms as f64 * factor) as u64
        } else {
            capped_delay_ms
        }
    } else {
        capped_delay_ms
    };

    Duration::from_millis(final_delay_ms)
}

/// Uncapped, unjittered delay for the given 1-indexed attempt
fn base_delay_ms(policy: &RetryPolicy, attempt: u32) -> u64 {
    let attempt_index = attempt.saturating_sub(1);

    match policy.strategy {
        RetryStrategy::None => 0,

        RetryStrategy::FixedDelay => policy.initial_delay_ms,

        RetryStrategy::ExponentialBackoff => {
            let multiplier = policy.backoff_multiplier.max(1.0).powf(attempt_index as f64);
            let delay = policy.initial_delay_ms as f64 * multiplier;
            if delay.is_finite() && delay < u64::MAX as f64 {
                delay as u64
            } else {
                u64::MAX
            }
        }

        RetryStrategy::LinearBackoff => policy
            .initial_delay_ms
            .saturating_mul(u64::from(attempt_index) + 1),
    }
}

/// Jitter fraction clamped to `[0, 1]`
fn jitter_fraction(policy: &RetryPolicy) -> f64 {
    if policy.jitter_fraction.is_nan() {
        0.0
    } else {
        policy.jitter_fraction.clamp(0.0, 1.0)
    }
}

/// A predicate that determines whether an error should be retried
///
/// Classification is always supplied by the caller; the retry engine itself
/// has no opinion on which failures are transient.
///
/// # Example
///
/// ```rust
/// use cliorch_core::retry::RetryPredicate;
/// use std::io::{Error, ErrorKind};
///
/// struct IoRetryPredicate;
///
/// impl RetryPredicate<Error> for IoRetryPredicate {
///     fn should_retry(&self, error: &Error) -> bool {
///         !matches!(
///             error.kind(),
///             ErrorKind::NotFound | ErrorKind::PermissionDenied | ErrorKind::InvalidInput
///         )
///     }
/// }
/// ```
pub trait RetryPredicate<E: ?Sized>: Send + Sync {
    /// Determine whether the given error should be retried
    fn should_retry(&self, error: &E) -> bool;
}

/// A predicate that always returns true (all errors are retryable)
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<E: ?Sized> RetryPredicate<E> for AlwaysRetry {
    fn should_retry(&self, _error: &E) -> bool {
        true
    }
}

/// A predicate that never retries (no errors are retryable)
#[derive(Debug, Clone, Copy)]
pub struct NeverRetry;

impl<E: ?Sized> RetryPredicate<E> for NeverRetry {
    fn should_retry(&self, _error: &E) -> bool {
        false
    }
}

/// A predicate that uses a closure to determine retryability
pub struct ClosurePredicate<F> {
    predicate: F,
}

impl<F> ClosurePredicate<F> {
    /// Create a new closure-based predicate
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<E, F> RetryPredicate<E> for ClosurePredicate<F>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &E) -> bool {
        (self.predicate)(error)
    }
}

/// A predicate that retries only on specific error messages
#[derive(Debug, Clone)]
pub struct MessagePredicate {
    /// Lowercased patterns that indicate retryable errors
    retryable_patterns: Vec<String>,
}

impl MessagePredicate {
    /// Create a new message predicate with the given patterns
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            retryable_patterns: patterns.into_iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// Create a predicate for common network errors
    pub fn network_errors() -> Self {
        Self::new(vec![
            "timeout".to_string(),
            "timed out".to_string(),
            "connection reset".to_string(),
            "connection refused".to_string(),
            "network unreachable".to_string(),
            "temporary failure".to_string(),
        ])
    }

    /// Whether a message matches any retryable pattern
    pub fn matches(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.retryable_patterns
            .iter()
            .any(|pattern| message.contains(pattern.as_str()))
    }
}

impl<E: Error> RetryPredicate<E> for MessagePredicate {
    fn should_retry(&self, error: &E) -> bool {
        self.matches(&error.to_string())
    }
}

impl<E: ?Sized, P: RetryPredicate<E> + ?Sized> RetryPredicate<E> for &P {
    fn should_retry(&self, error: &E) -> bool {
        (**self).should_retry(error)
    }
}

impl<E: ?Sized, P: RetryPredicate<E> + ?Sized> RetryPredicate<E> for Arc<P> {
    fn should_retry(&self, error: &E) -> bool {
        (**self).should_retry(error)
    }
}
