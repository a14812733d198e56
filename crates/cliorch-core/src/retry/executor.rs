//! Retry execution engine
//!
//! This module provides the core retry execution logic with configurable
//! policies, predicates, and observers.

use std::error::Error;
use std::future::Future;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::types::RetryPolicy;

use super::error::RetryError;
use super::observer::{AttemptRecord, NoOpObserver, RetryObserver, TracingObserver};
use super::strategies::{calculate_delay, AlwaysRetry, RetryPredicate};

/// Execute an async operation with retry logic based on a policy
///
/// Every error is treated as retryable. Use [`retry_with_predicate`] when
/// some failures must short-circuit.
///
/// # Example
///
/// ```rust,no_run
/// use cliorch_core::retry::retry_with_policy;
/// use cliorch_core::types::RetryPolicy;
///
/// async fn example() {
///     let policy = RetryPolicy::default();
///
///     let result = retry_with_policy(&policy, || async {
///         Ok::<_, std::io::Error>("success")
///     }).await;
/// }
/// ```
pub async fn retry_with_policy<F, Fut, T, E>(policy: &RetryPolicy, op: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Error + Send + 'static,
{
    RetryExecutorBuilder::new()
        .with_policy(policy.clone())
        .with_observer(TracingObserver::default())
        .build()
        .execute(op)
        .await
}

/// Execute an async operation, retrying only errors the predicate accepts
///
/// An error the predicate rejects is returned immediately as
/// [`RetryError::NonRetryable`] without sleeping.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    predicate: P,
    op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Error + Send + 'static,
    P: RetryPredicate<E>,
{
    RetryExecutorBuilder::new()
        .with_policy(policy.clone())
        .with_predicate(predicate)
        .with_observer(TracingObserver::default())
        .build()
        .execute(op)
        .await
}

/// Builder for configuring a `RetryExecutor`
///
/// # Example
///
/// ```rust
/// use cliorch_core::retry::{RetryExecutorBuilder, TracingObserver};
/// use cliorch_core::types::RetryPolicy;
///
/// let executor = RetryExecutorBuilder::new()
///     .with_policy(RetryPolicy::default())
///     .with_observer(TracingObserver::new("org-select"))
///     .with_jitter(true)
///     .build();
/// ```
pub struct RetryExecutorBuilder<P = AlwaysRetry, O = NoOpObserver> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    jitter: bool,
}

impl Default for RetryExecutorBuilder<AlwaysRetry, NoOpObserver> {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryExecutorBuilder<AlwaysRetry, NoOpObserver> {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::default(),
            predicate: AlwaysRetry,
            observer: NoOpObserver,
            jitter: true,
        }
    }
}

impl<P, O> RetryExecutorBuilder<P, O> {
    /// Set the retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the retry predicate
    pub fn with_predicate<P2>(self, predicate: P2) -> RetryExecutorBuilder<P2, O> {
        RetryExecutorBuilder {
            policy: self.policy,
            predicate,
            observer: self.observer,
            jitter: self.jitter,
        }
    }

    /// Set the observer
    pub fn with_observer<O2>(self, observer: O2) -> RetryExecutorBuilder<P, O2> {
        RetryExecutorBuilder {
            policy: self.policy,
            predicate: self.predicate,
            observer,
            jitter: self.jitter,
        }
    }

    /// Enable or disable jitter (enabled by default)
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Build the executor
    pub fn build(self) -> RetryExecutor<P, O> {
        RetryExecutor {
            policy: self.policy,
            predicate: self.predicate,
            observer: self.observer,
            jitter: self.jitter,
        }
    }
}

/// A retry executor with configurable policy, predicate, and observer
///
/// Use `RetryExecutorBuilder` to create an instance.
pub struct RetryExecutor<P, O> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    jitter: bool,
}

impl<P, O> RetryExecutor<P, O>
where
    O: RetryObserver,
{
    /// The policy this executor runs with
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Number of attempts actually made; a zero budget still runs once
    pub fn effective_max_attempts(&self) -> u32 {
        self.policy.max_attempts.max(1)
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + Send + 'static,
        P: RetryPredicate<E>,
    {
        self.run(op, None).await
    }

    /// Execute an operation with retry logic, stopping when `cancel` fires
    ///
    /// Cancellation is honoured both while an attempt is in flight and while
    /// sleeping between attempts. An in-flight attempt future is dropped.
    pub async fn execute_with_cancel<F, Fut, T, E>(
        &self,
        op: F,
        cancel: &CancellationToken,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + Send + 'static,
        P: RetryPredicate<E>,
    {
        self.run(op, Some(cancel)).await
    }

    async fn run<F, Fut, T, E>(
        &self,
        mut op: F,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + Send + 'static,
        P: RetryPredicate<E>,
    {
        let start = Instant::now();
        let max_attempts = self.effective_max_attempts();
        let mut last_error: Option<E> = None;
        let mut attempt: u32 = 1;

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                self.observer.on_cancelled(attempt - 1);
                return Err(RetryError::cancelled(attempt - 1, last_error));
            }

            self.observer.on_attempt_start(attempt, max_attempts);

            let outcome = tokio::select! {
                biased;
                _ = wait_cancelled(cancel) => None,
                result = op() => Some(result),
            };

            let err = match outcome {
                None => {
                    self.observer.on_cancelled(attempt);
                    return Err(RetryError::cancelled(attempt, last_error));
                }
                Some(Ok(value)) => {
                    self.observer.on_success(attempt, start.elapsed());
                    return Ok(value);
                }
                Some(Err(err)) => err,
            };

            if !self.predicate.should_retry(&err) {
                self.observer.on_non_retryable(attempt, &err);
                return Err(RetryError::non_retryable(attempt, err));
            }

            if attempt >= max_attempts {
                self.observer.on_exhausted(attempt, &err);
                return Err(RetryError::exhausted(attempt, err, start.elapsed()));
            }

            let delay = calculate_delay(&self.policy, attempt, self.jitter);
            self.observer.on_attempt_failed(&AttemptRecord {
                attempt,
                max_attempts,
                error: &err,
                delay,
            });
            last_error = Some(err);

            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = wait_cancelled(cancel) => {
                        self.observer.on_cancelled(attempt);
                        return Err(RetryError::cancelled(attempt, last_error));
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            attempt += 1;
        }
    }
}

/// Resolve when the token fires; never resolves without a token
async fn wait_cancelled(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::observer::StatsObserver;
    use crate::retry::strategies::ClosurePredicate;
    use crate::types::RetryStrategy;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn test_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            strategy: RetryStrategy::FixedDelay,
            backoff_multiplier: 2.0,
            initial_delay_ms: 10,
            max_delay_ms: 100,
            jitter_fraction: 0.0,
        }
    }

    #[tokio::test]
    async fn test_immediate_success() {
        let observer = Arc::new(StatsObserver::new());

        let result: Result<&str, RetryError<io::Error>> = RetryExecutorBuilder::new()
            .with_policy(test_policy())
            .with_observer(observer.clone())
            .build()
            .execute(|| async { Ok("success") })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(observer.attempt_starts(), 1);
        assert_eq!(observer.successes(), 1);
        assert_eq!(observer.failures(), 0);
    }

    #[tokio::test]
    async fn test_non_retryable_error_has_no_delay() {
        let observer = Arc::new(StatsObserver::new());
        let predicate =
            ClosurePredicate::new(|err: &io::Error| err.kind() != io::ErrorKind::NotFound);

        let result: Result<&str, RetryError<io::Error>> = RetryExecutorBuilder::new()
            .with_policy(test_policy())
            .with_predicate(predicate)
            .with_observer(observer.clone())
            .build()
            .execute(|| async { Err(io::Error::new(io::ErrorKind::NotFound, "not found")) })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_non_retryable());
        assert_eq!(err.attempts(), 1);
        assert_eq!(observer.attempt_starts(), 1);
        assert_eq!(observer.non_retryable(), 1);
        assert_eq!(observer.total_delay(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_zero_max_attempts_runs_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..test_policy()
        };
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<&str, RetryError<io::Error>> = retry_with_policy(&policy, || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(io::Error::other("error")) }
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_attempt() {
        let policy = RetryPolicy {
            max_attempts: 1,
            ..test_policy()
        };
        let observer = Arc::new(StatsObserver::new());

        let result: Result<&str, RetryError<io::Error>> = RetryExecutorBuilder::new()
            .with_policy(policy)
            .with_observer(observer.clone())
            .build()
            .execute(|| async { Err(io::Error::other("error")) })
            .await;

        assert!(result.unwrap_err().is_exhausted());
        assert_eq!(observer.attempt_starts(), 1);
        assert_eq!(observer.exhaustions(), 1);
        assert_eq!(observer.failures(), 0);
    }

    #[tokio::test]
    async fn test_already_cancelled_token_runs_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), RetryError<io::Error>> = RetryExecutorBuilder::new()
            .with_policy(test_policy())
            .build()
            .execute_with_cancel(
                || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                },
                &token,
            )
            .await;

        let err = result.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.attempts(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

