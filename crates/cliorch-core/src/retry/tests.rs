//! Integration tests for the retry module
//!
//! These tests drive the complete retry flow with a paused clock so that
//! backoff delays can be asserted exactly.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::retry::error::RetryError;
use crate::retry::executor::{retry_with_policy, retry_with_predicate, RetryExecutorBuilder};
use crate::retry::observer::{AttemptRecord, RetryObserver, StatsObserver};
use crate::retry::strategies::{calculate_delay, ClosurePredicate, MessagePredicate, NeverRetry};
use crate::types::{RetryPolicy, RetryStrategy};

fn policy(max_attempts: u32, strategy: RetryStrategy) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        strategy,
        backoff_multiplier: 2.0,
        initial_delay_ms: 100,
        max_delay_ms: 10_000,
        jitter_fraction: 0.25,
    }
}

/// Records every delay the executor schedules
#[derive(Default)]
struct DelayRecorder {
    delays: Mutex<Vec<Duration>>,
}

impl DelayRecorder {
    fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

impl RetryObserver for DelayRecorder {
    fn on_attempt_start(&self, _attempt: u32, _max_attempts: u32) {}

    fn on_attempt_failed(&self, record: &AttemptRecord<'_>) {
        self.delays.lock().unwrap().push(record.delay);
    }

    fn on_success(&self, _attempt: u32, _total_duration: Duration) {}

    fn on_exhausted(&self, _attempts: u32, _final_error: &dyn std::error::Error) {}
}

/// An operation that fails `failures` times before succeeding
fn flaky(
    calls: Arc<AtomicU32>,
    failures: u32,
) -> impl FnMut() -> std::future::Ready<Result<u32, io::Error>> {
    move || {
        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= failures {
            std::future::ready(Err(io::Error::new(io::ErrorKind::TimedOut, "timed out")))
        } else {
            std::future::ready(Ok(call))
        }
    }
}

// ============================================================================
// Strategy Tests
// ============================================================================

#[test]
fn test_strategy_exponential_doubles() {
    let policy = policy(5, RetryStrategy::ExponentialBackoff);

    let delays: Vec<u128> = (1..=5)
        .map(|attempt| calculate_delay(&policy, attempt, false).as_millis())
        .collect();
    assert_eq!(delays, vec![100, 200, 400, 800, 1600]);
}

#[test]
fn test_strategy_fixed_constant_delay() {
    let policy = policy(5, RetryStrategy::FixedDelay);

    for attempt in 1..=5 {
        assert_eq!(
            calculate_delay(&policy, attempt, false),
            Duration::from_millis(100)
        );
    }
}

#[test]
fn test_max_delay_caps_all_strategies() {
    for strategy in [
        RetryStrategy::FixedDelay,
        RetryStrategy::ExponentialBackoff,
        RetryStrategy::LinearBackoff,
    ] {
        let policy = RetryPolicy {
            backoff_multiplier: 10.0,
            initial_delay_ms: 10_000,
            max_delay_ms: 5_000,
            ..policy(10, strategy)
        };

        for attempt in 1..=10 {
            assert_eq!(
                calculate_delay(&policy, attempt, false),
                Duration::from_millis(5_000),
                "{:?} at attempt {} ignored max_delay",
                strategy,
                attempt
            );
        }
    }
}

#[test]
fn test_jitter_stays_within_bounds() {
    let policy = policy(5, RetryStrategy::ExponentialBackoff);

    for _ in 0..1000 {
        for attempt in 1..=5u32 {
            let base = 100u64 * 2u64.pow(attempt - 1);
            let delay = calculate_delay(&policy, attempt, true).as_millis() as u64;
            assert!(delay >= base, "delay {} below base {}", delay, base);
            assert!(
                delay as f64 <= base as f64 * 1.25,
                "delay {} above jitter bound for base {}",
                delay,
                base
            );
        }
    }
}

#[test]
fn test_jittered_backoff_is_monotonic() {
    // The jitter band (25%) is narrower than the doubling step, so successive
    // delays never shrink.
    let policy = policy(6, RetryStrategy::ExponentialBackoff);

    for _ in 0..200 {
        let delays: Vec<Duration> = (1..=6)
            .map(|attempt| calculate_delay(&policy, attempt, true))
            .collect();
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}

#[test]
fn test_capped_delays_stay_in_jitter_band() {
    let mut policy = policy(10, RetryStrategy::ExponentialBackoff);
    policy.max_delay_ms = 400;

    let plain: Vec<u128> = (1..=10)
        .map(|attempt| calculate_delay(&policy, attempt, false).as_millis())
        .collect();
    assert!(plain.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(plain[9], 400);

    // Past the cap each draw is independent, bounded by the band around the cap
    for _ in 0..200 {
        for attempt in 4..=10 {
            let delay = calculate_delay(&policy, attempt, true).as_millis();
            assert!((400..=500).contains(&delay), "delay {} outside cap band", delay);
        }
    }
}

// ============================================================================
// Executor Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_always_failing_op_runs_exactly_max_attempts() {
    for max_attempts in 1..=4 {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_with_policy(
            &policy(max_attempts, RetryStrategy::FixedDelay),
            flaky(calls.clone(), u32::MAX),
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), max_attempts);
        assert_eq!(calls.load(Ordering::SeqCst), max_attempts);
    }
}

#[tokio::test(start_paused = true)]
async fn test_fail_twice_then_succeed() {
    let calls = Arc::new(AtomicU32::new(0));
    let observer = Arc::new(StatsObserver::new());

    let result = RetryExecutorBuilder::new()
        .with_policy(policy(5, RetryStrategy::ExponentialBackoff))
        .with_observer(observer.clone())
        .with_jitter(false)
        .build()
        .execute(flaky(calls.clone(), 2))
        .await;

    assert_eq!(result.unwrap(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(observer.failures(), 2);
    assert_eq!(observer.successes(), 1);
    assert_eq!(observer.total_delay(), Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_sleeps_follow_schedule() {
    let calls = Arc::new(AtomicU32::new(0));
    let recorder = Arc::new(DelayRecorder::default());
    let start = Instant::now();

    let result = RetryExecutorBuilder::new()
        .with_policy(policy(4, RetryStrategy::ExponentialBackoff))
        .with_observer(recorder.clone())
        .with_jitter(false)
        .build()
        .execute(flaky(calls, u32::MAX))
        .await;

    assert!(result.unwrap_err().is_exhausted());
    assert_eq!(
        recorder.delays(),
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400)
        ]
    );
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(700));
    assert!(elapsed < Duration::from_millis(710));
}

#[tokio::test(start_paused = true)]
async fn test_fatal_error_short_circuits_without_sleeping() {
    let calls = Arc::new(AtomicU32::new(0));
    let start = Instant::now();

    let result = retry_with_predicate(
        &policy(5, RetryStrategy::FixedDelay),
        NeverRetry,
        flaky(calls.clone(), u32::MAX),
    )
    .await;

    let err = result.unwrap_err();
    assert!(err.is_non_retryable());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_predicate_decides_per_error() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let result: Result<(), RetryError<io::Error>> = retry_with_predicate(
        &policy(5, RetryStrategy::FixedDelay),
        MessagePredicate::network_errors(),
        move || {
            let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
            let err = if call < 3 {
                io::Error::other("connection reset by peer")
            } else {
                io::Error::other("401 unauthorized")
            };
            async move { Err(err) }
        },
    )
    .await;

    let err = result.unwrap_err();
    assert!(err.is_non_retryable());
    assert_eq!(err.attempts(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_closure_predicate_with_observer() {
    let observer = Arc::new(StatsObserver::new());
    let calls = Arc::new(AtomicU32::new(0));

    let result = RetryExecutorBuilder::new()
        .with_policy(policy(3, RetryStrategy::None))
        .with_predicate(ClosurePredicate::new(|err: &io::Error| {
            err.kind() == io::ErrorKind::TimedOut
        }))
        .with_observer(observer.clone())
        .build()
        .execute(flaky(calls, 1))
        .await;

    assert_eq!(result.unwrap(), 2);
    assert_eq!(observer.attempt_starts(), 2);
    assert_eq!(observer.failures(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff_sleep() {
    let token = CancellationToken::new();
    let calls = Arc::new(AtomicU32::new(0));
    let observer = Arc::new(StatsObserver::new());

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let result = RetryExecutorBuilder::new()
        .with_policy(RetryPolicy {
            initial_delay_ms: 10_000,
            ..policy(5, RetryStrategy::FixedDelay)
        })
        .with_observer(observer.clone())
        .with_jitter(false)
        .build()
        .execute_with_cancel(flaky(calls.clone(), u32::MAX), &token)
        .await;

    let err = result.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.attempts(), 1);
    assert!(err.source_ref().is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(observer.cancellations(), 1);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_drops_in_flight_attempt() {
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let result: Result<(), RetryError<io::Error>> = RetryExecutorBuilder::new()
        .with_policy(policy(3, RetryStrategy::FixedDelay))
        .build()
        .execute_with_cancel(
            || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            },
            &token,
        )
        .await;

    let err = result.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.attempts(), 1);
    assert!(err.source_ref().is_none());
}
