//! Exclusive command runs and condition waits
//!
//! [`Orchestrator`] is the single entry point callers use. A command that
//! touches the CLI's shared context runs under the lock for its resource key,
//! through the retry engine, and the lock is released whatever the outcome.
//! Waits for external state go through the polling service without locking.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cliorch_core::lock::{LockError, ResourceLocker};
use cliorch_core::poll::{PollConfig, PollOutcome, PollStatus, PollingService, TracingPollObserver};
use cliorch_core::retry::{RetryError, RetryExecutorBuilder, RetryPredicate, TracingObserver};
use cliorch_core::types::{CommandRequest, CommandResult, RetryPolicy};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::check::CommandCheck;
use crate::executor::{CommandExecutor, ExecutionError, ProcessExecutor};
use crate::failure::{execute_checked, CliFailureClassifier, CommandFailure};

/// Resource key guarding the CLI's selected organization/project/workspace
pub const CLI_CONTEXT_KEY: &str = "cli-console-context";

/// Terminal failure of an exclusive run
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// The resource lock could not be acquired
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The command failed in a way that retrying cannot fix
    #[error("command failed: {0}")]
    Fatal(#[source] CommandFailure),

    /// The command kept failing until the attempt budget ran out
    #[error("command still failing after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: CommandFailure,
    },

    /// The caller cancelled the run
    #[error("cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl OrchestrationError {
    /// The last command result observed, if a process ran
    pub fn last_result(&self) -> Option<&CommandResult> {
        match self {
            OrchestrationError::Fatal(failure)
            | OrchestrationError::RetriesExhausted {
                source: failure, ..
            } => failure.result(),
            _ => None,
        }
    }

    pub fn is_lock_timeout(&self) -> bool {
        matches!(self, OrchestrationError::Lock(err) if err.is_timeout())
    }
}

impl From<RetryError<CommandFailure>> for OrchestrationError {
    fn from(err: RetryError<CommandFailure>) -> Self {
        match err {
            RetryError::Exhausted {
                attempts, source, ..
            } => OrchestrationError::RetriesExhausted { attempts, source },
            RetryError::NonRetryable { source, .. } => OrchestrationError::Fatal(source),
            RetryError::Cancelled { attempts, .. } => OrchestrationError::Cancelled { attempts },
        }
    }
}

/// Spawn failures are fatal whatever the caller's predicate says
struct SpawnIsFatal<P>(P);

impl<P: RetryPredicate<CommandFailure>> RetryPredicate<CommandFailure> for SpawnIsFatal<P> {
    fn should_retry(&self, error: &CommandFailure) -> bool {
        !error.is_spawn() && self.0.should_retry(error)
    }
}

/// Coordination facade over the executor, locker, retry engine and poller
///
/// Cheap to clone; clones share one lock registry.
pub struct Orchestrator<X = ProcessExecutor> {
    inner: Arc<Inner<X>>,
}

struct Inner<X> {
    executor: X,
    locker: ResourceLocker,
    classifier: CliFailureClassifier,
}

impl<X> Clone for Orchestrator<X> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Orchestrator<ProcessExecutor> {
    /// Orchestrator running real child processes with the default classifier
    pub fn new() -> Self {
        Self::with_executor(ProcessExecutor, CliFailureClassifier::default())
    }
}

impl Default for Orchestrator<ProcessExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<X: CommandExecutor> Orchestrator<X> {
    pub fn with_executor(executor: X, classifier: CliFailureClassifier) -> Self {
        Self {
            inner: Arc::new(Inner {
                executor,
                locker: ResourceLocker::new(),
                classifier,
            }),
        }
    }

    pub fn executor(&self) -> &X {
        &self.inner.executor
    }

    /// The lock registry, for diagnostics
    pub fn locker(&self) -> &ResourceLocker {
        &self.inner.locker
    }

    pub fn classifier(&self) -> &CliFailureClassifier {
        &self.inner.classifier
    }

    /// Run `request` while holding the lock for `key`
    ///
    /// Failures are classified with the orchestrator's [`CliFailureClassifier`].
    pub async fn run_exclusive(
        &self,
        key: &str,
        request: &CommandRequest,
        policy: &RetryPolicy,
        lock_timeout: Duration,
    ) -> Result<CommandResult, OrchestrationError> {
        self.run_exclusive_with(key, request, policy, lock_timeout, &self.inner.classifier, None)
            .await
    }

    /// [`Orchestrator::run_exclusive`] that stops when `cancel` fires
    ///
    /// The lock is released and any running child is killed before this
    /// returns [`OrchestrationError::Cancelled`].
    pub async fn run_exclusive_with_cancel(
        &self,
        key: &str,
        request: &CommandRequest,
        policy: &RetryPolicy,
        lock_timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<CommandResult, OrchestrationError> {
        self.run_exclusive_with(
            key,
            request,
            policy,
            lock_timeout,
            &self.inner.classifier,
            Some(cancel),
        )
        .await
    }

    /// Exclusive run with a caller-supplied failure classification
    pub async fn run_exclusive_with<P>(
        &self,
        key: &str,
        request: &CommandRequest,
        policy: &RetryPolicy,
        lock_timeout: Duration,
        predicate: P,
        cancel: Option<&CancellationToken>,
    ) -> Result<CommandResult, OrchestrationError>
    where
        P: RetryPredicate<CommandFailure>,
    {
        let acquire = self.inner.locker.acquire(key, lock_timeout);
        let guard = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(OrchestrationError::Cancelled { attempts: 0 }),
                guard = acquire => guard?,
            },
            None => acquire.await?,
        };

        tracing::debug!(key = %key, command = %request, "running exclusively");

        let retry = RetryExecutorBuilder::new()
            .with_policy(policy.clone())
            .with_predicate(SpawnIsFatal(predicate))
            .with_observer(TracingObserver::new(key))
            .build();
        let executor = &self.inner.executor;
        let op = || execute_checked(executor, request);

        let outcome = guard
            .scope(async {
                match cancel {
                    Some(token) => retry.execute_with_cancel(op, token).await,
                    None => retry.execute(op).await,
                }
            })
            .await;

        guard.release();
        outcome.map_err(OrchestrationError::from)
    }

    /// Poll `check` until it reports ready, without taking any lock
    pub async fn await_condition<F, Fut, T>(&self, config: &PollConfig, check: F) -> PollOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PollStatus<T>>,
    {
        PollingService::with_observer(TracingPollObserver::default())
            .poll(config, check)
            .await
    }

    /// [`Orchestrator::await_condition`] that stops when `cancel` fires
    pub async fn await_condition_with_cancel<F, Fut, T>(
        &self,
        config: &PollConfig,
        check: F,
        cancel: &CancellationToken,
    ) -> PollOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PollStatus<T>>,
    {
        PollingService::with_observer(TracingPollObserver::default())
            .poll_with_cancel(config, check, cancel)
            .await
    }

    /// Poll a CLI command until its success indicator holds
    pub async fn await_command(
        &self,
        check: &CommandCheck,
        config: &PollConfig,
        cancel: Option<&CancellationToken>,
    ) -> PollOutcome<Result<CommandResult, ExecutionError>> {
        let executor = &self.inner.executor;
        let probe = || check.probe(executor);
        let service = PollingService::with_observer(TracingPollObserver::new(check.request.to_string()));

        match cancel {
            Some(token) => service.poll_with_cancel(config, probe, token).await,
            None => service.poll(config, probe).await,
        }
    }
}
