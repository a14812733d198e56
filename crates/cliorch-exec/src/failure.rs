//! Command failure taxonomy and the default retry classifier

use std::time::Duration;

use cliorch_core::retry::RetryPredicate;
use cliorch_core::types::{CliConfig, CommandRequest, CommandResult};
use thiserror::Error;

use crate::executor::{CommandExecutor, ExecutionError};

/// A command that did not succeed
#[derive(Debug, Error)]
pub enum CommandFailure {
    /// The process could not be started; never retried
    #[error(transparent)]
    Spawn(#[from] ExecutionError),

    /// The process ran and exited unsuccessfully
    #[error("`{command}` exited with {}: {}", exit_label(.result), first_line(.result))]
    NonZeroExit {
        command: String,
        result: CommandResult,
    },

    /// The process exceeded its timeout and was killed
    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut {
        command: String,
        result: CommandResult,
        timeout: Duration,
    },
}

impl CommandFailure {
    /// The result of the process, when one ran
    pub fn result(&self) -> Option<&CommandResult> {
        match self {
            CommandFailure::Spawn(_) => None,
            CommandFailure::NonZeroExit { result, .. } | CommandFailure::TimedOut { result, .. } => {
                Some(result)
            }
        }
    }

    pub fn is_spawn(&self) -> bool {
        matches!(self, CommandFailure::Spawn(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CommandFailure::TimedOut { .. })
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.result().and_then(|r| r.exit_code)
    }
}

fn exit_label(result: &CommandResult) -> String {
    match result.exit_code {
        Some(code) => format!("code {}", code),
        None => "no exit code".to_string(),
    }
}

fn first_line(result: &CommandResult) -> &str {
    let stderr = result.stderr.trim();
    let text = if stderr.is_empty() {
        result.stdout.trim()
    } else {
        stderr
    };
    text.lines().next().unwrap_or("")
}

/// Turn a finished command into success or a [`CommandFailure`]
pub fn check_result(
    request: &CommandRequest,
    result: CommandResult,
) -> Result<CommandResult, CommandFailure> {
    if result.timed_out {
        Err(CommandFailure::TimedOut {
            command: request.to_string(),
            result,
            timeout: request.timeout,
        })
    } else if result.success() {
        Ok(result)
    } else {
        Err(CommandFailure::NonZeroExit {
            command: request.to_string(),
            result,
        })
    }
}

/// Execute a request and treat anything but exit code 0 as a failure
pub async fn execute_checked<X>(
    executor: &X,
    request: &CommandRequest,
) -> Result<CommandResult, CommandFailure>
where
    X: CommandExecutor + ?Sized,
{
    let result = executor.execute(request).await?;
    check_result(request, result)
}

/// How a failure should be treated by the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    Fatal,
}

/// Classifies CLI failures from exit codes and output text
///
/// Rules, first match wins:
/// 1. spawn failures are fatal
/// 2. timeouts follow `retry_timeouts`
/// 3. output matching a fatal pattern is fatal
/// 4. a transient exit code or a retryable pattern is retryable
/// 5. anything else follows `retry_unknown_failures`
///
/// Pattern matching is case-insensitive over stderr and stdout.
#[derive(Debug, Clone)]
pub struct CliFailureClassifier {
    transient_exit_codes: Vec<i32>,
    retryable_patterns: Vec<String>,
    fatal_patterns: Vec<String>,
    retry_timeouts: bool,
    retry_unknown_failures: bool,
}

impl CliFailureClassifier {
    pub fn from_config(config: &CliConfig) -> Self {
        let lower = |patterns: &[String]| -> Vec<String> {
            patterns.iter().map(|p| p.to_lowercase()).collect()
        };
        Self {
            transient_exit_codes: config.transient_exit_codes.clone(),
            retryable_patterns: lower(&config.retryable_patterns),
            fatal_patterns: lower(&config.fatal_patterns),
            retry_timeouts: config.retry_timeouts,
            retry_unknown_failures: config.retry_unknown_failures,
        }
    }

    pub fn classify(&self, failure: &CommandFailure) -> FailureClass {
        let result = match failure {
            CommandFailure::Spawn(_) => return FailureClass::Fatal,
            CommandFailure::TimedOut { .. } => return self.flag(self.retry_timeouts),
            CommandFailure::NonZeroExit { result, .. } => result,
        };

        let output = format!("{}\n{}", result.stderr, result.stdout).to_lowercase();

        if let Some(pattern) = find_pattern(&self.fatal_patterns, &output) {
            tracing::debug!(pattern = %pattern, "fatal pattern in command output");
            return FailureClass::Fatal;
        }

        let transient_code = result
            .exit_code
            .is_some_and(|code| self.transient_exit_codes.contains(&code));
        if transient_code || find_pattern(&self.retryable_patterns, &output).is_some() {
            return FailureClass::Retryable;
        }

        self.flag(self.retry_unknown_failures)
    }

    fn flag(&self, retry: bool) -> FailureClass {
        if retry {
            FailureClass::Retryable
        } else {
            FailureClass::Fatal
        }
    }
}

impl Default for CliFailureClassifier {
    fn default() -> Self {
        Self::from_config(&CliConfig::default())
    }
}

impl RetryPredicate<CommandFailure> for CliFailureClassifier {
    fn should_retry(&self, error: &CommandFailure) -> bool {
        self.classify(error) == FailureClass::Retryable
    }
}

fn find_pattern<'a>(patterns: &'a [String], output: &str) -> Option<&'a str> {
    patterns
        .iter()
        .map(String::as_str)
        .find(|pattern| !pattern.is_empty() && output.contains(*pattern))
}
