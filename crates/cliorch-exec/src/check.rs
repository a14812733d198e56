//! CLI invocations used as poll probes

use cliorch_core::poll::PollStatus;
use cliorch_core::types::{CommandRequest, CommandResult};
use regex::Regex;
use serde_json::Value;

use crate::executor::{CommandExecutor, ExecutionError};

/// What a command's result must show for the condition to hold
#[derive(Debug, Clone)]
pub enum SuccessIndicator {
    /// Process exits with this code
    ExitCode(i32),
    /// stdout contains this text
    StdoutContains(String),
    /// stderr does not contain this text
    StderrNotContains(String),
    /// stdout matches this regex
    StdoutMatches(Regex),
    /// stdout is JSON and the value at `pointer` equals `value`
    ///
    /// `pointer` uses RFC 6901 syntax, e.g. `/status` or `/0/state`.
    JsonPointerEquals { pointer: String, value: Value },
}

impl SuccessIndicator {
    /// Whether `result` satisfies this indicator
    ///
    /// A timed-out result never does.
    pub fn is_satisfied(&self, result: &CommandResult) -> bool {
        if result.timed_out {
            return false;
        }

        match self {
            SuccessIndicator::ExitCode(expected) => result.exit_code == Some(*expected),
            SuccessIndicator::StdoutContains(pattern) => result.stdout.contains(pattern.as_str()),
            SuccessIndicator::StderrNotContains(pattern) => {
                !result.stderr.contains(pattern.as_str())
            }
            SuccessIndicator::StdoutMatches(regex) => regex.is_match(&result.stdout),
            SuccessIndicator::JsonPointerEquals { pointer, value } => {
                match serde_json::from_str::<Value>(result.stdout.trim()) {
                    Ok(json) => json.pointer(pointer) == Some(value),
                    Err(_) => false,
                }
            }
        }
    }
}

/// A command plus the indicator that decides whether it reports "done"
#[derive(Debug, Clone)]
pub struct CommandCheck {
    pub request: CommandRequest,
    pub indicator: SuccessIndicator,
}

impl CommandCheck {
    pub fn new(request: CommandRequest, indicator: SuccessIndicator) -> Self {
        Self { request, indicator }
    }

    /// Run the command once and judge the result
    ///
    /// An execution error is reported as a pending observation so a poll
    /// session can ride out a briefly missing binary or a transient IO error.
    pub async fn probe<X>(&self, executor: &X) -> PollStatus<Result<CommandResult, ExecutionError>>
    where
        X: CommandExecutor + ?Sized,
    {
        match executor.execute(&self.request).await {
            Ok(result) => {
                let done = self.indicator.is_satisfied(&result);
                PollStatus::from_flag(done, Ok(result))
            }
            Err(err) => {
                tracing::debug!(command = %self.request, error = %err, "probe failed to run");
                PollStatus::Pending(Err(err))
            }
        }
    }
}
