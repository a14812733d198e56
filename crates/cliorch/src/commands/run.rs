//! Run command - exclusive, retried CLI invocation

use std::time::Duration;

use anyhow::Result;
use camino::Utf8Path;
use cliorch_core::lock::LockError;
use cliorch_core::types::CommandRequest;
use cliorch_exec::{CliFailureClassifier, CommandFailure, OrchestrationError, Orchestrator, ProcessExecutor};

use super::{cancel_on_ctrl_c, load_runtime_config, EXIT_CANCELLED};
use crate::cli::RunArgs;
use crate::output;

/// Exit code when the resource lock could not be acquired (EX_TEMPFAIL)
const EXIT_LOCK_TIMEOUT: i32 = 75;

pub async fn run(args: RunArgs, config_dir: Option<&Utf8Path>) -> Result<()> {
    let config = load_runtime_config(config_dir)?;

    let policy = match &args.operation {
        Some(operation) => config.retry_policies.policy_for(operation).clone(),
        None => config.retry_policies.default.clone(),
    };
    let lock_timeout = args
        .lock_timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.timeouts.lock_timeout());
    let command_timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.timeouts.command_timeout());
    let program = args.program.unwrap_or_else(|| config.cli.program.clone());

    let mut request = CommandRequest::new(program)
        .args(args.args)
        .timeout(command_timeout);
    if let Some(cwd) = args.cwd {
        request = request.working_dir(cwd.into_std_path_buf());
    }
    for (key, value) in args.env {
        request = request.env(key, value);
    }

    let orchestrator = Orchestrator::with_executor(
        ProcessExecutor::new(),
        CliFailureClassifier::from_config(&config.cli),
    );
    let cancel = cancel_on_ctrl_c();

    tracing::info!(key = %args.key, command = %request, "running");
    match orchestrator
        .run_exclusive_with_cancel(&args.key, &request, &policy, lock_timeout, &cancel)
        .await
    {
        Ok(result) => {
            output::relay(&result);
            Ok(())
        }
        Err(err) => {
            if let Some(result) = err.last_result() {
                output::relay(result);
            }
            if matches!(err, OrchestrationError::Cancelled { .. }) {
                output::warning(&describe(&err));
            } else {
                output::error(&describe(&err));
            }
            std::process::exit(exit_code_for(&err));
        }
    }
}

/// One actionable message per failure kind
fn describe(err: &OrchestrationError) -> String {
    match err {
        OrchestrationError::Lock(LockError::Timeout { key, waited }) => format!(
            "Gave up after {:?} waiting for '{}'; another command is still using it",
            waited, key
        ),
        OrchestrationError::Lock(other) => other.to_string(),
        OrchestrationError::Fatal(CommandFailure::Spawn(spawn)) if spawn.is_not_found() => format!(
            "'{}' is not installed or not on PATH; run `cliorch doctor`",
            spawn.program()
        ),
        OrchestrationError::Fatal(failure) => format!("Not retrying: {}", failure),
        OrchestrationError::RetriesExhausted { attempts, source } => {
            format!("Still failing after {} attempts: {}", attempts, source)
        }
        OrchestrationError::Cancelled { .. } => "Cancelled".to_string(),
    }
}

fn exit_code_for(err: &OrchestrationError) -> i32 {
    match err {
        OrchestrationError::Lock(LockError::Timeout { .. }) => EXIT_LOCK_TIMEOUT,
        OrchestrationError::Lock(_) => 1,
        OrchestrationError::Cancelled { .. } => EXIT_CANCELLED,
        OrchestrationError::Fatal(failure) | OrchestrationError::RetriesExhausted { source: failure, .. } => {
            match failure.exit_code() {
                Some(code) if code != 0 => code,
                _ => 1,
            }
        }
    }
}
