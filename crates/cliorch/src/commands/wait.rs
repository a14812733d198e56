//! Wait command - poll a CLI command until it reports the expected state

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use camino::Utf8Path;
use cliorch_core::poll::{PollConfig, PollPhase};
use cliorch_core::types::CommandRequest;
use cliorch_exec::{CommandCheck, Orchestrator, SuccessIndicator};
use regex::Regex;
use serde_json::Value;

use super::{cancel_on_ctrl_c, load_runtime_config, EXIT_CANCELLED};
use crate::cli::{IndicatorArgs, WaitArgs};
use crate::output;

pub async fn run(args: WaitArgs, config_dir: Option<&Utf8Path>) -> Result<()> {
    let config = load_runtime_config(config_dir)?;

    let settings = match &args.operation {
        Some(operation) => config.polling.settings_for(operation),
        None => &config.polling.default,
    };
    let mut poll_config = PollConfig::from(settings);
    if let Some(ms) = args.interval_ms {
        poll_config.interval = Duration::from_millis(ms);
    }
    if let Some(ms) = args.max_wait_ms {
        poll_config.max_wait = Duration::from_millis(ms);
    }
    if let Some(multiplier) = args.backoff {
        poll_config = poll_config.with_backoff(multiplier, Duration::from_millis(settings.max_interval_ms));
    }

    let indicator = indicator_from_args(args.indicator, args.equals)?;
    let probe_timeout = args
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.timeouts.probe_timeout());
    let program = args.program.unwrap_or_else(|| config.cli.program.clone());
    let request = CommandRequest::new(program)
        .args(args.args)
        .timeout(probe_timeout);

    let check = CommandCheck::new(request, indicator);
    let cancel = cancel_on_ctrl_c();
    let spinner = output::spinner(&format!("Waiting for `{}`", check.request));

    let outcome = Orchestrator::new()
        .await_command(&check, &poll_config, Some(&cancel))
        .await;
    spinner.finish_and_clear();

    let last = outcome.value.as_ref().and_then(|value| value.as_ref().ok());
    match outcome.state {
        PollPhase::Completed => {
            if let Some(result) = last {
                output::relay(result);
            }
            output::success(&format!(
                "Condition met after {} check(s) in {:.1?}",
                outcome.checks, outcome.elapsed
            ));
            Ok(())
        }
        PollPhase::Cancelled => {
            output::warning(&format!("Cancelled after {} check(s)", outcome.checks));
            std::process::exit(EXIT_CANCELLED);
        }
        _ => {
            if let Some(result) = last {
                output::relay(result);
            }
            Err(anyhow!(
                "Condition not met within {:?} ({} check(s))",
                poll_config.max_wait,
                outcome.checks
            ))
        }
    }
}

fn indicator_from_args(args: IndicatorArgs, equals: Option<String>) -> Result<SuccessIndicator> {
    if let Some(code) = args.exit_code {
        return Ok(SuccessIndicator::ExitCode(code));
    }
    if let Some(text) = args.stdout_contains {
        return Ok(SuccessIndicator::StdoutContains(text));
    }
    if let Some(text) = args.stderr_not_contains {
        return Ok(SuccessIndicator::StderrNotContains(text));
    }
    if let Some(pattern) = args.stdout_matches {
        let regex = Regex::new(&pattern).with_context(|| format!("Invalid regex '{}'", pattern))?;
        return Ok(SuccessIndicator::StdoutMatches(regex));
    }
    if let Some(pointer) = args.json_pointer {
        let raw = equals.ok_or_else(|| anyhow!("--json-pointer requires --equals"))?;
        // Bare words are compared as JSON strings
        let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
        return Ok(SuccessIndicator::JsonPointerEquals { pointer, value });
    }
    Err(anyhow!("No success indicator given"))
}
