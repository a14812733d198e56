//! Doctor command - check that the CLI is installed and recent enough

use anyhow::Result;
use camino::Utf8Path;
use cliorch_exec::{PrerequisiteProbe, PrerequisiteStatus};

use super::load_runtime_config;
use crate::cli::DoctorArgs;
use crate::output;

pub async fn run(args: DoctorArgs, config_dir: Option<&Utf8Path>) -> Result<()> {
    let config = load_runtime_config(config_dir)?;

    let mut cli = config.cli.clone();
    if let Some(program) = args.program {
        cli.program = program;
    }
    if args.min_version.is_some() {
        cli.min_version = args.min_version;
    }

    let probe = PrerequisiteProbe::from_config(&cli, config.timeouts.probe_timeout());
    let spinner = output::spinner(&format!("Checking {}...", probe.program()));
    let status = probe.check().await;
    spinner.finish_and_clear();

    output::header("Prerequisites");
    match &status {
        PrerequisiteStatus::Missing => {
            output::error(&format!("{} not found on PATH", cli.program));
        }
        PrerequisiteStatus::Available { path, version } => {
            output::success(&format!("{} is installed", cli.program));
            output::kv("Path", &path.display().to_string());
            output::kv("Version", version.as_deref().unwrap_or("unknown"));
            if version.is_none() && cli.min_version.is_some() {
                output::info("Could not determine the version; minimum version not checked");
            }
        }
        PrerequisiteStatus::VersionTooOld {
            path,
            found,
            required,
        } => {
            output::error(&format!(
                "{} {} is too old; {} or newer is required",
                cli.program, found, required
            ));
            output::kv("Path", &path.display().to_string());
        }
    }

    if !status.is_ok() {
        std::process::exit(1);
    }

    Ok(())
}
