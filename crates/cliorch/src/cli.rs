//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use cliorch_exec::CLI_CONTEXT_KEY;

/// cliorch - run a stateful cloud CLI safely from concurrent callers
#[derive(Parser, Debug)]
#[command(name = "cliorch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Directory holding runtime.yaml (default: ~/.cliorch)
    #[arg(long, global = true, env = "CLIORCH_CONFIG_DIR")]
    pub config_dir: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a CLI command while holding a resource lock, retrying transient failures
    Run(RunArgs),

    /// Poll a CLI command until its output shows the expected state
    Wait(WaitArgs),

    /// Check that the CLI is installed and recent enough
    Doctor(DoctorArgs),

    /// Runtime configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

// Run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Resource key to hold while the command runs
    #[arg(short, long, default_value = CLI_CONTEXT_KEY)]
    pub key: String,

    /// Named retry policy from the runtime config
    #[arg(long)]
    pub operation: Option<String>,

    /// How long to wait for the resource lock, in milliseconds
    #[arg(long)]
    pub lock_timeout_ms: Option<u64>,

    /// Timeout for each invocation, in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Working directory for the CLI
    #[arg(long)]
    pub cwd: Option<Utf8PathBuf>,

    /// Environment override (KEY=VALUE), repeatable
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// CLI binary to run instead of the configured one
    #[arg(long)]
    pub program: Option<String>,

    /// Arguments passed verbatim to the CLI
    #[arg(last = true, required = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

// Wait command
#[derive(Args, Debug)]
pub struct WaitArgs {
    /// Named poll settings from the runtime config
    #[arg(long)]
    pub operation: Option<String>,

    /// Delay between checks, in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Total time budget, in milliseconds
    #[arg(long)]
    pub max_wait_ms: Option<u64>,

    /// Grow the interval by this factor after each check
    #[arg(long)]
    pub backoff: Option<f64>,

    /// Timeout for each check, in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// CLI binary to run instead of the configured one
    #[arg(long)]
    pub program: Option<String>,

    #[command(flatten)]
    pub indicator: IndicatorArgs,

    /// JSON value the --json-pointer target must equal; bare words are strings
    #[arg(long, requires = "json_pointer")]
    pub equals: Option<String>,

    /// Arguments passed verbatim to the CLI
    #[arg(last = true, required = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

/// Exactly one success indicator
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct IndicatorArgs {
    /// Done when the command exits with this code
    #[arg(long)]
    pub exit_code: Option<i32>,

    /// Done when stdout contains this text
    #[arg(long)]
    pub stdout_contains: Option<String>,

    /// Done when stderr does not contain this text
    #[arg(long)]
    pub stderr_not_contains: Option<String>,

    /// Done when stdout matches this regex
    #[arg(long)]
    pub stdout_matches: Option<String>,

    /// Done when the JSON value at this pointer equals --equals
    #[arg(long, requires = "equals")]
    pub json_pointer: Option<String>,
}

// Doctor command
#[derive(Args, Debug)]
pub struct DoctorArgs {
    /// Minimum CLI version to require
    #[arg(long)]
    pub min_version: Option<String>,

    /// CLI binary to check instead of the configured one
    #[arg(long)]
    pub program: Option<String>,
}

// Config commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective runtime configuration
    Show(ConfigShowArgs),
}

#[derive(Args, Debug)]
pub struct ConfigShowArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}
