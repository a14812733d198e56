//! cliorch - run a stateful cloud CLI safely from concurrent callers
//!
//! This is the main entry point for the cliorch command-line interface.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let config_dir = cli.config_dir.as_deref();
    match cli.command {
        Commands::Run(args) => commands::run::run(args, config_dir).await,
        Commands::Wait(args) => commands::wait::run(args, config_dir).await,
        Commands::Doctor(args) => commands::doctor::run(args, config_dir).await,
        Commands::Config(cmd) => commands::config::run(cmd, config_dir),
    }
}

/// Initialize tracing with appropriate verbosity
///
/// Logs go to stderr; stdout carries the wrapped CLI's own output.
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
