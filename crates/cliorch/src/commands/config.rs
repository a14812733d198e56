//! Config command

use anyhow::Result;
use camino::Utf8Path;

use super::load_runtime_config;
use crate::cli::{ConfigCommands, ConfigShowArgs};

pub fn run(cmd: ConfigCommands, config_dir: Option<&Utf8Path>) -> Result<()> {
    match cmd {
        ConfigCommands::Show(args) => show(args, config_dir),
    }
}

fn show(args: ConfigShowArgs, config_dir: Option<&Utf8Path>) -> Result<()> {
    let config = load_runtime_config(config_dir)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", serde_yaml_ng::to_string(&config)?);
    }

    Ok(())
}
