//! CLI command implementations

pub mod config;
pub mod doctor;
pub mod run;
pub mod wait;

use anyhow::{Context, Result};
use camino::Utf8Path;
use cliorch_core::types::RuntimeConfig;
use cliorch_core::HierarchicalConfigLoader;
use tokio_util::sync::CancellationToken;

/// Exit code for a run or wait interrupted with Ctrl-C
pub const EXIT_CANCELLED: i32 = 130;

fn loader(config_dir: Option<&Utf8Path>) -> Result<HierarchicalConfigLoader> {
    match config_dir {
        Some(dir) => Ok(HierarchicalConfigLoader::with_dir(dir.to_owned())),
        None => HierarchicalConfigLoader::new().context("Failed to locate config directory"),
    }
}

/// Load the effective runtime configuration
pub fn load_runtime_config(config_dir: Option<&Utf8Path>) -> Result<RuntimeConfig> {
    let loader = loader(config_dir)?;
    let config = loader
        .load_runtime_config()
        .with_context(|| format!("Failed to load runtime config from {}", loader.config_dir()))?;
    tracing::debug!(config_dir = %loader.config_dir(), "runtime config loaded");
    Ok(config)
}

/// A token cancelled when the user presses Ctrl-C
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupt received");
            trigger.cancel();
        }
    });
    token
}
