//! Hierarchical configuration loader with precedence
//!
//! Loads configuration from multiple sources with the following precedence (low to high):
//! 1. Embedded defaults (built into binary)
//! 2. Runtime config (~/.cliorch/runtime.yaml)
//! 3. Environment variables (CLIORCH_* prefix)
//! 4. CLI flags (handled by caller)

use crate::error::{Error, Result};
use crate::types::{PollingConfig, RetryPoliciesConfig, RuntimeConfig};
use camino::{Utf8Path, Utf8PathBuf};
use rust_embed::RustEmbed;
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use std::str::FromStr;

/// Embedded configuration files
#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/../../embedded/config/"]
#[prefix = ""]
struct EmbeddedConfigs;

/// Name of the user-level runtime configuration file
pub const RUNTIME_CONFIG_FILE: &str = "runtime.yaml";

/// Configuration hierarchy loader
pub struct HierarchicalConfigLoader {
    /// Base directory for configuration files
    config_dir: Utf8PathBuf,
}

impl HierarchicalConfigLoader {
    /// Create a loader rooted at the standard config directory
    pub fn new() -> Result<Self> {
        let config_dir = Self::default_config_dir()?;
        Ok(Self { config_dir })
    }

    /// Create a loader with a custom config directory
    pub fn with_dir(config_dir: Utf8PathBuf) -> Self {
        Self { config_dir }
    }

    /// Get the standard config directory (~/.cliorch)
    ///
    /// `$HOME` is preferred over `dirs::home_dir()` so container setups that
    /// remap HOME resolve the same directory the CLI itself uses.
    fn default_config_dir() -> Result<Utf8PathBuf> {
        let home = env::var("HOME")
            .map(std::path::PathBuf::from)
            .ok()
            .or_else(dirs::home_dir)
            .ok_or_else(|| Error::invalid_config("Could not determine home directory"))?;

        let home = Utf8PathBuf::from_path_buf(home)
            .map_err(|p| Error::invalid_config(format!("Home directory is not UTF-8: {:?}", p)))?;

        Ok(home.join(".cliorch"))
    }

    /// Load runtime configuration with hierarchical precedence
    pub fn load_runtime_config(&self) -> Result<RuntimeConfig> {
        let mut config = Self::load_embedded_config::<RuntimeConfig>("runtime-defaults.yaml")?;

        let runtime_config_path = self.runtime_config_path();
        if runtime_config_path.exists() {
            let file_config = self.load_yaml_file::<RuntimeConfig>(&runtime_config_path)?;
            config = Self::merge_runtime_config(config, file_config);
        }

        Self::apply_env_overrides(config)
    }

    /// Path of the user-level runtime config file
    pub fn runtime_config_path(&self) -> Utf8PathBuf {
        self.config_dir.join(RUNTIME_CONFIG_FILE)
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Load an embedded configuration file
    fn load_embedded_config<T: DeserializeOwned>(filename: &str) -> Result<T> {
        let embedded_file = EmbeddedConfigs::get(filename).ok_or_else(|| {
            Error::config_not_found(format!("Embedded config not found: {}", filename))
        })?;

        let content = std::str::from_utf8(&embedded_file.data).map_err(|_| {
            Error::invalid_config(format!("Invalid UTF-8 in embedded config: {}", filename))
        })?;

        serde_yaml_ng::from_str(content).map_err(|e| {
            Error::invalid_config(format!(
                "Failed to parse embedded config {}: {}",
                filename, e
            ))
        })
    }

    /// Load a YAML file and parse it
    fn load_yaml_file<T: DeserializeOwned>(&self, path: &Utf8Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        serde_yaml_ng::from_str(&content)
            .map_err(|e| Error::invalid_config(format!("Failed to parse {}: {}", path, e)))
    }

    /// Merge two runtime configs (base is overridden by overlay)
    fn merge_runtime_config(base: RuntimeConfig, overlay: RuntimeConfig) -> RuntimeConfig {
        RuntimeConfig {
            cli: overlay.cli,
            timeouts: overlay.timeouts,
            retry_policies: Self::merge_retry_policies(base.retry_policies, overlay.retry_policies),
            polling: Self::merge_polling(base.polling, overlay.polling),
        }
    }

    /// Merge retry policies key-wise
    fn merge_retry_policies(
        mut base: RetryPoliciesConfig,
        overlay: RetryPoliciesConfig,
    ) -> RetryPoliciesConfig {
        base.operations.extend(overlay.operations);
        base.default = overlay.default;
        base
    }

    /// Merge poll settings key-wise
    fn merge_polling(mut base: PollingConfig, overlay: PollingConfig) -> PollingConfig {
        base.operations.extend(overlay.operations);
        base.default = overlay.default;
        base
    }

    /// Apply environment variable overrides to runtime config
    fn apply_env_overrides(mut config: RuntimeConfig) -> Result<RuntimeConfig> {
        if let Ok(val) = env::var("CLIORCH_CLI_PROGRAM") {
            if !val.trim().is_empty() {
                config.cli.program = val;
            }
        }

        if let Some(val) = parse_env("CLIORCH_COMMAND_TIMEOUT_MS")? {
            config.timeouts.command_timeout_ms = val;
        }

        if let Some(val) = parse_env("CLIORCH_LOCK_TIMEOUT_MS")? {
            config.timeouts.lock_timeout_ms = val;
        }

        if let Some(val) = parse_env("CLIORCH_PROBE_TIMEOUT_MS")? {
            config.timeouts.probe_timeout_ms = val;
        }

        if let Some(val) = parse_env("CLIORCH_RETRY_MAX_ATTEMPTS")? {
            config.retry_policies.default.max_attempts = val;
        }

        if let Some(val) = parse_env("CLIORCH_POLL_INTERVAL_MS")? {
            config.polling.default.interval_ms = val;
        }

        if let Some(val) = parse_env("CLIORCH_POLL_MAX_WAIT_MS")? {
            config.polling.default.max_wait_ms = val;
        }

        Ok(config)
    }
}

/// Read and parse a numeric environment override
fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::invalid_config(format!("{} must be a valid number", name))),
        Err(_) => Ok(None),
    }
}
