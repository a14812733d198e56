//! Checking that the external CLI is installed and recent enough

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use cliorch_core::types::{CliConfig, CommandRequest};
use regex::Regex;

use crate::executor::{CommandExecutor, ProcessExecutor};

/// Pre-compiled regex for extracting version numbers from command output
static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"v?(\d+\.\d+(?:\.\d+)?)").expect("version regex is valid"));

/// Availability of the CLI binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrerequisiteStatus {
    /// Not found on `PATH`
    Missing,
    /// Installed; the version is `None` when it could not be determined
    Available {
        path: PathBuf,
        version: Option<String>,
    },
    /// Installed but older than required
    VersionTooOld {
        path: PathBuf,
        found: String,
        required: String,
    },
}

impl PrerequisiteStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, PrerequisiteStatus::Available { .. })
    }
}

/// Locates the CLI and checks its version
pub struct PrerequisiteProbe<X = ProcessExecutor> {
    executor: X,
    program: String,
    version_flag: String,
    min_version: Option<String>,
    timeout: Duration,
}

impl PrerequisiteProbe<ProcessExecutor> {
    pub fn from_config(config: &CliConfig, timeout: Duration) -> Self {
        Self {
            executor: ProcessExecutor,
            program: config.program.clone(),
            version_flag: config.version_flag.clone(),
            min_version: config.min_version.clone(),
            timeout,
        }
    }
}

impl<X: CommandExecutor> PrerequisiteProbe<X> {
    /// Use a different executor for the version command
    pub fn with_executor<Y: CommandExecutor>(self, executor: Y) -> PrerequisiteProbe<Y> {
        PrerequisiteProbe {
            executor,
            program: self.program,
            version_flag: self.version_flag,
            min_version: self.min_version,
            timeout: self.timeout,
        }
    }

    /// Override the minimum required version
    pub fn with_min_version(mut self, min_version: Option<String>) -> Self {
        self.min_version = min_version;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub async fn check(&self) -> PrerequisiteStatus {
        let path = match which::which(&self.program) {
            Ok(path) => path,
            Err(_) => {
                tracing::debug!(program = %self.program, "not found on PATH");
                return PrerequisiteStatus::Missing;
            }
        };

        let version = self.detect_version(&path).await;

        match (&version, &self.min_version) {
            (Some(found), Some(required)) if !version_satisfies(found, required) => {
                PrerequisiteStatus::VersionTooOld {
                    path,
                    found: found.clone(),
                    required: required.clone(),
                }
            }
            _ => PrerequisiteStatus::Available { path, version },
        }
    }

    async fn detect_version(&self, path: &std::path::Path) -> Option<String> {
        let request = CommandRequest::new(path.to_string_lossy())
            .args(self.version_flag.split_whitespace())
            .timeout(self.timeout);

        match self.executor.execute(&request).await {
            Ok(result) if !result.timed_out => parse_version(result.primary_output()),
            Ok(_) => {
                tracing::warn!(program = %self.program, "version command timed out");
                None
            }
            Err(err) => {
                tracing::warn!(program = %self.program, error = %err, "version command failed");
                None
            }
        }
    }
}

/// Extract a version number from `--version` style output
///
/// Handles forms like `@adobe/aio-cli/10.3.1 darwin-arm64 node-v20.11.0`,
/// `v2.43.0` and `aio 9.4`.
pub fn parse_version(text: &str) -> Option<String> {
    VERSION_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Whether `actual` is at least `required`
///
/// Two-part versions are padded to three parts. Unparseable versions are
/// accepted to avoid false negatives.
pub fn version_satisfies(actual: &str, required: &str) -> bool {
    match (
        semver::Version::parse(&normalize(actual)),
        semver::Version::parse(&normalize(required)),
    ) {
        (Ok(actual), Ok(required)) => actual >= required,
        _ => true,
    }
}

fn normalize(version: &str) -> String {
    let version = version.trim().trim_start_matches('v');
    match version.split('.').count() {
        1 => format!("{}.0.0", version),
        2 => format!("{}.0", version),
        _ => version.to_string(),
    }
}
