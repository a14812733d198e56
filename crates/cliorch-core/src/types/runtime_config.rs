//! Runtime configuration types for operational parameters
//!
//! These types control how the external CLI is invoked: which binary, how
//! long commands and lock waits may take, how failures are retried and how
//! eventually-consistent state is polled.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Complete runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuntimeConfig {
    /// External CLI settings and failure classification
    #[serde(default)]
    pub cli: CliConfig,

    /// Command, probe and lock timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Retry policy configurations
    #[serde(default)]
    pub retry_policies: RetryPoliciesConfig,

    /// Polling configurations
    #[serde(default)]
    pub polling: PollingConfig,
}

/// External CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CliConfig {
    /// Command alias or path of the CLI binary
    #[serde(default = "default_program")]
    pub program: String,

    /// Flag that prints the CLI version
    #[serde(default = "default_version_flag")]
    pub version_flag: String,

    /// Minimum supported CLI version, if any
    #[serde(default)]
    pub min_version: Option<String>,

    /// Exit codes the CLI uses for transient service failures
    #[serde(default = "default_transient_exit_codes")]
    pub transient_exit_codes: Vec<i32>,

    /// Output fragments that mark a failure as transient
    #[serde(default = "default_retryable_patterns")]
    pub retryable_patterns: Vec<String>,

    /// Output fragments that mark a failure as fatal; these win over retryable ones
    #[serde(default = "default_fatal_patterns")]
    pub fatal_patterns: Vec<String>,

    /// Retry commands that hit their per-call timeout
    #[serde(default = "default_true")]
    pub retry_timeouts: bool,

    /// Retry non-zero exits that match no pattern
    #[serde(default)]
    pub retry_unknown_failures: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            version_flag: default_version_flag(),
            min_version: None,
            transient_exit_codes: default_transient_exit_codes(),
            retryable_patterns: default_retryable_patterns(),
            fatal_patterns: default_fatal_patterns(),
            retry_timeouts: true,
            retry_unknown_failures: false,
        }
    }
}

fn default_program() -> String {
    "aio".to_string()
}
fn default_version_flag() -> String {
    "--version".to_string()
}
fn default_transient_exit_codes() -> Vec<i32> {
    vec![75] // EX_TEMPFAIL
}
fn default_retryable_patterns() -> Vec<String> {
    [
        "timeout",
        "timed out",
        "econnreset",
        "connection reset",
        "connection refused",
        "network unreachable",
        "socket hang up",
        "temporary failure",
        "service unavailable",
        "too many requests",
        "502",
        "503",
        "504",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_fatal_patterns() -> Vec<String> {
    [
        "401",
        "403",
        "unauthorized",
        "forbidden",
        "not logged in",
        "login required",
        "invalid argument",
        "unknown flag",
        "missing required",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_true() -> bool {
    true
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimeoutConfig {
    /// Hard timeout for a single CLI invocation in milliseconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// How long a caller may queue for a resource lock in milliseconds
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_ms: u64,

    /// Timeout for short probes (version checks, poll checks) in milliseconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
}

impl TimeoutConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: default_command_timeout(),
            lock_timeout_ms: default_lock_timeout(),
            probe_timeout_ms: default_probe_timeout(),
        }
    }
}

fn default_command_timeout() -> u64 {
    60_000 // 1 minute
}
fn default_lock_timeout() -> u64 {
    120_000 // 2 minutes
}
fn default_probe_timeout() -> u64 {
    10_000
}

/// Retry policy configurations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPoliciesConfig {
    /// Default retry policy
    #[serde(default)]
    pub default: RetryPolicy,

    /// Per-operation retry policies
    #[serde(default)]
    pub operations: HashMap<String, RetryPolicy>,
}

impl RetryPoliciesConfig {
    /// Policy for a named operation, falling back to the default
    pub fn policy_for(&self, operation: &str) -> &RetryPolicy {
        self.operations.get(operation).unwrap_or(&self.default)
    }
}

impl Default for RetryPoliciesConfig {
    fn default() -> Self {
        let mut operations = HashMap::new();

        // Context switches are interactive; fail fast
        operations.insert(
            "context-switch".to_string(),
            RetryPolicy {
                max_attempts: 2,
                strategy: RetryStrategy::FixedDelay,
                backoff_multiplier: 1.0,
                initial_delay_ms: 500,
                max_delay_ms: 500,
                jitter_fraction: 0.1,
            },
        );

        // Provisioning calls hit eventually-consistent backends
        operations.insert(
            "provision".to_string(),
            RetryPolicy {
                max_attempts: 5,
                strategy: RetryStrategy::ExponentialBackoff,
                backoff_multiplier: 2.0,
                initial_delay_ms: 2000,
                max_delay_ms: 30000,
                jitter_fraction: 0.25,
            },
        );

        Self {
            default: RetryPolicy::default(),
            operations,
        }
    }
}

/// Retry policy for an operation
///
/// The retryable-error predicate is supplied at the call site alongside the
/// policy, so the policy itself stays a plain serializable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Retry strategy
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Backoff multiplier for exponential strategies
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Upper bound of the multiplicative jitter, e.g. 0.25 for up to +25%
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            strategy: RetryStrategy::default(),
            backoff_multiplier: default_backoff_multiplier(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            jitter_fraction: default_jitter_fraction(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_initial_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    30000
}
fn default_jitter_fraction() -> f64 {
    0.25
}

/// Retry strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStrategy {
    /// No delay between attempts
    None,

    /// Fixed delay between retries
    FixedDelay,

    /// Exponential backoff (default)
    #[default]
    ExponentialBackoff,

    /// Linear backoff
    LinearBackoff,
}

/// Polling configurations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PollingConfig {
    /// Default poll settings
    #[serde(default)]
    pub default: PollSettings,

    /// Per-operation poll settings
    #[serde(default)]
    pub operations: HashMap<String, PollSettings>,
}

impl PollingConfig {
    /// Settings for a named operation, falling back to the default
    pub fn settings_for(&self, operation: &str) -> &PollSettings {
        self.operations.get(operation).unwrap_or(&self.default)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        let mut operations = HashMap::new();

        operations.insert(
            "provision".to_string(),
            PollSettings {
                interval_ms: 5000,
                max_wait_ms: 600_000,
                backoff_multiplier: 1.5,
                max_interval_ms: 30_000,
            },
        );

        Self {
            default: PollSettings::default(),
            operations,
        }
    }
}

/// Poll timing for one kind of wait
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PollSettings {
    /// Delay between checks in milliseconds
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    /// Total time budget in milliseconds
    #[serde(default = "default_poll_max_wait")]
    pub max_wait_ms: u64,

    /// Interval growth per check; 1.0 keeps the interval fixed
    #[serde(default = "default_poll_backoff")]
    pub backoff_multiplier: f64,

    /// Ceiling for the grown interval in milliseconds
    #[serde(default = "default_poll_max_interval")]
    pub max_interval_ms: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            max_wait_ms: default_poll_max_wait(),
            backoff_multiplier: default_poll_backoff(),
            max_interval_ms: default_poll_max_interval(),
        }
    }
}

fn default_poll_interval() -> u64 {
    2000
}
fn default_poll_max_wait() -> u64 {
    300_000 // 5 minutes
}
fn default_poll_backoff() -> f64 {
    1.0
}
fn default_poll_max_interval() -> u64 {
    30_000
}
