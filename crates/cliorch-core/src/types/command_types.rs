//! Command invocation types shared by the executor and its callers

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// A single CLI invocation
///
/// Arguments are passed verbatim to the child process; no shell is involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Executable alias or path
    pub program: String,
    /// Argument vector
    pub args: Vec<String>,
    /// Working directory, inherited when unset
    pub working_dir: Option<PathBuf>,
    /// Environment overrides applied on top of the inherited environment
    pub env: BTreeMap<String, String>,
    /// Hard timeout for the invocation
    pub timeout: Duration,
}

impl CommandRequest {
    /// Default timeout used when none is set explicitly
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Display for CommandRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Outcome of one CLI invocation
///
/// A non-zero exit is a normal result at this level; only a failure to start
/// the process is reported as an error by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit code; `None` when the process timed out or was killed by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Wall-clock time from spawn to exit
    pub duration: Duration,
    /// Whether the process was killed for exceeding its timeout
    pub timed_out: bool,
}

impl CommandResult {
    /// Whether the process exited with code 0
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Trimmed stdout, falling back to stderr when stdout is empty
    ///
    /// Some CLIs print their primary output to stderr.
    pub fn primary_output(&self) -> &str {
        let stdout = self.stdout.trim();
        if stdout.is_empty() {
            self.stderr.trim()
        } else {
            stdout
        }
    }
}
