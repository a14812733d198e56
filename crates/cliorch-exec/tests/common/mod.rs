//! Common test helpers for cliorch-exec integration tests
//!
//! - Mock CLI scripts written into a temp dir for real-process tests
//! - `ScriptedExecutor`, an in-process `CommandExecutor` with canned responses,
//!   call timing and concurrency tracking for orchestration tests

#![allow(dead_code)]

use async_trait::async_trait;
use cliorch_core::types::{CommandRequest, CommandResult, RetryPolicy, RetryStrategy};
use cliorch_exec::{CommandExecutor, ExecutionError};
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

// ─── Process Mock Scripts ────────────────────────────────────────────────────

/// Write an executable shell script and return its path
pub fn create_script(dir: &Path, name: &str, body: &str) -> io::Result<PathBuf> {
    let script_path = dir.join(name);
    std::fs::write(&script_path, format!("#!/bin/sh\n{}\n", body))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755))?;
    }

    Ok(script_path)
}

/// Creates a mock CLI that logs its arguments, prints `stdout` and exits
/// with `exit_code`
pub fn create_mock_executable(
    dir: &Path,
    name: &str,
    stdout: &str,
    exit_code: i32,
) -> io::Result<PathBuf> {
    let log_path = invocation_log_path(dir, name);
    create_script(
        dir,
        name,
        &format!(
            r#"echo "$*" >> "{log}"
cat <<'MOCK_OUTPUT'
{stdout}
MOCK_OUTPUT
exit {exit_code}"#,
            log = log_path.display(),
            stdout = stdout,
            exit_code = exit_code,
        ),
    )
}

/// Creates a mock CLI that fails `failures` times with `stderr` on stderr
/// and exit code 1, then prints `stdout` and succeeds
///
/// The attempt count is kept in a counter file next to the script.
pub fn create_flaky_executable(
    dir: &Path,
    name: &str,
    failures: u32,
    stderr: &str,
    stdout: &str,
) -> io::Result<PathBuf> {
    let log_path = invocation_log_path(dir, name);
    let counter_path = dir.join(format!("{}.count", name));
    create_script(
        dir,
        name,
        &format!(
            r#"echo "$*" >> "{log}"
count=$(cat "{counter}" 2>/dev/null || echo 0)
count=$((count + 1))
echo "$count" > "{counter}"
if [ "$count" -le {failures} ]; then
  echo "{stderr}" >&2
  exit 1
fi
echo "{stdout}""#,
            log = log_path.display(),
            counter = counter_path.display(),
            failures = failures,
            stderr = stderr,
            stdout = stdout,
        ),
    )
}

pub fn invocation_log_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.log", name))
}

/// Argument lines logged by a mock executable, one per invocation
pub fn read_invocations(dir: &Path, name: &str) -> Vec<String> {
    std::fs::read_to_string(invocation_log_path(dir, name))
        .map(|log| log.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

// ─── Policies ────────────────────────────────────────────────────────────────

/// Fixed-delay policy without jitter
pub fn fixed_policy(max_attempts: u32, delay_ms: u64) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        strategy: RetryStrategy::FixedDelay,
        backoff_multiplier: 1.0,
        initial_delay_ms: delay_ms,
        max_delay_ms: delay_ms,
        jitter_fraction: 0.0,
    }
}

// ─── Scripted Executor ───────────────────────────────────────────────────────

/// A canned executor response
#[derive(Debug, Clone)]
pub struct Response {
    pub delay: Duration,
    pub outcome: Result<(i32, String, String), io::ErrorKind>,
}

impl Response {
    pub fn ok(stdout: &str) -> Self {
        Self::exit(0, stdout, "")
    }

    pub fn fail(exit_code: i32, stderr: &str) -> Self {
        Self::exit(exit_code, "", stderr)
    }

    pub fn exit(exit_code: i32, stdout: &str, stderr: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Ok((exit_code, stdout.to_string(), stderr.to_string())),
        }
    }

    pub fn spawn_error() -> Self {
        Self {
            delay: Duration::ZERO,
            outcome: Err(io::ErrorKind::NotFound),
        }
    }

    /// Take `delay` to produce this response
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Timing of one executed call
#[derive(Debug, Clone)]
pub struct Call {
    pub args: Vec<String>,
    pub started: Instant,
    pub finished: Instant,
}

/// In-process executor returning queued responses in call order
///
/// Once the queue is empty every call gets the fallback response. A
/// response slower than the request's timeout is reported as timed out.
pub struct ScriptedExecutor {
    responses: Mutex<VecDeque<Response>>,
    fallback: Response,
    calls: Mutex<Vec<Call>>,
    started: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new(responses: Vec<Response>) -> Self {
        Self::with_fallback(responses, Response::ok(""))
    }

    pub fn with_fallback(responses: Vec<Response>, fallback: Response) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    /// Calls that ran to completion
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that were started, including ones dropped mid-flight
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

struct ActiveCall<'a>(&'a AtomicUsize);

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, request: &CommandRequest) -> Result<CommandResult, ExecutionError> {
        let started = Instant::now();
        self.started.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        let _active = ActiveCall(&self.active);

        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        let timed_out = response.delay > request.timeout;
        tokio::time::sleep(response.delay.min(request.timeout)).await;

        self.calls.lock().unwrap().push(Call {
            args: request.args.clone(),
            started,
            finished: Instant::now(),
        });

        let (exit_code, stdout, stderr) = match response.outcome {
            Ok(output) => output,
            Err(kind) => {
                return Err(ExecutionError::Spawn {
                    program: request.program.clone(),
                    source: io::Error::new(kind, "scripted spawn failure"),
                })
            }
        };

        Ok(CommandResult {
            exit_code: if timed_out { None } else { Some(exit_code) },
            stdout,
            stderr,
            duration: started.elapsed(),
            timed_out,
        })
    }
}
