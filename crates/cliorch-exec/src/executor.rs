//! Child-process execution with captured output and a hard timeout

use std::io;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use cliorch_core::types::{CommandRequest, CommandResult};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// How long to keep draining output after the child has exited
///
/// A background process the CLI left behind can hold the pipes open after
/// the child itself is gone. Both streams share this one deadline.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

/// The process could not be run at all
///
/// A non-zero exit is not an error at this level; it is reported through
/// [`CommandResult::exit_code`].
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The binary is missing or not executable
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Waiting for the child failed
    #[error("I/O error while waiting for '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl ExecutionError {
    /// Whether the binary could not be found
    pub fn is_not_found(&self) -> bool {
        match self {
            ExecutionError::Spawn { source, .. } => source.kind() == io::ErrorKind::NotFound,
            ExecutionError::Io { .. } => false,
        }
    }

    pub fn program(&self) -> &str {
        match self {
            ExecutionError::Spawn { program, .. } | ExecutionError::Io { program, .. } => program,
        }
    }
}

/// Runs one CLI invocation to completion
///
/// Implementations must never block past `request.timeout` and must not leave
/// a running child behind on any exit path.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, request: &CommandRequest) -> Result<CommandResult, ExecutionError>;
}

#[async_trait]
impl<T: CommandExecutor + ?Sized> CommandExecutor for Arc<T> {
    async fn execute(&self, request: &CommandRequest) -> Result<CommandResult, ExecutionError> {
        (**self).execute(request).await
    }
}

/// Executes commands as OS child processes
///
/// Arguments are passed verbatim with no shell involved. stdin is closed,
/// stdout and stderr are captured as lossy UTF-8. On unix the child leads its
/// own process group, and a timeout or a dropped future kills the whole
/// group, so helpers forked by wrapper scripts die with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, request: &CommandRequest) -> Result<CommandResult, ExecutionError> {
        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .envs(&request.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        if let Some(dir) = &request.working_dir {
            cmd.current_dir(dir);
        }

        tracing::debug!(command = %request, timeout_ms = request.timeout.as_millis() as u64, "spawning");

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| ExecutionError::Spawn {
            program: request.program.clone(),
            source,
        })?;

        let mut group = ProcessGroup::new(child.id());
        let stdout = OutputCollector::start(child.stdout.take());
        let stderr = OutputCollector::start(child.stderr.take());

        let status = match tokio::time::timeout(request.timeout, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(source)) => {
                return Err(ExecutionError::Io {
                    program: request.program.clone(),
                    source,
                })
            }
            Err(_) => {
                tracing::warn!(
                    command = %request,
                    timeout_ms = request.timeout.as_millis() as u64,
                    "command timed out, killing"
                );
                group.kill();
                if let Err(err) = child.start_kill() {
                    tracing::debug!(error = %err, "kill after timeout failed");
                }
                // Reap so no zombie is left behind
                if let Err(err) = child.wait().await {
                    tracing::debug!(error = %err, "wait after kill failed");
                }
                None
            }
        };
        group.disarm();
        let duration = start.elapsed();

        let drain_deadline = Instant::now() + OUTPUT_DRAIN_TIMEOUT;
        let (stdout, stderr) = tokio::join!(stdout.finish(drain_deadline), stderr.finish(drain_deadline));

        let result = CommandResult {
            exit_code: status.and_then(|s| s.code()),
            stdout,
            stderr,
            duration,
            timed_out: status.is_none(),
        };

        tracing::debug!(
            command = %request,
            exit_code = ?result.exit_code,
            duration_ms = duration.as_millis() as u64,
            timed_out = result.timed_out,
            "command finished"
        );

        Ok(result)
    }
}

/// Background reader that accumulates one output stream
///
/// Output is kept in a shared buffer so that whatever was read before a
/// timeout is still returned.
struct OutputCollector {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl OutputCollector {
    fn start<R>(stream: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = stream.map(|mut stream| {
            let sink = buffer.clone();
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => sink
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .extend_from_slice(&chunk[..n]),
                    }
                }
            })
        });
        Self { buffer, task }
    }

    async fn finish(self, deadline: Instant) -> String {
        if let Some(mut task) = self.task {
            if tokio::time::timeout_at(deadline, &mut task)
                .await
                .is_err()
            {
                task.abort();
            }
        }
        let bytes = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let text = String::from_utf8_lossy(&bytes).into_owned();
        text
    }
}

/// The child's process group, killed on drop unless disarmed
///
/// Covers the paths where the `execute` future is dropped mid-wait; tokio's
/// `kill_on_drop` only reaches the direct child.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    /// Kill every process in the group; must run before the leader is reaped
    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }

    /// The leader exited on its own; leave anything it started alone
    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Err(err) = killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        tracing::debug!(pgid, error = %err, "killing process group failed");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}
