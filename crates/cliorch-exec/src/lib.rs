//! # cliorch-exec
//!
//! Process execution and orchestration for cliorch:
//! - Child-process executor with captured output and hard timeouts
//! - Failure taxonomy and configurable transient/fatal classification
//! - CLI commands as poll probes
//! - Prerequisite (installed binary + version) probing
//! - The [`Orchestrator`] facade tying locks, retries and polling together

pub mod check;
pub mod executor;
pub mod failure;
pub mod orchestrator;
pub mod prerequisites;

pub use check::{CommandCheck, SuccessIndicator};
pub use executor::{CommandExecutor, ExecutionError, ProcessExecutor};
pub use failure::{check_result, execute_checked, CliFailureClassifier, CommandFailure, FailureClass};
pub use orchestrator::{OrchestrationError, Orchestrator, CLI_CONTEXT_KEY};
pub use prerequisites::{PrerequisiteProbe, PrerequisiteStatus};
