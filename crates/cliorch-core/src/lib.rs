//! # cliorch-core
//!
//! Coordination primitives for driving a stateful external CLI:
//! - Runtime configuration with embedded defaults and layered overrides
//! - Retry execution engine with policy-based configuration
//! - Named FIFO locks guarding the CLI's shared context
//! - Polling for eventually-consistent external state

pub mod config;
pub mod error;
pub mod lock;
pub mod poll;
pub mod retry;
pub mod types;

pub use config::HierarchicalConfigLoader;
pub use error::{Error, Result};
pub use lock::{LockError, LockGuard, ResourceLocker};
pub use poll::{PollConfig, PollOutcome, PollStatus, PollingService};
pub use retry::RetryError;
