//! Named, FIFO-fair mutual exclusion for shared external resources
//!
//! The external CLI keeps a single persisted context (selected organization,
//! project, workspace). Commands that read or write it must not overlap, so
//! every such command runs while holding the lock for a resource key.
//!
//! # Example
//!
//! ```rust,no_run
//! use cliorch_core::lock::ResourceLocker;
//! use std::time::Duration;
//!
//! async fn example() -> Result<(), cliorch_core::lock::LockError> {
//!     let locker = ResourceLocker::new();
//!     let guard = locker.acquire("cli-console-context", Duration::from_secs(30)).await?;
//!     // ... run commands against the shared context ...
//!     guard.release();
//!     Ok(())
//! }
//! ```

mod error;
mod locker;

pub use error::LockError;
pub use locker::{LockGuard, LockHandle, ResourceLocker};
