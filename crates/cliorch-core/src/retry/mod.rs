//! Retry execution engine with policy-based configuration
//!
//! Every CLI invocation that can fail transiently runs through this engine.
//! Classification of failures is supplied by the caller through a
//! [`RetryPredicate`]; the engine only schedules attempts.
//!
//! # Features
//!
//! - Multiple retry strategies: None, Fixed, Exponential, Linear backoff
//! - Bounded multiplicative jitter
//! - Observable retry attempts via the `RetryObserver` trait
//! - Cooperative cancellation through a `CancellationToken`
//!
//! # Example
//!
//! ```rust,no_run
//! use cliorch_core::retry::{retry_with_policy, RetryError};
//! use cliorch_core::types::RetryPolicy;
//!
//! async fn example() -> Result<String, RetryError<std::io::Error>> {
//!     let policy = RetryPolicy::default();
//!
//!     retry_with_policy(&policy, || async {
//!         Ok("success".to_string())
//!     }).await
//! }
//! ```

mod error;
mod executor;
mod observer;
mod strategies;

pub use error::RetryError;
pub use executor::{retry_with_policy, retry_with_predicate, RetryExecutor, RetryExecutorBuilder};
pub use observer::{AttemptRecord, NoOpObserver, RetryObserver, StatsObserver, TracingObserver};
pub use strategies::{
    calculate_delay, AlwaysRetry, ClosurePredicate, MessagePredicate, NeverRetry, RetryPredicate,
};

#[cfg(test)]
mod tests;
