//! Polling for eventually-consistent external state
//!
//! A poll session repeatedly runs a caller-supplied check until it reports
//! ready, the deadline passes, or the caller cancels. Running out of time is
//! a normal outcome reported through [`PollOutcome`], never an error.

mod observer;
mod service;

pub use observer::{NoOpPollObserver, PollObserver, TracingPollObserver};
pub use service::{PollBackoff, PollConfig, PollOutcome, PollPhase, PollStatus, PollingService};
