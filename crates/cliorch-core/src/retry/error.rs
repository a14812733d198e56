//! Error types for the retry execution engine
//!
//! A retry loop ends in one of three failure shapes: the attempt budget was
//! spent, the predicate classified an error as fatal, or the caller cancelled.

use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Terminal failure of a retry loop
///
/// The error type is generic over `E`, the underlying error type from the
/// operation being retried.
#[derive(Debug)]
pub enum RetryError<E> {
    /// All retry attempts have been exhausted
    ///
    /// Distinct from [`RetryError::NonRetryable`] so callers can tell
    /// "gave up" apart from "known unrecoverable".
    Exhausted {
        /// Number of attempts made before giving up
        attempts: u32,
        /// The error from the final attempt
        source: E,
        /// Total duration spent across all attempts
        total_duration: Duration,
    },

    /// The predicate classified the error as fatal
    NonRetryable {
        /// Attempt on which the fatal error occurred
        attempt: u32,
        /// The fatal error
        source: E,
    },

    /// The retry loop was cancelled by its caller
    Cancelled {
        /// Number of attempts started before cancellation
        attempts: u32,
        /// The last error that occurred, if any
        last_error: Option<E>,
    },
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted {
                attempts,
                source,
                total_duration,
            } => {
                write!(
                    f,
                    "retry exhausted after {} attempts over {:.2}s: {}",
                    attempts,
                    total_duration.as_secs_f64(),
                    source
                )
            }
            RetryError::NonRetryable { attempt, source } => {
                write!(f, "non-retryable error on attempt {}: {}", attempt, source)
            }
            RetryError::Cancelled {
                attempts,
                last_error,
            } => {
                if let Some(err) = last_error {
                    write!(f, "retry cancelled after {} attempts: {}", attempts, err)
                } else {
                    write!(f, "retry cancelled after {} attempts", attempts)
                }
            }
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::NonRetryable { source, .. } => Some(source),
            RetryError::Cancelled {
                last_error: Some(err),
                ..
            } => Some(err),
            RetryError::Cancelled { .. } => None,
        }
    }
}

impl<E> RetryError<E> {
    /// Create a new exhausted error
    pub fn exhausted(attempts: u32, source: E, total_duration: Duration) -> Self {
        RetryError::Exhausted {
            attempts,
            source,
            total_duration,
        }
    }

    /// Create a new non-retryable error
    pub fn non_retryable(attempt: u32, source: E) -> Self {
        RetryError::NonRetryable { attempt, source }
    }

    /// Create a new cancelled error
    pub fn cancelled(attempts: u32, last_error: Option<E>) -> Self {
        RetryError::Cancelled {
            attempts,
            last_error,
        }
    }

    /// Get the number of attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::NonRetryable { attempt, .. } => *attempt,
            RetryError::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// Check if this error indicates all retries were exhausted
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// Check if this error is non-retryable
    pub fn is_non_retryable(&self) -> bool {
        matches!(self, RetryError::NonRetryable { .. })
    }

    /// Check if this error indicates cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    /// Get the underlying error, consuming this error
    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::NonRetryable { source, .. } => Some(source),
            RetryError::Cancelled { last_error, .. } => last_error,
        }
    }

    /// Get a reference to the underlying error
    pub fn source_ref(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::NonRetryable { source, .. } => Some(source),
            RetryError::Cancelled { last_error, .. } => last_error.as_ref(),
        }
    }

    /// Map the error type using a closure
    pub fn map_err<F, E2>(self, f: F) -> RetryError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            RetryError::Exhausted {
                attempts,
                source,
                total_duration,
            } => RetryError::Exhausted {
                attempts,
                source: f(source),
                total_duration,
            },
            RetryError::NonRetryable { attempt, source } => RetryError::NonRetryable {
                attempt,
                source: f(source),
            },
            RetryError::Cancelled {
                attempts,
                last_error,
            } => RetryError::Cancelled {
                attempts,
                last_error: last_error.map(f),
            },
        }
    }
}
