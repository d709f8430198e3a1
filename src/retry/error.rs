//! Error types for the retry orchestrator.

use std::time::Duration;

use thiserror::Error;

use crate::remote::RemoteError;

/// Errors raised by [`super::RetryOrchestrator`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RetryError {
    /// Raised before any attempt when the policy is malformed.
    #[error("invalid retry policy: {reason}")]
    InvalidPolicy {
        /// Constraint that was violated.
        reason: String,
    },
    /// Raised on the first failure classified as non-retryable.
    #[error("command on {host} failed on attempt {attempt}: {source}")]
    Fatal {
        /// Host the command ran on.
        host: String,
        /// Attempt that failed, starting at one.
        attempt: u32,
        /// The failure that stopped the loop.
        source: RemoteError,
    },
    /// Raised when every attempt failed with a retryable error.
    #[error("command on {host} still failing after {attempts} attempts: {source}")]
    Exhausted {
        /// Host the command ran on.
        host: String,
        /// Number of attempts made.
        attempts: u32,
        /// The last failure observed.
        source: RemoteError,
    },
    /// Raised when the overall time budget elapses mid-command or mid-backoff.
    #[error("command on {host} exceeded its {budget:?} retry budget during attempt {attempt}")]
    DeadlineExceeded {
        /// Host the command ran on.
        host: String,
        /// Budget derived from the policy.
        budget: Duration,
        /// Attempt in progress when the budget ran out.
        attempt: u32,
    },
    /// Raised when a fan-out task panics or is cancelled.
    #[error("task for {host} did not complete: {message}")]
    Task {
        /// Host the task was working on.
        host: String,
        /// Join failure description.
        message: String,
    },
}

impl RetryError {
    /// The last remote failure behind this error, when there was one.
    #[must_use]
    pub const fn last_error(&self) -> Option<&RemoteError> {
        match self {
            Self::Fatal { source, .. } | Self::Exhausted { source, .. } => Some(source),
            Self::InvalidPolicy { .. } | Self::DeadlineExceeded { .. } | Self::Task { .. } => None,
        }
    }
}
