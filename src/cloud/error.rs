//! Error types for the instance manager.

use std::time::Duration;

use thiserror::Error;

use super::InstanceState;

/// Errors raised by cloud instance operations. All of them are final.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CloudError {
    /// Wrapper for provider level failures.
    #[error("provider error during {operation}: {message}")]
    Provider {
        /// Operation that was being performed.
        operation: String,
        /// Message returned by the provider.
        message: String,
    },
    /// Raised when no live instance owns an address.
    #[error("no instance found with address {ip}")]
    NotFound {
        /// Address that was looked up.
        ip: String,
    },
    /// Raised when more than one instance claims an address.
    #[error("{count} instances share address {ip}")]
    AmbiguousIp {
        /// Address that was looked up.
        ip: String,
        /// Number of matching instances.
        count: usize,
    },
    /// Raised when an operation requires a running instance.
    #[error("instance {id} at {ip} is {state}, not running")]
    NotRunning {
        /// Address the caller supplied.
        ip: String,
        /// Provider identifier.
        id: String,
        /// State reported by the provider.
        state: InstanceState,
    },
    /// Raised when a status wait exceeds its deadline.
    #[error("timeout after {waited:?} waiting for instance {id} to become {target}")]
    Timeout {
        /// Provider identifier.
        id: String,
        /// State being waited for.
        target: InstanceState,
        /// Time spent polling.
        waited: Duration,
    },
    /// Raised when an instance lands in a state it can never leave while
    /// another state is awaited.
    #[error("instance {id} entered {state} while waiting for {target}")]
    UnexpectedState {
        /// Provider identifier.
        id: String,
        /// State being waited for.
        target: InstanceState,
        /// State observed instead.
        state: InstanceState,
    },
    /// Raised when a spawned per-instance task panics or is cancelled.
    #[error("task for {name} did not complete: {message}")]
    Task {
        /// Name or identifier the task was working on.
        name: String,
        /// Join failure description.
        message: String,
    },
    /// Aggregate of every failure in a concurrent batch.
    #[error("batch {batch_id} failed for {}", summarise(.failures))]
    Batch {
        /// Identifier tagged onto every instance in the batch.
        batch_id: String,
        /// Each failed name with its error, in request order.
        failures: Vec<(String, CloudError)>,
    },
}

impl CloudError {
    /// Builds a provider error for `operation`.
    #[must_use]
    pub fn provider(operation: &str, message: impl ToString) -> Self {
        Self::Provider {
            operation: operation.to_owned(),
            message: message.to_string(),
        }
    }
}

fn summarise(failures: &[(String, CloudError)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("{name} ({err})"))
        .collect::<Vec<_>>()
        .join(", ")
}
