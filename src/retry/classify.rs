//! Ordered retryable/fatal classification of remote failures.
//!
//! Rules are evaluated in a fixed order and the first match wins:
//!
//! 1. a non-retryable message fragment makes the error fatal;
//! 2. a retryable message fragment makes it retryable;
//! 3. an exit code is retryable only when whitelisted, otherwise fatal;
//! 4. the orchestrator's own attempt timeout is retryable;
//! 5. anything else is fatal.

use crate::remote::{RemoteError, RemoteErrorKind};

use super::RetryPolicy;

/// Outcome of classifying a failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Disposition {
    /// Another attempt may succeed.
    Retryable,
    /// Further attempts are pointless.
    Fatal,
}

/// Classifies `error` under `policy`.
#[must_use]
pub fn classify(error: &RemoteError, policy: &RetryPolicy) -> Disposition {
    let message = error.message.to_lowercase();

    if contains_any(&message, &policy.non_retryable_messages) {
        return Disposition::Fatal;
    }
    if contains_any(&message, &policy.retryable_messages) {
        return Disposition::Retryable;
    }
    if let Some(code) = error.exit_code() {
        return if policy.retryable_exit_codes.contains(&code) {
            Disposition::Retryable
        } else {
            Disposition::Fatal
        };
    }
    if error.kind == RemoteErrorKind::Timeout {
        return Disposition::Retryable;
    }
    Disposition::Fatal
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles
        .iter()
        .filter(|needle| !needle.is_empty())
        .any(|needle| haystack.contains(&needle.to_lowercase()))
}
