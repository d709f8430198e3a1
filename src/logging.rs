//! Log subscriber set-up for the `ruslan` binary.
//!
//! The library only emits `tracing` events. Installing a subscriber is left
//! to the binary so embedding test harnesses keep control of their output.

use std::io;

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Environment variable holding filter directives, for example
/// `ruslan=debug,warn`.
pub const LOG_ENV_VAR: &str = "RUSLAN_LOG";

/// Filter applied when [`LOG_ENV_VAR`] is unset.
pub const DEFAULT_FILTER: &str = "warn";

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Raised when the filter directives do not parse.
    #[error("invalid {LOG_ENV_VAR} directives '{directives}': {message}")]
    Filter {
        /// Directives that were rejected.
        directives: String,
        /// Parser message.
        message: String,
    },
    /// Raised when a global subscriber is already installed.
    #[error("log subscriber already installed: {0}")]
    Install(String),
}

/// Builds the filter from `RUSLAN_LOG`, falling back to `default_filter`.
///
/// # Errors
///
/// Returns [`LoggingError::Filter`] when the directives are malformed.
pub fn filter_from(
    directives: Option<&str>,
    default_filter: &str,
) -> Result<EnvFilter, LoggingError> {
    let chosen = directives
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default_filter);
    EnvFilter::try_new(chosen).map_err(|err| LoggingError::Filter {
        directives: chosen.to_owned(),
        message: err.to_string(),
    })
}

/// Installs a compact stderr subscriber filtered by `RUSLAN_LOG`.
///
/// Stdout stays reserved for command output.
///
/// # Errors
///
/// Returns [`LoggingError`] when the filter is malformed or a subscriber is
/// already installed.
pub fn init(default_filter: &str) -> Result<(), LoggingError> {
    let directives = std::env::var(LOG_ENV_VAR).ok();
    let filter = filter_from(directives.as_deref(), default_filter)?;
    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(io::stderr)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .try_init()
        .map_err(|err| LoggingError::Install(err.to_string()))
}
