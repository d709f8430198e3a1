//! Session abstractions shared by the cache, the executor, and transports.

use std::future::Future;
use std::pin::Pin;

use super::RemoteError;

/// Future returned by session and connector operations.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// Unprocessed output of one command run on a session channel.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RawOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit status reported by the remote shell, if any.
    pub exit_status: Option<i32>,
    /// Name of the signal that terminated the command, if any.
    pub signal: Option<String>,
}

impl RawOutput {
    /// Output of a command that exited cleanly with `stdout`.
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_status: Some(0),
            ..Self::default()
        }
    }

    /// Returns `true` when the exit status equals zero and no signal arrived.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.exit_status, Some(0)) && self.signal.is_none()
    }
}

/// Interpreted result of one command execution.
///
/// Non-empty `stderr` alongside `error: None` is a success: many provisioning
/// tools write warnings to stderr.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandResult {
    /// Standard output with trailing whitespace removed.
    pub stdout: String,
    /// Standard error with trailing whitespace removed.
    pub stderr: String,
    /// Failure, when the command did not succeed.
    pub error: Option<RemoteError>,
}

impl CommandResult {
    /// Converts into `Ok(stdout)` or the recorded error.
    ///
    /// # Errors
    ///
    /// Returns the [`RemoteError`] captured during execution.
    pub fn into_result(self) -> Result<String, RemoteError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.stdout),
        }
    }
}

/// An authenticated connection able to run commands on one host.
pub trait RemoteSession: Send + Sync + 'static {
    /// Opens a channel, runs `command`, and releases the channel before
    /// returning.
    fn exec<'a>(&'a self, command: &'a str) -> RemoteFuture<'a, RawOutput>;

    /// Disconnects the session. Further `exec` calls fail.
    fn close(&self);
}

/// Dials and authenticates new sessions.
pub trait Connector: Send + Sync + 'static {
    /// Session type produced by this connector.
    type Session: RemoteSession;

    /// Opens an authenticated session to `host`.
    fn connect<'a>(&'a self, host: &'a str) -> RemoteFuture<'a, Self::Session>;
}
