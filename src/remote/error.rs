//! Structured errors raised by remote sessions and command execution.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Broad category of a remote failure, used by retry classification.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RemoteErrorKind {
    /// Dial, handshake, authentication, or channel failure.
    Transport,
    /// The remote command exited with a non-zero status.
    Exit {
        /// Exit status reported by the remote shell.
        code: i32,
    },
    /// The remote command was terminated by a signal.
    Signal,
    /// The orchestrator's own per-attempt deadline elapsed.
    Timeout,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => f.write_str("transport"),
            Self::Exit { code } => write!(f, "exit status {code}"),
            Self::Signal => f.write_str("signal"),
            Self::Timeout => f.write_str("timeout"),
        }
    }
}

/// Failure observed while talking to, or running a command on, a host.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{host}: {message}")]
pub struct RemoteError {
    /// Host the failure was observed on.
    pub host: String,
    /// Category of the failure.
    pub kind: RemoteErrorKind,
    /// Authoritative error text (stderr, transport message, or a synthesised
    /// status description).
    pub message: String,
}

impl RemoteError {
    /// Builds a transport-level error.
    #[must_use]
    pub fn transport(host: &str, message: impl fmt::Display) -> Self {
        Self {
            host: host.to_owned(),
            kind: RemoteErrorKind::Transport,
            message: message.to_string(),
        }
    }

    /// Builds an error for a command that exited with `code`.
    #[must_use]
    pub fn exit(host: &str, code: i32, message: impl Into<String>) -> Self {
        Self {
            host: host.to_owned(),
            kind: RemoteErrorKind::Exit { code },
            message: message.into(),
        }
    }

    /// Builds an error for a command killed by `signal`.
    #[must_use]
    pub fn signal(host: &str, signal: &str, stderr: &str) -> Self {
        let message = if stderr.is_empty() {
            format!("process terminated by signal {signal}")
        } else {
            format!("process terminated by signal {signal}: {stderr}")
        };
        Self {
            host: host.to_owned(),
            kind: RemoteErrorKind::Signal,
            message,
        }
    }

    /// Builds an error for an attempt that exceeded `limit`.
    #[must_use]
    pub fn timeout(host: &str, limit: Duration) -> Self {
        Self {
            host: host.to_owned(),
            kind: RemoteErrorKind::Timeout,
            message: format!("attempt deadline of {limit:?} elapsed"),
        }
    }

    /// Returns the remote exit code when the error carries one.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        match self.kind {
            RemoteErrorKind::Exit { code } => Some(code),
            _ => None,
        }
    }

    /// Returns `true` when the underlying session should not be reused.
    #[must_use]
    pub const fn poisons_session(&self) -> bool {
        matches!(
            self.kind,
            RemoteErrorKind::Transport | RemoteErrorKind::Timeout
        )
    }
}
