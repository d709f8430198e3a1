//! Runs one command on a session and interprets its outcome.
//!
//! Failure is decided by the transport and the exit status, never by the mere
//! presence of stderr. When a command does fail, non-empty stderr becomes the
//! authoritative error text unless it is only the shell's own exit-status
//! annotation.

use tracing::debug;

use super::{CommandResult, RawOutput, RemoteError, RemoteSession};

const EXIT_ANNOTATIONS: [&str; 2] = ["process exited with status", "exit status"];

/// Message used when a command ends without reporting any status.
pub const MISSING_STATUS_MESSAGE: &str = "process exited without exit status or signal";

/// Runs `command` on `session` through a single channel.
///
/// Both output streams are captured separately with trailing whitespace
/// trimmed.
pub async fn run<S>(host: &str, session: &S, command: &str) -> CommandResult
where
    S: RemoteSession + ?Sized,
{
    match session.exec(command).await {
        Ok(raw) => interpret(host, raw),
        Err(err) => CommandResult {
            stdout: String::new(),
            stderr: String::new(),
            error: Some(err),
        },
    }
}

/// Applies the stderr and exit-status rules to raw channel output.
#[must_use]
pub fn interpret(host: &str, raw: RawOutput) -> CommandResult {
    let stdout = raw.stdout.trim_end().to_owned();
    let stderr = raw.stderr.trim_end().to_owned();

    let error = match (raw.exit_status, raw.signal.as_deref()) {
        (_, Some(signal)) => Some(RemoteError::signal(host, signal, &stderr)),
        (Some(0), None) => {
            if !stderr.is_empty() {
                debug!(host, stderr = %stderr, "command succeeded with stderr output");
            }
            None
        }
        (Some(code), None) => Some(RemoteError::exit(host, code, failure_text(&stderr, code))),
        (None, None) => Some(RemoteError::transport(host, MISSING_STATUS_MESSAGE)),
    };

    CommandResult {
        stdout,
        stderr,
        error,
    }
}

fn failure_text(stderr: &str, code: i32) -> String {
    if stderr.is_empty() || is_exit_annotation(stderr) {
        format!("process exited with status {code}")
    } else {
        stderr.to_owned()
    }
}

/// Returns `true` when `stderr` is nothing more than an exit-status line such
/// as `Process exited with status 1`.
fn is_exit_annotation(stderr: &str) -> bool {
    let lowered = stderr.trim().to_lowercase();
    EXIT_ANNOTATIONS.iter().any(|prefix| {
        lowered.strip_prefix(prefix).is_some_and(|rest| {
            let digits = rest.trim();
            !digits.is_empty() && digits.chars().all(|ch| ch.is_ascii_digit())
        })
    })
}
