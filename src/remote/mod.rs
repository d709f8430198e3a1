//! Remote command execution over cached, authenticated sessions.
//!
//! The layer is split into a per-host [`SessionCache`], a single-command
//! [`executor`], and an SSH transport ([`Ssh2Connector`]). Retrying lives one
//! level up in [`crate::retry`].

mod config;
mod error;
pub mod executor;
mod session;
mod ssh;
mod types;

pub use config::{Credentials, DEFAULT_IDENTITY_FILE, DEFAULT_SSH_USER, SshConfig, expand_tilde};
pub use error::{RemoteError, RemoteErrorKind};
pub use session::{PROBE_COMMAND, SessionCache};
pub use ssh::{Ssh2Connector, Ssh2Session};
pub use types::{CommandResult, Connector, RawOutput, RemoteFuture, RemoteSession};
