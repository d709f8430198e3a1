//! Key-authenticated SSH sessions backed by libssh2.
//!
//! libssh2 calls block, so dialling and command execution run on tokio's
//! blocking pool. One channel is opened per command and closed before the
//! call returns; commands on the same session are serialised by the session
//! mutex. Command output is drained from both streams in one non-blocking
//! loop, bounded by the connector's command timeout.

use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use tracing::debug;

use super::{Connector, Credentials, RawOutput, RemoteError, RemoteFuture, RemoteSession};

const KEEPALIVE_INTERVAL_SECS: u32 = 30;
const READ_CHUNK: usize = 8192;
const IDLE_POLL: Duration = Duration::from_millis(10);

/// Dials SSH sessions using a fixed key and user.
#[derive(Clone, Debug)]
pub struct Ssh2Connector {
    credentials: Credentials,
    command_timeout: Option<Duration>,
}

impl Ssh2Connector {
    /// Creates a connector that authenticates every host with `credentials`.
    #[must_use]
    pub const fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            command_timeout: None,
        }
    }

    /// Bounds every blocking libssh2 call and output drain by `limit`.
    ///
    /// Set this to the retry policy's attempt timeout so an abandoned
    /// attempt releases its session instead of holding it until the remote
    /// command ends.
    #[must_use]
    pub const fn with_command_timeout(mut self, limit: Duration) -> Self {
        self.command_timeout = Some(limit);
        self
    }
}

impl Connector for Ssh2Connector {
    type Session = Ssh2Session;

    fn connect<'a>(&'a self, host: &'a str) -> RemoteFuture<'a, Self::Session> {
        Box::pin(async move {
            let credentials = self.credentials.clone();
            let target = host.to_owned();
            let session = tokio::task::spawn_blocking(move || dial(&target, &credentials))
                .await
                .map_err(|err| RemoteError::transport(host, format!("dial task failed: {err}")))??;
            session.set_timeout(timeout_millis(self.command_timeout));
            Ok(Ssh2Session {
                host: host.to_owned(),
                inner: Arc::new(Mutex::new(session)),
                command_timeout: self.command_timeout,
            })
        })
    }
}

/// An authenticated libssh2 session to one host.
pub struct Ssh2Session {
    host: String,
    inner: Arc<Mutex<ssh2::Session>>,
    command_timeout: Option<Duration>,
}

impl RemoteSession for Ssh2Session {
    fn exec<'a>(&'a self, command: &'a str) -> RemoteFuture<'a, RawOutput> {
        Box::pin(async move {
            let inner = Arc::clone(&self.inner);
            let host = self.host.clone();
            let owned = command.to_owned();
            let limit = self.command_timeout;
            tokio::task::spawn_blocking(move || run_channel(&host, &inner, &owned, limit))
                .await
                .map_err(|err| {
                    RemoteError::transport(&self.host, format!("command task failed: {err}"))
                })?
        })
    }

    fn close(&self) {
        close_when_idle(&self.host, &self.inner, disconnect);
    }
}

fn disconnect(host: &str, session: &ssh2::Session) {
    if let Err(err) = session.disconnect(None, "session closed by client", None) {
        debug!(host, error = %err, "ssh disconnect failed");
    }
}

/// Runs `shutdown` on the shared session without waiting for its lock.
///
/// A command still running on the blocking pool holds the lock; the shutdown
/// is then handed to the blocking pool too and runs once that command
/// releases the session.
fn close_when_idle<T: Send + 'static>(host: &str, inner: &Arc<Mutex<T>>, shutdown: fn(&str, &T)) {
    match inner.try_lock() {
        Ok(session) => shutdown(host, &session),
        Err(TryLockError::Poisoned(poisoned)) => shutdown(host, &poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => {
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                debug!(host, "session busy outside a runtime; dropping it unclosed");
                return;
            };
            debug!(host, "session busy; deferring disconnect");
            let shared = Arc::clone(inner);
            let owned_host = host.to_owned();
            drop(runtime.spawn_blocking(move || {
                let session = shared.lock().unwrap_or_else(PoisonError::into_inner);
                shutdown(&owned_host, &session);
            }));
        }
    }
}

fn timeout_millis(limit: Option<Duration>) -> u32 {
    // libssh2 treats zero as "wait forever".
    limit.map_or(0, |limit| u32::try_from(limit.as_millis()).unwrap_or(u32::MAX).max(1))
}

fn dial(host: &str, credentials: &Credentials) -> Result<ssh2::Session, RemoteError> {
    let addr = (host, credentials.port)
        .to_socket_addrs()
        .map_err(|err| RemoteError::transport(host, format!("invalid address: {err}")))?
        .next()
        .ok_or_else(|| RemoteError::transport(host, "address resolved to nothing"))?;
    let tcp = TcpStream::connect_timeout(&addr, credentials.connect_timeout)
        .map_err(|err| RemoteError::transport(host, err))?;

    let mut session = ssh2::Session::new().map_err(|err| RemoteError::transport(host, err))?;
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|err| RemoteError::transport(host, err))?;
    session
        .userauth_pubkey_file(
            &credentials.user,
            None,
            credentials.identity_file.as_std_path(),
            None,
        )
        .map_err(|err| RemoteError::transport(host, err))?;
    if !session.authenticated() {
        return Err(RemoteError::transport(
            host,
            format!("authentication failed for user {}", credentials.user),
        ));
    }
    session.set_keepalive(true, KEEPALIVE_INTERVAL_SECS);
    Ok(session)
}

fn run_channel(
    host: &str,
    inner: &Mutex<ssh2::Session>,
    command: &str,
    limit: Option<Duration>,
) -> Result<RawOutput, RemoteError> {
    let session = inner.lock().unwrap_or_else(PoisonError::into_inner);
    let transport = |err: ssh2::Error| RemoteError::transport(host, err);

    let mut channel = session.channel_session().map_err(transport)?;
    channel.exec(command).map_err(transport)?;

    let deadline = limit.map(|limit| Instant::now() + limit);
    let mut stdout_stream = channel.stream(0);
    let mut stderr_stream = channel.stderr();
    session.set_blocking(false);
    let drained = drain_streams(&mut stdout_stream, &mut stderr_stream, deadline);
    session.set_blocking(true);
    let (stdout, stderr) = drained.map_err(|err| match (err.kind(), limit) {
        (io::ErrorKind::TimedOut, Some(limit)) => RemoteError::timeout(host, limit),
        _ => RemoteError::transport(host, err),
    })?;

    channel.wait_close().map_err(transport)?;
    let exit_status = channel.exit_status().ok();
    let signal = channel
        .exit_signal()
        .ok()
        .and_then(|exit| exit.exit_signal);

    Ok(RawOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_status,
        signal,
    })
}

/// Reads `stdout` and `stderr` alternately until both report end of file.
///
/// Either reader may return [`io::ErrorKind::WouldBlock`]; the loop keeps
/// draining the other one, so a command that floods one stream never stalls
/// on the stream nobody is reading.
///
/// # Errors
///
/// Returns the first hard read error, or [`io::ErrorKind::TimedOut`] once
/// `deadline` passes before both streams close.
fn drain_streams<O: Read, E: Read>(
    stdout: &mut O,
    stderr: &mut E,
    deadline: Option<Instant>,
) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let mut out_open = true;
    let mut err_open = true;
    let mut chunk = [0_u8; READ_CHUNK];

    while out_open || err_open {
        let read_out = pump(stdout, &mut out, &mut out_open, &mut chunk)?;
        let read_err = pump(stderr, &mut err, &mut err_open, &mut chunk)?;
        if read_out || read_err {
            continue;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "command output still open at the timeout",
            ));
        }
        if out_open || err_open {
            std::thread::sleep(IDLE_POLL);
        }
    }
    Ok((out, err))
}

fn pump(
    reader: &mut impl Read,
    sink: &mut Vec<u8>,
    open: &mut bool,
    chunk: &mut [u8],
) -> io::Result<bool> {
    if !*open {
        return Ok(false);
    }
    match reader.read(chunk) {
        Ok(0) => {
            *open = false;
            Ok(false)
        }
        Ok(read) => {
            sink.extend_from_slice(chunk.get(..read).unwrap_or_default());
            Ok(true)
        }
        Err(err) => match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(false),
            _ => Err(err),
        },
    }
}
