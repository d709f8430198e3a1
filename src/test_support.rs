//! Test support utilities shared across unit and integration tests.
//!
//! [`ScriptedConnector`] stands in for an SSH transport and [`FakeCloud`] for
//! a cloud control plane. Both are cheap to clone; clones share state so a
//! test can keep a handle for assertions after moving one into the code under
//! test.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::{Instant, sleep};

use crate::cloud::{
    CloudApi, CloudError, CloudFuture, CreateRequest, FloatingIp, Instance, InstanceState,
};
use crate::remote::{
    Connector, PROBE_COMMAND, RawOutput, RemoteError, RemoteFuture, RemoteSession,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct ScriptState {
    connects: usize,
    connect_failures: VecDeque<RemoteError>,
    refused_hosts: HashMap<String, RemoteError>,
    probe_failures: usize,
    responses: VecDeque<Result<RawOutput, RemoteError>>,
    commands: Vec<(String, Instant)>,
}

/// Connector whose sessions replay pre-seeded command outcomes in FIFO order.
///
/// Commands without a queued outcome succeed with empty output. Liveness
/// probes succeed unless [`Self::fail_next_probe`] was called and are not
/// recorded as commands.
#[derive(Clone, Debug, Default)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ScriptState>>,
    connect_delay: Duration,
    exec_delay: Duration,
}

impl ScriptedConnector {
    /// Creates a connector with nothing queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every dial take `delay` before completing.
    #[must_use]
    pub const fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    /// Makes every non-probe command take `delay` before completing.
    #[must_use]
    pub const fn with_exec_delay(mut self, delay: Duration) -> Self {
        self.exec_delay = delay;
        self
    }

    /// Number of dial attempts so far, failed ones included.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        lock(&self.state).connects
    }

    /// Makes the next dial fail with `error`.
    pub fn fail_next_connect(&self, error: RemoteError) {
        lock(&self.state).connect_failures.push_back(error);
    }

    /// Makes every dial to `host` fail with `error`.
    pub fn refuse_host(&self, host: &str, error: RemoteError) {
        lock(&self.state).refused_hosts.insert(host.to_owned(), error);
    }

    /// Makes the next liveness probe report a dead session.
    pub fn fail_next_probe(&self) {
        lock(&self.state).probe_failures += 1;
    }

    /// Queues raw output for the next command.
    pub fn push_output(&self, output: RawOutput) {
        lock(&self.state).responses.push_back(Ok(output));
    }

    /// Queues a non-zero exit with `stderr` for the next command.
    pub fn push_exit(&self, code: i32, stderr: &str) {
        self.push_output(RawOutput {
            stdout: String::new(),
            stderr: stderr.to_owned(),
            exit_status: Some(code),
            signal: None,
        });
    }

    /// Queues a transport failure for the next command.
    pub fn push_error(&self, error: RemoteError) {
        lock(&self.state).responses.push_back(Err(error));
    }

    /// Commands executed so far, probes excluded.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        lock(&self.state)
            .commands
            .iter()
            .map(|(command, _)| command.clone())
            .collect()
    }

    /// Instants at which each recorded command started.
    #[must_use]
    pub fn command_times(&self) -> Vec<Instant> {
        lock(&self.state)
            .commands
            .iter()
            .map(|(_, at)| *at)
            .collect()
    }

    /// Gaps between consecutive recorded commands.
    #[must_use]
    pub fn command_gaps(&self) -> Vec<Duration> {
        self.command_times()
            .windows(2)
            .filter_map(|pair| match pair {
                [earlier, later] => Some(later.saturating_duration_since(*earlier)),
                _ => None,
            })
            .collect()
    }
}

impl Connector for ScriptedConnector {
    type Session = ScriptedSession;

    fn connect<'a>(&'a self, host: &'a str) -> RemoteFuture<'a, Self::Session> {
        Box::pin(async move {
            let failure = {
                let mut state = lock(&self.state);
                state.connects += 1;
                state
                    .refused_hosts
                    .get(host)
                    .cloned()
                    .or_else(|| state.connect_failures.pop_front())
            };
            if !self.connect_delay.is_zero() {
                sleep(self.connect_delay).await;
            }
            if let Some(error) = failure {
                return Err(error);
            }
            Ok(ScriptedSession {
                host: host.to_owned(),
                state: Arc::clone(&self.state),
                exec_delay: self.exec_delay,
                closed: AtomicBool::new(false),
            })
        })
    }
}

/// Session produced by [`ScriptedConnector`].
#[derive(Debug)]
pub struct ScriptedSession {
    host: String,
    state: Arc<Mutex<ScriptState>>,
    exec_delay: Duration,
    closed: AtomicBool,
}

impl ScriptedSession {
    /// Returns `true` once the session has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl RemoteSession for ScriptedSession {
    fn exec<'a>(&'a self, command: &'a str) -> RemoteFuture<'a, RawOutput> {
        Box::pin(async move {
            if self.is_closed() {
                return Err(RemoteError::transport(&self.host, "session closed"));
            }
            if command == PROBE_COMMAND {
                let mut state = lock(&self.state);
                if state.probe_failures > 0 {
                    state.probe_failures -= 1;
                    return Ok(RawOutput {
                        exit_status: Some(255),
                        ..RawOutput::default()
                    });
                }
                return Ok(RawOutput::success(""));
            }

            let response = {
                let mut state = lock(&self.state);
                state.commands.push((command.to_owned(), Instant::now()));
                state.responses.pop_front()
            };
            if !self.exec_delay.is_zero() {
                sleep(self.exec_delay).await;
            }
            response.unwrap_or_else(|| Ok(RawOutput::success("")))
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct CloudState {
    next_id: usize,
    instances: BTreeMap<String, Instance>,
    scripted: HashMap<String, VecDeque<InstanceState>>,
    frozen: HashSet<String>,
    held_checks: HashMap<String, usize>,
    describe_counts: HashMap<String, usize>,
    create_failures: HashMap<String, String>,
    created_tags: Vec<Vec<String>>,
    floating: HashMap<String, FloatingIp>,
    released: Vec<String>,
}

impl CloudState {
    fn add(&mut self, name: &str, state: InstanceState) -> String {
        self.next_id += 1;
        let id = format!("srv-{}", self.next_id);
        self.instances.insert(
            id.clone(),
            Instance {
                id: id.clone(),
                name: name.to_owned(),
                public_ip: Some(format!("10.0.0.{}", self.next_id)),
                private_ip: Some(format!("10.1.0.{}", self.next_id)),
                state,
                system_ok: state == InstanceState::Running,
            },
        );
        id
    }

    fn set_state(&mut self, id: &str, state: InstanceState) -> Result<(), CloudError> {
        if self.frozen.contains(id) && state != InstanceState::Terminated {
            return Ok(());
        }
        let instance = self
            .instances
            .get_mut(id)
            .ok_or_else(|| CloudError::provider("action", format!("unknown server {id}")))?;
        instance.state = state;
        Ok(())
    }
}

/// In-memory cloud whose instances settle one poll after each action.
///
/// Scripted state sequences override the automatic progression, and frozen
/// instances ignore power actions entirely.
#[derive(Clone, Debug, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<CloudState>>,
}

impl FakeCloud {
    /// Creates an empty cloud.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an instance in `state` and returns its identifier.
    pub fn insert(&self, name: &str, state: InstanceState) -> String {
        lock(&self.state).add(name, state)
    }

    /// States reported by the next polls of `id`, in order.
    pub fn script_states(&self, id: &str, states: impl IntoIterator<Item = InstanceState>) {
        lock(&self.state)
            .scripted
            .entry(id.to_owned())
            .or_default()
            .extend(states);
    }

    /// Reports the next `polls` running reads of `id` with a failing system
    /// check.
    pub fn hold_system_check(&self, id: &str, polls: usize) {
        lock(&self.state).held_checks.insert(id.to_owned(), polls);
    }

    /// Stops `id` from ever changing state except through termination.
    pub fn freeze(&self, id: &str) {
        lock(&self.state).frozen.insert(id.to_owned());
    }

    /// Makes creation of instances named `name` fail with `message`.
    pub fn fail_create(&self, name: &str, message: &str) {
        lock(&self.state)
            .create_failures
            .insert(name.to_owned(), message.to_owned());
    }

    /// Reserves a floating address for `id`.
    pub fn attach_floating_ip(&self, id: &str, ip_id: &str, address: &str) {
        lock(&self.state).floating.insert(
            id.to_owned(),
            FloatingIp {
                id: ip_id.to_owned(),
                address: address.to_owned(),
            },
        );
    }

    /// Overrides the public address of `id`.
    pub fn set_public_ip(&self, id: &str, ip: &str) {
        if let Some(instance) = lock(&self.state).instances.get_mut(id) {
            instance.public_ip = Some(ip.to_owned());
        }
    }

    /// Number of status polls made for `id`.
    #[must_use]
    pub fn describe_count(&self, id: &str) -> usize {
        lock(&self.state)
            .describe_counts
            .get(id)
            .copied()
            .unwrap_or_default()
    }

    /// Current state of `id`, if it exists.
    #[must_use]
    pub fn state_of(&self, id: &str) -> Option<InstanceState> {
        lock(&self.state)
            .instances
            .get(id)
            .map(|instance| instance.state)
    }

    /// Public address of `id`, if any.
    #[must_use]
    pub fn public_ip_of(&self, id: &str) -> Option<String> {
        lock(&self.state)
            .instances
            .get(id)
            .and_then(|instance| instance.public_ip.clone())
    }

    /// Tags passed to every create request, in call order.
    #[must_use]
    pub fn created_tags(&self) -> Vec<Vec<String>> {
        lock(&self.state).created_tags.clone()
    }

    /// Identifiers of released floating addresses, in call order.
    #[must_use]
    pub fn released_ips(&self) -> Vec<String> {
        lock(&self.state).released.clone()
    }

    fn poll(&self, id: &str) -> Option<Instance> {
        let mut guard = lock(&self.state);
        let state = &mut *guard;
        *state.describe_counts.entry(id.to_owned()).or_default() += 1;

        let scripted = state.scripted.get_mut(id).and_then(VecDeque::pop_front);
        let frozen = state.frozen.contains(id);
        let instance = state.instances.get_mut(id)?;
        match scripted {
            Some(next) => instance.state = next,
            None if frozen => {}
            None => {
                instance.state = match instance.state {
                    InstanceState::Pending => InstanceState::Running,
                    InstanceState::Stopping => InstanceState::Stopped,
                    other => other,
                };
            }
        }

        instance.system_ok = instance.state == InstanceState::Running;
        if instance.system_ok
            && let Some(held) = state.held_checks.get_mut(id)
            && *held > 0
        {
            *held -= 1;
            instance.system_ok = false;
        }
        Some(instance.clone())
    }
}

impl CloudApi for FakeCloud {
    fn create_instance<'a>(&'a self, request: &'a CreateRequest) -> CloudFuture<'a, String> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.created_tags.push(request.tags.clone());
            if let Some(message) = state.create_failures.get(&request.name) {
                return Err(CloudError::provider("create", message));
            }
            Ok(state.add(&request.name, InstanceState::Pending))
        })
    }

    fn describe<'a>(&'a self, id: &'a str) -> CloudFuture<'a, Option<Instance>> {
        Box::pin(async move { Ok(self.poll(id)) })
    }

    fn find_by_ip<'a>(&'a self, ip: &'a str) -> CloudFuture<'a, Vec<Instance>> {
        Box::pin(async move {
            Ok(lock(&self.state)
                .instances
                .values()
                .filter(|instance| !instance.state.is_terminal() && instance.has_address(ip))
                .cloned()
                .collect())
        })
    }

    fn start<'a>(&'a self, id: &'a str) -> CloudFuture<'a, ()> {
        Box::pin(async move { lock(&self.state).set_state(id, InstanceState::Pending) })
    }

    fn stop<'a>(&'a self, id: &'a str) -> CloudFuture<'a, ()> {
        Box::pin(async move { lock(&self.state).set_state(id, InstanceState::Stopping) })
    }

    fn terminate<'a>(&'a self, id: &'a str) -> CloudFuture<'a, ()> {
        Box::pin(async move { lock(&self.state).set_state(id, InstanceState::Terminated) })
    }

    fn floating_ip<'a>(&'a self, id: &'a str) -> CloudFuture<'a, Option<FloatingIp>> {
        Box::pin(async move { Ok(lock(&self.state).floating.get(id).cloned()) })
    }

    fn release_ip<'a>(&'a self, ip: &'a FloatingIp) -> CloudFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.floating.retain(|_, held| held.id != ip.id);
            state.released.push(ip.id.clone());
            Ok(())
        })
    }
}
