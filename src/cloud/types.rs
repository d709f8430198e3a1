//! Provider-neutral instance model and the provider boundary trait.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use super::CloudError;

/// Future returned by [`CloudApi`] operations.
pub type CloudFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CloudError>> + Send + 'a>>;

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Default upper bound on a single status wait.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(300);

/// Lifecycle state of a compute instance.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum InstanceState {
    /// Booting or otherwise transitioning towards running.
    Pending,
    /// Powered on.
    Running,
    /// Powering off.
    Stopping,
    /// Powered off but still allocated.
    Stopped,
    /// Deleted. Terminal.
    Terminated,
}

impl InstanceState {
    /// Returns `true` for states no instance ever leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// Position of `self` along the lifecycle leg that ends in `target`.
    ///
    /// Returns `None` when `self` cannot occur on the way to `target`, which
    /// only happens for a terminal state observed while waiting for a live
    /// one.
    #[must_use]
    pub const fn leg_position(self, target: Self) -> Option<u8> {
        match (target, self) {
            (Self::Terminated, Self::Terminated) => Some(1),
            (Self::Terminated, _) => Some(0),
            (_, Self::Terminated) => None,
            (Self::Running | Self::Pending, Self::Stopped | Self::Stopping) => Some(0),
            (Self::Running | Self::Pending, Self::Pending) => Some(1),
            (Self::Running | Self::Pending, Self::Running) => Some(2),
            (Self::Stopped | Self::Stopping, Self::Running | Self::Pending) => Some(0),
            (Self::Stopped | Self::Stopping, Self::Stopping) => Some(1),
            (Self::Stopped | Self::Stopping, Self::Stopped) => Some(2),
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

/// Snapshot of an instance as last reported by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instance {
    /// Provider identifier.
    pub id: String,
    /// Human-readable name given at creation.
    pub name: String,
    /// Public IPv4 address, once assigned.
    pub public_ip: Option<String>,
    /// Private address, once assigned.
    pub private_ip: Option<String>,
    /// Reported lifecycle state.
    pub state: InstanceState,
    /// Provider-side health check. A running instance only counts as ready
    /// once this is `true`.
    pub system_ok: bool,
}

impl Instance {
    /// Returns `true` when the instance has reached `target` and, for
    /// `Running`, passed its system check.
    #[must_use]
    pub fn has_reached(&self, target: InstanceState) -> bool {
        self.state == target && (target != InstanceState::Running || self.system_ok)
    }

    /// Returns `true` when `ip` is one of the instance's addresses.
    #[must_use]
    pub fn has_address(&self, ip: &str) -> bool {
        self.public_ip.as_deref() == Some(ip) || self.private_ip.as_deref() == Some(ip)
    }
}

/// Parameters for creating one instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateRequest {
    /// Instance name.
    pub name: String,
    /// Tags attached at creation; always includes the batch tag.
    pub tags: Vec<String>,
}

/// A reserved address that survives instance power cycles.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FloatingIp {
    /// Provider identifier of the address reservation.
    pub id: String,
    /// The address itself.
    pub address: String,
}

/// Settings for the status-poll loop.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollSettings {
    /// Sleep between polls.
    pub interval: Duration,
    /// Hard deadline measured from the first poll.
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

/// Control-plane operations the instance manager depends on.
///
/// Every error is final: the manager never retries a provider call.
pub trait CloudApi: Send + Sync + 'static {
    /// Requests a new instance and returns its provider identifier.
    fn create_instance<'a>(&'a self, request: &'a CreateRequest) -> CloudFuture<'a, String>;

    /// Reads the current state of `id`. `None` means the provider does not
    /// (or does not yet) know the instance.
    fn describe<'a>(&'a self, id: &'a str) -> CloudFuture<'a, Option<Instance>>;

    /// Lists live instances that own `ip` as a public or private address.
    fn find_by_ip<'a>(&'a self, ip: &'a str) -> CloudFuture<'a, Vec<Instance>>;

    /// Requests power-on.
    fn start<'a>(&'a self, id: &'a str) -> CloudFuture<'a, ()>;

    /// Requests power-off.
    fn stop<'a>(&'a self, id: &'a str) -> CloudFuture<'a, ()>;

    /// Requests deletion.
    fn terminate<'a>(&'a self, id: &'a str) -> CloudFuture<'a, ()>;

    /// Returns the floating address attached to instance `id`, if any.
    fn floating_ip<'a>(&'a self, id: &'a str) -> CloudFuture<'a, Option<FloatingIp>>;

    /// Releases a floating address reservation.
    fn release_ip<'a>(&'a self, ip: &'a FloatingIp) -> CloudFuture<'a, ()>;
}
