//! Core library for the Ruslan cluster test driver.
//!
//! The crate runs shell commands on cluster nodes over cached SSH sessions,
//! retrying transient failures under a bounded [`RetryPolicy`], and manages
//! the lifecycle of the cloud instances those nodes live on
//! ([`InstanceManager`], backed by [`ScalewayCloud`]). A thin
//! [`ServiceController`] maps cluster service actions onto remote commands.

pub mod cloud;
pub mod config;
mod deadline;
pub mod logging;
pub mod remote;
pub mod retry;
pub mod scaleway;
pub mod service;
pub mod test_support;

pub use cloud::{BatchOutcome, CloudApi, CloudError, Instance, InstanceManager, InstanceState};
pub use config::{ConfigError, ScalewayConfig};
pub use remote::{
    CommandResult, Connector, Credentials, RemoteError, RemoteErrorKind, SessionCache, SshConfig,
    Ssh2Connector,
};
pub use retry::{RetryConfig, RetryError, RetryOrchestrator, RetryPolicy};
pub use scaleway::{ScalewayCloud, ScalewayCloudError};
pub use service::{NodeRole, ServiceAction, ServiceController, ServiceError, Verb};
