//! Cluster service control on remote nodes.
//!
//! A [`ServiceAction`] names a distribution, a verb, and a node role. The
//! controller maps it to one shell command through [`ServiceCatalog`] and runs
//! that command through the retry orchestrator.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::info;

use crate::remote::Connector;
use crate::retry::{RetryError, RetryOrchestrator, RetryPolicy};

/// Operation to perform on a service.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Verb {
    /// `systemctl start`.
    Start,
    /// `systemctl stop`.
    Stop,
    /// `systemctl restart`.
    Restart,
    /// `systemctl status`; the only verb whose output is returned.
    Status,
    /// Rotate the distribution's cluster certificates.
    RotateCredential,
}

impl Verb {
    const fn systemctl_verb(self) -> Option<&'static str> {
        match self {
            Self::Start => Some("start"),
            Self::Stop => Some("stop"),
            Self::Restart => Some("restart"),
            Self::Status => Some("status"),
            Self::RotateCredential => None,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.systemctl_verb().unwrap_or("rotate-credential"))
    }
}

impl FromStr for Verb {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            "status" => Ok(Self::Status),
            "rotate-credential" | "rotate" => Ok(Self::RotateCredential),
            other => Err(ServiceError::UnknownVerb {
                verb: other.to_owned(),
            }),
        }
    }
}

/// Role a node plays in the cluster.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NodeRole {
    /// Control-plane node.
    Server,
    /// Worker node.
    Agent,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str("server"),
            Self::Agent => f.write_str("agent"),
        }
    }
}

impl FromStr for NodeRole {
    type Err = ServiceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "server" => Ok(Self::Server),
            "agent" => Ok(Self::Agent),
            other => Err(ServiceError::UnknownRole {
                role: other.to_owned(),
            }),
        }
    }
}

/// A request to apply `verb` to `service` on a node with `role`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceAction {
    /// Distribution name, for example `k3s` or `rke2`.
    pub service: String,
    /// Operation to perform.
    pub verb: Verb,
    /// Role of the target node.
    pub role: NodeRole,
}

impl ServiceAction {
    /// Builds an action.
    #[must_use]
    pub fn new(service: impl Into<String>, verb: Verb, role: NodeRole) -> Self {
        Self {
            service: service.into(),
            verb,
            role,
        }
    }

    /// Status reports the trimmed remote output; every other verb reports
    /// nothing on success.
    fn shape_output(&self, stdout: &str) -> String {
        if self.verb == Verb::Status {
            return stdout.trim().to_owned();
        }
        String::new()
    }

    fn remote_failure(&self, source: RetryError) -> ServiceError {
        ServiceError::Remote {
            service: self.service.clone(),
            verb: self.verb,
            source,
        }
    }
}

/// Fixed lookup from `{service, role}` to systemd unit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceCatalog {
    units: Vec<(String, NodeRole, String)>,
}

impl Default for ServiceCatalog {
    fn default() -> Self {
        Self {
            units: vec![
                (String::from("k3s"), NodeRole::Server, String::from("k3s")),
                (String::from("k3s"), NodeRole::Agent, String::from("k3s-agent")),
                (String::from("rke2"), NodeRole::Server, String::from("rke2-server")),
                (String::from("rke2"), NodeRole::Agent, String::from("rke2-agent")),
            ],
        }
    }
}

impl ServiceCatalog {
    /// Returns the systemd unit for `service` on a node with `role`.
    #[must_use]
    pub fn unit(&self, service: &str, role: NodeRole) -> Option<&str> {
        self.units
            .iter()
            .find(|(name, unit_role, _)| name == service && *unit_role == role)
            .map(|(_, _, unit)| unit.as_str())
    }

    /// Renders the remote command for `action`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UnknownUnit`] when the catalog has no unit for
    /// the action's service and role.
    pub fn command_for(&self, action: &ServiceAction) -> Result<String, ServiceError> {
        let unit = self
            .unit(&action.service, action.role)
            .ok_or_else(|| ServiceError::UnknownUnit {
                service: action.service.clone(),
                role: action.role,
            })?;
        let command = match action.verb.systemctl_verb() {
            Some(verb) => format!("sudo systemctl {verb} {}", shell_escape::escape(unit.into())),
            None => format!(
                "sudo {} certificate rotate",
                shell_escape::escape(action.service.as_str().into())
            ),
        };
        Ok(command)
    }
}

/// Errors raised by [`ServiceController`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ServiceError {
    /// Raised when no unit is known for a service and role.
    #[error("no systemd unit known for service '{service}' on {role} nodes")]
    UnknownUnit {
        /// Requested distribution.
        service: String,
        /// Requested role.
        role: NodeRole,
    },
    /// Raised when parsing an unrecognised verb.
    #[error("unknown service verb '{verb}'")]
    UnknownVerb {
        /// Text that failed to parse.
        verb: String,
    },
    /// Raised when parsing an unrecognised node role.
    #[error("unknown node role '{role}'")]
    UnknownRole {
        /// Text that failed to parse.
        role: String,
    },
    /// Raised when the remote command fails after retries.
    #[error("{verb} {service} failed: {source}")]
    Remote {
        /// Distribution acted on.
        service: String,
        /// Verb that failed.
        verb: Verb,
        /// Underlying retry failure, which names the host.
        source: RetryError,
    },
}

/// Applies service actions to remote nodes.
pub struct ServiceController<C: Connector> {
    orchestrator: RetryOrchestrator<C>,
    catalog: ServiceCatalog,
}

impl<C: Connector> ServiceController<C> {
    /// Creates a controller using the default unit catalog.
    #[must_use]
    pub fn new(orchestrator: RetryOrchestrator<C>) -> Self {
        Self {
            orchestrator,
            catalog: ServiceCatalog::default(),
        }
    }

    /// Replaces the unit catalog.
    #[must_use]
    pub fn with_catalog(mut self, catalog: ServiceCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Applies `action` on `host` under `policy`.
    ///
    /// Returns the trimmed command output for [`Verb::Status`] and an empty
    /// string for every other verb.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UnknownUnit`] before contacting the host when
    /// the action cannot be mapped, and [`ServiceError::Remote`] when the
    /// command fails.
    pub async fn apply(
        &self,
        host: &str,
        action: &ServiceAction,
        policy: &RetryPolicy,
    ) -> Result<String, ServiceError> {
        let command = self.catalog.command_for(action)?;
        info!(host, service = %action.service, verb = %action.verb, "applying service action");
        let stdout = self
            .orchestrator
            .run_with_retry(host, &command, policy)
            .await
            .map_err(|source| action.remote_failure(source))?;
        Ok(action.shape_output(&stdout))
    }

    /// Applies `action` on every host concurrently.
    ///
    /// Results are returned in the order of `hosts`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UnknownUnit`] before contacting any host when
    /// the action cannot be mapped. Per-host failures are reported in the
    /// returned list.
    pub async fn apply_many<S: AsRef<str>>(
        &self,
        hosts: &[S],
        action: &ServiceAction,
        policy: &RetryPolicy,
    ) -> Result<Vec<(String, Result<String, ServiceError>)>, ServiceError> {
        let command = self.catalog.command_for(action)?;
        let results = self.orchestrator.run_on_hosts(hosts, &command, policy).await;
        Ok(results
            .into_iter()
            .map(|(host, result)| {
                let mapped = result
                    .map(|stdout| action.shape_output(&stdout))
                    .map_err(|source| action.remote_failure(source));
                (host, mapped)
            })
            .collect())
    }
}
