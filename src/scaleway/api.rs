//! Wire records for the Scaleway Instances HTTP API.

use serde::{Deserialize, Serialize};

use crate::cloud::{FloatingIp, Instance, InstanceState};

/// `state_detail` reported once the guest has finished booting.
const BOOTED_DETAIL: &str = "booted";

#[derive(Serialize)]
pub(super) struct CreateServerRequest {
    pub(super) name: String,
    pub(super) commercial_type: String,
    pub(super) image: String,
    pub(super) project: String,
    pub(super) routed_ip_enabled: bool,
    pub(super) dynamic_ip_required: bool,
    pub(super) tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) organization: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct ServerEnvelope {
    pub(super) server: ServerRecord,
}

#[derive(Deserialize)]
pub(super) struct ServerList {
    pub(super) servers: Vec<ServerRecord>,
}

#[derive(Clone, Debug, Deserialize)]
pub(super) struct ServerRecord {
    pub(super) id: String,
    #[serde(default)]
    pub(super) name: String,
    pub(super) state: String,
    #[serde(default)]
    pub(super) state_detail: String,
    #[serde(default)]
    pub(super) allowed_actions: Vec<String>,
    #[serde(default)]
    pub(super) public_ip: Option<AddressRecord>,
    #[serde(default)]
    pub(super) public_ips: Vec<AddressRecord>,
    #[serde(default)]
    pub(super) private_ip: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub(super) struct AddressRecord {
    pub(super) address: String,
}

#[derive(Deserialize)]
pub(super) struct IpList {
    pub(super) ips: Vec<FlexibleIpRecord>,
}

#[derive(Deserialize)]
pub(super) struct FlexibleIpRecord {
    pub(super) id: String,
    pub(super) address: String,
    #[serde(default)]
    pub(super) server: Option<ServerRef>,
}

#[derive(Deserialize)]
pub(super) struct ServerRef {
    pub(super) id: String,
}

impl ServerRecord {
    fn public_address(&self) -> Option<&str> {
        self.public_ip
            .as_ref()
            .or_else(|| self.public_ips.first())
            .map(|ip| ip.address.as_str())
    }

    pub(super) fn owns_address(&self, ip: &str) -> bool {
        self.private_ip.as_deref() == Some(ip)
            || self.public_ip.iter().chain(&self.public_ips).any(|record| record.address == ip)
    }

    pub(super) fn into_instance(self) -> Instance {
        let state = parse_state(&self.state);
        let system_ok = state == InstanceState::Running
            && (self.state_detail.is_empty() || self.state_detail == BOOTED_DETAIL);
        Instance {
            public_ip: self.public_address().map(str::to_owned),
            private_ip: self.private_ip,
            id: self.id,
            name: self.name,
            state,
            system_ok,
        }
    }
}

impl FlexibleIpRecord {
    pub(super) fn attached_to(&self, server_id: &str) -> bool {
        self.server.as_ref().is_some_and(|server| server.id == server_id)
    }

    pub(super) fn into_floating(self) -> FloatingIp {
        FloatingIp {
            id: self.id,
            address: self.address,
        }
    }
}

/// Maps a Scaleway server state onto the lifecycle model.
///
/// Deleted servers disappear from the API rather than reporting a state, so
/// nothing maps to `Terminated` here.
pub(super) fn parse_state(state: &str) -> InstanceState {
    match state {
        "running" => InstanceState::Running,
        "stopping" => InstanceState::Stopping,
        "stopped" | "stopped in place" => InstanceState::Stopped,
        _ => InstanceState::Pending,
    }
}
