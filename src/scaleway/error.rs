//! Error types for the Scaleway adapter.

use scaleway_rs::ScalewayError;
use thiserror::Error;

use crate::cloud::CloudError;
use crate::config::ConfigError;

/// Errors raised by the Scaleway adapter.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScalewayCloudError {
    /// Raised when the high-level configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the requested image label cannot be resolved.
    #[error("image '{label}' (arch {arch}) not found in zone {zone}")]
    ImageNotFound {
        /// Image label from configuration.
        label: String,
        /// Architecture from configuration.
        arch: String,
        /// Zone used for the lookup.
        zone: String,
    },
    /// Raised when the server type is not available in the selected zone.
    #[error("instance type '{instance_type}' not available in zone {zone}")]
    InstanceTypeUnavailable {
        /// Requested commercial type.
        instance_type: String,
        /// Target zone.
        zone: String,
    },
    /// Raised when a freshly created instance refuses to power on.
    #[error("instance {instance_id} in state {state} cannot be powered on")]
    PowerOnNotAllowed {
        /// Provider instance identifier.
        instance_id: String,
        /// Current state reported by the provider.
        state: String,
    },
    /// Raised when the HTTP API answers with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Response status code.
        status: u16,
        /// Response body.
        message: String,
    },
    /// Wrapper for transport and SDK level failures.
    #[error("provider error: {message}")]
    Provider {
        /// Message returned by the provider SDK or HTTP client.
        message: String,
    },
}

impl ScalewayCloudError {
    /// Converts into the provider-neutral error for `operation`.
    #[must_use]
    pub fn into_cloud(self, operation: &str) -> CloudError {
        CloudError::provider(operation, self)
    }
}

impl From<ScalewayError> for ScalewayCloudError {
    fn from(value: ScalewayError) -> Self {
        Self::Provider {
            message: value.to_string(),
        }
    }
}

impl From<reqwest::Error> for ScalewayCloudError {
    fn from(value: reqwest::Error) -> Self {
        Self::Provider {
            message: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for ScalewayCloudError {
    fn from(value: serde_json::Error) -> Self {
        Self::Provider {
            message: format!("unexpected response body: {value}"),
        }
    }
}

impl From<ConfigError> for ScalewayCloudError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}
