//! SSH connection settings and the credential value handed to connectors.
//!
//! Settings are loaded via `ortho-config`, which merges defaults,
//! configuration files, and environment variables. The resulting
//! [`Credentials`] value is passed explicitly into the session connector so
//! nothing reads ambient state at connect time.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::config::ConfigError;

/// Default remote login for freshly provisioned nodes.
pub const DEFAULT_SSH_USER: &str = "root";

/// Default private key used for every host.
pub const DEFAULT_IDENTITY_FILE: &str = "~/.ssh/id_ed25519";

/// SSH settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "RUSLAN_SSH",
    discovery(
        app_name = "ruslan",
        env_var = "RUSLAN_CONFIG_PATH",
        config_file_name = "ruslan.toml",
        dotfile_name = ".ruslan.toml",
        project_file_name = "ruslan.toml"
    )
)]
pub struct SshConfig {
    /// Remote user to authenticate as.
    #[ortho_config(default = DEFAULT_SSH_USER.to_owned())]
    pub user: String,
    /// Path to the private key. Supports tilde expansion.
    #[ortho_config(default = DEFAULT_IDENTITY_FILE.to_owned())]
    pub identity_file: String,
    /// TCP port of the SSH daemon.
    #[ortho_config(default = 22)]
    pub port: u16,
    /// Seconds allowed for the TCP dial before giving up.
    #[ortho_config(default = 10)]
    pub connect_timeout_secs: u64,
}

/// Authentication material shared by every session in a cache.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Credentials {
    /// Remote user to authenticate as.
    pub user: String,
    /// Expanded path to the private key.
    pub identity_file: Utf8PathBuf,
    /// TCP port of the SSH daemon.
    pub port: u16,
    /// Time allowed for the TCP dial.
    pub connect_timeout: Duration,
}

impl SshConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("ruslan")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Ensures required values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the environment variable
    /// and TOML key that supply the missing value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_value(&self.user, "user")?;
        Self::require_value(&self.identity_file, "identity_file")?;
        if self.port == 0 {
            return Err(Self::missing("port"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(Self::missing("connect_timeout_secs"));
        }
        Ok(())
    }

    /// Builds the explicit credential value for a session connector.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when validation fails.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        self.validate()?;
        Ok(Credentials {
            user: self.user.trim().to_owned(),
            identity_file: Utf8PathBuf::from(expand_tilde(self.identity_file.trim())),
            port: self.port,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        })
    }

    fn require_value(value: &str, field: &str) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(Self::missing(field));
        }
        Ok(())
    }

    fn missing(field: &str) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {field}: set RUSLAN_SSH_{} or add {field} to [ssh] in ruslan.toml",
            field.to_uppercase()
        ))
    }
}

/// Expands a leading `~/` prefix to the user's home directory.
///
/// When `HOME` is unset the input is returned unchanged.
///
/// # Examples
///
/// ```
/// # use ruslan::remote::expand_tilde;
/// assert_eq!(expand_tilde("/absolute/path"), "/absolute/path");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn ssh_config() -> SshConfig {
        SshConfig {
            user: String::from(" ubuntu "),
            identity_file: String::from("/keys/id_ed25519"),
            port: 2222,
            connect_timeout_secs: 7,
        }
    }

    #[rstest]
    fn credentials_trim_and_convert(ssh_config: SshConfig) {
        let credentials = ssh_config.credentials().expect("valid config");
        assert_eq!(credentials.user, "ubuntu");
        assert_eq!(credentials.identity_file, Utf8PathBuf::from("/keys/id_ed25519"));
        assert_eq!(credentials.port, 2222);
        assert_eq!(credentials.connect_timeout, Duration::from_secs(7));
    }

    #[rstest]
    #[case("user")]
    #[case("identity_file")]
    #[case("port")]
    fn validation_names_env_var_and_key(ssh_config: SshConfig, #[case] field: &str) {
        let mut cfg = ssh_config;
        match field {
            "user" => cfg.user = String::from("  "),
            "identity_file" => cfg.identity_file = String::new(),
            _ => cfg.port = 0,
        }
        let message = cfg.validate().expect_err("should fail").to_string();
        assert!(
            message.contains(&format!("RUSLAN_SSH_{}", field.to_uppercase())),
            "message: {message}"
        );
        assert!(message.contains("ruslan.toml"), "message: {message}");
    }

    #[rstest]
    fn expand_tilde_leaves_relative_paths() {
        assert_eq!(expand_tilde("keys/id"), "keys/id");
    }
}
