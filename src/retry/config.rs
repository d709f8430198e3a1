//! Retry settings loaded via `ortho-config`.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::config::{CONFIG_FILE_NAME, ConfigError};

use super::RetryPolicy;

/// Retry tunables; message lists keep their built-in defaults.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq)]
#[ortho_config(
    prefix = "RUSLAN_RETRY",
    discovery(
        app_name = "ruslan",
        env_var = "RUSLAN_CONFIG_PATH",
        config_file_name = "ruslan.toml",
        dotfile_name = ".ruslan.toml",
        project_file_name = "ruslan.toml"
    )
)]
pub struct RetryConfig {
    /// Maximum executor invocations per command.
    #[ortho_config(default = 3)]
    pub attempts: u32,
    /// Sleep before the first retry, in milliseconds.
    #[ortho_config(default = 5_000)]
    pub base_delay_ms: u64,
    /// Growth factor applied to the sleep after every retry.
    #[ortho_config(default = 2.0)]
    pub delay_multiplier: f64,
    /// Comma-separated exit codes treated as transient.
    #[ortho_config(default = "1,255".to_owned())]
    pub retryable_exit_codes: String,
    /// Time allowed for one attempt, in seconds.
    #[ortho_config(default = 120)]
    pub attempt_timeout_secs: u64,
}

impl RetryConfig {
    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("ruslan")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Builds a validated [`RetryPolicy`] from these settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for an unparsable exit code list or a
    /// policy that fails validation.
    pub fn to_policy(&self) -> Result<RetryPolicy, ConfigError> {
        let codes = parse_exit_codes(&self.retryable_exit_codes)?;
        let policy = RetryPolicy::default()
            .with_attempts(self.attempts)
            .with_base_delay(Duration::from_millis(self.base_delay_ms))
            .with_delay_multiplier(self.delay_multiplier)
            .with_attempt_timeout(Duration::from_secs(self.attempt_timeout_secs))
            .with_retryable_exit_codes(codes);
        policy.validate().map_err(|err| {
            ConfigError::Parse(format!(
                "{err}: check RUSLAN_RETRY_* or [retry] in {CONFIG_FILE_NAME}"
            ))
        })?;
        Ok(policy)
    }
}

fn parse_exit_codes(raw: &str) -> Result<Vec<i32>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(|code| {
            code.parse::<i32>().map_err(|err| {
                ConfigError::Parse(format!(
                    "invalid exit code '{code}' in RUSLAN_RETRY_RETRYABLE_EXIT_CODES: {err}"
                ))
            })
        })
        .collect()
}
