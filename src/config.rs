//! Runtime tunables loaded via `ortho-config`.
//!
//! These settings never reach the provider; they control how the driver talks
//! to it (endpoint, timeouts, retry and polling cadence) and where the bundled
//! binary keeps its machine records.

use std::ffi::OsString;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::driver::ReadinessPolicy;
use crate::provider::{ClientSettings, RetryPolicy};

/// Public Vultr v2 API endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://api.vultr.com/v2";

/// Default directory for machine records.
pub const DEFAULT_STORE_PATH: &str = "~/.vultr-machine";

/// Driver tunables merged from defaults, configuration files and
/// `VULTR_MACHINE_*` environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "VULTR_MACHINE",
    discovery(
        app_name = "vultr-machine",
        env_var = "VULTR_MACHINE_CONFIG_PATH",
        config_file_name = "vultr-machine.toml",
        dotfile_name = ".vultr-machine.toml",
        project_file_name = "vultr-machine.toml"
    )
)]
pub struct RuntimeConfig {
    /// Base URL of the provider API.
    #[ortho_config(default = DEFAULT_API_BASE_URL.to_owned())]
    pub api_base_url: String,
    /// Per-request HTTP timeout in seconds.
    #[ortho_config(default = 30)]
    pub http_timeout_secs: u64,
    /// Delay between readiness polls in seconds.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Maximum number of readiness polls before giving up.
    #[ortho_config(default = 60)]
    pub poll_attempts: u32,
    /// Attempts per idempotent request when the provider fails transiently.
    #[ortho_config(default = 3)]
    pub retry_attempts: u32,
    /// Initial backoff between retries in milliseconds; doubles per retry.
    #[ortho_config(default = 500)]
    pub retry_backoff_millis: u64,
    /// Directory holding machine records and generated SSH keys.
    #[ortho_config(default = DEFAULT_STORE_PATH.to_owned())]
    pub store_path: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to vultr-machine.toml",
            self.description, self.env_var, self.toml_key
        ))
    }

    fn zero(&self) -> ConfigError {
        ConfigError::Invalid(format!(
            "{} must be greater than zero: check {} or {} in vultr-machine.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

const API_BASE_URL: FieldMetadata =
    FieldMetadata::new("provider API base URL", "VULTR_MACHINE_API_BASE_URL", "api_base_url");
const STORE_PATH: FieldMetadata =
    FieldMetadata::new("machine store path", "VULTR_MACHINE_STORE_PATH", "store_path");
const HTTP_TIMEOUT: FieldMetadata = FieldMetadata::new(
    "HTTP timeout",
    "VULTR_MACHINE_HTTP_TIMEOUT_SECS",
    "http_timeout_secs",
);
const POLL_INTERVAL: FieldMetadata = FieldMetadata::new(
    "poll interval",
    "VULTR_MACHINE_POLL_INTERVAL_SECS",
    "poll_interval_secs",
);
const POLL_ATTEMPTS: FieldMetadata = FieldMetadata::new(
    "poll attempt count",
    "VULTR_MACHINE_POLL_ATTEMPTS",
    "poll_attempts",
);
const RETRY_ATTEMPTS: FieldMetadata = FieldMetadata::new(
    "retry attempt count",
    "VULTR_MACHINE_RETRY_ATTEMPTS",
    "retry_attempts",
);

impl RuntimeConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("vultr-machine")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and file key that control the offending field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for blank strings and
    /// [`ConfigError::Invalid`] for zero-valued counters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(API_BASE_URL.missing());
        }
        if self.store_path.trim().is_empty() {
            return Err(STORE_PATH.missing());
        }
        if self.http_timeout_secs == 0 {
            return Err(HTTP_TIMEOUT.zero());
        }
        if self.poll_interval_secs == 0 {
            return Err(POLL_INTERVAL.zero());
        }
        if self.poll_attempts == 0 {
            return Err(POLL_ATTEMPTS.zero());
        }
        if self.retry_attempts == 0 {
            return Err(RETRY_ATTEMPTS.zero());
        }
        Ok(())
    }

    /// HTTP client settings for [`crate::provider::VultrClient`].
    #[must_use]
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            base_url: self.api_base_url.trim_end_matches('/').to_owned(),
            timeout: Duration::from_secs(self.http_timeout_secs),
            retry: RetryPolicy {
                attempts: self.retry_attempts,
                initial_backoff: Duration::from_millis(self.retry_backoff_millis),
            },
        }
    }

    /// Readiness poll bounds for [`crate::driver::Driver`].
    #[must_use]
    pub const fn readiness_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_attempts: self.poll_attempts,
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
