//! Relay Configuration - endpoint, schedule and credential settings as TOML values
//!
//! Each struct implements `Default` with the values the plugin always shipped
//! with, so a missing config file changes nothing.

use super::defaults;
use crate::delivery::filter::{EventFilter, FLEET_CARRIER_EVENTS, IMPORTANT_EVENTS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for the relay.
///
/// Load with `RelayConfig::load()` which searches:
/// 1. `$EDSTS_CONFIG` env var
/// 2. `./edsts_relay.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Remote endpoint and request timeouts
    #[serde(default)]
    pub api: ApiConfig,

    /// Timer, polling and backoff intervals
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Initial credential values (the settings store owns them afterwards)
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Optional overrides of the tracked event sets
    #[serde(default)]
    pub filter: FilterConfig,
}

impl RelayConfig {
    /// Load configuration using the standard search order:
    /// 1. `$EDSTS_CONFIG` environment variable
    /// 2. `./edsts_relay.toml` in the current working directory
    /// 3. Built-in defaults
    ///
    /// Credential environment overrides are applied in every case.
    pub fn load() -> Self {
        let mut config = Self::discover();
        config.apply_env_overrides();
        config
    }

    fn discover() -> Self {
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded relay config from EDSTS_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from EDSTS_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "EDSTS_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(defaults::CONFIG_FILE_NAME);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded relay config from ./{}", defaults::CONFIG_FILE_NAME);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", defaults::CONFIG_FILE_NAME);
                }
            }
        }

        info!("No relay config file found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// `EDSTS_API_KEY` / `EDSTS_PERMISSIONS` win over file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(defaults::API_KEY_ENV_VAR) {
            if !key.trim().is_empty() {
                self.credentials.api_key = Some(key);
            }
        }
        if let Ok(perms) = std::env::var(defaults::PERMISSIONS_ENV_VAR) {
            self.credentials.permissions = Some(perms);
        }
    }

    /// Validate settings for internal consistency.
    ///
    /// Rules:
    /// - Base URL must be http(s)
    /// - Timeouts and intervals must be non-zero
    /// - The fleet-carrier set must be contained in the important set
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let base = self.api.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            errors.push(format!("api.base_url: must start with http:// or https:// (got {base:?})"));
        }

        for (name, value) in [
            ("api.verify_timeout_secs", self.api.verify_timeout_secs),
            ("api.submit_timeout_secs", self.api.submit_timeout_secs),
            ("schedule.verify_interval_secs", self.schedule.verify_interval_secs),
            ("schedule.poll_interval_secs", self.schedule.poll_interval_secs),
            ("schedule.shutdown_join_timeout_secs", self.schedule.shutdown_join_timeout_secs),
        ] {
            if value == 0 {
                errors.push(format!("{name}: must be greater than zero"));
            }
        }

        let important = self.filter.important_filter();
        let fleet_carrier = self.filter.fleet_carrier_filter();
        let mut missing: Vec<&str> = fleet_carrier
            .names()
            .filter(|name| !important.accepts(name))
            .collect();
        missing.sort_unstable();
        if !missing.is_empty() {
            errors.push(format!(
                "filter.fleet_carrier_events: not in important_events: {}",
                missing.join(", ")
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

/// EDStS endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub verify_timeout_secs: u64,
    pub submit_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::API_BASE_URL.to_string(),
            verify_timeout_secs: defaults::VERIFY_TIMEOUT_SECS,
            submit_timeout_secs: defaults::SUBMIT_TIMEOUT_SECS,
        }
    }
}

impl ApiConfig {
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    /// Page where a user obtains an API key.
    pub fn register_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            defaults::REGISTER_PATH
        )
    }
}

/// Timer, polling and backoff intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub verify_interval_secs: u64,
    pub verify_jitter_secs: u64,
    pub poll_interval_secs: u64,
    pub failure_backoff_secs: u64,
    pub shutdown_join_timeout_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            verify_interval_secs: defaults::VERIFY_INTERVAL_SECS,
            verify_jitter_secs: defaults::VERIFY_JITTER_SECS,
            poll_interval_secs: defaults::QUEUE_POLL_INTERVAL_SECS,
            failure_backoff_secs: defaults::FAILURE_BACKOFF_SECS,
            shutdown_join_timeout_secs: defaults::SHUTDOWN_JOIN_TIMEOUT_SECS,
        }
    }
}

/// Initial credential values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub api_key: Option<String>,
    /// Comma-separated permission tags
    pub permissions: Option<String>,
}

/// Event set overrides; `None` keeps the built-in set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub important_events: Option<Vec<String>>,
    pub fleet_carrier_events: Option<Vec<String>>,
}

impl FilterConfig {
    pub fn important_filter(&self) -> EventFilter {
        match &self.important_events {
            Some(names) => EventFilter::new(names.iter().cloned()),
            None => EventFilter::new(IMPORTANT_EVENTS.iter().copied()),
        }
    }

    pub fn fleet_carrier_filter(&self) -> EventFilter {
        match &self.fleet_carrier_events {
            Some(names) => EventFilter::new(names.iter().cloned()),
            None => EventFilter::new(FLEET_CARRIER_EVENTS.iter().copied()),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Config loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    #[error("failed to parse {}: {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {}", .0.join("; "))]
    Validation(Vec<String>),
}
