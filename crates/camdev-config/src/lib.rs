//! Configuration loading for the camdev camera driver.
//!
//! Defaults, then a TOML file, then `CAMDEV_` environment variables, merged
//! with figment and translated into `camdev_core::DriverConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use camdev_core::{DriverConfig, RcpSettings, TlsMode, VapixSettings};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration. Durations are whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Total time spent retrying a credential lookup.
    #[serde(default = "default_credentials_retry_time")]
    pub credentials_retry_time: u64,

    /// Wait between credential lookup attempts.
    #[serde(default = "default_credentials_retry_wait")]
    pub credentials_retry_wait: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Accept invalid camera certificates. Cameras usually ship self-signed.
    pub insecure: Option<bool>,

    /// Path to a CA certificate for HTTPS cameras.
    pub ca_cert: Option<PathBuf>,

    #[serde(default)]
    pub bosch: BoschSection,

    #[serde(default)]
    pub axis: AxisSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials_retry_time: default_credentials_retry_time(),
            credentials_retry_wait: default_credentials_retry_wait(),
            request_timeout: default_request_timeout(),
            event_channel_capacity: default_event_channel_capacity(),
            insecure: None,
            ca_cert: None,
            bosch: BoschSection::default(),
            axis: AxisSection::default(),
        }
    }
}

/// `[bosch]`: RCP polling.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BoschSection {
    #[serde(default = "default_interval")]
    pub poll_interval: u64,

    #[serde(default = "default_error_budget")]
    pub error_budget: u32,
}

impl Default for BoschSection {
    fn default() -> Self {
        Self {
            poll_interval: default_interval(),
            error_budget: default_error_budget(),
        }
    }
}

/// `[axis]`: VAPIX stream retries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AxisSection {
    #[serde(default = "default_interval")]
    pub retry_delay: u64,

    #[serde(default = "default_error_budget")]
    pub error_budget: u32,
}

impl Default for AxisSection {
    fn default() -> Self {
        Self {
            retry_delay: default_interval(),
            error_budget: default_error_budget(),
        }
    }
}

fn default_credentials_retry_time() -> u64 {
    30
}
fn default_credentials_retry_wait() -> u64 {
    1
}
fn default_request_timeout() -> u64 {
    30
}
fn default_event_channel_capacity() -> usize {
    256
}
fn default_interval() -> u64 {
    5
}
fn default_error_budget() -> u32 {
    60
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "camdev", "camdev").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("camdev");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the Config from the platform config file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the Config from `path` + environment. A missing file is not an
/// error; defaults and environment still apply.
///
/// Environment keys use `__` for nesting: `CAMDEV_BOSCH__POLL_INTERVAL=2`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CAMDEV_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load and translate in one step.
pub fn load_driver_config(path: Option<&Path>) -> Result<DriverConfig, ConfigError> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    config.to_driver_config()
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Validate and convert to the driver's runtime configuration.
    pub fn to_driver_config(&self) -> Result<DriverConfig, ConfigError> {
        positive("request_timeout", self.request_timeout)?;
        positive("credentials_retry_wait", self.credentials_retry_wait)?;
        positive("bosch.poll_interval", self.bosch.poll_interval)?;
        positive("bosch.error_budget", u64::from(self.bosch.error_budget))?;
        positive("axis.error_budget", u64::from(self.axis.error_budget))?;
        if self.event_channel_capacity == 0 {
            return Err(invalid("event_channel_capacity", "must be at least 1"));
        }
        if self.credentials_retry_wait > self.credentials_retry_time {
            return Err(invalid(
                "credentials_retry_wait",
                "must not exceed credentials_retry_time",
            ));
        }

        let tls = match (self.insecure, &self.ca_cert) {
            (Some(true), Some(_)) => {
                return Err(invalid("ca_cert", "cannot be combined with insecure = true"));
            }
            (_, Some(ca_path)) => TlsMode::CustomCa(ca_path.clone()),
            (Some(false), None) => TlsMode::System,
            (Some(true) | None, None) => TlsMode::DangerAcceptInvalid,
        };

        Ok(DriverConfig {
            credentials_retry_time: Duration::from_secs(self.credentials_retry_time),
            credentials_retry_wait: Duration::from_secs(self.credentials_retry_wait),
            request_timeout: Duration::from_secs(self.request_timeout),
            tls,
            bosch: RcpSettings {
                poll_interval: Duration::from_secs(self.bosch.poll_interval),
                error_budget: self.bosch.error_budget,
            },
            axis: VapixSettings {
                retry_delay: Duration::from_secs(self.axis.retry_delay),
                error_budget: self.axis.error_budget,
            },
            event_channel_capacity: self.event_channel_capacity,
        })
    }
}

fn positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(invalid(field, "must be greater than zero"));
    }
    Ok(())
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}
