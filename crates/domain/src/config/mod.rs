mod devices;
mod observability;
mod server;
mod sessions;
mod streaming;

pub use devices::*;
pub use observability::*;
pub use server::*;
pub use sessions::*;
pub use streaming::*;

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Parse a TOML document.  Missing sections take their defaults.
    pub fn from_toml(raw: &str) -> crate::Result<Self> {
        toml::from_str(raw).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Load `path`; a file that does not exist yields [`Config::default`].
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }

        if self.devices.robots.is_empty() {
            errors.push(ConfigError::warning(
                "devices.robots",
                "no robots registered; every session request will be rejected",
            ));
        }

        let mut seen = HashSet::new();
        for (i, robot) in self.devices.robots.iter().enumerate() {
            let serial = normalize_serial(&robot.serial);
            if serial.is_empty() {
                errors.push(ConfigError::error(
                    format!("devices.robots[{i}].serial"),
                    "serial must not be empty",
                ));
            } else if !seen.insert(serial.clone()) {
                errors.push(ConfigError::error(
                    format!("devices.robots[{i}].serial"),
                    format!("duplicate serial \"{serial}\""),
                ));
            }
            if robot.address.trim().is_empty() {
                errors.push(ConfigError::error(
                    format!("devices.robots[{i}].address"),
                    "address must not be empty",
                ));
            }
            if self.devices.credential_for(robot).is_none() {
                errors.push(ConfigError::warning(
                    format!("devices.robots[{i}].credential"),
                    "no credential and no devices.global_credential; sessions to this robot will fail",
                ));
            }
        }

        if self.sessions.idle_timeout_secs == 0 {
            errors.push(ConfigError::error(
                "sessions.idle_timeout_secs",
                "idle timeout must be greater than 0",
            ));
        }
        if self.sessions.tick_ms == 0 {
            errors.push(ConfigError::error("sessions.tick_ms", "tick must be greater than 0"));
        }
        if self.sessions.gate_timeout_secs == 0 {
            errors.push(ConfigError::error(
                "sessions.gate_timeout_secs",
                "gate timeout must be greater than 0",
            ));
        }

        if self.streaming.pipe_capacity == 0 {
            errors.push(ConfigError::error(
                "streaming.pipe_capacity",
                "pipe capacity must be greater than 0",
            ));
        }
        if self.streaming.partial_buffer == 0 {
            errors.push(ConfigError::error(
                "streaming.partial_buffer",
                "partial buffer must be greater than 0",
            ));
        }
        if self.streaming.chunk_bytes == 0 {
            errors.push(ConfigError::error(
                "streaming.chunk_bytes",
                "chunk size must be greater than 0",
            ));
        }
        let eos = &self.streaming.end_of_speech;
        if eos.enabled && eos.silence_chunks == 0 {
            errors.push(ConfigError::error(
                "streaming.end_of_speech.silence_chunks",
                "silence run must be at least one chunk",
            ));
        }
        if eos.enabled && (eos.rms_threshold.is_nan() || eos.rms_threshold <= 0.0) {
            errors.push(ConfigError::error(
                "streaming.end_of_speech.rms_threshold",
                "threshold must be greater than 0",
            ));
        }

        match self.recognizer.url.as_deref() {
            None => errors.push(ConfigError::warning(
                "recognizer.url",
                "no recognizer configured; POST /v1/stream is disabled",
            )),
            Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
                errors.push(ConfigError::error(
                    "recognizer.url",
                    "url must start with http:// or https://",
                ));
            }
            Some(_) => {}
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError::error(
                "observability.sample_rate",
                "sample rate must be within 0.0..=1.0",
            ));
        }

        errors
    }
}
