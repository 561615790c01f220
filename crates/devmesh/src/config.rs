use crate::device::DeviceOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Highest mesh domain id accepted
pub const MAX_DOMAIN: u32 = 232;

/// Router endpoint used when nothing else is configured
pub const DEFAULT_ENDPOINT: &str = "tcp/127.0.0.1:7447";

/// Environment variable overriding the configured endpoint
pub const ENDPOINT_ENV: &str = "DEVMESH_ZENOH_ENDPOINT";

fn default_enumeration_timeout_ms() -> u64 {
    30_000
}

fn default_event_capacity() -> usize {
    100
}

/// Root configuration of a mesh directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Mesh domain (0-232)
    #[serde(default)]
    pub domain: u32,
    /// Zenoh router endpoint
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bound on a single device enumeration
    #[serde(default = "default_enumeration_timeout_ms")]
    pub enumeration_timeout_ms: u64,
    /// Capacity of event broadcast channels
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            domain: 0,
            endpoint: None,
            enumeration_timeout_ms: default_enumeration_timeout_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl MeshConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain > MAX_DOMAIN {
            return Err(ConfigError::Invalid(format!(
                "domain {} out of range [0, {}]",
                self.domain, MAX_DOMAIN
            )));
        }
        if self.enumeration_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "enumeration_timeout_ms must be positive".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the router endpoint: explicit > environment > config > default
    pub fn resolve_endpoint(&self, explicit: Option<&str>) -> String {
        let env_endpoint = std::env::var(ENDPOINT_ENV).ok();
        explicit
            .or(env_endpoint.as_deref())
            .or(self.endpoint.as_deref())
            .unwrap_or(DEFAULT_ENDPOINT)
            .to_string()
    }

    /// Prefix prepended to mesh key expressions for this domain
    pub fn key_prefix(&self) -> Option<String> {
        (self.domain != 0).then(|| format!("domain/{}", self.domain))
    }

    pub fn device_options(&self) -> DeviceOptions {
        DeviceOptions {
            enumeration_timeout: Duration::from_millis(self.enumeration_timeout_ms),
            event_capacity: self.event_capacity,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
