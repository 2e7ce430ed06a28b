//! Configuration types for rawecho

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

use crate::{RawEchoError, Result};

/// Port the listener binds to when none is configured
pub const DEFAULT_PORT: u16 = 5003;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Interface to listen on
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port to listen on (0 picks an ephemeral port)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Dump every recording to the log
    #[serde(default)]
    pub print_request: bool,
    /// `tracing` filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_filter() -> String {
    "rawecho=info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            print_request: false,
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RawEchoError::ConfigError(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| RawEchoError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        self.host.parse::<IpAddr>().map_err(|e| {
            RawEchoError::ConfigError(format!("Invalid listen host '{}': {e}", self.host))
        })?;

        if self.log_filter.trim().is_empty() {
            return Err(RawEchoError::ConfigError(
                "log_filter cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Address the listener binds to
    ///
    /// # Errors
    ///
    /// Returns error if `host` is not an IP address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip = self.host.parse::<IpAddr>().map_err(|e| {
            RawEchoError::ConfigError(format!("Invalid listen host '{}': {e}", self.host))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
