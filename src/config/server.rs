//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use super::parse::{env_duration, env_or};
use super::ConfigError;

/// Server configuration loaded from environment.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen address (default: 0.0.0.0:8080).
    pub listen_addr: SocketAddr,
    /// Time allowed to receive request headers (default: 30s, `off` disables).
    pub header_timeout: Option<Duration>,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let value = env_or("LISTEN_ADDR", "0.0.0.0:8080");
        let listen_addr: SocketAddr = value.parse().map_err(|e| ConfigError::Parse {
            key: "LISTEN_ADDR".into(),
            value: value.clone(),
            error: format!("{}", e),
        })?;

        Ok(Self {
            listen_addr,
            header_timeout: env_duration("HEADER_TIMEOUT", "30s")?,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            header_timeout: Some(Duration::from_secs(30)),
        }
    }
}
