//! Configuration loaded from environment variables.
//!
//! # Example
//!
//! ```rust,ignore
//! use http_observer::config::Config;
//!
//! let config = Config::from_env()?;
//! println!("Listen address: {}", config.server.listen_addr);
//! println!("Service: {}", config.interceptor.service_name);
//! ```

mod error;
mod interceptor;
mod logging;
mod parse;
mod server;
mod tracing;

pub use self::tracing::{TracingConfig, DEFAULT_OTLP_ENDPOINT};
pub use error::ConfigError;
pub use interceptor::InterceptorConfig;
pub use logging::{LoggingConfig, DEFAULT_FILTER};
pub use parse::{parse_duration, parse_size};
pub use server::ServerConfig;

use parse::env_or;

/// Complete application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub interceptor: InterceptorConfig,
    pub logging: LoggingConfig,
    pub tracing: TracingConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `SERVICE_NAME` (default `app`) is shared by correlation IDs, log lines
    /// and, unless `OTEL_SERVICE_NAME` is set, exported spans.
    pub fn from_env() -> Result<Self, ConfigError> {
        let service = env_or("SERVICE_NAME", "app");
        Ok(Self {
            server: ServerConfig::from_env()?,
            interceptor: InterceptorConfig::from_env(&service)?,
            logging: LoggingConfig::from_env(&service)?,
            tracing: TracingConfig::from_env(&service)?,
        })
    }

    /// Print configuration summary to log.
    pub fn log_summary(&self) {
        use ::tracing::info;

        info!("Configuration loaded:");
        info!("  Service: {}", self.interceptor.service_name);
        info!("  Listen: {}", self.server.listen_addr);

        match self.server.header_timeout {
            Some(t) => info!("  Header timeout: {}s", t.as_secs()),
            None => info!("  Header timeout: disabled"),
        }

        info!("  Body inspection limit: {} bytes", self.interceptor.max_inspect_bytes);
        if !self.interceptor.capture_request_body {
            info!("  Request bodies: omitted");
        }
        if !self.interceptor.capture_response_body {
            info!("  Response bodies: omitted");
        }

        if self.interceptor.redact {
            info!("  Redaction: card numbers");
        } else {
            info!("  Redaction: disabled");
        }

        if self.tracing.enabled {
            info!("  OTLP export: {}", self.tracing.endpoint);
        }
    }
}
