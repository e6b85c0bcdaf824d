//! Span export configuration.

use std::time::Duration;

use super::parse::{env_bool, env_opt, env_or, env_parse};
use super::ConfigError;

/// Default OTLP gRPC endpoint.
pub const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";

/// OpenTelemetry export settings.
///
/// Only acted on when the crate is built with the `otel` feature; otherwise
/// spans stay in the in-memory recording backend.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Whether OTLP export is enabled (`OTEL_ENABLED`)
    pub enabled: bool,
    /// OTLP endpoint (e.g., "http://jaeger:4317")
    pub endpoint: String,
    pub service_name: String,
    pub service_version: String,
    /// Deployment environment (production, staging, etc.)
    pub environment: String,
    /// Sampling ratio (0.0 - 1.0, 1.0 = sample all)
    pub sampling_ratio: f64,
    pub export_timeout: Duration,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: DEFAULT_OTLP_ENDPOINT.into(),
            service_name: "app".into(),
            service_version: env!("CARGO_PKG_VERSION").into(),
            environment: "development".into(),
            sampling_ratio: 1.0,
            export_timeout: Duration::from_secs(10),
        }
    }
}

impl TracingConfig {
    /// Load configuration from environment variables.
    ///
    /// `OTEL_SERVICE_NAME` overrides `service_name`.
    pub fn from_env(service_name: &str) -> Result<Self, ConfigError> {
        let sampling_ratio: f64 = env_parse("OTEL_SAMPLING_RATIO", 1.0)?;
        if !(0.0..=1.0).contains(&sampling_ratio) {
            return Err(ConfigError::Invalid {
                key: "OTEL_SAMPLING_RATIO".into(),
                message: format!("{} is not between 0.0 and 1.0", sampling_ratio),
            });
        }

        Ok(Self {
            enabled: env_bool("OTEL_ENABLED", false),
            endpoint: env_or("OTEL_EXPORTER_OTLP_ENDPOINT", DEFAULT_OTLP_ENDPOINT),
            service_name: env_opt("OTEL_SERVICE_NAME").unwrap_or_else(|| service_name.to_string()),
            service_version: env_or("OTEL_SERVICE_VERSION", env!("CARGO_PKG_VERSION")),
            environment: env_or("OTEL_ENVIRONMENT", "development"),
            sampling_ratio,
            export_timeout: Duration::from_secs(env_parse("OTEL_EXPORT_TIMEOUT", 10u64)?),
        })
    }
}
