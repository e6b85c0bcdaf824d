//! Logging configuration.

use super::ConfigError;

/// Default filter when neither `LOG_LEVEL` nor `RUST_LOG` is set.
pub const DEFAULT_FILTER: &str = "http_observer=info";

/// Logging configuration loaded from environment.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Log level filter (from LOG_LEVEL or RUST_LOG).
    pub filter: String,
    /// Service name stamped on every log line.
    pub service_name: String,
}

impl LoggingConfig {
    /// Load configuration from environment variables.
    ///
    /// Priority: LOG_LEVEL > RUST_LOG > default
    ///
    /// LOG_LEVEL accepts simple values: trace, debug, info, warn, error
    /// RUST_LOG accepts full tracing filter syntax: http_observer=debug,hyper=warn
    pub fn from_env(service_name: &str) -> Result<Self, ConfigError> {
        let filter = resolve_log_filter(
            std::env::var("LOG_LEVEL").ok().as_deref(),
            std::env::var("RUST_LOG").ok().as_deref(),
        );
        Ok(Self {
            filter,
            service_name: service_name.to_string(),
        })
    }
}

/// Pick the filter directive. Invalid `LOG_LEVEL` values fall through to `RUST_LOG`.
fn resolve_log_filter(log_level: Option<&str>, rust_log: Option<&str>) -> String {
    if let Some(level) = log_level {
        let level = level.to_lowercase();
        match level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {
                return format!("http_observer={}", level);
            }
            _ => {
                // Logging is not up yet.
                eprintln!(
                    "Warning: Invalid LOG_LEVEL '{}', expected: trace, debug, info, warn, error",
                    level
                );
            }
        }
    }

    match rust_log {
        Some(filter) if !filter.is_empty() => filter.to_string(),
        _ => DEFAULT_FILTER.to_string(),
    }
}
