//! Interceptor configuration: what gets captured and redacted.

use super::parse::{env_bool, env_size};
use super::ConfigError;
use crate::capture::{BodyCapture, Inspection, DEFAULT_MAX_INSPECT_BYTES};
use crate::redact::Redactor;

/// Capture and redaction settings loaded from environment.
#[derive(Clone, Debug)]
pub struct InterceptorConfig {
    /// Prefix of generated correlation IDs.
    pub service_name: String,
    /// Bytes of each body included in snapshots (`CAPTURE_MAX_BODY`).
    pub max_inspect_bytes: usize,
    /// Include request bodies in snapshots (`CAPTURE_REQUEST_BODY`).
    pub capture_request_body: bool,
    /// Include response bodies in snapshots (`CAPTURE_RESPONSE_BODY`).
    pub capture_response_body: bool,
    /// Mask card numbers (`REDACT_ENABLED`).
    pub redact: bool,
}

impl InterceptorConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env(service_name: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            service_name: service_name.to_string(),
            max_inspect_bytes: env_size("CAPTURE_MAX_BODY", "64k")?,
            capture_request_body: env_bool("CAPTURE_REQUEST_BODY", true),
            capture_response_body: env_bool("CAPTURE_RESPONSE_BODY", true),
            redact: env_bool("REDACT_ENABLED", true),
        })
    }

    pub fn body_capture(&self) -> BodyCapture {
        BodyCapture::new(
            Inspection {
                enabled: self.capture_request_body,
                max_bytes: self.max_inspect_bytes,
            },
            Inspection {
                enabled: self.capture_response_body,
                max_bytes: self.max_inspect_bytes,
            },
        )
    }

    pub fn redactor(&self) -> Redactor {
        Redactor::from_enabled(self.redact)
    }
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            service_name: "app".to_string(),
            max_inspect_bytes: DEFAULT_MAX_INSPECT_BYTES,
            capture_request_body: true,
            capture_response_body: true,
            redact: true,
        }
    }
}
