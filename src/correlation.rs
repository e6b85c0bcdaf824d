//! Correlation IDs: per-request tokens that join log lines and traces.
//!
//! An inbound `X-Correlation-ID` is trusted and kept verbatim. Otherwise the
//! ID is generated as `{service}-{yyyyMMddHHmmss}-{8 hex chars}`, e.g.
//! `customer-20240611093015-9f86d081`.
//!
//! While a request is being handled its ID is also available through
//! [`current`], which is how the JSON log formatter picks it up.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderName, HeaderValue};
use uuid::Uuid;

/// Correlation header name (inbound and outbound).
pub static X_CORRELATION_ID: HeaderName = HeaderName::from_static("x-correlation-id");

/// Timestamp used when the host clock cannot be read.
pub const FALLBACK_TIMESTAMP: &str = "19700101000000";

tokio::task_local! {
    static CURRENT: CorrelationId;
}

/// Opaque per-request correlation token.
///
/// Cheap to clone; immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Resolve the ID for a request: the inbound value if non-empty, else a new one.
    pub fn resolve(inbound: Option<&str>, service: &str) -> Self {
        match inbound {
            Some(value) if !value.is_empty() => Self(Arc::from(value)),
            _ => Self::generate(service),
        }
    }

    /// Resolve from request headers. Non-UTF-8 values count as absent.
    pub fn from_headers(headers: &HeaderMap, service: &str) -> Self {
        let inbound = headers
            .get(&X_CORRELATION_ID)
            .and_then(|v| v.to_str().ok());
        Self::resolve(inbound, service)
    }

    /// Generate a new ID using the host clock.
    pub fn generate(service: &str) -> Self {
        Self::generate_at(service, SystemTime::now())
    }

    /// Generate a new ID for the given instant.
    pub fn generate_at(service: &str, now: SystemTime) -> Self {
        let timestamp = format_timestamp(now);
        let random = Uuid::new_v4().simple().to_string();
        Self(Arc::from(format!("{}-{}-{}", service, timestamp, &random[..8])))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Header value form, if the ID is a legal header value.
    pub fn header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.0).ok()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// `yyyyMMddHHmmss` in UTC, or [`FALLBACK_TIMESTAMP`] if the clock is unusable.
fn format_timestamp(now: SystemTime) -> String {
    now.duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| i64::try_from(d.as_secs()).ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|t| t.format("%Y%m%d%H%M%S").to_string())
        .unwrap_or_else(|| FALLBACK_TIMESTAMP.to_string())
}

/// Run `fut` with `id` as the current correlation ID.
pub async fn scope<F: Future>(id: CorrelationId, fut: F) -> F::Output {
    CURRENT.scope(id, fut).await
}

/// Correlation ID of the request being handled on this task, if any.
pub fn current() -> Option<CorrelationId> {
    CURRENT.try_with(Clone::clone).ok()
}
