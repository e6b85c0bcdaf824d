//! Request context passed explicitly through the interception pipeline.
//!
//! The context is where a request's correlation ID, the currently active
//! span and the remote parent span live. Nothing in the pipeline looks these
//! up from ambient state; they travel with the request.

use std::any::Any;
use std::collections::HashMap;
use std::net::IpAddr;
use std::ops::{Deref, DerefMut};
use std::time::Instant;

use http::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

use crate::correlation::CorrelationId;
use crate::trace_context::TraceContext;

/// HTTP version as static string (no allocation).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HttpVersion(&'static str);

impl HttpVersion {
    pub const HTTP_10: Self = Self("HTTP/1.0");
    pub const HTTP_11: Self = Self("HTTP/1.1");
    pub const HTTP_20: Self = Self("HTTP/2.0");

    #[inline]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }

    #[inline]
    pub fn from_http(version: http::Version) -> Self {
        match version {
            http::Version::HTTP_10 => Self::HTTP_10,
            http::Version::HTTP_2 => Self::HTTP_20,
            _ => Self::HTTP_11,
        }
    }
}

impl std::fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

impl Default for HttpVersion {
    fn default() -> Self {
        Self::HTTP_11
    }
}

/// Request-scoped state shared by the interceptor and the handlers it wraps.
pub struct Context {
    /// Client IP address.
    pub client_ip: IpAddr,

    /// Request start time.
    pub started_at: Instant,

    pub http_version: HttpVersion,

    correlation_id: Option<CorrelationId>,

    /// Span started locally that is still open (set by an outer interceptor).
    active_span: Option<TraceContext>,

    /// Span of the remote caller, from an inbound `traceparent`.
    remote_parent: Option<TraceContext>,

    /// Headers to put on the response, whatever the outcome.
    response_headers: HashMap<String, String>,

    values: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl Context {
    /// Create a context with no correlation ID and no spans.
    #[inline]
    pub fn new(client_ip: IpAddr) -> Self {
        Self {
            client_ip,
            started_at: Instant::now(),
            http_version: HttpVersion::HTTP_11,
            correlation_id: None,
            active_span: None,
            remote_parent: None,
            response_headers: HashMap::with_capacity(2),
            values: HashMap::new(),
        }
    }

    #[inline]
    pub fn builder(client_ip: IpAddr) -> ContextBuilder {
        ContextBuilder::new(client_ip)
    }

    /// Set a custom value.
    #[inline]
    pub fn set<T: Send + Sync + 'static>(&mut self, key: &str, value: T) {
        self.values.insert(key.to_string(), Box::new(value));
    }

    /// Get a custom value.
    #[inline]
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref())
    }

    #[inline]
    pub fn remove<T: 'static>(&mut self, key: &str) -> Option<T> {
        self.values
            .remove(key)
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Attach a correlation ID unless one is already set.
    ///
    /// Returns the ID the request ends up with. The first assignment wins, so
    /// nested interceptors all see the outermost one's ID.
    pub fn assign_correlation_id(&mut self, id: CorrelationId) -> CorrelationId {
        self.correlation_id.get_or_insert(id).clone()
    }

    #[inline]
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    #[inline]
    pub fn active_span(&self) -> Option<&TraceContext> {
        self.active_span.as_ref()
    }

    #[inline]
    pub fn remote_parent(&self) -> Option<&TraceContext> {
        self.remote_parent.as_ref()
    }

    #[inline]
    pub fn set_remote_parent(&mut self, parent: Option<TraceContext>) {
        self.remote_parent = parent;
    }

    /// Make `span` the active span until the returned scope is dropped.
    ///
    /// `None` leaves the current active span in place.
    pub fn enter_span(&mut self, span: Option<TraceContext>) -> ActiveSpanScope<'_> {
        let previous = match span {
            Some(span) => Some(self.active_span.replace(span)),
            None => None,
        };
        ActiveSpanScope {
            ctx: self,
            previous,
        }
    }

    /// Add a response header.
    #[inline]
    pub fn set_response_header(&mut self, name: impl Into<String>, value: impl ToString) {
        self.response_headers.insert(name.into(), value.to_string());
    }

    #[inline]
    pub fn response_headers(&self) -> &HashMap<String, String> {
        &self.response_headers
    }

    /// Copy the pending response headers into `headers`, replacing same-named ones.
    pub fn apply_response_headers(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.response_headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %name, "dropping invalid response header"),
            }
        }
    }

    /// Get elapsed time since request started.
    #[inline]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    #[inline]
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}

/// Guard returned by [`Context::enter_span`].
///
/// Derefs to the context; restores the previous active span on drop.
pub struct ActiveSpanScope<'a> {
    ctx: &'a mut Context,
    /// `Some(prev)` when a span was entered, `None` when nothing changed.
    previous: Option<Option<TraceContext>>,
}

impl Deref for ActiveSpanScope<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx
    }
}

impl DerefMut for ActiveSpanScope<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx
    }
}

impl Drop for ActiveSpanScope<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.ctx.active_span = previous;
        }
    }
}

/// Builder for creating Context with more control.
pub struct ContextBuilder {
    client_ip: IpAddr,
    http_version: HttpVersion,
    correlation_id: Option<CorrelationId>,
    active_span: Option<TraceContext>,
    remote_parent: Option<TraceContext>,
}

impl ContextBuilder {
    #[inline]
    pub fn new(client_ip: IpAddr) -> Self {
        Self {
            client_ip,
            http_version: HttpVersion::HTTP_11,
            correlation_id: None,
            active_span: None,
            remote_parent: None,
        }
    }

    #[inline]
    pub fn http_version(mut self, version: HttpVersion) -> Self {
        self.http_version = version;
        self
    }

    #[inline]
    pub fn correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Start with an already-open local span.
    #[inline]
    pub fn active_span(mut self, span: TraceContext) -> Self {
        self.active_span = Some(span);
        self
    }

    #[inline]
    pub fn remote_parent(mut self, parent: Option<TraceContext>) -> Self {
        self.remote_parent = parent;
        self
    }

    pub fn build(self) -> Context {
        let mut ctx = Context::new(self.client_ip);
        ctx.http_version = self.http_version;
        ctx.correlation_id = self.correlation_id;
        ctx.active_span = self.active_span;
        ctx.remote_parent = self.remote_parent;
        ctx
    }
}
