//! Span bookkeeping for intercepted requests.
//!
//! [`SpanRecorder::begin`] either reuses the span already active in the
//! request [`Context`] or starts a new one. Ownership decides who closes it:
//!
//! | Handle     | Created here | Closed by `end`        |
//! |------------|--------------|------------------------|
//! | `Owned`    | yes          | yes, exactly once      |
//! | `Reused`   | no           | never                  |
//! | `Detached` | start failed | nothing to close       |
//!
//! Backend failures are logged at `warn` and never returned: a broken tracing
//! backend must not change a request's outcome.

use std::sync::Arc;

use http::{Method, StatusCode};
use tracing::{debug, warn};

use super::backend::{keys, AttributeValue, BackendError, TraceBackend};
use crate::capture::{RequestSnapshot, ResponseSnapshot};
use crate::core::Context;
use crate::correlation::CorrelationId;
use crate::trace_context::TraceContext;

/// Who is responsible for closing the span behind a handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    /// Started by this handle; closed by it.
    Owned,
    /// Found already active; someone else closes it.
    Reused,
    /// The backend refused to start a span; attributes go nowhere.
    Detached,
}

/// Reference to the span recording one request.
///
/// Dropping an owned handle that was never passed to [`SpanRecorder::end`]
/// (the request future was cancelled) marks the span interrupted and ends it.
pub struct SpanHandle {
    span: Option<TraceContext>,
    ownership: Ownership,
    failed: bool,
    closed: bool,
    backend: Arc<dyn TraceBackend>,
}

impl SpanHandle {
    #[inline]
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    #[inline]
    pub fn is_owned(&self) -> bool {
        self.ownership == Ownership::Owned
    }

    /// The span this handle writes to (`None` when detached).
    #[inline]
    pub fn span(&self) -> Option<&TraceContext> {
        self.span.as_ref()
    }

    /// The span, only if this handle owns it.
    #[inline]
    pub fn owned_span(&self) -> Option<&TraceContext> {
        if self.is_owned() {
            self.span.as_ref()
        } else {
            None
        }
    }

    /// Whether `fail` has been recorded.
    #[inline]
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    fn set(&self, key: &'static str, value: impl Into<AttributeValue>) {
        if let Some(span) = &self.span {
            log_failure("set_attribute", self.backend.set_attribute(span, key, value.into()));
        }
    }

    fn close(&mut self) {
        if self.closed || !self.is_owned() {
            return;
        }
        self.closed = true;
        if let Some(span) = &self.span {
            log_failure("end_span", self.backend.end_span(span));
        }
    }
}

impl Drop for SpanHandle {
    fn drop(&mut self) {
        if self.closed || !self.is_owned() {
            return;
        }
        warn!(
            span_id = self.span.as_ref().map(|s| s.span_id.as_str()).unwrap_or(""),
            "request interrupted before completion, closing span"
        );
        self.set(keys::SPAN_INTERRUPTED, true);
        self.set(keys::ERROR, true);
        self.close();
    }
}

impl std::fmt::Debug for SpanHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanHandle")
            .field("span", &self.span)
            .field("ownership", &self.ownership)
            .field("failed", &self.failed)
            .field("closed", &self.closed)
            .finish()
    }
}

fn log_failure(op: &'static str, result: Result<(), BackendError>) {
    if let Err(e) = result {
        warn!(op, error = %e, "tracing backend call failed");
    }
}

/// Wraps a [`TraceBackend`] with the request span lifecycle.
#[derive(Clone)]
pub struct SpanRecorder {
    backend: Arc<dyn TraceBackend>,
}

impl SpanRecorder {
    pub fn new(backend: Arc<dyn TraceBackend>) -> Self {
        Self { backend }
    }

    #[inline]
    pub fn backend(&self) -> &Arc<dyn TraceBackend> {
        &self.backend
    }

    /// Acquire the span for a request.
    ///
    /// Reuses `ctx.active_span()` if set. Otherwise starts `"{METHOD} {PATH}"`
    /// as a child of `ctx.remote_parent()` (or as a new root).
    pub fn begin(&self, ctx: &Context, method: &Method, path: &str) -> SpanHandle {
        if let Some(active) = ctx.active_span() {
            debug!(span_id = %active.span_id, "reusing active span");
            return self.handle(Some(active.clone()), Ownership::Reused);
        }

        let name = format!("{} {}", method, path);
        match self.backend.start_span(&name, ctx.remote_parent()) {
            Ok(span) => {
                debug!(span = %name, trace_id = %span.trace_id, span_id = %span.span_id, "span started");
                self.handle(Some(span), Ownership::Owned)
            }
            Err(e) => {
                warn!(span = %name, error = %e, "could not start span");
                self.handle(None, Ownership::Detached)
            }
        }
    }

    fn handle(&self, span: Option<TraceContext>, ownership: Ownership) -> SpanHandle {
        SpanHandle {
            span,
            ownership,
            failed: false,
            closed: false,
            backend: self.backend.clone(),
        }
    }

    /// Set `correlation.id`.
    pub fn attach_correlation(&self, handle: &SpanHandle, id: &CorrelationId) {
        handle.set(keys::CORRELATION_ID, id.as_str());
    }

    /// Set `http.request` from an already redacted snapshot.
    pub fn attach_request(&self, handle: &SpanHandle, snapshot: &RequestSnapshot) {
        handle.set(keys::HTTP_REQUEST, snapshot.as_str());
    }

    /// Set `http.response` and `http.status_code`.
    pub fn attach_response(&self, handle: &SpanHandle, snapshot: &ResponseSnapshot, status: StatusCode) {
        handle.set(keys::HTTP_RESPONSE, snapshot.as_str());
        handle.set(keys::HTTP_STATUS_CODE, status.as_u16());
    }

    /// Set `error=true` and `error.message`. Only the first call records.
    pub fn fail(&self, handle: &mut SpanHandle, message: &str) {
        if handle.failed {
            return;
        }
        handle.failed = true;
        handle.set(keys::ERROR, true);
        handle.set(keys::ERROR_MESSAGE, message);
    }

    /// Close the span if the handle owns it. Consumes the handle.
    pub fn end(&self, mut handle: SpanHandle) {
        handle.close();
    }
}
