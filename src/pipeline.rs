//! Request interception: correlation, span and body capture around a handler.
//!
//! For every request [`Interceptor`] runs, in order:
//!
//! 1. resolve the correlation ID and queue it as a response header
//! 2. acquire the span (reuse the active one, or start `"{METHOD} {PATH}"`)
//! 3. buffer the request body, attach the redacted request snapshot
//! 4. run the handler against an owned response buffer
//! 5. attach the redacted response snapshot and status, tag failures
//! 6. flush the buffer to the real output byte for byte, close the span
//!
//! Steps 5 and 6 run on every exit path of the handler: success, error and
//! panic. A panic is resumed once the span is closed. If the whole future is
//! dropped instead (client went away), the span handle closes the span as
//! interrupted and the buffer is freed.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use http::{HeaderMap, HeaderValue};
use hyper::body::Body;
use tracing::{debug, info_span, warn, Instrument};

use crate::capture::{BodyCapture, RequestSnapshot, ResponseCapture, ResponseSink, ResponseSnapshot};
use crate::config::InterceptorConfig;
use crate::core::{BoxError, Context, Error, Request, ResponseWriter, Result};
use crate::correlation::{self, CorrelationId, X_CORRELATION_ID};
use crate::observability::{SpanHandle, SpanRecorder, TraceBackend};
use crate::redact::Redactor;
use crate::trace_context::{TraceContext, TRACEPARENT};

/// Downstream request handler.
///
/// Reads the request, writes into `res`. Errors are returned to the caller
/// of the interceptor unchanged.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        req: Request,
        ctx: &mut Context,
        res: &mut ResponseWriter,
    ) -> std::result::Result<(), BoxError>;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn handle(
        &self,
        req: Request,
        ctx: &mut Context,
        res: &mut ResponseWriter,
    ) -> std::result::Result<(), BoxError> {
        (**self).handle(req, ctx, res).await
    }
}

/// Wraps a [`Handler`] with correlation, tracing and body capture.
///
/// Shared across requests; holds only immutable configuration and the
/// tracing backend.
pub struct Interceptor<H> {
    inner: H,
    service: Arc<str>,
    redactor: Arc<Redactor>,
    capture: BodyCapture,
    recorder: SpanRecorder,
}

impl<H: Handler> Interceptor<H> {
    pub fn new(inner: H, config: &InterceptorConfig, backend: Arc<dyn TraceBackend>) -> Self {
        Self {
            inner,
            service: Arc::from(config.service_name.as_str()),
            redactor: Arc::new(config.redactor()),
            capture: config.body_capture(),
            recorder: SpanRecorder::new(backend),
        }
    }

    /// Replace the redaction rules.
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = Arc::new(redactor);
        self
    }

    #[inline]
    pub fn inner(&self) -> &H {
        &self.inner
    }

    /// Service name used for generated correlation IDs.
    #[inline]
    pub fn service(&self) -> &str {
        &self.service
    }

    #[inline]
    pub fn recorder(&self) -> &SpanRecorder {
        &self.recorder
    }

    /// Intercept an already buffered request, flushing the response to `sink`.
    ///
    /// Everything after correlation, including span bookkeeping and redaction,
    /// runs inside the request's correlation scope so its log lines carry the ID.
    pub async fn serve<S>(&self, req: Request, ctx: &mut Context, sink: &mut S) -> Result<()>
    where
        S: ResponseSink + ?Sized,
    {
        let correlation = self.correlate(req.headers(), ctx);
        correlation::scope(correlation.clone(), async move {
            let span = self.recorder.begin(ctx, req.method(), req.path());
            self.recorder.attach_correlation(&span, &correlation);

            self.run(req, ctx, sink, correlation, span).await
        })
        .await
    }

    /// Intercept a streaming request.
    ///
    /// The body is read after the span is acquired, so a failed read is
    /// recorded on the span before `Error::RequestBody` is returned.
    pub async fn serve_http<B, S>(
        &self,
        req: http::Request<B>,
        ctx: &mut Context,
        sink: &mut S,
    ) -> Result<()>
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: Into<BoxError>,
        S: ResponseSink + ?Sized,
    {
        let correlation = self.correlate(req.headers(), ctx);
        correlation::scope(correlation.clone(), async move {
            let mut span = self.recorder.begin(ctx, req.method(), req.uri().path());
            self.recorder.attach_correlation(&span, &correlation);

            let req = match BodyCapture::buffer_request(req).await {
                Ok(req) => req,
                Err(e) => {
                    let err = Error::RequestBody(e);
                    self.recorder.fail(&mut span, &err.to_string());
                    self.recorder.end(span);
                    warn!(correlation_id = %correlation, error = %err, "request body read failed");
                    return Err(err);
                }
            };

            self.run(req, ctx, sink, correlation, span).await
        })
        .await
    }

    /// Correlation ID for this request; queued on the context's response headers.
    fn correlate(&self, headers: &HeaderMap, ctx: &mut Context) -> CorrelationId {
        let id = match ctx.correlation_id() {
            Some(existing) => existing.clone(),
            None => ctx.assign_correlation_id(CorrelationId::from_headers(headers, &self.service)),
        };
        ctx.set_response_header(X_CORRELATION_ID.as_str(), id.as_str());

        if ctx.active_span().is_none() && ctx.remote_parent().is_none() {
            ctx.set_remote_parent(TraceContext::from_headers(headers));
        }
        id
    }

    async fn run<S>(
        &self,
        req: Request,
        ctx: &mut Context,
        sink: &mut S,
        correlation: CorrelationId,
        mut span: SpanHandle,
    ) -> Result<()>
    where
        S: ResponseSink + ?Sized,
    {
        let request_span = info_span!(
            "request",
            correlation_id = %correlation,
            method = %req.method(),
            path = %req.path(),
        );

        let (body_text, req) = self.capture.capture_request(req);
        let snapshot = RequestSnapshot::new(&req, &body_text, &self.redactor);
        self.recorder.attach_request(&span, &snapshot);
        drop(snapshot);
        drop(body_text);

        let mut response = self.capture.capture_response();
        self.stamp_headers(&mut response, &correlation, &span);

        let outcome = {
            let mut scope = ctx.enter_span(span.owned_span().cloned());
            let handler = self.inner.handle(req, &mut scope, response.writer());
            AssertUnwindSafe(handler.instrument(request_span))
                .catch_unwind()
                .await
        };

        let (result, panic) = match outcome {
            Ok(result) => (result, None),
            Err(payload) => (Ok(()), Some(payload)),
        };

        let snapshot = ResponseSnapshot::of(&response, &self.redactor);
        let status = response.status();
        self.recorder.attach_response(&span, &snapshot, status);
        drop(snapshot);

        if let Err(e) = &result {
            self.recorder.fail(&mut span, &e.to_string());
        }
        if let Some(payload) = &panic {
            self.recorder.fail(&mut span, &panic_message(payload.as_ref()));
        }

        let flushed = response.flush(sink).await;
        if let Err(e) = &flushed {
            self.recorder.fail(&mut span, &format!("failed to flush response: {}", e));
        }
        self.recorder.end(span);

        let elapsed_ms = ctx.elapsed_ms();
        match (&result, &flushed) {
            (Ok(()), Ok(bytes)) => debug!(
                correlation_id = %correlation,
                status = status.as_u16(),
                bytes = *bytes,
                elapsed_ms,
                "request completed"
            ),
            (_, Err(e)) if result.is_err() || panic.is_some() => warn!(
                correlation_id = %correlation,
                error = %e,
                "response flush failed after handler failure"
            ),
            _ => {}
        }

        if let Some(payload) = panic {
            std::panic::resume_unwind(payload);
        }

        match (result, flushed) {
            (Err(e), _) => Err(Error::Handler(e)),
            (Ok(()), Err(e)) => Err(Error::Flush(e)),
            (Ok(()), Ok(_)) => Ok(()),
        }
    }

    /// Correlation header always; `traceparent` when this request owns its span.
    fn stamp_headers(&self, response: &mut ResponseCapture, correlation: &CorrelationId, span: &SpanHandle) {
        let headers = response.writer().headers_mut();
        if let Some(value) = correlation.header_value() {
            headers.insert(&X_CORRELATION_ID, value);
        }
        if let Some(owned) = span.owned_span() {
            if let Ok(value) = HeaderValue::from_str(&owned.to_traceparent()) {
                headers.insert(TRACEPARENT, value);
            }
        }
    }
}

/// Interceptors nest: the inner one reuses the outer span and correlation ID.
#[async_trait]
impl<H: Handler> Handler for Interceptor<H> {
    async fn handle(
        &self,
        req: Request,
        ctx: &mut Context,
        res: &mut ResponseWriter,
    ) -> std::result::Result<(), BoxError> {
        match self.serve(req, ctx, res).await {
            Ok(()) => Ok(()),
            Err(Error::Handler(e)) => Err(e),
            Err(e) => Err(Box::new(e)),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
