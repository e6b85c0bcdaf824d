//! OpenTelemetry export of request spans.
//!
//! [`init_tracing`] installs a global tracer provider with an OTLP/gRPC batch
//! exporter; [`OtelBackend`] maps the [`TraceBackend`] calls onto that global
//! tracer.
//!
//! # Configuration
//!
//! - `OTEL_ENABLED`: Enable OpenTelemetry (`1` = enabled)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP gRPC endpoint (default: `http://localhost:4317`)
//! - `OTEL_SERVICE_NAME`: Service name in traces (default: `SERVICE_NAME`)
//! - `OTEL_SERVICE_VERSION`: Service version (default: from Cargo.toml)
//! - `OTEL_ENVIRONMENT`: Deployment environment (default: `development`)
//! - `OTEL_SAMPLING_RATIO`: Sampling ratio 0.0-1.0 (default: `1.0`)
//!
//! # Example
//!
//! ```rust,ignore
//! let config = TracingConfig::from_env(&service)?;
//! init_tracing(&config)?;
//! let backend = Arc::new(OtelBackend::new());
//! // ... run server ...
//! shutdown_tracing();
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use opentelemetry::global::{self, BoxedSpan, BoxedTracer};
use opentelemetry::trace::{
    Span, SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState, Tracer,
};
use opentelemetry::{KeyValue, Value};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    runtime,
    trace::{Config, Sampler},
    Resource,
};
use tracing::{info, warn};

use super::backend::{AttributeValue, BackendError, TraceBackend};
use crate::config::TracingConfig;
use crate::core::BoxError;
use crate::trace_context::TraceContext;

// Semantic convention keys (avoiding dependency on semconv_experimental feature)
const SERVICE_NAME: &str = "service.name";
const SERVICE_VERSION: &str = "service.version";
const DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment";

/// Instrumentation scope name.
const TRACER_NAME: &str = "http_observer";

/// Initialize OpenTelemetry tracing.
///
/// Returns `false` (and installs nothing) when disabled. Call
/// [`shutdown_tracing`] before exit to flush pending spans.
pub fn init_tracing(config: &TracingConfig) -> Result<bool, BoxError> {
    if !config.enabled {
        info!("OpenTelemetry disabled (OTEL_ENABLED != 1)");
        return Ok(false);
    }

    let resource = Resource::new([
        KeyValue::new(SERVICE_NAME, config.service_name.clone()),
        KeyValue::new(SERVICE_VERSION, config.service_version.clone()),
        KeyValue::new(DEPLOYMENT_ENVIRONMENT, config.environment.clone()),
    ]);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.endpoint)
        .with_timeout(config.export_timeout)
        .build()?;

    let tracer_provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            Config::default()
                .with_resource(resource)
                .with_sampler(Sampler::TraceIdRatioBased(config.sampling_ratio)),
        )
        .build();

    global::set_tracer_provider(tracer_provider);

    info!(
        endpoint = %config.endpoint,
        service = %config.service_name,
        version = %config.service_version,
        environment = %config.environment,
        sampling = %config.sampling_ratio,
        "OpenTelemetry tracing initialized"
    );

    Ok(true)
}

/// Flush pending spans and uninstall the global provider.
pub fn shutdown_tracing() {
    global::shutdown_tracer_provider();
    info!("OpenTelemetry tracing shutdown complete");
}

/// [`TraceBackend`] over the global OpenTelemetry tracer.
///
/// Open spans are held by span id until `end_span`.
pub struct OtelBackend {
    tracer: BoxedTracer,
    spans: Mutex<HashMap<String, BoxedSpan>>,
}

impl OtelBackend {
    pub fn new() -> Self {
        Self {
            tracer: global::tracer(TRACER_NAME),
            spans: Mutex::new(HashMap::new()),
        }
    }

    fn parent_context(parent: Option<&TraceContext>) -> opentelemetry::Context {
        let Some(parent) = parent else {
            return opentelemetry::Context::new();
        };
        match (
            TraceId::from_hex(&parent.trace_id),
            SpanId::from_hex(&parent.span_id),
        ) {
            (Ok(trace_id), Ok(span_id)) => {
                let remote = SpanContext::new(
                    trace_id,
                    span_id,
                    TraceFlags::new(parent.flags),
                    true,
                    TraceState::default(),
                );
                opentelemetry::Context::new().with_remote_span_context(remote)
            }
            _ => {
                warn!(parent = %parent, "unusable parent span, starting new trace");
                opentelemetry::Context::new()
            }
        }
    }

    fn with_spans<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, BoxedSpan>) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        let mut spans = self
            .spans
            .lock()
            .map_err(|_| BackendError::Unavailable("span table lock poisoned".into()))?;
        f(&mut spans)
    }
}

impl Default for OtelBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn to_otel_value(value: AttributeValue) -> Value {
    match value {
        AttributeValue::Str(s) => Value::from(s),
        AttributeValue::Int(i) => Value::from(i),
        AttributeValue::Bool(b) => Value::from(b),
    }
}

impl TraceBackend for OtelBackend {
    fn start_span(
        &self,
        name: &str,
        parent: Option<&TraceContext>,
    ) -> Result<TraceContext, BackendError> {
        let parent_cx = Self::parent_context(parent);
        let span = self
            .tracer
            .span_builder(name.to_string())
            .start_with_context(&self.tracer, &parent_cx);

        let sc = span.span_context();
        let span_id = format!("{:016x}", sc.span_id());
        // A no-op provider echoes the parent's ids (or none); keep local ones instead.
        let fresh = sc.is_valid() && parent.map_or(true, |p| p.span_id != span_id);
        let context = if fresh {
            TraceContext {
                trace_id: format!("{:032x}", sc.trace_id()),
                span_id,
                parent_span_id: parent.map(|p| p.span_id.clone()),
                flags: if sc.is_sampled() { 0x01 } else { 0x00 },
            }
        } else {
            match parent {
                Some(p) => TraceContext::child_of(p),
                None => TraceContext::new_root(),
            }
        };

        self.with_spans(|spans| {
            spans.insert(context.span_id.clone(), span);
            Ok(())
        })?;
        Ok(context)
    }

    fn set_attribute(
        &self,
        span: &TraceContext,
        key: &'static str,
        value: AttributeValue,
    ) -> Result<(), BackendError> {
        self.with_spans(|spans| match spans.get_mut(&span.span_id) {
            Some(open) => {
                open.set_attribute(KeyValue::new(key, to_otel_value(value)));
                Ok(())
            }
            None => Err(BackendError::UnknownSpan(span.span_id.clone())),
        })
    }

    fn end_span(&self, span: &TraceContext) -> Result<(), BackendError> {
        let mut open = self.with_spans(|spans| {
            spans
                .remove(&span.span_id)
                .ok_or_else(|| BackendError::UnknownSpan(span.span_id.clone()))
        })?;
        open.end();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_init_is_noop() {
        let config = TracingConfig::default();
        assert!(!config.enabled);
        assert!(!init_tracing(&config).unwrap());
    }

    #[test]
    fn test_noop_provider_span_lifecycle() {
        // No provider installed: ids are generated locally.
        let backend = OtelBackend::new();
        let remote = TraceContext::new_root();
        let span = backend.start_span("GET /", Some(&remote)).unwrap();
        assert_eq!(span.trace_id, remote.trace_id);

        backend
            .set_attribute(&span, "http.status_code", AttributeValue::Int(200))
            .unwrap();
        backend.end_span(&span).unwrap();
        assert!(matches!(
            backend.end_span(&span),
            Err(BackendError::UnknownSpan(_))
        ));
    }

    #[test]
    fn test_unknown_span_attribute() {
        let backend = OtelBackend::new();
        let stranger = TraceContext::new_root();
        assert!(backend
            .set_attribute(&stranger, "error", AttributeValue::Bool(true))
            .is_err());
    }
}
