//! Span recording for intercepted requests.
//!
//! - [`backend`]: the [`TraceBackend`] capability and attribute keys
//! - [`recording`]: in-memory backend (default, and used by tests)
//! - [`recorder`]: reuse-or-create span lifecycle over a backend
//! - `otel` (feature `otel`): OTLP export through the OpenTelemetry SDK
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use http_observer::observability::{RecordingBackend, SpanRecorder};
//!
//! let backend = Arc::new(RecordingBackend::new());
//! let recorder = SpanRecorder::new(backend.clone());
//! let handle = recorder.begin(&ctx, req.method(), req.path());
//! // ... attach attributes ...
//! recorder.end(handle);
//! ```

pub mod backend;
pub mod recorder;
pub mod recording;

#[cfg(feature = "otel")]
pub mod otel;

pub use backend::{keys, AttributeValue, BackendError, TraceBackend};
pub use recorder::{Ownership, SpanHandle, SpanRecorder};
pub use recording::{RecordedSpan, RecordingBackend};

#[cfg(feature = "otel")]
pub use otel::{init_tracing, shutdown_tracing, OtelBackend};
