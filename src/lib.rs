//! http_observer - request observability around any async HTTP handler.
//!
//! An [`Interceptor`] wraps a [`Handler`] and, for every request:
//!
//! - resolves a correlation ID (`X-Correlation-ID`, generated when absent)
//!   and echoes it on the response
//! - reuses the span already active for the request, or starts and owns a
//!   `"{METHOD} {PATH}"` span (child of an inbound `traceparent`)
//! - records redacted request and response snapshots on the span
//! - passes the request body and the response bytes through unchanged
//!
//! # Architecture
//!
//! ```text
//! request ──► correlation ──► span (reuse | own) ──► request snapshot
//!                                                         │
//!                                                         ▼
//! caller ◄── flush bytes ◄── close span ◄── response snapshot ◄── handler
//! ```
//!
//! Spans go to a [`TraceBackend`](observability::TraceBackend): the in-memory
//! [`RecordingBackend`](observability::RecordingBackend), or OpenTelemetry
//! with the `otel` feature.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use http_observer::config::Config;
//! use http_observer::observability::RecordingBackend;
//! use http_observer::{Interceptor, Server};
//!
//! let config = Config::from_env()?;
//! let backend = Arc::new(RecordingBackend::new());
//! let interceptor = Interceptor::new(MyHandler, &config.interceptor, backend);
//! Server::new(config.server, interceptor).run().await?;
//! ```

/// Package version from Cargo.toml
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git commit hash (8 chars) with optional "-dirty" suffix
pub const BUILD_VERSION: &str = env!("BUILD_VERSION");

/// Full version string: "0.1.0 (abc12345)"
pub const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_VERSION"), ")");

pub mod capture;
pub mod config;
pub mod core;
pub mod correlation;
pub mod logging;
pub mod observability;
pub mod pipeline;
pub mod redact;
pub mod server;
pub mod trace_context;

// Re-exports for convenience
pub use config::Config;
pub use core::{Context, Error, Request, ResponseWriter};
pub use correlation::CorrelationId;
pub use pipeline::{Handler, Interceptor};
pub use redact::Redactor;
pub use server::Server;
