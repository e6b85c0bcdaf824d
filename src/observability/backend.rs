//! Tracing backend capability: start a span, set attributes, end it.
//!
//! Backends are synchronous so a span can be closed from `Drop` when a request
//! is cancelled mid-flight. They must be safe for concurrent span creation.

use std::fmt;

use thiserror::Error;

use crate::trace_context::TraceContext;

/// Span attribute keys.
pub mod keys {
    pub const HTTP_REQUEST: &str = "http.request";
    pub const HTTP_RESPONSE: &str = "http.response";
    pub const HTTP_STATUS_CODE: &str = "http.status_code";
    pub const ERROR: &str = "error";
    pub const ERROR_MESSAGE: &str = "error.message";
    pub const CORRELATION_ID: &str = "correlation.id";
    pub const SPAN_INTERRUPTED: &str = "span.interrupted";
}

/// Attribute value: string, integer or boolean.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttributeValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Str(s) => f.write_str(s),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Str(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Str(s.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Int(i)
    }
}

impl From<u16> for AttributeValue {
    fn from(i: u16) -> Self {
        AttributeValue::Int(i64::from(i))
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

/// Backend failures. Callers log these; they never fail a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("tracing backend unavailable: {0}")]
    Unavailable(String),

    #[error("unknown span {0}")]
    UnknownSpan(String),

    #[error("span {0} already ended")]
    Ended(String),
}

/// A place spans are recorded.
pub trait TraceBackend: Send + Sync {
    /// Start a span. With `parent` the span joins the parent's trace.
    fn start_span(
        &self,
        name: &str,
        parent: Option<&TraceContext>,
    ) -> Result<TraceContext, BackendError>;

    /// Set (or overwrite) an attribute on an open span.
    fn set_attribute(
        &self,
        span: &TraceContext,
        key: &'static str,
        value: AttributeValue,
    ) -> Result<(), BackendError>;

    /// Close a span. Closing twice is an error.
    fn end_span(&self, span: &TraceContext) -> Result<(), BackendError>;
}
