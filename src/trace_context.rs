//! W3C Trace Context identities.
//!
//! A [`TraceContext`] identifies one span: the trace it belongs to, its own
//! span ID and (optionally) its parent. It doubles as the handle type the
//! tracing backends hand out.
//!
//! Format: `traceparent: {version}-{trace-id}-{parent-id}-{trace-flags}`
//! Example: `traceparent: 00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`
//!
//! An inbound `traceparent` is parsed as the *remote* span that called us.
//! It parents the span we create; it is never treated as a local active span.

use std::fmt;

use http::HeaderMap;
use uuid::Uuid;

/// W3C Trace Context version (always 00 today).
const TRACE_VERSION: &str = "00";

/// Trace flags: sampled (01) or not sampled (00).
const FLAG_SAMPLED: u8 = 0x01;

/// Header carrying the W3C trace context.
pub const TRACEPARENT: &str = "traceparent";

/// Span identity within a distributed trace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceContext {
    /// 16-byte trace ID as 32 hex chars
    pub trace_id: String,
    /// 8-byte span ID as 16 hex chars
    pub span_id: String,
    /// Parent span ID, if this span has one
    pub parent_span_id: Option<String>,
    /// Trace flags (bit 0 = sampled)
    pub flags: u8,
}

impl TraceContext {
    /// Identity for a new root span.
    pub fn new_root() -> Self {
        Self {
            trace_id: generate_trace_id(),
            span_id: generate_span_id(),
            parent_span_id: None,
            flags: FLAG_SAMPLED,
        }
    }

    /// Identity for a new span whose parent is `parent`.
    pub fn child_of(parent: &TraceContext) -> Self {
        Self {
            trace_id: parent.trace_id.clone(),
            span_id: generate_span_id(),
            parent_span_id: Some(parent.span_id.clone()),
            flags: parent.flags,
        }
    }

    /// Parse a W3C traceparent header into the remote span it names.
    ///
    /// Format: `{version}-{trace-id}-{parent-id}-{trace-flags}`
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.trim().split('-');
        let (version, trace_id, span_id, flags_str) =
            (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || version != TRACE_VERSION {
            return None;
        }

        // trace-id: 32 hex chars, not all zeros
        if trace_id.len() != 32 || !is_valid_hex(trace_id) || is_all_zeros(trace_id) {
            return None;
        }

        // parent-id: 16 hex chars, not all zeros
        if span_id.len() != 16 || !is_valid_hex(span_id) || is_all_zeros(span_id) {
            return None;
        }

        if flags_str.len() != 2 || !is_valid_hex(flags_str) {
            return None;
        }
        let flags = u8::from_str_radix(flags_str, 16).ok()?;

        Some(Self {
            trace_id: trace_id.to_lowercase(),
            span_id: span_id.to_lowercase(),
            parent_span_id: None,
            flags,
        })
    }

    /// Extract the remote caller's span from request headers.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(TRACEPARENT)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse)
    }

    /// Format as W3C traceparent header value.
    pub fn to_traceparent(&self) -> String {
        format!(
            "{}-{}-{}-{:02x}",
            TRACE_VERSION, self.trace_id, self.span_id, self.flags
        )
    }

    /// Check if trace is sampled.
    #[inline]
    pub fn is_sampled(&self) -> bool {
        self.flags & FLAG_SAMPLED != 0
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_traceparent())
    }
}

// =============================================================================
// ID Generation
// =============================================================================

/// 32 hex chars from a v4 UUID (122 random bits).
fn generate_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// 16 hex chars from the random tail of a v4 UUID.
fn generate_span_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[16..].to_string()
}

#[inline]
fn is_valid_hex(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_hexdigit())
}

#[inline]
fn is_all_zeros(s: &str) -> bool {
    s.chars().all(|c| c == '0')
}
