//! In-memory tracing backend.
//!
//! Keeps open spans plus a bounded ring of finished ones. Used when no
//! exporter is configured and in tests, where it makes span lifecycles
//! observable (ending a span twice is an error, not a silent no-op).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use super::backend::{AttributeValue, BackendError, TraceBackend};
use crate::trace_context::TraceContext;

/// Finished spans kept by default.
pub const DEFAULT_FINISHED_CAPACITY: usize = 1024;

/// A span as recorded by [`RecordingBackend`].
#[derive(Clone, Debug)]
pub struct RecordedSpan {
    pub name: String,
    pub context: TraceContext,
    /// Attributes in the order they were set.
    pub attributes: Vec<(&'static str, AttributeValue)>,
    pub started_at: Instant,
    /// Set once the span has ended.
    pub duration: Option<Duration>,
}

impl RecordedSpan {
    /// Latest value set for `key`.
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// Latest string value set for `key`.
    pub fn str_attribute(&self, key: &str) -> Option<&str> {
        match self.attribute(key) {
            Some(AttributeValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn is_ended(&self) -> bool {
        self.duration.is_some()
    }
}

#[derive(Default)]
struct State {
    live: HashMap<String, RecordedSpan>,
    finished: VecDeque<RecordedSpan>,
    started: u64,
}

/// Thread-safe in-memory [`TraceBackend`].
pub struct RecordingBackend {
    state: Mutex<State>,
    available: AtomicBool,
    capacity: usize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FINISHED_CAPACITY)
    }

    /// Keep at most `capacity` finished spans (oldest dropped first).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            available: AtomicBool::new(true),
            capacity: capacity.max(1),
        }
    }

    /// Simulate an outage: while unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Total spans ever started.
    pub fn started_count(&self) -> u64 {
        self.lock().map(|s| s.started).unwrap_or(0)
    }

    /// Spans still open.
    pub fn live(&self) -> Vec<RecordedSpan> {
        self.lock()
            .map(|s| s.live.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Finished spans, oldest first.
    pub fn finished(&self) -> Vec<RecordedSpan> {
        self.lock()
            .map(|s| s.finished.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Look up a span, open or finished, by its span id.
    pub fn span(&self, span_id: &str) -> Option<RecordedSpan> {
        let state = self.lock().ok()?;
        let found = state
            .live
            .get(span_id)
            .or_else(|| state.finished.iter().find(|s| s.context.span_id == span_id))
            .cloned();
        found
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, BackendError> {
        self.state
            .lock()
            .map_err(|_| BackendError::Unavailable("span store lock poisoned".into()))
    }

    fn check_available(&self) -> Result<(), BackendError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(BackendError::Unavailable("recording backend disabled".into()))
        }
    }

    fn missing(state: &State, span: &TraceContext) -> BackendError {
        if state
            .finished
            .iter()
            .any(|s| s.context.span_id == span.span_id)
        {
            BackendError::Ended(span.span_id.clone())
        } else {
            BackendError::UnknownSpan(span.span_id.clone())
        }
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceBackend for RecordingBackend {
    fn start_span(
        &self,
        name: &str,
        parent: Option<&TraceContext>,
    ) -> Result<TraceContext, BackendError> {
        self.check_available()?;

        let context = match parent {
            Some(parent) => TraceContext::child_of(parent),
            None => TraceContext::new_root(),
        };

        let mut state = self.lock()?;
        state.started += 1;
        state.live.insert(
            context.span_id.clone(),
            RecordedSpan {
                name: name.to_string(),
                context: context.clone(),
                attributes: Vec::with_capacity(6),
                started_at: Instant::now(),
                duration: None,
            },
        );
        Ok(context)
    }

    fn set_attribute(
        &self,
        span: &TraceContext,
        key: &'static str,
        value: AttributeValue,
    ) -> Result<(), BackendError> {
        self.check_available()?;

        let mut state = self.lock()?;
        match state.live.get_mut(&span.span_id) {
            Some(recorded) => {
                recorded.attributes.push((key, value));
                Ok(())
            }
            None => Err(Self::missing(&state, span)),
        }
    }

    fn end_span(&self, span: &TraceContext) -> Result<(), BackendError> {
        let mut state = self.lock()?;
        let Some(mut recorded) = state.live.remove(&span.span_id) else {
            return Err(Self::missing(&state, span));
        };
        // Ended while down: the span is lost, but never stays live.
        self.check_available()?;

        let duration = recorded.started_at.elapsed();
        recorded.duration = Some(duration);

        debug!(
            name = %recorded.name,
            trace_id = %recorded.context.trace_id,
            span_id = %recorded.context.span_id,
            duration_ms = duration.as_secs_f64() * 1000.0,
            attributes = recorded.attributes.len(),
            "span finished"
        );

        if state.finished.len() == self.capacity {
            state.finished.pop_front();
        }
        state.finished.push_back(recorded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_lifecycle() {
        let backend = RecordingBackend::new();
        let span = backend.start_span("GET /users", None).unwrap();
        backend
            .set_attribute(&span, "http.status_code", AttributeValue::Int(200))
            .unwrap();

        assert_eq!(backend.live().len(), 1);
        backend.end_span(&span).unwrap();
        assert!(backend.live().is_empty());

        let finished = backend.finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].name, "GET /users");
        assert!(finished[0].is_ended());
        assert_eq!(
            finished[0].attribute("http.status_code"),
            Some(&AttributeValue::Int(200))
        );
    }

    #[test]
    fn test_double_end_is_error() {
        let backend = RecordingBackend::new();
        let span = backend.start_span("GET /", None).unwrap();
        backend.end_span(&span).unwrap();

        assert_eq!(
            backend.end_span(&span),
            Err(BackendError::Ended(span.span_id.clone()))
        );
        assert_eq!(
            backend.set_attribute(&span, "error", true.into()),
            Err(BackendError::Ended(span.span_id.clone()))
        );
    }

    #[test]
    fn test_unknown_span() {
        let backend = RecordingBackend::new();
        let stranger = TraceContext::new_root();
        assert!(matches!(
            backend.end_span(&stranger),
            Err(BackendError::UnknownSpan(_))
        ));
    }

    #[test]
    fn test_child_joins_parent_trace() {
        let backend = RecordingBackend::new();
        let remote = TraceContext::new_root();
        let span = backend.start_span("POST /orders", Some(&remote)).unwrap();

        assert_eq!(span.trace_id, remote.trace_id);
        assert_eq!(span.parent_span_id.as_deref(), Some(remote.span_id.as_str()));
    }

    #[test]
    fn test_unavailable_rejects_everything() {
        let backend = RecordingBackend::new();
        let span = backend.start_span("GET /", None).unwrap();

        backend.set_available(false);
        assert!(matches!(
            backend.start_span("GET /", None),
            Err(BackendError::Unavailable(_))
        ));
        assert!(backend.set_attribute(&span, "error", true.into()).is_err());
        assert!(matches!(
            backend.end_span(&span),
            Err(BackendError::Unavailable(_))
        ));

        backend.set_available(true);
        assert!(backend.live().is_empty());
        assert!(backend.finished().is_empty());
        assert!(matches!(
            backend.end_span(&span),
            Err(BackendError::UnknownSpan(_))
        ));
        assert_eq!(backend.started_count(), 1);
    }

    #[test]
    fn test_outage_does_not_grow_live_spans() {
        let backend = RecordingBackend::new();
        let spans: Vec<_> = (0..100)
            .map(|_| backend.start_span("GET /", None).unwrap())
            .collect();

        backend.set_available(false);
        for span in &spans {
            assert!(backend.end_span(span).is_err());
        }
        assert!(backend.live().is_empty());
    }

    #[test]
    fn test_finished_ring_is_bounded() {
        let backend = RecordingBackend::with_capacity(2);
        let spans: Vec<_> = (0..3)
            .map(|i| backend.start_span(&format!("span {i}"), None).unwrap())
            .collect();
        for span in &spans {
            backend.end_span(span).unwrap();
        }

        let names: Vec<_> = backend.finished().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["span 1", "span 2"]);
        assert!(backend.span(&spans[0].span_id).is_none());
        assert!(backend.span(&spans[2].span_id).is_some());
    }

    #[test]
    fn test_concurrent_span_creation() {
        let backend = std::sync::Arc::new(RecordingBackend::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let backend = backend.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let span = backend.start_span("GET /", None).unwrap();
                        backend.end_span(&span).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(backend.started_count(), 400);
        assert!(backend.live().is_empty());
    }
}
