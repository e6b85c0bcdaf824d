//! JSON log lines, one per event.
//!
//! Log format:
//! ```json
//! {"time":"2024-06-11T09:30:15.123Z","level":"info","msg":"request completed","correlation_id":"customer-20240611093015-9f86d081","service":"customer","data":{"status":200}}
//! ```
//!
//! `correlation_id` comes from an explicit `correlation_id` event field, else
//! from the request currently being handled on this task, else it is empty.
//! Remaining event fields go under `data`, which is left out when empty.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LoggingConfig, DEFAULT_FILTER};
use crate::core::BoxError;
use crate::correlation;

/// Event field that overrides the ambient correlation ID.
const CORRELATION_FIELD: &str = "correlation_id";

/// One serialized log line.
#[derive(Serialize)]
pub struct LogEntry<'a> {
    /// RFC 3339 timestamp with milliseconds, UTC
    pub time: &'a str,
    /// debug, info, warn, error
    pub level: &'a str,
    pub msg: &'a str,
    pub correlation_id: &'a str,
    pub service: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, serde_json::Value>,
}

/// `FormatEvent` producing [`LogEntry`] lines.
pub struct JsonFormatter {
    service_name: String,
}

impl JsonFormatter {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

impl<S, N> FormatEvent<S, N> for JsonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let level = match *event.metadata().level() {
            Level::TRACE | Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let explicit = match visitor.fields.remove(CORRELATION_FIELD) {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
            None => None,
        };
        let correlation_id = explicit
            .or_else(|| correlation::current().map(|id| id.to_string()))
            .unwrap_or_default();

        let time = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let entry = LogEntry {
            time: &time,
            level,
            msg: visitor.message.as_deref().unwrap_or(""),
            correlation_id: &correlation_id,
            service: &self.service_name,
            data: visitor.fields,
        };

        let line = serde_json::to_string(&entry).map_err(|_| std::fmt::Error)?;
        writeln!(writer, "{}", line)
    }
}

/// Install the global subscriber: env filter plus JSON lines on stdout.
pub fn init(config: &LoggingConfig) -> Result<(), BoxError> {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|e| {
        eprintln!("Warning: invalid log filter '{}': {}", config.filter, e);
        EnvFilter::new(DEFAULT_FILTER)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(JsonFormatter::new(config.service_name.clone())),
        )
        .try_init()?;
    Ok(())
}

/// Field visitor for collecting tracing fields.
#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: BTreeMap<String, serde_json::Value>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value).trim_matches('"').to_string());
        } else {
            self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(format!("{:?}", value)),
            );
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(value.to_string()),
            );
        }
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::json!(value));
    }
}
