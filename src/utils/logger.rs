//! Tracing subscriber setup.
//!
//! `json` output follows the OpenTelemetry log data model so events can be
//! shipped as-is; `console` is the pretty human format.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Field names rewritten to their OpenTelemetry semantic-convention keys.
const RENAMED_FIELDS: &[(&str, &str)] = &[
    ("event_name", "event.name"),
    ("event_domain", "event.domain"),
    ("http_method", "http.request.method"),
    ("http_status", "http.response.status_code"),
    ("url", "url.full"),
];

#[derive(Default)]
struct FieldCollector {
    fields: Map<String, Value>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: impl Into<Value>) {
        self.fields.insert(field.name().to_string(), value.into());
    }
}

impl Visit for FieldCollector {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, value);
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, value);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.put(field, format!("{:?}", value));
    }
}

#[derive(Clone)]
struct OtelJsonFormatter {
    resource: Map<String, Value>,
}

impl OtelJsonFormatter {
    fn new(service_name: &str, service_version: &str) -> Self {
        let mut resource = Map::new();
        resource.insert("service.name".to_string(), Value::from(service_name));
        resource.insert("service.version".to_string(), Value::from(service_version));
        Self { resource }
    }

    fn severity_number(level: &Level) -> u64 {
        match *level {
            Level::TRACE => 1,
            Level::DEBUG => 5,
            Level::INFO => 9,
            Level::WARN => 13,
            Level::ERROR => 17,
        }
    }
}

impl<S, N> FormatEvent<S, N> for OtelJsonFormatter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        let mut attributes = collector.fields;
        for (from, to) in RENAMED_FIELDS {
            if let Some(v) = attributes.remove(*from) {
                attributes.insert((*to).to_string(), v);
            }
        }
        if let Some(file) = metadata.file() {
            attributes.insert("code.filepath".to_string(), Value::from(file));
        }
        if let Some(line) = metadata.line() {
            attributes.insert("code.lineno".to_string(), Value::from(line));
        }
        attributes.insert("code.target".to_string(), Value::from(metadata.target()));
        if let Some(scope) = ctx.event_scope() {
            let spans: Vec<Value> = scope
                .from_root()
                .map(|span| Value::from(span.name()))
                .collect();
            if !spans.is_empty() {
                attributes.insert("span.path".to_string(), Value::Array(spans));
            }
        }

        let body = attributes
            .remove("message")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| metadata.name().to_string());

        let mut root = Map::new();
        root.insert(
            "timestamp".to_string(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        root.insert(
            "severity_text".to_string(),
            Value::from(metadata.level().as_str()),
        );
        root.insert(
            "severity_number".to_string(),
            Value::from(Self::severity_number(metadata.level())),
        );
        root.insert("body".to_string(), Value::from(body));
        root.insert("resource".to_string(), Value::Object(self.resource.clone()));
        root.insert("attributes".to_string(), Value::Object(attributes));

        let serialized = serde_json::to_string(&Value::Object(root)).map_err(|_| std::fmt::Error)?;
        writer.write_str(&serialized)?;
        writer.write_char('\n')
    }
}

/// Parse a level name from the configuration.
pub fn parse_level(level: &str) -> Result<LevelFilter> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        other => Err(Error::Logging(format!(
            "invalid logging.level '{}'. Valid values: trace, debug, info, warn, error",
            other
        ))),
    }
}

/// Install the global subscriber described by `logging_config`.
///
/// `RUST_LOG` directives are layered on top of the configured level. Output
/// goes to stderr so command output on stdout stays machine-readable.
pub fn init_logging(logging_config: &LoggingConfig) -> Result<()> {
    let level_filter = parse_level(&logging_config.level)?;
    let filter_layer = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .from_env_lossy();

    let installed = match logging_config.format.to_lowercase().as_str() {
        "json" => tracing_subscriber::registry()
            .with(filter_layer)
            .with(
                fmt::layer()
                    .event_format(OtelJsonFormatter::new(
                        &logging_config.service_name,
                        &logging_config.service_version,
                    ))
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        // unknown formats fall back to console
        _ => tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
    };

    installed.map_err(|e| Error::Logging(e.to_string()))
}
