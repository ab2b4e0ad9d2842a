//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging for the supervisor (human-readable) and the worker
//!   (one JSON record per line on stdout)
//! - Encode worker events in the log line protocol the supervisor relays
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Log level configurable via config and `RUST_LOG`
//! - Worker records are `{message, level_name, context, extra}`; event fields
//!   other than `message` land in `context`

use std::fmt;
use std::io::Write;
use std::time::SystemTime;

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Severity name used in the log line protocol.
pub fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG | Level::TRACE => "DEBUG",
    }
}

/// Layer writing each event as one JSON line.
pub struct LogLineLayer<W> {
    make_writer: W,
}

impl<W> LogLineLayer<W>
where
    W: for<'a> MakeWriter<'a> + 'static,
{
    pub fn new(make_writer: W) -> Self {
        Self { make_writer }
    }
}

impl<S, W> Layer<S> for LogLineLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'a> MakeWriter<'a> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);

        let mut extra = Map::new();
        extra.insert("target".into(), Value::from(metadata.target()));
        extra.insert(
            "datetime".into(),
            Value::from(httpdate::fmt_http_date(SystemTime::now())),
        );

        let mut record = Map::new();
        record.insert("message".into(), Value::from(visitor.message));
        record.insert("level_name".into(), Value::from(level_name(metadata.level())));
        record.insert("context".into(), Value::Object(visitor.fields));
        record.insert("extra".into(), Value::Object(extra));

        let Ok(mut line) = serde_json::to_vec(&Value::Object(record)) else {
            return;
        };
        line.push(b'\n');

        let mut writer = self.make_writer.make_writer();
        let _ = writer.write_all(&line);
        let _ = writer.flush();
    }
}

#[derive(Default)]
struct JsonVisitor {
    message: String,
    fields: Map<String, Value>,
}

impl JsonVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for JsonVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::from(format!("{value:?}")));
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Human-readable logging for the supervisor process.
pub fn init_supervisor_logging(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// JSON-line logging on stdout for a worker process.
pub fn init_worker_logging(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(LogLineLayer::new(std::io::stdout))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture(f: impl FnOnce()) -> Vec<Value> {
        let captured = Captured::default();
        let subscriber =
            tracing_subscriber::registry().with(LogLineLayer::new(captured.clone()));
        tracing::subscriber::with_default(subscriber, f);

        let raw = captured.0.lock().unwrap().clone();
        String::from_utf8(raw)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn event_becomes_protocol_record() {
        let records = capture(|| {
            tracing::warn!(user = "ada", attempts = 3_u64, "login throttled");
        });

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record["message"], "login throttled");
        assert_eq!(record["level_name"], "WARNING");
        assert_eq!(record["context"]["user"], "ada");
        assert_eq!(record["context"]["attempts"], 3);
        assert!(record["extra"]["target"].is_string());
        assert!(record["extra"]["datetime"].is_string());
    }

    #[test]
    fn one_line_per_event() {
        let records = capture(|| {
            tracing::info!("first");
            tracing::error!(code = 500_u64, "second");
        });
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["level_name"], "INFO");
        assert_eq!(records[1]["level_name"], "ERROR");
        assert_eq!(records[1]["context"]["code"], 500);
    }

    #[test]
    fn level_names() {
        assert_eq!(level_name(&Level::TRACE), "DEBUG");
        assert_eq!(level_name(&Level::DEBUG), "DEBUG");
        assert_eq!(level_name(&Level::WARN), "WARNING");
    }
}
