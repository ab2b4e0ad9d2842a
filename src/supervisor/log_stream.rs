//! Relay of the worker's stdout log lines into the supervisor's logger.
//!
//! Every line is classified once:
//! - not a JSON object → logged verbatim at info
//! - `message == "request"` → rendered as a request trace line
//! - a known `level_name` → replayed at that severity
//! - anything else → dropped

use serde_json::{Map, Value};

use crate::observability::request_trace::{RequestTrace, REQUEST_MESSAGE};

/// Severities a worker may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl Severity {
    /// Parse a `level_name`, case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        let severity = match name.to_ascii_lowercase().as_str() {
            "debug" | "trace" => Severity::Debug,
            "info" => Severity::Info,
            "notice" => Severity::Notice,
            "warning" | "warn" => Severity::Warning,
            "error" => Severity::Error,
            "critical" => Severity::Critical,
            "alert" => Severity::Alert,
            "emergency" => Severity::Emergency,
            _ => return None,
        };
        Some(severity)
    }
}

/// One classified worker output line.
#[derive(Debug, Clone, PartialEq)]
pub enum LogLine {
    Raw(String),
    Request(RequestTrace),
    Record {
        severity: Severity,
        message: String,
        context: Value,
    },
    Unrecognized,
}

/// Classify a single line. Blank lines are `Unrecognized`.
pub fn parse_line(line: &str) -> LogLine {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return LogLine::Unrecognized;
    }

    let record: Map<String, Value> = match serde_json::from_str(line) {
        Ok(record) => record,
        Err(_) => return LogLine::Raw(line.to_string()),
    };

    let message = record.get("message").and_then(Value::as_str).unwrap_or_default();
    if message == REQUEST_MESSAGE {
        let context = record.get("context").cloned().unwrap_or(Value::Null);
        return match serde_json::from_value(context) {
            Ok(trace) => LogLine::Request(trace),
            Err(_) => LogLine::Unrecognized,
        };
    }

    match record
        .get("level_name")
        .and_then(Value::as_str)
        .and_then(Severity::parse)
    {
        Some(severity) => LogLine::Record {
            severity,
            message: message.to_string(),
            context: record.get("context").cloned().unwrap_or(Value::Null),
        },
        None => LogLine::Unrecognized,
    }
}

/// Parse `line` and replay it through the supervisor's logger.
pub fn relay_line(line: &str) {
    match parse_line(line) {
        LogLine::Raw(text) => tracing::info!(target: "worker", "{text}"),
        LogLine::Request(trace) => tracing::info!(target: "worker", "{}", trace.render()),
        LogLine::Record {
            severity,
            message,
            context,
        } => match severity {
            Severity::Debug => tracing::debug!(target: "worker", %context, "{message}"),
            Severity::Info | Severity::Notice => {
                tracing::info!(target: "worker", %context, "{message}")
            }
            Severity::Warning => tracing::warn!(target: "worker", %context, "{message}"),
            Severity::Error | Severity::Critical | Severity::Alert | Severity::Emergency => {
                tracing::error!(target: "worker", %context, "{message}")
            }
        },
        LogLine::Unrecognized => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_raw() {
        assert_eq!(
            parse_line("thread 'main' panicked\n"),
            LogLine::Raw("thread 'main' panicked".into())
        );
        assert_eq!(parse_line("[1, 2]"), LogLine::Raw("[1, 2]".into()));
    }

    #[test]
    fn request_record_becomes_trace() {
        let line = r#"{"message":"request","level_name":"INFO","context":{"type":"request","method":"GET","url":"http://localhost/","memory":1048576,"statusCode":404,"duration":0.5},"extra":{}}"#;
        match parse_line(line) {
            LogLine::Request(trace) => {
                assert_eq!(trace.method, "GET");
                assert_eq!(trace.status_code, 404);
                assert_eq!(trace.memory, 1_048_576);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn severity_records_keep_context() {
        let line = r#"{"message":"cache miss","level_name":"WARNING","context":{"key":"users"},"extra":{}}"#;
        assert_eq!(
            parse_line(line),
            LogLine::Record {
                severity: Severity::Warning,
                message: "cache miss".into(),
                context: serde_json::json!({"key": "users"}),
            }
        );
    }

    #[test]
    fn unknown_severity_is_dropped() {
        let line = r#"{"message":"x","level_name":"LOUD","context":{},"extra":{}}"#;
        assert_eq!(parse_line(line), LogLine::Unrecognized);
        assert_eq!(parse_line(r#"{"message":"x"}"#), LogLine::Unrecognized);
        assert_eq!(parse_line("   "), LogLine::Unrecognized);
    }

    #[test]
    fn severity_names() {
        assert_eq!(Severity::parse("EMERGENCY"), Some(Severity::Emergency));
        assert_eq!(Severity::parse("notice"), Some(Severity::Notice));
        assert_eq!(Severity::parse("verbose"), None);
    }

    fn relayed(lines: &[&str]) -> Vec<Value> {
        use crate::observability::LogLineLayer;
        use std::io::Write;
        use std::sync::{Arc, Mutex};
        use tracing_subscriber::fmt::MakeWriter;
        use tracing_subscriber::layer::SubscriberExt;

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

        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry().with(LogLineLayer::new(captured.clone()));
        tracing::subscriber::with_default(subscriber, || {
            for line in lines {
                relay_line(line);
            }
        });

        let raw = captured.0.lock().unwrap().clone();
        String::from_utf8(raw)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn relay_replays_each_shape_at_its_level() {
        let records = relayed(&[
            "plain",
            r#"{"message":"boot","level_name":"DEBUG","context":{"run":1},"extra":{}}"#,
            r#"{"message":"request","context":{"method":"GET","url":"/","statusCode":200}}"#,
            r#"{"message":"disk full","level_name":"CRITICAL","context":{},"extra":{}}"#,
            r#"{"message":"no level"}"#,
            "",
        ]);

        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r["extra"]["target"] == "worker"));

        assert_eq!(records[0]["message"], "plain");
        assert_eq!(records[0]["level_name"], "INFO");

        assert_eq!(records[1]["message"], "boot");
        assert_eq!(records[1]["level_name"], "DEBUG");
        assert_eq!(records[1]["context"]["context"], r#"{"run":1}"#);

        assert_eq!(records[2]["message"], "200 GET / .... 0.00 ms (0.00 MB)");
        assert_eq!(records[2]["level_name"], "INFO");

        assert_eq!(records[3]["message"], "disk full");
        assert_eq!(records[3]["level_name"], "ERROR");
    }
}
