//! Per-request trace record shared by the worker and the supervisor.

use serde::{Deserialize, Serialize};

/// Message that marks a log record as a request trace.
pub const REQUEST_MESSAGE: &str = "request";

/// One handled request, as reported by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTrace {
    pub method: String,
    pub url: String,
    /// Resident memory of the worker in bytes.
    #[serde(default)]
    pub memory: u64,
    pub status_code: u16,
    /// Milliseconds since the request started.
    #[serde(default)]
    pub duration: f64,
}

impl RequestTrace {
    /// Emit the record through `tracing` in the shape the supervisor relays.
    pub fn emit(&self) {
        tracing::info!(
            "type" = REQUEST_MESSAGE,
            method = %self.method,
            url = %self.url,
            memory = self.memory,
            "statusCode" = self.status_code,
            duration = self.duration,
            "request"
        );
    }

    /// Console line for the supervisor.
    pub fn render(&self) -> String {
        format!(
            "{} {} {} .... {:.2} ms ({:.2} MB)",
            self.status_code,
            self.method,
            self.url,
            self.duration,
            self.memory as f64 / 1024.0 / 1024.0
        )
    }
}

/// Resident set size of this process in bytes, or 0 when unavailable.
pub fn resident_memory() -> u64 {
    memory_stats::memory_stats()
        .map(|usage| usage.physical_mem as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_console_line() {
        let trace = RequestTrace {
            method: "GET".into(),
            url: "http://localhost:8000/users?page=2".into(),
            memory: 3 * 1024 * 1024,
            status_code: 200,
            duration: 1.5,
        };
        assert_eq!(
            trace.render(),
            "200 GET http://localhost:8000/users?page=2 .... 1.50 ms (3.00 MB)"
        );
    }

    #[test]
    fn parses_protocol_context() {
        let trace: RequestTrace = serde_json::from_value(serde_json::json!({
            "type": "request",
            "method": "POST",
            "url": "http://x/",
            "memory": 10,
            "statusCode": 201,
            "duration": 2.0
        }))
        .unwrap();
        assert_eq!(trace.status_code, 201);
        assert_eq!(trace.memory, 10);
    }
}
