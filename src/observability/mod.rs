//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! worker events
//!     → logging.rs LogLineLayer (one JSON record per stdout line)
//!     → supervisor log relay (parse, replay at the same severity)
//!     → supervisor fmt layer (console)
//!
//! per-request trace (local/testing environments only)
//!     → {"message": "request", "context": {method, url, memory, statusCode, duration}}
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing between processes
//! - Request ID flows through the worker via `x-request-id`
//! - Memory is the resident set size of the worker process

pub mod logging;
pub mod request_trace;

pub use logging::{init_supervisor_logging, init_worker_logging, LogLineLayer};
pub use request_trace::RequestTrace;
