//! Worker process: one application instance behind one HTTP listener.
//!
//! # Data Flow
//! ```text
//! state file → ServerStateRecord → WorkerServer::new
//!     → bind host:port → serve (handler.rs per request)
//!     → signal / request limit → drain → Application::terminate → exit(code)
//! ```
//!
//! # Design Decisions
//! - Process-wide state lives in an explicit `WorkerContext`, shared by `Arc`
//! - The binary runs a current-thread runtime, so requests interleave only at
//!   body reads and the completion wait

pub mod context;
pub mod handler;
pub mod server;

pub use context::WorkerContext;
pub use handler::handle_request;
pub use server::WorkerServer;
