//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger(code) → stop accepting → drain in-flight requests → exit(code)
//!
//! Signals (signals.rs):
//!     SIGUSR1       → shutdown with the reload code (supervisor restarts)
//!     SIGINT/SIGTERM → shutdown with the signal number (supervisor stops)
//! ```
//!
//! # Design Decisions
//! - The first shutdown trigger decides the exit code
//! - Recycling after max requests reuses the reload code

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{SignalListener, RELOAD_EXIT_CODE};
