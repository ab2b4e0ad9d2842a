//! Worker process supervision.
//!
//! # Data Flow
//! ```text
//! start:
//!     inspector.is_running? → refuse
//!     → state file (record) → spawn worker → state file (pid)
//!     → loop {
//!           worker stdout  → log_stream.rs → supervisor logger
//!           watch tick     → watcher.rs changed? → inspector.reload (SIGUSR1)
//!           SIGINT/SIGTERM → forwarded to worker
//!           worker exit    → reload code? restart : delete state file, return code
//!       }
//!
//! stop/status/reload (separate process):
//!     state file pid → inspector.rs → kill(pid, SIGTERM | 0 | SIGUSR1)
//! ```
//!
//! # Design Decisions
//! - Restart and stop are told apart only by the worker's exit code
//! - The watcher compares per path, so additions and removals that cancel out
//!   are still reported

pub mod inspector;
pub mod log_stream;
pub mod process;
pub mod watcher;

pub use inspector::{PosixSignaller, ProcessInspector, Signaller};
pub use process::{
    RunOutcome, Supervisor, SupervisorError, SupervisorOptions, SupervisorState, WorkerCommand,
};
pub use watcher::{FileWatcher, WatchPhase};
