//! Shared run-state persisted between the supervisor and its workers.
//!
//! # Data Flow
//! ```text
//! supervisor start → write_state (pid cleared)
//!     → spawn worker → write_process_id
//! worker start     → read (exit 11 if unusable)
//! stop/status/reload → read masterProcessId → signal
//! clean stop       → delete
//! ```
//!
//! # Design Decisions
//! - Writes are atomic (temp file + rename in the same directory)
//! - One supervisor per state-file path; there is no lock

pub mod file;

pub use file::{ServerStateFile, ServerStateRecord, StateFileContents, StateFileError};
