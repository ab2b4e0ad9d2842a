//! Signal-based control of a server recorded in the state file.

use crate::lifecycle::signals::{SIGTERM, SIGUSR1};
use crate::state::ServerStateFile;

/// Delivers signals to processes.
pub trait Signaller: Send + Sync {
    /// Send `signal` to `pid`; `0` only probes for existence.
    /// Returns whether the signal was accepted.
    fn signal(&self, pid: u32, signal: i32) -> bool;
}

/// `kill(2)` on unix. Elsewhere nothing can be signalled.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixSignaller;

impl Signaller for PosixSignaller {
    #[cfg(unix)]
    fn signal(&self, pid: u32, signal: i32) -> bool {
        // pid 0 and negative pids address process groups.
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        if pid <= 0 {
            return false;
        }
        // SAFETY: kill has no memory-safety preconditions.
        unsafe { libc::kill(pid, signal) == 0 }
    }

    #[cfg(not(unix))]
    fn signal(&self, _pid: u32, _signal: i32) -> bool {
        false
    }
}

/// Reads the recorded process id and signals it.
#[derive(Debug, Clone)]
pub struct ProcessInspector<S = PosixSignaller> {
    state_file: ServerStateFile,
    signaller: S,
}

impl ProcessInspector<PosixSignaller> {
    pub fn new(state_file: ServerStateFile) -> Self {
        Self::with_signaller(state_file, PosixSignaller)
    }
}

impl<S: Signaller> ProcessInspector<S> {
    pub fn with_signaller(state_file: ServerStateFile, signaller: S) -> Self {
        Self {
            state_file,
            signaller,
        }
    }

    pub fn state_file(&self) -> &ServerStateFile {
        &self.state_file
    }

    pub fn signaller(&self) -> &S {
        &self.signaller
    }

    /// Process id on record; an unreadable state file counts as none.
    pub fn master_process_id(&self) -> Option<u32> {
        match self.state_file.read() {
            Ok(contents) => contents.master_process_id,
            Err(err) => {
                tracing::debug!(error = %err, "Cannot read server state");
                None
            }
        }
    }

    /// Whether the recorded process exists.
    pub fn is_running(&self) -> bool {
        self.send(0)
    }

    /// Ask the recorded process to reload.
    pub fn reload(&self) -> bool {
        self.send(SIGUSR1)
    }

    /// Ask the recorded process to terminate.
    pub fn stop(&self) -> bool {
        self.send(SIGTERM)
    }

    fn send(&self, signal: i32) -> bool {
        match self.master_process_id() {
            Some(pid) => self.signaller.signal(pid, signal),
            None => false,
        }
    }
}
