//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGUSR1, SIGINT and SIGTERM
//! - Report which signal arrived as its number
//! - Translate signals into shutdown with that number as the exit code
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGUSR1 means "reload": the process exits with it and the supervisor
//!   restarts it
//! - Non-unix targets only see Ctrl+C, reported as SIGINT

use std::io;

use crate::lifecycle::shutdown::Shutdown;

#[cfg(unix)]
pub const SIGINT: i32 = libc::SIGINT;
#[cfg(unix)]
pub const SIGTERM: i32 = libc::SIGTERM;
#[cfg(unix)]
pub const SIGUSR1: i32 = libc::SIGUSR1;

#[cfg(not(unix))]
pub const SIGINT: i32 = 2;
#[cfg(not(unix))]
pub const SIGTERM: i32 = 15;
#[cfg(not(unix))]
pub const SIGUSR1: i32 = 10;

/// Exit code that asks the supervisor to restart the worker.
pub const RELOAD_EXIT_CODE: i32 = SIGUSR1;

/// Exit code of a worker that could not load the server state.
pub const STATE_UNAVAILABLE_EXIT_CODE: i32 = 11;

/// Listens for the signals that end a process.
pub struct SignalListener {
    #[cfg(unix)]
    usr1: tokio::signal::unix::Signal,
    #[cfg(unix)]
    int: tokio::signal::unix::Signal,
    #[cfg(unix)]
    term: tokio::signal::unix::Signal,
}

impl SignalListener {
    /// Install the handlers. Must be called inside a Tokio runtime.
    #[cfg(unix)]
    pub fn new() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            usr1: signal(SignalKind::user_defined1())?,
            int: signal(SignalKind::interrupt())?,
            term: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn new() -> io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the next signal and return its number.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> i32 {
        tokio::select! {
            _ = self.usr1.recv() => SIGUSR1,
            _ = self.int.recv() => SIGINT,
            _ = self.term.recv() => SIGTERM,
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> i32 {
        match tokio::signal::ctrl_c().await {
            Ok(()) => SIGINT,
            Err(_) => std::future::pending().await,
        }
    }
}

/// Trigger `shutdown` with the number of the first signal received.
pub async fn shutdown_on_signal(mut listener: SignalListener, shutdown: Shutdown) {
    let signal = listener.recv().await;
    tracing::info!(signal, "Signal received, shutting down");
    shutdown.trigger(signal);
}

/// Human name of a signal number, for log lines.
pub fn signal_name(signal: i32) -> &'static str {
    match signal {
        s if s == SIGINT => "SIGINT",
        s if s == SIGTERM => "SIGTERM",
        s if s == SIGUSR1 => "SIGUSR1",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_code_is_usr1() {
        assert_eq!(RELOAD_EXIT_CODE, SIGUSR1);
        assert_ne!(RELOAD_EXIT_CODE, SIGTERM);
        assert_eq!(signal_name(SIGTERM), "SIGTERM");
        assert_eq!(signal_name(99), "unknown");
    }
}
