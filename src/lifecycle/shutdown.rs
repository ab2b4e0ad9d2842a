//! Shutdown coordination for a worker process.

use std::sync::{Arc, OnceLock};

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// Carries the exit code the process should end with. Only the first
/// trigger counts; later triggers are ignored.
#[derive(Debug, Clone)]
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<i32>,
    code: Arc<OnceLock<i32>>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            code: Arc::new(OnceLock::new()),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<i32> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal with the given exit code.
    pub fn trigger(&self, code: i32) {
        if self.code.set(code).is_ok() {
            let _ = self.tx.send(code);
        }
    }

    /// Exit code of the shutdown, if one was triggered.
    pub fn requested(&self) -> Option<i32> {
        self.code.get().copied()
    }

    /// Wait until shutdown is triggered and return its exit code.
    pub async fn wait(&self) -> i32 {
        let mut rx = self.subscribe();
        if let Some(code) = self.requested() {
            return code;
        }
        match rx.recv().await {
            Ok(code) => code,
            Err(_) => self.requested().unwrap_or_default(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
