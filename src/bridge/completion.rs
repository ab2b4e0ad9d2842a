//! Single-assignment hand-off between the transport dispatch path and the
//! call/return application handling.
//!
//! # Responsibilities
//! - Give the dispatcher something to suspend on while the response is computed
//! - Accept exactly one completion per request lifecycle
//! - Reject (never overwrite) any later completion attempt
//!
//! # Design Decisions
//! - Built on `tokio::sync::oneshot`; the sender lives behind a shared slot so
//!   the success, error and static-file paths can all hold a handle
//! - The first completion wins; the rest get `CompletionError::AlreadyCompleted`

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::oneshot;

/// Errors raised by the completion slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// A value was already delivered through this slot.
    #[error("completion slot already completed")]
    AlreadyCompleted,

    /// Every handle was dropped without completing the slot.
    #[error("completion slot dropped without a value")]
    Abandoned,
}

/// Create a connected handle/slot pair for one request.
pub fn completion_slot<T>() -> (CompletionHandle<T>, CompletionSlot<T>) {
    let (tx, rx) = oneshot::channel();
    (
        CompletionHandle {
            tx: Arc::new(Mutex::new(Some(tx))),
        },
        CompletionSlot { rx },
    )
}

/// Producer side. Cheap to clone; all clones share the same single assignment.
#[derive(Debug)]
pub struct CompletionHandle<T> {
    tx: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for CompletionHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> CompletionHandle<T> {
    /// Deliver the value. Only the first call across all clones succeeds.
    ///
    /// If the waiting side has already gone away the value is discarded, but
    /// the slot still counts as completed.
    pub fn complete(&self, value: T) -> Result<(), CompletionError> {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(CompletionError::AlreadyCompleted)?;

        if sender.send(value).is_err() {
            tracing::debug!("Completion delivered after the dispatcher stopped waiting");
        }
        Ok(())
    }

    /// Whether a value has already been delivered.
    pub fn is_completed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Consumer side, awaited by the transport dispatcher.
#[derive(Debug)]
pub struct CompletionSlot<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> CompletionSlot<T> {
    /// Suspend until the slot is completed.
    pub async fn wait(self) -> Result<T, CompletionError> {
        self.rx.await.map_err(|_| CompletionError::Abandoned)
    }
}
