//! The application runtime seam.
//!
//! The worker owns one long-lived [`Application`] and calls into it once per
//! request, call/return style. Everything on the far side of this trait
//! (routing, middleware, business logic) belongs to the application.

use std::any::Any;
use std::error::Error as StdError;

use thiserror::Error;

use crate::bridge::request::AppRequest;
use crate::bridge::response::{AppResponse, OutputBuffer};

/// Boxed error type accepted as the cause of an [`ApplicationError`].
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A long-lived request-processing engine.
pub trait Application: Send + Sync + 'static {
    /// Process one request.
    ///
    /// Anything written to `output` is treated as out-of-band output captured
    /// during handling. When non-empty it replaces a buffered or streamed
    /// response body; file bodies are sent as they are.
    fn handle(
        &self,
        request: AppRequest,
        output: &mut OutputBuffer,
    ) -> Result<AppResponse, ApplicationError>;

    /// Called after each response has been handed to the transport.
    fn on_request_handled(&self, _handled: u64) {}

    /// Called once when the worker stops serving.
    fn terminate(&self) {}
}

/// Failure raised while the application processed a request.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ApplicationError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ApplicationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Turn a caught panic payload into an error.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "application panicked".to_string()
        };
        Self::new(format!("panic while handling request: {message}"))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_keep_their_message() {
        let err = ApplicationError::from_panic(Box::new("boom"));
        assert_eq!(err.to_string(), "panic while handling request: boom");

        let err = ApplicationError::from_panic(Box::new(String::from("kaboom")));
        assert!(err.to_string().ends_with("kaboom"));

        let err = ApplicationError::from_panic(Box::new(42_u8));
        assert!(err.to_string().ends_with("application panicked"));
    }

    #[test]
    fn source_is_exposed() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = ApplicationError::with_source("cannot render", io);
        assert_eq!(err.message(), "cannot render");
        assert_eq!(err.source().unwrap().to_string(), "disk on fire");
    }
}
