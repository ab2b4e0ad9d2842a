//! Bridge client: the three ways a request's completion slot gets resolved.
//!
//! # Responsibilities
//! - Marshal a transport request into the application request model
//! - Complete the slot with the emitted application response
//! - Complete the slot with the fixed 500 response when the application fails
//!
//! # Design Decisions
//! - Every path completes through [`CompletionHandle::complete`], so a late
//!   second completion is rejected instead of overwriting the first
//! - The 500 body is generic unless debug mode is on

use std::error::Error as StdError;
use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{header, request::Parts, HeaderName, HeaderValue, Response, StatusCode};
use bytes::Bytes;

use crate::bridge::completion::{CompletionError, CompletionHandle};
use crate::bridge::request::{translate, AppRequest, ParsedBody, TranslateError};
use crate::bridge::response::{emit, AppResponse};

/// Body sent for application errors outside debug mode.
pub const GENERIC_ERROR_BODY: &str = "Internal server error.";

/// Hands requests to the application and responses back to the transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeClient {
    debug: bool,
}

impl BridgeClient {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Build the application request for a transport request.
    pub fn marshal(
        &self,
        parts: &Parts,
        remote_addr: SocketAddr,
        body: ParsedBody,
    ) -> Result<AppRequest, TranslateError> {
        translate(parts, remote_addr, body)
    }

    /// Emit `response` and complete the slot with it.
    ///
    /// A response that cannot be emitted (an unreadable file body) completes
    /// the slot through the error path instead.
    pub fn respond(
        &self,
        handle: &CompletionHandle<Response<Body>>,
        response: AppResponse,
        output: Option<Bytes>,
    ) -> Result<(), CompletionError> {
        match emit(response, output) {
            Ok(emitted) => handle.complete(emitted.into_response()),
            Err(err) => {
                tracing::error!(error = %err, "Failed to emit application response");
                self.error(handle, &err)
            }
        }
    }

    /// Complete the slot with the 500 response for `err`.
    pub fn error(
        &self,
        handle: &CompletionHandle<Response<Body>>,
        err: &(dyn StdError + 'static),
    ) -> Result<(), CompletionError> {
        handle.complete(error_response(err, self.debug))
    }
}

/// The fixed 500 response used for application failures.
pub fn error_response(err: &(dyn StdError + 'static), debug: bool) -> Response<Body> {
    let body = if debug {
        format_error_for_client(err)
    } else {
        GENERIC_ERROR_BODY.to_string()
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("status"),
        HeaderValue::from_static("500 Internal Server Error"),
    );
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}

/// Diagnostic dump of an error and its whole source chain.
pub fn format_error_for_client(err: &(dyn StdError + 'static)) -> String {
    let mut dump = err.to_string();
    let mut source = err.source();
    if source.is_some() {
        dump.push_str("\n\nCaused by:");
    }
    while let Some(cause) = source {
        dump.push_str("\n    ");
        dump.push_str(&cause.to_string());
        source = cause.source();
    }
    dump
}

/// The 400 response for a request that could not be translated.
pub fn bad_request_response(err: &TranslateError) -> Response<Body> {
    let mut response = Response::new(Body::from(format!("Bad Request: {err}")));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}
