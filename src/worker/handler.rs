//! The worker's single request handler.
//!
//! # Data Flow
//! ```text
//! GET/HEAD + static file? → serve_static → slot
//! otherwise:
//!     parse_body (400 on failure)
//!     → client.marshal (400 on failure or panic)
//!     → Application::handle under catch_unwind
//!     → client.respond | client.error → slot
//! slot.wait → bookkeeping → transport
//! ```

use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Method, Request, Response};
use futures_util::FutureExt;

use crate::bridge::client::{bad_request_response, error_response};
use crate::bridge::completion::{
    completion_slot, CompletionError, CompletionHandle, CompletionSlot,
};
use crate::bridge::request::{absolute_url, parse_body, TranslateError};
use crate::bridge::response::OutputBuffer;
use crate::bridge::static_files::{resolve_static, serve_static};
use crate::bridge::ApplicationError;
use crate::worker::context::WorkerContext;

/// Handle one request end to end.
pub async fn handle_request(
    State(ctx): State<Arc<WorkerContext>>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response<Body> {
    let started = ctx.begin_request();
    let method = request.method().clone();
    let url = absolute_url(request.uri(), request.headers());

    let (handle, slot) = completion_slot();
    let dispatched = AssertUnwindSafe(dispatch(&ctx, remote_addr, request, &handle))
        .catch_unwind()
        .await;
    if let Err(payload) = dispatched {
        let err = ApplicationError::from_panic(payload);
        tracing::error!(error = %err, "Request dispatch panicked");
        if !handle.is_completed() {
            log_completion(ctx.client().error(&handle, &err));
        }
    }
    drop(handle);
    let response = await_response(slot, ctx.client().debug()).await;

    ctx.request_handled(&method, &url, response.status(), started);
    response
}

async fn dispatch(
    ctx: &WorkerContext,
    remote_addr: SocketAddr,
    request: Request<Body>,
    handle: &CompletionHandle<Response<Body>>,
) {
    if request.method() == Method::GET || request.method() == Method::HEAD {
        let public = ctx.state().public_path.as_deref();
        if let Some(path) = resolve_static(request.uri().path(), public) {
            tracing::debug!(path = %path.display(), "Serving static file");
            log_completion(handle.complete(serve_static(&path, request).await));
            return;
        }
    }

    let (parts, body) = request.into_parts();
    let parsed = match parse_body(&parts, body, ctx.state().max_body_size).await {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::warn!(error = %err, uri = %parts.uri, "Rejecting malformed request body");
            log_completion(handle.complete(bad_request_response(&err)));
            return;
        }
    };

    let client = ctx.client();
    let marshalled = panic::catch_unwind(AssertUnwindSafe(|| {
        client.marshal(&parts, remote_addr, parsed)
    }))
    .unwrap_or_else(|payload| {
        let err = ApplicationError::from_panic(payload);
        Err(TranslateError::Malformed(err.message().to_string()))
    });
    let app_request = match marshalled {
        Ok(app_request) => app_request,
        Err(err) => {
            tracing::warn!(error = %err, uri = %parts.uri, "Failed to translate request");
            log_completion(handle.complete(bad_request_response(&err)));
            return;
        }
    };

    let app = ctx.app();
    let mut output = OutputBuffer::new();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| app.handle(app_request, &mut output)));

    let completed = match outcome {
        Ok(Ok(response)) => client.respond(handle, response, output.into_contents()),
        Ok(Err(err)) => {
            tracing::error!(error = %err, "Application failed to handle request");
            client.error(handle, &err)
        }
        Err(payload) => {
            let err = ApplicationError::from_panic(payload);
            tracing::error!(error = %err, "Application panicked");
            client.error(handle, &err)
        }
    };

    log_completion(completed);
}

fn log_completion(completed: Result<(), CompletionError>) {
    if let Err(err) = completed {
        tracing::warn!(error = %err, "Response slot completed twice");
    }
}

async fn await_response(slot: CompletionSlot<Response<Body>>, debug: bool) -> Response<Body> {
    match slot.wait().await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, "Request finished without a response");
            error_response(&err, debug)
        }
    }
}
