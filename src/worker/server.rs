//! Worker HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router around the single bridge handler
//! - Wire up middleware (request id, tracing)
//! - Serve until a signal or the request limit asks for shutdown
//! - Drain in-flight requests, terminate the application, report the exit code

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Request};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::bridge::Application;
use crate::lifecycle::signals::shutdown_on_signal;
use crate::lifecycle::{Shutdown, SignalListener};
use crate::state::ServerStateRecord;
use crate::worker::context::WorkerContext;
use crate::worker::handler::handle_request;

/// UUID v4 request ids for requests that arrive without one.
#[derive(Debug, Clone, Copy, Default)]
struct MakeRequestUuidV4;

impl MakeRequestId for MakeRequestUuidV4 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// HTTP server for one worker process.
pub struct WorkerServer {
    router: Router,
    ctx: Arc<WorkerContext>,
}

impl WorkerServer {
    /// Create a worker server for `app` with the persisted server state.
    pub fn new(app: Arc<dyn Application>, state: ServerStateRecord) -> Self {
        let ctx = Arc::new(WorkerContext::new(app, state, Shutdown::new()));
        let router = Self::build_router(ctx.clone());
        Self { router, ctx }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(ctx: Arc<WorkerContext>) -> Router {
        Router::new()
            .fallback(handle_request)
            .with_state(ctx)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
    }

    pub fn context(&self) -> &Arc<WorkerContext> {
        &self.ctx
    }

    /// Handle for triggering shutdown from outside the server.
    pub fn shutdown(&self) -> Shutdown {
        self.ctx.shutdown().clone()
    }

    /// Bind the listener at the host and port from the server state.
    pub async fn bind(&self) -> io::Result<TcpListener> {
        let state = self.ctx.state();
        TcpListener::bind((state.host.as_str(), state.port)).await
    }

    /// Turn SIGUSR1/SIGINT/SIGTERM into a shutdown with the signal number.
    pub fn install_signal_handlers(&self) -> io::Result<()> {
        let listener = SignalListener::new()?;
        tokio::spawn(shutdown_on_signal(listener, self.shutdown()));
        Ok(())
    }

    /// Serve until shutdown and return the exit code the process should use.
    pub async fn run(self, listener: TcpListener) -> io::Result<i32> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            max_requests = self.ctx.state().max_requests,
            "Worker listening"
        );

        let shutdown = self.shutdown();
        let drain = shutdown.clone();
        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let code = drain.wait().await;
                tracing::info!(code, "Stopping worker, draining in-flight requests");
            })
            .await?;

        self.ctx.app().terminate();

        let code = shutdown.requested().unwrap_or_default();
        tracing::info!(code, handled = self.ctx.handled_count(), "Worker stopped");
        Ok(code)
    }
}
