//! Process-wide worker state, passed explicitly to every request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use axum::http::{Method, StatusCode};

use crate::bridge::{Application, BridgeClient};
use crate::lifecycle::{Shutdown, RELOAD_EXIT_CODE};
use crate::observability::request_trace::{resident_memory, RequestTrace};
use crate::state::ServerStateRecord;

/// Environments in which every request is reported to the supervisor.
const TRACED_ENVIRONMENTS: [&str; 2] = ["local", "testing"];

/// Everything one worker process shares across requests.
pub struct WorkerContext {
    app: Arc<dyn Application>,
    client: BridgeClient,
    state: ServerStateRecord,
    handled: AtomicU64,
    last_request_started: Mutex<Option<Instant>>,
    shutdown: Shutdown,
}

impl WorkerContext {
    pub fn new(app: Arc<dyn Application>, state: ServerStateRecord, shutdown: Shutdown) -> Self {
        Self {
            app,
            client: BridgeClient::new(state.debug()),
            state,
            handled: AtomicU64::new(0),
            last_request_started: Mutex::new(None),
            shutdown,
        }
    }

    pub fn app(&self) -> &Arc<dyn Application> {
        &self.app
    }

    pub fn client(&self) -> BridgeClient {
        self.client
    }

    pub fn state(&self) -> &ServerStateRecord {
        &self.state
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Requests fully handled so far.
    pub fn handled_count(&self) -> u64 {
        self.handled.load(Ordering::SeqCst)
    }

    pub fn last_request_started(&self) -> Option<Instant> {
        *self
            .last_request_started
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the start of a request and return its start time.
    pub fn begin_request(&self) -> Instant {
        let now = Instant::now();
        *self
            .last_request_started
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(now);
        now
    }

    /// Bookkeeping after a response has been produced.
    ///
    /// Reports the request when tracing is on for this environment, and
    /// starts a recycling shutdown once `max_requests` is reached.
    pub fn request_handled(
        &self,
        method: &Method,
        url: &str,
        status: StatusCode,
        started: Instant,
    ) -> u64 {
        let handled = self.handled.fetch_add(1, Ordering::SeqCst) + 1;

        if TRACED_ENVIRONMENTS.contains(&self.state.app_env()) {
            RequestTrace {
                method: method.to_string(),
                url: url.to_string(),
                memory: resident_memory(),
                status_code: status.as_u16(),
                duration: started.elapsed().as_secs_f64() * 1000.0,
            }
            .emit();
        }

        self.app.on_request_handled(handled);

        let max = self.state.max_requests;
        if max > 0 && handled >= max && self.shutdown.requested().is_none() {
            tracing::info!(handled, max_requests = max, "Request limit reached, recycling worker");
            self.shutdown.trigger(RELOAD_EXIT_CODE);
        }

        handled
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("client", &self.client)
            .field("handled", &self.handled)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
