//! Worker process launched by `bridgehead start`.
//!
//! Reads the server state named by `STATE_FILE`, serves the bundled echo
//! application on a single-threaded runtime, and exits with the code of the
//! signal (or request limit) that stopped it.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use bridgehead::echo::EchoApplication;
use bridgehead::lifecycle::signals::STATE_UNAVAILABLE_EXIT_CODE;
use bridgehead::observability::init_worker_logging;
use bridgehead::state::{ServerStateFile, ServerStateRecord};
use bridgehead::supervisor::process::STATE_FILE_ENV;
use bridgehead::WorkerServer;

fn main() -> ExitCode {
    init_worker_logging("info");

    let Some(state) = load_state() else {
        return ExitCode::from(STATE_UNAVAILABLE_EXIT_CODE as u8);
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "Failed to build runtime");
            return ExitCode::FAILURE;
        }
    };

    let app = Arc::new(EchoApplication::new(state.app_name.clone()));
    let result = runtime.block_on(async move {
        let server = WorkerServer::new(app, state);
        server.install_signal_handlers()?;
        let listener = server.bind().await?;
        server.run(listener).await
    });

    match result {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            tracing::error!(error = %err, "Worker failed");
            ExitCode::FAILURE
        }
    }
}

fn load_state() -> Option<ServerStateRecord> {
    let Some(path) = std::env::var_os(STATE_FILE_ENV).map(PathBuf::from) else {
        tracing::error!("{STATE_FILE_ENV} is not set");
        return None;
    };

    match ServerStateFile::new(&path).read() {
        Ok(contents) => {
            if contents.state.is_none() {
                tracing::error!(path = %path.display(), "Server state file holds no state");
            }
            contents.state
        }
        Err(err) => {
            tracing::error!(error = %err, "Cannot read server state file");
            None
        }
    }
}
