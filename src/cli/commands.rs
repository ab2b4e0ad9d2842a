//! `start`, `stop`, `status` and `reload`, each returning a process exit code.

use std::path::{Path, PathBuf};

use crate::cli::StartArgs;
use crate::config::BridgeConfig;
use crate::state::{ServerStateFile, ServerStateRecord};
use crate::supervisor::{
    ProcessInspector, Signaller, Supervisor, SupervisorError, SupervisorOptions, WorkerCommand,
};

/// Name of the bundled worker executable.
pub const WORKER_BINARY: &str = "bridgehead-worker";

/// Merge `start` flags into the configuration.
pub fn apply_start_overrides(config: &mut BridgeConfig, args: &StartArgs) {
    if let Some(host) = &args.host {
        config.listener.host = host.clone();
    }
    if let Some(port) = args.port {
        config.listener.port = port;
    }
    if let Some(workers) = args.workers {
        config.workers.count = workers;
    }
    if let Some(max_requests) = args.max_requests {
        config.workers.max_requests = max_requests;
    }
    if args.watch {
        config.watch.enabled = true;
    }
    if let Some(command) = &args.worker_command {
        config.worker.command = Some(command.clone());
    }
    if let Some(env) = &args.env {
        config.app.env = env.clone();
    }
}

/// The record persisted for workers and inspection commands.
pub fn state_record(config: &BridgeConfig) -> ServerStateRecord {
    ServerStateRecord {
        host: config.listener.host.clone(),
        port: config.listener.port,
        workers: config.workers.count,
        max_requests: config.workers.max_requests,
        public_path: config.paths.public.as_deref().map(|p| config.resolve(p)),
        storage_path: config.resolve(&config.paths.storage),
        app_config: serde_json::json!({
            "name": config.app.name,
            "env": config.app.env,
            "debug": config.app.debug,
        }),
        app_name: config.app.name.clone(),
        max_body_size: config.workers.max_body_size,
    }
}

/// Supervisor options derived from the configuration.
pub fn supervisor_options(config: &BridgeConfig) -> SupervisorOptions {
    let program = config
        .worker
        .command
        .clone()
        .unwrap_or_else(default_worker_program);

    let mut command = WorkerCommand::new(program).args(config.worker.args.iter().cloned());
    command.cwd = Some(config.paths.base.clone());

    let mut options = SupervisorOptions::new(command, absolute(&config.paths.base));
    options.app_env = config.app.env.clone();
    options.relay_signals = true;
    if config.watch.enabled {
        options.watch_paths = Some(
            config
                .watch
                .paths
                .iter()
                .map(|p| config.resolve(Path::new(p)))
                .collect(),
        );
    }
    options
}

/// `bridgehead-worker` next to the running executable, or on `PATH`.
fn default_worker_program() -> PathBuf {
    let name = format!("{WORKER_BINARY}{}", std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(name))
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Start the server and supervise it until it stops.
pub async fn start(config: &BridgeConfig) -> i32 {
    let state_file = ServerStateFile::new(config.state_file_path());
    let mut supervisor = Supervisor::new(
        state_record(config),
        state_file,
        supervisor_options(config),
    );

    match supervisor.start().await {
        Ok(code) => code,
        Err(SupervisorError::AlreadyRunning) => 1,
        Err(err) => {
            tracing::error!(error = %err, "Server failed");
            1
        }
    }
}

/// Stop the recorded server. The state file is removed either way.
pub fn stop<S: Signaller>(inspector: &ProcessInspector<S>) -> i32 {
    let state_file = inspector.state_file();

    if !inspector.is_running() {
        remove_state_file(state_file);
        tracing::error!("Server is not running.");
        return 1;
    }

    tracing::info!("Stopping server...");
    let stopped = inspector.stop();
    remove_state_file(state_file);

    if stopped {
        0
    } else {
        tracing::error!("Failed to stop server.");
        1
    }
}

/// Report whether the recorded server is running.
pub fn status<S: Signaller>(inspector: &ProcessInspector<S>) -> i32 {
    if inspector.is_running() {
        tracing::info!("Server is running.");
        0
    } else {
        tracing::info!("Server is not running.");
        1
    }
}

/// Ask the recorded server to reload its worker.
pub fn reload<S: Signaller>(inspector: &ProcessInspector<S>) -> i32 {
    if !inspector.is_running() {
        tracing::error!("Server is not running.");
        return 1;
    }

    tracing::info!("Reloading workers...");
    if inspector.reload() {
        0
    } else {
        tracing::error!("Failed to reload workers.");
        1
    }
}

fn remove_state_file(state_file: &ServerStateFile) {
    if let Err(err) = state_file.delete() {
        tracing::warn!(error = %err, "Failed to delete server state file");
    }
}
