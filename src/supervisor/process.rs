//! Worker process supervisor.
//!
//! # Responsibilities
//! - Refuse to start over a live server recorded in the state file
//! - Persist the server state, spawn the worker, record its pid
//! - Relay the worker's stdout log lines
//! - Poll the file watcher and ask the worker to reload on change
//! - Restart on the reload exit code, stop on anything else
//!
//! # Design Decisions
//! - One `select!` loop drives the log drain, the watch timer, signal relay
//!   and the child wait, so none of them need locks
//! - Watch scans hash files on the blocking pool; the watcher moves into the
//!   scan task and comes back with its result
//! - The state file is deleted on every exit path out of `start`

use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::lifecycle::signals::signal_name;
use crate::lifecycle::{SignalListener, RELOAD_EXIT_CODE};
use crate::state::{ServerStateFile, ServerStateRecord, StateFileError};
use crate::supervisor::inspector::{PosixSignaller, ProcessInspector, Signaller};
use crate::supervisor::log_stream::relay_line;
use crate::supervisor::watcher::FileWatcher;

/// Polling interval of the file watcher.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(2);

/// Environment variable telling a worker it runs under the supervisor.
pub const SUPERVISED_ENV: &str = "BRIDGEHEAD_WORKER";

/// Environment variable carrying the state file path to the worker.
pub const STATE_FILE_ENV: &str = "STATE_FILE";

const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Failure that ends `Supervisor::start` without a worker exit code.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("server is already running")]
    AlreadyRunning,

    #[error("failed to spawn worker {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    StateFile(#[from] StateFileError),

    #[error("I/O error while supervising worker: {0}")]
    Io(#[from] io::Error),
}

/// Where the supervisor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Reloading,
    Stopping,
}

/// How one worker run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The worker exited with the reload code and should be started again.
    Reload,
    /// The worker is gone for good with this code.
    Exit(i32),
}

impl RunOutcome {
    pub fn from_code(code: i32) -> Self {
        if code == RELOAD_EXIT_CODE {
            RunOutcome::Reload
        } else {
            RunOutcome::Exit(code)
        }
    }
}

/// The worker executable and how to launch it.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Everything `start` needs besides the server state.
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    pub command: WorkerCommand,
    pub app_env: String,
    pub base_path: PathBuf,
    /// Files to watch; `None` disables watching.
    pub watch_paths: Option<Vec<PathBuf>>,
    pub watch_interval: Duration,
    /// Forward SIGINT/SIGTERM/SIGUSR1 received by the supervisor to the worker.
    pub relay_signals: bool,
}

impl SupervisorOptions {
    pub fn new(command: WorkerCommand, base_path: impl Into<PathBuf>) -> Self {
        Self {
            command,
            app_env: "production".to_string(),
            base_path: base_path.into(),
            watch_paths: None,
            watch_interval: DEFAULT_WATCH_INTERVAL,
            relay_signals: false,
        }
    }
}

type OutputLines = Lines<BufReader<ChildStdout>>;
type WatchScan = JoinHandle<(FileWatcher, bool)>;

/// Owns the worker lifecycle for one state file.
pub struct Supervisor<S = PosixSignaller> {
    inspector: ProcessInspector<S>,
    record: ServerStateRecord,
    options: SupervisorOptions,
    state: SupervisorState,
    runs: u32,
}

impl Supervisor<PosixSignaller> {
    pub fn new(
        record: ServerStateRecord,
        state_file: ServerStateFile,
        options: SupervisorOptions,
    ) -> Self {
        Self::with_inspector(record, ProcessInspector::new(state_file), options)
    }
}

impl<S: Signaller> Supervisor<S> {
    pub fn with_inspector(
        record: ServerStateRecord,
        inspector: ProcessInspector<S>,
        options: SupervisorOptions,
    ) -> Self {
        Self {
            inspector,
            record,
            options,
            state: SupervisorState::Idle,
            runs: 0,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Number of workers spawned so far.
    pub fn runs(&self) -> u32 {
        self.runs
    }

    pub fn inspector(&self) -> &ProcessInspector<S> {
        &self.inspector
    }

    /// Run the server until the worker exits with something other than the
    /// reload code, and return that code.
    pub async fn start(&mut self) -> Result<i32, SupervisorError> {
        if self.inspector.is_running() {
            tracing::error!("Server is already running.");
            return Err(SupervisorError::AlreadyRunning);
        }

        self.state = SupervisorState::Starting;
        if let Err(err) = self.inspector.state_file().write_state(&self.record) {
            self.state = SupervisorState::Idle;
            return Err(err.into());
        }
        self.write_running_banner();

        let result = self.supervise().await;

        self.state = SupervisorState::Stopping;
        if let Err(err) = self.inspector.state_file().delete() {
            tracing::warn!(error = %err, "Failed to delete server state file");
        }
        self.state = SupervisorState::Idle;
        result
    }

    async fn supervise(&mut self) -> Result<i32, SupervisorError> {
        let mut watcher = self.options.watch_paths.as_ref().map(|paths| {
            tracing::info!(paths = paths.len(), "Watching for file changes");
            FileWatcher::new(paths)
        });
        let mut signals = if self.options.relay_signals {
            Some(SignalListener::new()?)
        } else {
            None
        };

        loop {
            self.state = SupervisorState::Starting;
            match self.run_worker(&mut watcher, &mut signals).await? {
                RunOutcome::Reload => {
                    self.state = SupervisorState::Reloading;
                    tracing::info!("Worker reloading, starting a new one");
                }
                RunOutcome::Exit(code) => {
                    tracing::info!(code, "Worker exited, stopping server");
                    return Ok(code);
                }
            }
        }
    }

    async fn run_worker(
        &mut self,
        watcher: &mut Option<FileWatcher>,
        signals: &mut Option<SignalListener>,
    ) -> Result<RunOutcome, SupervisorError> {
        let mut child = self.command().spawn().map_err(|source| SupervisorError::Spawn {
            program: self.options.command.program.clone(),
            source,
        })?;
        let pid = child.id();
        if let Some(pid) = pid {
            self.inspector.state_file().write_process_id(pid)?;
        }
        self.runs += 1;
        self.state = SupervisorState::Running;
        tracing::debug!(pid, run = self.runs, "Worker started");

        let mut lines: Option<OutputLines> =
            child.stdout.take().map(|stdout| BufReader::new(stdout).lines());

        let period = self.options.watch_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut scan: Option<WatchScan> = None;
        let status = loop {
            tokio::select! {
                line = next_line(&mut lines), if lines.is_some() => match line {
                    Some(line) => relay_line(&line),
                    None => lines = None,
                },
                _ = ticker.tick(), if watcher.is_some() => {
                    scan = watcher.take().map(|mut watcher| {
                        tokio::task::spawn_blocking(move || {
                            let changed = watcher.check_changed();
                            (watcher, changed)
                        })
                    });
                },
                changed = finish_scan(&mut scan, watcher), if scan.is_some() => {
                    if changed && self.state == SupervisorState::Running {
                        tracing::info!("Application change detected. Restarting...");
                        self.state = SupervisorState::Reloading;
                        if !self.inspector.reload() {
                            tracing::warn!("Failed to signal worker to reload");
                        }
                    }
                },
                signal = next_signal(signals), if signals.is_some() => {
                    tracing::info!(signal = signal_name(signal), "Forwarding signal to worker");
                    if let Some(pid) = pid {
                        self.inspector.signaller().signal(pid, signal);
                    }
                },
                status = child.wait() => break status?,
            }
        };

        if scan.is_some() {
            finish_scan(&mut scan, watcher).await;
        }

        if let Some(mut lines) = lines {
            let drain = async {
                while let Ok(Some(line)) = lines.next_line().await {
                    relay_line(&line);
                }
            };
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, drain).await.is_err() {
                tracing::debug!("Worker output still open after exit");
            }
        }

        Ok(RunOutcome::from_code(exit_code(status)))
    }

    fn command(&self) -> Command {
        let worker = &self.options.command;
        let mut cmd = Command::new(&worker.program);
        cmd.args(&worker.args)
            .env("APP_ENV", &self.options.app_env)
            .env("APP_BASE_PATH", &self.options.base_path)
            .env(SUPERVISED_ENV, "1")
            .env(STATE_FILE_ENV, self.inspector.state_file().path())
            .envs(worker.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = &worker.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }

    fn write_running_banner(&self) {
        tracing::info!("Server running…");
        tracing::info!("  Local: {}", self.record.local_url());
        tracing::info!("  Press Ctrl+C to stop the server");
    }
}

async fn next_line(lines: &mut Option<OutputLines>) -> Option<String> {
    match lines {
        Some(lines) => match lines.next_line().await {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to read worker output");
                None
            }
        },
        None => std::future::pending().await,
    }
}

/// Wait for an in-flight watch scan and put the watcher back.
///
/// A scan that panicked loses its watcher, which turns watching off.
async fn finish_scan(scan: &mut Option<WatchScan>, watcher: &mut Option<FileWatcher>) -> bool {
    let Some(task) = scan.as_mut() else {
        return std::future::pending().await;
    };
    let result = task.await;
    *scan = None;
    match result {
        Ok((restored, changed)) => {
            *watcher = Some(restored);
            changed
        }
        Err(err) => {
            tracing::warn!(error = %err, "File watch scan failed, watching disabled");
            false
        }
    }
}

async fn next_signal(signals: &mut Option<SignalListener>) -> i32 {
    match signals {
        Some(listener) => listener.recv().await,
        None => std::future::pending().await,
    }
}

/// Exit code of a finished worker; a signal death reports the signal number.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return signal;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_code_restarts() {
        assert_eq!(RunOutcome::from_code(RELOAD_EXIT_CODE), RunOutcome::Reload);
        assert_eq!(RunOutcome::from_code(0), RunOutcome::Exit(0));
        assert_eq!(RunOutcome::from_code(15), RunOutcome::Exit(15));
    }

    #[test]
    fn options_default_to_no_watching() {
        let options = SupervisorOptions::new(WorkerCommand::new("worker").args(["-v"]), "/srv");
        assert!(options.watch_paths.is_none());
        assert_eq!(options.watch_interval, DEFAULT_WATCH_INTERVAL);
        assert_eq!(options.command.args, vec!["-v".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn signal_deaths_report_the_signal() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(exit_code(ExitStatus::from_raw(15)), 15);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
    }
}
