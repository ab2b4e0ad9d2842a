//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bridgehead::bridge::Application;
use bridgehead::lifecycle::Shutdown;
use bridgehead::observability::LogLineLayer;
use bridgehead::state::ServerStateRecord;
use bridgehead::supervisor::Signaller;
use bridgehead::WorkerServer;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;

/// Server state for a worker on an ephemeral local port.
pub fn state_record(public_path: Option<PathBuf>) -> ServerStateRecord {
    ServerStateRecord {
        host: "127.0.0.1".into(),
        port: 0,
        workers: 1,
        max_requests: 0,
        public_path,
        storage_path: std::env::temp_dir(),
        app_config: serde_json::json!({"env": "production", "debug": false}),
        app_name: "integration".into(),
        max_body_size: 1024 * 1024,
    }
}

/// A worker serving `app` in the background.
pub struct RunningWorker {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<io::Result<i32>>,
}

impl RunningWorker {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown with `code` and wait for the worker's exit code.
    pub async fn stop(self, code: i32) -> i32 {
        self.shutdown.trigger(code);
        self.join().await
    }

    pub async fn join(self) -> i32 {
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("worker did not stop in time")
            .unwrap()
            .unwrap()
    }
}

/// Start a worker for `app` on 127.0.0.1 with an OS-assigned port.
pub async fn start_worker(app: Arc<dyn Application>, state: ServerStateRecord) -> RunningWorker {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = WorkerServer::new(app, state);
    let shutdown = server.shutdown();
    let handle = tokio::spawn(server.run(listener));

    RunningWorker {
        addr,
        shutdown,
        handle,
    }
}

/// HTTP client that never reuses connections between tests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .build()
        .unwrap()
}

/// Signaller that records every call and reports a fixed liveness.
#[derive(Debug, Default)]
pub struct RecordingSignaller {
    pub alive: bool,
    pub sent: Mutex<Vec<(u32, i32)>>,
}

impl RecordingSignaller {
    pub fn alive() -> Self {
        Self {
            alive: true,
            ..Default::default()
        }
    }
}

impl Signaller for RecordingSignaller {
    fn signal(&self, pid: u32, signal: i32) -> bool {
        self.sent.lock().unwrap().push((pid, signal));
        self.alive
    }
}

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Log records captured as protocol JSON lines.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn records(&self) -> Vec<serde_json::Value> {
        let raw = self.0.lock().unwrap().clone();
        String::from_utf8(raw)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Capture this thread's log events until the guard is dropped.
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::registry().with(LogLineLayer::new(logs.clone()));
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
