//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the bridge server.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listener configuration (host and port workers bind to).
    pub listener: ListenerConfig,

    /// Worker pool sizing and recycling.
    pub workers: WorkersConfig,

    /// Filesystem locations.
    pub paths: PathsConfig,

    /// Application identity and mode.
    pub app: AppConfig,

    /// File watching for automatic reloads.
    pub watch: WatchConfig,

    /// How to launch the worker executable.
    pub worker: WorkerProcessConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl BridgeConfig {
    /// State file location, defaulting to `<storage>/logs/bridgehead-server-state.json`.
    pub fn state_file_path(&self) -> PathBuf {
        match &self.paths.state_file {
            Some(path) => self.resolve(path),
            None => self
                .resolve(&self.paths.storage)
                .join("logs")
                .join("bridgehead-server-state.json"),
        }
    }

    /// Resolve a possibly relative path against the base path.
    pub fn resolve(&self, path: &std::path::Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.paths.base.join(path)
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host or IP address to bind (e.g., "127.0.0.1").
    pub host: String,

    /// TCP port.
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WorkersConfig {
    /// Number of workers recorded for the server.
    pub count: usize,

    /// Requests a worker handles before it is recycled (0 disables).
    pub max_requests: u64,

    /// Maximum buffered request body in bytes.
    pub max_body_size: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: 1,
            max_requests: 500,
            max_body_size: crate::state::file::DEFAULT_MAX_BODY_SIZE,
        }
    }
}

/// Filesystem locations. Relative paths resolve against `base`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub base: PathBuf,
    pub public: Option<PathBuf>,
    pub storage: PathBuf,
    pub state_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base: PathBuf::from("."),
            public: Some(PathBuf::from("public")),
            storage: PathBuf::from("storage"),
            state_file: None,
        }
    }
}

/// Application identity, handed to workers as `appConfig`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,

    /// Environment name (`local`, `testing`, `production`, ...).
    pub env: String,

    /// Send error diagnostics to clients.
    pub debug: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "bridgehead".to_string(),
            env: "production".to_string(),
            debug: false,
        }
    }
}

/// File watching configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WatchConfig {
    pub enabled: bool,

    /// Files, directories or globs relative to the base path. A trailing
    /// `*.ext` segment filters file names.
    pub paths: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            paths: vec![
                "src".to_string(),
                "config".to_string(),
                "Cargo.lock".to_string(),
                ".env".to_string(),
            ],
        }
    }
}

/// Worker executable configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
#[serde(default)]
pub struct WorkerProcessConfig {
    /// Worker program; defaults to `bridgehead-worker` next to the supervisor.
    pub command: Option<PathBuf>,

    pub args: Vec<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
