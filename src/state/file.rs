//! The persisted server-state file.
//!
//! Shape on disk:
//! ```text
//! {"masterProcessId": 4242, "state": {"host": "127.0.0.1", "port": 8000, ...}}
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Default request body limit for workers, in bytes.
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

fn default_max_body_size() -> usize {
    DEFAULT_MAX_BODY_SIZE
}

/// Failure reading or writing the state file.
#[derive(Debug, Error)]
pub enum StateFileError {
    #[error("state file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("state file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Run-state shared between the supervisor, its workers and inspection commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStateRecord {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub max_requests: u64,
    pub public_path: Option<PathBuf>,
    pub storage_path: PathBuf,
    #[serde(default)]
    pub app_config: serde_json::Value,
    #[serde(default)]
    pub app_name: String,
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl ServerStateRecord {
    /// Environment name from `appConfig.env`, defaulting to `production`.
    pub fn app_env(&self) -> &str {
        self.app_config
            .get("env")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("production")
    }

    /// Debug flag from `appConfig.debug`.
    pub fn debug(&self) -> bool {
        self.app_config
            .get("debug")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    pub fn local_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Everything the state file holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateFileContents {
    pub master_process_id: Option<u32>,
    pub state: Option<ServerStateRecord>,
}

/// Handle on a state file at a fixed path.
#[derive(Debug, Clone)]
pub struct ServerStateFile {
    path: PathBuf,
}

impl ServerStateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file. A missing file reads as empty contents.
    pub fn read(&self) -> Result<StateFileContents, StateFileError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(StateFileContents::default())
            }
            Err(e) => return Err(self.io_error(e)),
        };

        serde_json::from_slice(&raw).map_err(|source| StateFileError::Json {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the server state, clearing any recorded process id.
    pub fn write_state(&self, state: &ServerStateRecord) -> Result<(), StateFileError> {
        self.write(&StateFileContents {
            master_process_id: None,
            state: Some(state.clone()),
        })
    }

    /// Record the live worker's process id, keeping the server state.
    pub fn write_process_id(&self, pid: u32) -> Result<(), StateFileError> {
        let mut contents = self.read()?;
        contents.master_process_id = Some(pid);
        self.write(&contents)
    }

    /// Remove the file. Removing a missing file is not an error.
    pub fn delete(&self) -> Result<(), StateFileError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    // Temp file in the target directory, then rename over the old file.
    fn write(&self, contents: &StateFileContents) -> Result<(), StateFileError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;

        let json = serde_json::to_vec_pretty(contents).map_err(|source| StateFileError::Json {
            path: self.path.clone(),
            source,
        })?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        tmp.write_all(&json).map_err(|e| self.io_error(e))?;
        tmp.persist(&self.path)
            .map_err(|e| self.io_error(e.error))?;
        Ok(())
    }

    fn io_error(&self, source: io::Error) -> StateFileError {
        StateFileError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
