//! Configuration loading from disk.

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::BridgeConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "bridgehead.toml";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: BridgeConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load `path` if given, otherwise the default file; a missing default file
/// yields the default configuration.
pub fn load_config_or_default(path: Option<&Path>) -> Result<BridgeConfig, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => match load_config(Path::new(DEFAULT_CONFIG_FILE)) {
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                Ok(BridgeConfig::default())
            }
            other => other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridgehead.toml");
        fs::write(&path, "[listener]\nport = 8080\n").unwrap();
        assert_eq!(load_config(&path).unwrap().listener.port, 8080);

        fs::write(&path, "[listener]\nport = 0\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Validation(_))));

        fs::write(&path, "[listener\n").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_or_default(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
        assert!(err.to_string().starts_with("IO error"));
    }

    #[test]
    fn validation_errors_are_listed_together() {
        use std::error::Error as _;

        let err = ConfigError::Validation(vec![
            ValidationError {
                field: "listener.port",
                message: "must be non-zero".into(),
            },
            ValidationError {
                field: "workers.count",
                message: "must be non-zero".into(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: listener.port: must be non-zero, workers.count: must be non-zero"
        );
        assert!(err.source().is_none());

        let err = ConfigError::Io(io::Error::new(io::ErrorKind::Other, "denied"));
        assert!(err.source().is_some());
    }
}
