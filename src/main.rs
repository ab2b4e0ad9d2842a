//! Bridgehead supervisor
//!
//! Starts and controls the application server.
//!
//! # Architecture Overview
//!
//! ```text
//!   bridgehead start ──────────────────────────────────────────────┐
//!   │ config + flags → state file → spawn bridgehead-worker        │
//!   │                                                              │
//!   │   ┌────────────────── worker process ───────────────────┐    │
//!   │   │ listener → handler → static file? ──────────┐       │    │
//!   │   │              │                              ▼       │    │
//!   │   │              └→ translate → Application → emit → slot    │
//!   │   │ stdout: one JSON log record per line ─────────────────┼──▶ relay
//!   │   └─────────────────────────────────────────────────────┘    │
//!   │ watch timer → changed? → SIGUSR1 → worker exits → restart     │
//!   └──────────────────────────────────────────────────────────────┘
//!
//!   bridgehead stop | status | reload → state file pid → signal
//! ```

use std::process::ExitCode;

use clap::Parser;

use bridgehead::cli::{commands, Cli, Commands};
use bridgehead::config::{load_config_or_default, validate_config, ConfigError};
use bridgehead::observability::init_supervisor_logging;
use bridgehead::state::ServerStateFile;
use bridgehead::supervisor::ProcessInspector;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match load_config_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("bridgehead: {err}");
            return ExitCode::FAILURE;
        }
    };

    init_supervisor_logging(&config.observability.log_level);

    let code = match cli.command {
        Commands::Start(args) => {
            commands::apply_start_overrides(&mut config, &args);
            if let Err(errors) = validate_config(&config) {
                tracing::error!(error = %ConfigError::Validation(errors), "Invalid configuration");
                return ExitCode::FAILURE;
            }
            tracing::info!(
                host = %config.listener.host,
                port = config.listener.port,
                workers = config.workers.count,
                max_requests = config.workers.max_requests,
                watch = config.watch.enabled,
                "Configuration loaded"
            );
            commands::start(&config).await
        }
        Commands::Stop => commands::stop(&inspector(&config)),
        Commands::Status => commands::status(&inspector(&config)),
        Commands::Reload => commands::reload(&inspector(&config)),
    };

    exit_code(code)
}

fn inspector(config: &bridgehead::BridgeConfig) -> ProcessInspector {
    ProcessInspector::new(ServerStateFile::new(config.state_file_path()))
}

fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map(ExitCode::from).unwrap_or(ExitCode::FAILURE)
}
