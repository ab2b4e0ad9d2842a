//! Command-line surface of the supervisor binary.

pub mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "bridgehead")]
#[command(about = "Run and control the bridgehead application server", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./bridgehead.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the server and supervise its worker
    Start(StartArgs),
    /// Stop the running server
    Stop,
    /// Report whether the server is running
    Status,
    /// Reload the server's worker
    Reload,
}

/// Flags of `start`; each one overrides the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct StartArgs {
    /// The IP address the server should bind to
    #[arg(long)]
    pub host: Option<String>,

    /// The port the server should be available on
    #[arg(long)]
    pub port: Option<u16>,

    /// The number of workers that should be available to handle requests
    #[arg(long)]
    pub workers: Option<usize>,

    /// The number of requests to process before reloading the worker
    #[arg(long)]
    pub max_requests: Option<u64>,

    /// Automatically reload the server when the application is modified
    #[arg(long)]
    pub watch: bool,

    /// Worker executable to run instead of the bundled one
    #[arg(long)]
    pub worker_command: Option<PathBuf>,

    /// Application environment name (local, testing, production, ...)
    #[arg(long)]
    pub env: Option<String>,
}
