//! Bridgehead: run a long-lived application behind an async HTTP server and
//! keep its worker process alive, observable and reloadable.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod echo;
pub mod lifecycle;
pub mod observability;
pub mod state;
pub mod supervisor;
pub mod worker;

pub use bridge::{AppRequest, AppResponse, Application, ApplicationError};
pub use config::BridgeConfig;
pub use lifecycle::Shutdown;
pub use supervisor::Supervisor;
pub use worker::WorkerServer;
