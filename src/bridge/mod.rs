//! Request/response bridge between the transport and the application.
//!
//! # Data Flow
//! ```text
//! transport request
//!     → static_files   (GET/HEAD under the public root? serve and stop)
//!     → request        (buffer body, parse form, stage uploads, server vars)
//!     → client.marshal → Application::handle
//!     → client.respond / client.error
//!     → response       (status, reason, Date, ordered body chunks)
//!     → completion     (single assignment, awaited by the dispatcher)
//! ```
//!
//! # Design Decisions
//! - The application is synchronous; only body reads and the completion
//!   wait suspend
//! - Translation failures answer 400 before the application runs

pub mod application;
pub mod client;
pub mod completion;
pub mod params;
pub mod request;
pub mod response;
pub mod static_files;

pub use application::{Application, ApplicationError};
pub use client::BridgeClient;
pub use completion::{completion_slot, CompletionError, CompletionHandle, CompletionSlot};
pub use params::{ParamMap, ParamValue};
pub use request::{AppRequest, TranslateError, UploadedFile};
pub use response::{AppBody, AppResponse, OutputBuffer};
pub use static_files::can_serve_as_static;
