//! Built-in application that reports back what it received.
//!
//! - `/stream` answers with a streamed body, one chunk per line
//! - `/status/<code>` answers with that status code
//! - `/fail` raises an application error
//! - anything else answers with a JSON description of the request

use axum::http::{header, HeaderValue, StatusCode};
use serde_json::json;

use crate::bridge::{AppRequest, AppResponse, Application, ApplicationError, OutputBuffer};

/// Echoes requests as JSON.
#[derive(Debug, Clone)]
pub struct EchoApplication {
    name: String,
}

impl EchoApplication {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn describe(&self, request: &AppRequest) -> serde_json::Value {
        let files = request.files.map_values(&|file| {
            json!({
                "name": file.original_name(),
                "type": file.mime_type(),
                "size": file.size(),
            })
        });

        json!({
            "app": self.name,
            "method": request.method.as_str(),
            "path": request.path(),
            "url": request.full_url(),
            "remoteAddr": request.server_var("REMOTE_ADDR"),
            "protocol": request.server_var("SERVER_PROTOCOL"),
            "query": request.query,
            "body": request.body,
            "cookies": request.cookies,
            "files": files,
            "content": request
                .content
                .as_ref()
                .map(|c| String::from_utf8_lossy(c).into_owned()),
        })
    }
}

impl Application for EchoApplication {
    fn handle(
        &self,
        request: AppRequest,
        _output: &mut OutputBuffer,
    ) -> Result<AppResponse, ApplicationError> {
        let path = request.path().to_string();

        if path == "/stream" {
            let lines = request.input("lines").and_then(|n| n.parse().ok()).unwrap_or(3);
            return Ok(AppResponse::streamed(StatusCode::OK, move |out| {
                for i in 0..lines {
                    out.push(format!("line {i}\n"));
                }
            })
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/plain")));
        }

        if let Some(code) = path.strip_prefix("/status/") {
            let status = code
                .parse::<u16>()
                .ok()
                .and_then(|c| StatusCode::from_u16(c).ok())
                .ok_or_else(|| ApplicationError::new(format!("invalid status code {code:?}")))?;
            return Ok(AppResponse::new(status, ""));
        }

        if path == "/fail" {
            return Err(ApplicationError::new("requested failure"));
        }

        let body = serde_json::to_vec(&self.describe(&request))
            .map_err(|e| ApplicationError::with_source("cannot encode response", e))?;
        Ok(AppResponse::ok(body).with_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ))
    }

    fn terminate(&self) {
        tracing::info!(app = %self.name, "Application terminated");
    }
}
