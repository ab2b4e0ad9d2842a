//! Static-file fast path.
//!
//! Decides whether a request can skip the application entirely and be served
//! straight from the public directory, and hands accepted requests to
//! `tower_http`'s file service.

use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::{Request, Response};
use percent_encoding::percent_decode_str;
use tower::ServiceExt;
use tower_http::services::ServeFile;

/// Extensions that are never served as files, compared case-insensitively.
pub const BLOCKED_EXTENSIONS: [&str; 3] = ["php", "htaccess", "config"];

/// Drop `.` segments and resolve `..` against the segments seen so far.
///
/// The result always starts with `/` and can never climb above it.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Resolve `request_path` to a servable file under `public_root`, if any.
pub fn resolve_static(request_path: &str, public_root: Option<&Path>) -> Option<PathBuf> {
    let root = public_root?;

    let decoded = percent_decode_str(request_path).decode_utf8_lossy();
    let normalized = normalize_path(&decoded);
    if normalized == "/" {
        return None;
    }

    let candidate = root.join(normalized.trim_start_matches('/'));
    if !candidate.starts_with(root) {
        return None;
    }

    let blocked = candidate
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            BLOCKED_EXTENSIONS
                .iter()
                .any(|blocked| ext.eq_ignore_ascii_case(blocked))
        });
    if blocked {
        return None;
    }

    // metadata() follows symlinks, so a link to a regular file is accepted.
    match std::fs::metadata(&candidate) {
        Ok(meta) if meta.is_file() => Some(candidate),
        _ => None,
    }
}

/// Whether `request_path` should bypass the application.
pub fn can_serve_as_static(request_path: &str, public_root: Option<&Path>) -> bool {
    resolve_static(request_path, public_root).is_some()
}

/// Serve an already-resolved file through the file service.
pub async fn serve_static(path: &Path, request: Request<Body>) -> Response<Body> {
    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}
