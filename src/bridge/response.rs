//! Application response → transport response emission.
//!
//! # Responsibilities
//! - Turn a buffered, streamed or file-backed response into ordered body chunks
//! - Add the `Date` header when the application left it out
//! - Attach custom reason phrases for non-standard status codes
//!
//! # Design Decisions
//! - Streaming callbacks run synchronously on the handling turn; every
//!   non-empty write becomes its own chunk, in order
//! - Chunk selection is first-match-wins: file, captured output, stream,
//!   materialized content

use std::convert::Infallible;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use bytes::{Bytes, BytesMut};
use hyper::ext::ReasonPhrase;

/// Reason phrases for status codes the transport does not know by name.
const STATUS_CODE_REASONS: [(u16, &str); 6] = [
    (419, "Page Expired"),
    (418, "I'm a teapot"),
    (425, "Too Early"),
    (444, "Connection Closed Without Response"),
    (499, "Client Closed Request"),
    (599, "Network Connect Timeout Error"),
];

/// Custom reason phrase for `code`, if it has one.
pub fn reason_phrase(code: u16) -> Option<&'static str> {
    STATUS_CODE_REASONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, reason)| *reason)
}

/// Output captured while the application ran.
///
/// Each non-empty write is kept as a separate chunk.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    chunks: Vec<Bytes>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: impl Into<Bytes>) {
        let data = data.into();
        if !data.is_empty() {
            self.chunks.push(data);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn into_chunks(self) -> Vec<Bytes> {
        self.chunks
    }

    /// Everything written, concatenated; `None` when nothing was written.
    pub fn into_contents(self) -> Option<Bytes> {
        match self.chunks.len() {
            0 => None,
            1 => self.chunks.into_iter().next(),
            _ => {
                let mut joined = BytesMut::new();
                for chunk in &self.chunks {
                    joined.extend_from_slice(chunk);
                }
                Some(joined.freeze())
            }
        }
    }
}

impl io::Write for OutputBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.push(Bytes::copy_from_slice(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Body generator for streamed responses.
pub type StreamCallback = Box<dyn FnOnce(&mut OutputBuffer) + Send + 'static>;

/// The three shapes of application response body.
pub enum AppBody {
    Buffered(Bytes),
    Streamed(StreamCallback),
    File(PathBuf),
}

impl std::fmt::Debug for AppBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppBody::Buffered(b) => f.debug_tuple("Buffered").field(&b.len()).finish(),
            AppBody::Streamed(_) => f.write_str("Streamed(..)"),
            AppBody::File(p) => f.debug_tuple("File").field(p).finish(),
        }
    }
}

/// Response produced by the application for one request.
#[derive(Debug)]
pub struct AppResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: AppBody,
}

impl AppResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: AppBody::Buffered(body.into()),
        }
    }

    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn streamed(
        status: StatusCode,
        callback: impl FnOnce(&mut OutputBuffer) + Send + 'static,
    ) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: AppBody::Streamed(Box::new(callback)),
        }
    }

    pub fn file(status: StatusCode, path: impl Into<PathBuf>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: AppBody::File(path.into()),
        }
    }

    /// Append a header value, keeping earlier values for the same name.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }
}

/// A response ready for the transport, with its body already split into chunks.
#[derive(Debug)]
pub struct EmittedResponse {
    pub status: StatusCode,
    pub reason: Option<&'static str>,
    pub headers: HeaderMap,
    pub chunks: Vec<Bytes>,
}

impl EmittedResponse {
    /// Concatenated body, mostly useful for inspection.
    pub fn body_bytes(&self) -> Bytes {
        let mut joined = BytesMut::new();
        for chunk in &self.chunks {
            joined.extend_from_slice(chunk);
        }
        joined.freeze()
    }

    pub fn into_response(self) -> Response<Body> {
        let body = if self.chunks.is_empty() {
            Body::empty()
        } else {
            Body::from_stream(futures_util::stream::iter(
                self.chunks.into_iter().map(Ok::<_, Infallible>),
            ))
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        if let Some(reason) = self.reason {
            response
                .extensions_mut()
                .insert(ReasonPhrase::from_static(reason.as_bytes()));
        }
        response
    }
}

/// Convert an application response (plus any captured output) for the transport.
///
/// Fails only when a file-backed body cannot be read.
pub fn emit(response: AppResponse, output: Option<Bytes>) -> io::Result<EmittedResponse> {
    let AppResponse {
        status,
        mut headers,
        body,
    } = response;

    if !headers.contains_key(header::DATE) {
        if let Ok(date) = HeaderValue::from_str(&httpdate::fmt_http_date(SystemTime::now())) {
            headers.insert(header::DATE, date);
        }
    }

    Ok(EmittedResponse {
        status,
        reason: reason_phrase(status.as_u16()),
        headers,
        chunks: body_chunks(body, output)?,
    })
}

fn body_chunks(body: AppBody, output: Option<Bytes>) -> io::Result<Vec<Bytes>> {
    if let AppBody::File(path) = &body {
        return Ok(vec![read_file(path)?]);
    }

    if let Some(output) = output.filter(|o| !o.is_empty()) {
        return Ok(vec![output]);
    }

    match body {
        AppBody::Streamed(callback) => {
            let mut buffer = OutputBuffer::new();
            callback(&mut buffer);
            Ok(buffer.into_chunks())
        }
        AppBody::Buffered(content) if content.is_empty() => Ok(Vec::new()),
        AppBody::Buffered(content) => Ok(vec![content]),
        AppBody::File(_) => Ok(Vec::new()),
    }
}

fn read_file(path: &Path) -> io::Result<Bytes> {
    std::fs::read(path).map(Bytes::from)
}
