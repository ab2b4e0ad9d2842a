//! Transport request → application request translation.
//!
//! # Responsibilities
//! - Buffer and classify the request body (none / url-encoded / multipart)
//! - Build CGI-style server variables from the connection and headers
//! - Decode cookies and query/body parameters into nested maps
//! - Stage uploaded file parts into temporary files
//!
//! # Design Decisions
//! - Body parsing happens before the application sees anything; a malformed
//!   body fails the whole request with 400
//! - Non-multipart bodies keep their raw bytes as `content` alongside any
//!   parsed parameters
//! - Staged uploads are owned by the request model and removed on drop
//!   unless the application persists them

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::{header, request::Parts, HeaderMap, Method, Uri, Version};
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use tempfile::TempPath;
use thiserror::Error;

use crate::bridge::params::ParamMap;

/// Prefix of staged upload files in the temp directory.
pub const UPLOAD_PREFIX: &str = "bridgehead.upload.";

/// Failure while turning a transport request into an application request.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("invalid multipart boundary: {0}")]
    Boundary(String),

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] multer::Error),

    #[error("failed to read request body: {0}")]
    Body(String),

    #[error("failed to stage uploaded file: {0}")]
    Staging(#[from] std::io::Error),

    #[error("malformed request: {0}")]
    Malformed(String),
}

/// How the body should be interpreted, derived from `Content-Type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyKind {
    /// No recognised form marker; the body is only available as raw content.
    Opaque,
    UrlEncoded,
    Multipart { boundary: String },
}

impl BodyKind {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, TranslateError> {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        Self::from_content_type(content_type)
    }

    pub fn from_content_type(content_type: &str) -> Result<Self, TranslateError> {
        let trimmed = content_type.trim_start();
        let lower = trimmed.to_ascii_lowercase();

        if lower.starts_with("application/x-www-form-urlencoded") {
            return Ok(BodyKind::UrlEncoded);
        }
        if lower.starts_with("multipart/form-data") {
            return multer::parse_boundary(trimmed)
                .map(|boundary| BodyKind::Multipart { boundary })
                .map_err(|e| TranslateError::Boundary(e.to_string()));
        }
        Ok(BodyKind::Opaque)
    }
}

/// One file part of a multipart body, still in memory.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime_type: String,
    pub contents: Bytes,
}

/// Fields and files decoded from the body.
#[derive(Debug, Clone, Default)]
pub struct Form {
    pub fields: Vec<(String, String)>,
    pub files: Vec<FilePart>,
}

/// Buffered body plus its decoded form, ready for translation.
#[derive(Debug, Clone, Default)]
pub struct ParsedBody {
    /// Raw bytes for anything that is not multipart.
    pub content: Option<Bytes>,
    pub form: Form,
}

/// Buffer and decode the request body.
///
/// Bodyless methods (`GET`, `HEAD`) are not read at all.
pub async fn parse_body(
    parts: &Parts,
    body: Body,
    limit: usize,
) -> Result<ParsedBody, TranslateError> {
    if parts.method == Method::GET || parts.method == Method::HEAD {
        return Ok(ParsedBody::default());
    }

    let kind = BodyKind::from_headers(&parts.headers)?;
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|e| TranslateError::Body(e.to_string()))?;

    match kind {
        BodyKind::Opaque => Ok(ParsedBody {
            content: Some(bytes),
            form: Form::default(),
        }),
        BodyKind::UrlEncoded => {
            let fields = url::form_urlencoded::parse(&bytes).into_owned().collect();
            Ok(ParsedBody {
                content: Some(bytes),
                form: Form {
                    fields,
                    files: Vec::new(),
                },
            })
        }
        BodyKind::Multipart { boundary } => Ok(ParsedBody {
            content: None,
            form: parse_multipart(bytes, boundary).await?,
        }),
    }
}

async fn parse_multipart(bytes: Bytes, boundary: String) -> Result<Form, TranslateError> {
    let stream = futures_util::stream::once(async move { Ok::<_, Infallible>(bytes) });
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut form = Form::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let mime_type = field
                    .content_type()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let contents = field.bytes().await?;
                form.files.push(FilePart {
                    field: name,
                    file_name,
                    mime_type,
                    contents,
                });
            }
            None => {
                let value = field.text().await?;
                form.fields.push((name, value));
            }
        }
    }

    Ok(form)
}

/// An uploaded file staged on disk for the application.
///
/// The temporary file is removed when this value is dropped unless
/// [`UploadedFile::persist`] moved it somewhere permanent.
#[derive(Debug)]
pub struct UploadedFile {
    field_name: String,
    original_name: String,
    mime_type: String,
    size: u64,
    path: TempPath,
}

impl UploadedFile {
    /// Write `part` into a fresh temporary file.
    pub fn stage(part: &FilePart) -> Result<Self, std::io::Error> {
        let mut file = tempfile::Builder::new().prefix(UPLOAD_PREFIX).tempfile()?;
        file.write_all(&part.contents)?;
        file.flush()?;

        Ok(Self {
            field_name: part.field.clone(),
            original_name: part.file_name.clone(),
            mime_type: part.mime_type.clone(),
            size: part.contents.len() as u64,
            path: file.into_temp_path(),
        })
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Location of the staged content.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the staged file to `dest`, taking it out of automatic cleanup.
    pub fn persist(self, dest: impl AsRef<Path>) -> Result<PathBuf, std::io::Error> {
        let dest = dest.as_ref().to_path_buf();
        self.path.persist(&dest).map_err(|e| e.error)?;
        Ok(dest)
    }
}

/// The normalized request handed to the application runtime.
#[derive(Debug)]
pub struct AppRequest {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    /// CGI-style server variables.
    pub server: BTreeMap<String, String>,
    pub query: ParamMap,
    pub body: ParamMap,
    pub cookies: BTreeMap<String, String>,
    pub files: ParamMap<UploadedFile>,
    /// Raw body for non-multipart requests.
    pub content: Option<Bytes>,
}

impl AppRequest {
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Look a key up in the body parameters, then the query string.
    pub fn input(&self, key: &str) -> Option<&str> {
        self.body
            .value(key)
            .or_else(|| self.query.value(key))
            .map(String::as_str)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn server_var(&self, name: &str) -> Option<&str> {
        self.server.get(name).map(String::as_str)
    }

    /// Absolute URL of the request, reconstructed from the `Host` header.
    pub fn full_url(&self) -> String {
        absolute_url(&self.uri, &self.headers)
    }
}

/// Absolute URL for a request target, using `Host` when the target is not
/// already absolute.
pub fn absolute_url(uri: &Uri, headers: &HeaderMap) -> String {
    if uri.scheme().is_some() {
        return uri.to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("http://{host}{path_and_query}")
}

/// Build the application request from the transport request parts.
pub fn translate(
    parts: &Parts,
    remote_addr: SocketAddr,
    body: ParsedBody,
) -> Result<AppRequest, TranslateError> {
    let query: ParamMap = parts
        .uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let mut params = ParamMap::new();
    for (key, value) in body.form.fields {
        params.insert(&key, value);
    }

    let mut files = ParamMap::new();
    for part in &body.form.files {
        if part.file_name.is_empty() && part.contents.is_empty() {
            continue;
        }
        files.insert(&part.field, UploadedFile::stage(part)?);
    }

    Ok(AppRequest {
        method: parts.method.clone(),
        uri: parts.uri.clone(),
        version: parts.version,
        headers: parts.headers.clone(),
        server: server_variables(parts, remote_addr),
        query,
        body: params,
        cookies: cookie_variables(&parts.headers),
        files,
        content: body.content,
    })
}

/// Render a protocol version the way `SERVER_PROTOCOL` expects it.
pub fn protocol_string(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/1.1",
    }
}

fn server_variables(parts: &Parts, remote_addr: SocketAddr) -> BTreeMap<String, String> {
    let mut server = BTreeMap::new();
    server.insert("REMOTE_ADDR".into(), remote_addr.ip().to_string());
    server.insert("REMOTE_PORT".into(), remote_addr.port().to_string());
    server.insert(
        "SERVER_PROTOCOL".into(),
        protocol_string(parts.version).to_string(),
    );
    server.insert("REQUEST_METHOD".into(), parts.method.to_string());
    server.insert(
        "REQUEST_URI".into(),
        parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string()),
    );
    server.insert(
        "QUERY_STRING".into(),
        parts.uri.query().unwrap_or("").to_string(),
    );
    if let Some(host) = parts
        .headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
    {
        let name = host.rsplit_once(':').map_or(host, |(name, _)| name);
        server.insert("SERVER_NAME".into(), name.to_string());
    }

    server.extend(header_variables(&parts.headers));
    server
}

/// `Content-Type` → `HTTP_CONTENT_TYPE` and `CONTENT_TYPE`; `X-Foo` → `HTTP_X_FOO`.
///
/// Repeated headers are joined with `;`.
pub fn header_variables(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for name in headers.keys() {
        let joined = headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect::<Vec<_>>()
            .join(";");
        let key = name.as_str().replace('-', "_").to_ascii_uppercase();

        if key == "CONTENT_TYPE" || key == "CONTENT_LENGTH" {
            vars.insert(key.clone(), joined.clone());
        }
        vars.insert(format!("HTTP_{key}"), joined);
    }
    vars
}

/// Decode every `Cookie` header; a repeated name keeps its last value.
pub fn cookie_variables(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut cookies = BTreeMap::new();
    for value in headers.get_all(header::COOKIE) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let Some((name, raw)) = pair.trim().split_once('=') else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            cookies.insert(name.to_string(), url_decode(raw));
        }
    }
    cookies
}

/// Percent-decode with `+` read as a space.
fn url_decode(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn remote() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    fn parts_of(request: Request<Body>) -> (Parts, Body) {
        request.into_parts()
    }

    #[test]
    fn classifies_content_types() {
        assert_eq!(BodyKind::from_content_type("").unwrap(), BodyKind::Opaque);
        assert_eq!(
            BodyKind::from_content_type("application/json").unwrap(),
            BodyKind::Opaque
        );
        assert_eq!(
            BodyKind::from_content_type("application/x-www-form-urlencoded; charset=UTF-8")
                .unwrap(),
            BodyKind::UrlEncoded
        );
        assert_eq!(
            BodyKind::from_content_type("multipart/form-data; boundary=abc").unwrap(),
            BodyKind::Multipart {
                boundary: "abc".into()
            }
        );
        assert!(matches!(
            BodyKind::from_content_type("multipart/form-data"),
            Err(TranslateError::Boundary(_))
        ));
    }

    #[tokio::test]
    async fn get_requests_use_query_only() {
        let (parts, body) = parts_of(
            Request::get("/foo/bar?name=ada&tags[]=x")
                .body(Body::from("ignored"))
                .unwrap(),
        );
        let parsed = parse_body(&parts, body, 1024).await.unwrap();
        assert!(parsed.content.is_none());

        let request = translate(&parts, remote(), parsed).unwrap();
        assert_eq!(request.input("name"), Some("ada"));
        assert!(request.body.is_empty());
        assert_eq!(request.query.leaf_count(), 2);
    }

    #[tokio::test]
    async fn url_encoded_body_keeps_raw_content() {
        let (parts, body) = parts_of(
            Request::post("/submit")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from("a=1&b%5B%5D=2&b%5B%5D=3&msg=hello+world"))
                .unwrap(),
        );
        let parsed = parse_body(&parts, body, 1024).await.unwrap();
        let request = translate(&parts, remote(), parsed).unwrap();

        assert_eq!(
            request.content.as_deref(),
            Some(&b"a=1&b%5B%5D=2&b%5B%5D=3&msg=hello+world"[..])
        );
        assert_eq!(request.input("a"), Some("1"));
        assert_eq!(request.input("msg"), Some("hello world"));
        assert_eq!(request.body.leaf_count(), 4);
    }

    #[tokio::test]
    async fn opaque_body_is_content_only() {
        let (parts, body) = parts_of(
            Request::post("/json")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"a":1}"#))
                .unwrap(),
        );
        let parsed = parse_body(&parts, body, 1024).await.unwrap();
        let request = translate(&parts, remote(), parsed).unwrap();
        assert_eq!(request.content.as_deref(), Some(&br#"{"a":1}"#[..]));
        assert!(request.body.is_empty());
    }

    #[tokio::test]
    async fn multipart_fields_and_files_are_reachable() {
        let payload = concat!(
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"title\"\r\n\r\n",
            "hello\r\n",
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"tags[]\"\r\n\r\n",
            "a\r\n",
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"tags[]\"\r\n\r\n",
            "b\r\n",
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"avatar\"; filename=\"me.png\"\r\n",
            "Content-Type: image/png\r\n\r\n",
            "PNGDATA\r\n",
            "--XYZ\r\n",
            "Content-Disposition: form-data; name=\"empty\"; filename=\"\"\r\n",
            "Content-Type: application/octet-stream\r\n\r\n",
            "\r\n",
            "--XYZ--\r\n",
        );
        let (parts, body) = parts_of(
            Request::post("/upload")
                .header("content-type", "multipart/form-data; boundary=XYZ")
                .body(Body::from(payload))
                .unwrap(),
        );
        let parsed = parse_body(&parts, body, 4096).await.unwrap();
        assert!(parsed.content.is_none());

        let request = translate(&parts, remote(), parsed).unwrap();
        assert_eq!(request.input("title"), Some("hello"));
        let tags = request.body.get("tags").and_then(|t| t.as_map()).unwrap();
        assert_eq!(tags.value("0").map(String::as_str), Some("a"));
        assert_eq!(tags.value("1").map(String::as_str), Some("b"));

        assert!(!request.files.contains_key("empty"));
        let avatar = request.files.value("avatar").unwrap();
        assert_eq!(avatar.original_name(), "me.png");
        assert_eq!(avatar.mime_type(), "image/png");
        assert_eq!(avatar.field_name(), "avatar");
        assert_eq!(std::fs::read(avatar.path()).unwrap(), b"PNGDATA");
    }

    #[tokio::test]
    async fn malformed_multipart_is_an_error() {
        let (parts, body) = parts_of(
            Request::post("/upload")
                .header("content-type", "multipart/form-data; boundary=XYZ")
                .body(Body::from("--XYZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nnever closed"))
                .unwrap(),
        );
        assert!(matches!(
            parse_body(&parts, body, 4096).await,
            Err(TranslateError::Multipart(_))
        ));
    }

    #[tokio::test]
    async fn oversized_body_is_an_error() {
        let (parts, body) = parts_of(
            Request::post("/big")
                .body(Body::from(vec![b'x'; 64]))
                .unwrap(),
        );
        assert!(matches!(
            parse_body(&parts, body, 16).await,
            Err(TranslateError::Body(_))
        ));
    }

    #[test]
    fn staged_upload_is_removed_on_drop() {
        let part = FilePart {
            field: "doc".into(),
            file_name: "a.txt".into(),
            mime_type: "text/plain".into(),
            contents: Bytes::from_static(b"data"),
        };
        let upload = UploadedFile::stage(&part).unwrap();
        let path = upload.path().to_path_buf();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(UPLOAD_PREFIX));
        drop(upload);
        assert!(!path.exists());
    }

    #[test]
    fn persisted_upload_survives_drop() {
        let dir = tempfile::tempdir().unwrap();
        let part = FilePart {
            field: "doc".into(),
            file_name: "a.txt".into(),
            mime_type: "text/plain".into(),
            contents: Bytes::from_static(b"keep me"),
        };
        let upload = UploadedFile::stage(&part).unwrap();
        let dest = upload.persist(dir.path().join("kept.txt")).unwrap();
        assert_eq!(std::fs::read(dest).unwrap(), b"keep me");
    }

    #[test]
    fn server_variables_follow_cgi_conventions() {
        let (parts, _) = parts_of(
            Request::post("/x?y=1")
                .header("Content-Type", "text/plain")
                .header("Content-Length", "3")
                .header("X-Custom-Thing", "a")
                .header("X-Custom-Thing", "b")
                .header("Host", "example.test:8000")
                .body(Body::empty())
                .unwrap(),
        );
        let server = server_variables(&parts, remote());

        assert_eq!(server["REMOTE_ADDR"], "127.0.0.1");
        assert_eq!(server["REMOTE_PORT"], "9000");
        assert_eq!(server["SERVER_PROTOCOL"], "HTTP/1.1");
        assert_eq!(server["CONTENT_TYPE"], "text/plain");
        assert_eq!(server["HTTP_CONTENT_TYPE"], "text/plain");
        assert_eq!(server["CONTENT_LENGTH"], "3");
        assert_eq!(server["HTTP_CONTENT_LENGTH"], "3");
        assert_eq!(server["HTTP_X_CUSTOM_THING"], "a;b");
        assert_eq!(server["SERVER_NAME"], "example.test");
        assert_eq!(server["QUERY_STRING"], "y=1");
        assert!(!server.contains_key("X_CUSTOM_THING"));
    }

    #[test]
    fn cookies_are_decoded_and_last_wins() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, "color=blue; name=John%20Doe".parse().unwrap());
        headers.append(header::COOKIE, "color=red; plus=a+b".parse().unwrap());

        let cookies = cookie_variables(&headers);
        assert_eq!(cookies["color"], "red");
        assert_eq!(cookies["name"], "John Doe");
        assert_eq!(cookies["plus"], "a b");
    }

    #[test]
    fn full_url_uses_host_header() {
        let (parts, _) = parts_of(
            Request::get("/foo/bar?name=ada")
                .header("Host", "localhost:8000")
                .body(Body::empty())
                .unwrap(),
        );
        let request = translate(&parts, remote(), ParsedBody::default()).unwrap();
        assert_eq!(request.full_url(), "http://localhost:8000/foo/bar?name=ada");
        assert_eq!(request.path(), "/foo/bar");
    }
}
