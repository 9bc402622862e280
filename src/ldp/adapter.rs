//! Verb dispatch from LDP requests onto the filesystem.

use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::error::LdpError;
use crate::http::mime;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::ldp::path::ResolvedPath;
use crate::ldp::turtle::{self, DirectoryEntry};

/// Methods with a handler, as advertised in `Allow`.
pub const ALLOWED_METHODS: &str = "OPTIONS, HEAD, GET, POST, PUT, DELETE";

const INDEX_FILE: &str = "index.html";
const BROWSER_PAGE: &str = include_str!("browser.html");

/// Translates requests on resolved pod paths into filesystem operations.
///
/// The adapter holds no per-request state and can be shared freely between
/// connections. Faults never escape [`ProtocolAdapter::handle`]: they come
/// back as error responses.
#[derive(Debug, Clone, Default)]
pub struct ProtocolAdapter {
    uri_prefix: String,
}

impl ProtocolAdapter {
    /// `uri_prefix` is prepended to every `Location` value, e.g.
    /// `https://localhost:8443`.
    pub fn new(uri_prefix: Option<String>) -> Self {
        Self {
            uri_prefix: uri_prefix.unwrap_or_default(),
        }
    }

    pub async fn handle(&self, target: &ResolvedPath, request: &Request) -> Response {
        let result = match request.method {
            Method::GET | Method::HEAD => self.get(target, request).await,
            Method::OPTIONS => self.options(target).await,
            Method::POST => self.post(target, request).await,
            Method::PUT => self.put(target, request).await,
            Method::DELETE => self.delete(target).await,
            Method::PATCH => Err(LdpError::MethodNotAllowed),
        };

        match result {
            Ok(response) => response,
            Err(LdpError::MethodNotAllowed) => {
                let mut response = LdpError::MethodNotAllowed.into_response();
                response.set_header("Allow", ALLOWED_METHODS);
                response
            }
            Err(e) => {
                if let LdpError::Internal(source) = &e {
                    tracing::error!(
                        method = %request.method,
                        path = %target.fs_path.display(),
                        error = %source,
                        "filesystem operation failed"
                    );
                }
                e.into_response()
            }
        }
    }

    async fn get(&self, target: &ResolvedPath, request: &Request) -> Result<Response, LdpError> {
        let meta = existing(&target.fs_path).await?;
        if !meta.is_dir() {
            return read_file(&target.fs_path).await;
        }

        if prefers_html(request.header("Accept")) {
            let index = target.fs_path.join(INDEX_FILE);
            return match tokio::fs::metadata(&index).await {
                Ok(m) if m.is_file() => read_file(&index).await,
                _ => Ok(ResponseBuilder::new(StatusCode::Ok)
                    .header("Content-Type", "text/html; charset=utf-8")
                    .body(BROWSER_PAGE)
                    .build()),
            };
        }

        let container = DirectoryEntry::from_metadata("", &meta);
        let children = list_children(&target.fs_path).await?;
        let body = turtle::render_container(&target.uri_path, &container, &children);

        Ok(ResponseBuilder::new(StatusCode::Ok)
            .header("Content-Type", turtle::TURTLE_CONTENT_TYPE)
            .body(body)
            .build())
    }

    async fn options(&self, target: &ResolvedPath) -> Result<Response, LdpError> {
        let meta = existing(&target.fs_path).await?;
        let mut builder = ResponseBuilder::new(StatusCode::NoContent).header("Allow", ALLOWED_METHODS);
        if meta.is_dir() {
            builder = builder.header("Accept-Post", "text/turtle, */*");
        }
        Ok(builder.build())
    }

    async fn post(&self, target: &ResolvedPath, request: &Request) -> Result<Response, LdpError> {
        let meta = existing(&target.fs_path).await?;
        if !meta.is_dir() {
            return Err(LdpError::Validation("POST url must be a directory".into()));
        }

        let slug = request
            .header("Slug")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| LdpError::Validation("POST must contain a slug header".into()))?;
        validate_slug(slug)?;
        let link = request
            .header("Link")
            .ok_or_else(|| LdpError::Validation("POST must contain a link header".into()))?;

        if link.contains("BasicContainer") {
            let dir = target.fs_path.join(slug);
            tokio::fs::create_dir(&dir).await.map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => LdpError::Conflict(format!("{slug} already exists")),
                _ => LdpError::Internal(e),
            })?;
            tracing::debug!(path = %dir.display(), "container created");
            Ok(self.created(format!("{}/", target.child_uri(slug)), "Directory created"))
        } else if link.contains("Resource") {
            let name = resource_name(slug, request.header("Content-Type"))?;
            let file_path = target.fs_path.join(&name);
            let mut file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&file_path)
                .await
                .map_err(|e| match e.kind() {
                    ErrorKind::AlreadyExists => LdpError::Conflict(format!("{name} already exists")),
                    _ => LdpError::Internal(e),
                })?;
            file.write_all(&request.body).await?;
            file.flush().await?;
            tracing::debug!(path = %file_path.display(), bytes = request.body.len(), "resource created");
            Ok(self.created(target.child_uri(&name), "File created"))
        } else {
            Err(LdpError::Validation("POST must contain a valid link header".into()))
        }
    }

    async fn put(&self, target: &ResolvedPath, request: &Request) -> Result<Response, LdpError> {
        if target.is_root() {
            return Err(LdpError::Conflict("cannot PUT onto a container".into()));
        }
        match tokio::fs::metadata(&target.fs_path).await {
            Ok(meta) if meta.is_dir() => {
                return Err(LdpError::Conflict("cannot PUT onto a container".into()));
            }
            _ => {}
        }

        if let Some(parent) = target.fs_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(ancestor_error)?;
        }
        tokio::fs::write(&target.fs_path, &request.body)
            .await
            .map_err(ancestor_error)?;

        tracing::debug!(path = %target.fs_path.display(), bytes = request.body.len(), "resource written");
        Ok(self.created(target.uri_path.clone(), "File created"))
    }

    async fn delete(&self, target: &ResolvedPath) -> Result<Response, LdpError> {
        let meta = existing(&target.fs_path).await?;
        if meta.is_dir() {
            let mut entries = tokio::fs::read_dir(&target.fs_path).await?;
            if entries.next_entry().await?.is_some() {
                return Err(LdpError::Conflict("Directory not Empty".into()));
            }
            tokio::fs::remove_dir(&target.fs_path).await?;
        } else {
            tokio::fs::remove_file(&target.fs_path).await?;
        }
        tracing::debug!(path = %target.fs_path.display(), "removed");
        Ok(ResponseBuilder::new(StatusCode::NoContent).build())
    }

    fn created(&self, uri: String, message: &str) -> Response {
        ResponseBuilder::new(StatusCode::Created)
            .header("Location", format!("{}{}", self.uri_prefix, uri))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(message.as_bytes())
            .build()
    }
}

/// Metadata of an existing target, or 404. Runs before any other logic so a
/// lookup can never create anything.
async fn existing(path: &Path) -> Result<Metadata, LdpError> {
    tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound | ErrorKind::NotADirectory => LdpError::NotFound,
        _ => LdpError::Internal(e),
    })
}

async fn read_file(path: &Path) -> Result<Response, LdpError> {
    let content = tokio::fs::read(path).await?;
    let mut builder = ResponseBuilder::new(StatusCode::Ok);
    if let Some(content_type) = mime::content_type_for_path(path) {
        builder = builder.header("Content-Type", content_type);
    }
    Ok(builder.body(content).build())
}

async fn list_children(dir: &Path) -> Result<Vec<DirectoryEntry>, LdpError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut children = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        match tokio::fs::metadata(entry.path()).await {
            Ok(meta) => children.push(DirectoryEntry::from_metadata(name, &meta)),
            // dangling symlinks and entries removed mid-listing
            Err(e) => tracing::debug!(entry = %name, error = %e, "skipping unreadable entry"),
        }
    }
    Ok(children)
}

/// True when the client asks for HTML and does not accept Turtle.
pub fn prefers_html(accept: Option<&str>) -> bool {
    accept.is_some_and(|a| a.contains("text/html") && !a.contains("text/turtle"))
}

fn validate_slug(slug: &str) -> Result<(), LdpError> {
    if slug == "." || slug == ".." || slug.contains(['/', '\\', '\0']) {
        return Err(LdpError::Validation(format!("invalid slug {slug:?}")));
    }
    Ok(())
}

/// File name for a POSTed resource: the slug, plus an extension derived from
/// Content-Type when the slug has none.
fn resource_name(slug: &str, content_type: Option<&str>) -> Result<String, LdpError> {
    if Path::new(slug).extension().is_some() {
        return Ok(slug.to_string());
    }
    let ext = content_type
        .and_then(mime::extension_for_content_type)
        .ok_or_else(|| {
            LdpError::Validation("slug has no extension and content-type is missing or unknown".into())
        })?;
    Ok(format!("{slug}.{ext}"))
}

fn ancestor_error(e: std::io::Error) -> LdpError {
    match e.kind() {
        ErrorKind::AlreadyExists | ErrorKind::NotADirectory => {
            LdpError::Conflict("an ancestor of the target is not a container".into())
        }
        _ => LdpError::Internal(e),
    }
}
