//! File responses.
//!
//! The body is read by the response's preparation step, so a handler can
//! still hold the response and adjust headers before the read happens.

use crate::error::Fault;
use crate::reply::Reply;
use crate::request::Request;
use crate::response::{preparation, Response, Source};
use crate::route::{self, HandlerFn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispositionMode {
    Attachment,
    Inline,
}

impl DispositionMode {
    fn as_str(self) -> &'static str {
        match self {
            DispositionMode::Attachment => "attachment",
            DispositionMode::Inline => "inline",
        }
    }
}

/// Options for [`Reply::file`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOptions {
    /// Filename announced in `content-disposition` (defaults to the file's own)
    #[serde(default)]
    pub filename: Option<String>,
    /// Send a `content-disposition` header
    #[serde(default)]
    pub mode: Option<DispositionMode>,
}

/// Route handler configuration for a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    pub path: PathBuf,
    #[serde(flatten)]
    pub options: FileOptions,
}

impl FileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            options: FileOptions::default(),
        }
    }
}

/// Content type by file extension.
#[must_use]
pub fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
        .as_str()
    {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// A file response whose preparation reads `path`.
pub(crate) fn response(path: PathBuf, options: FileOptions) -> Response {
    let target = path.clone();
    Response::file(path).with_preparation(preparation(move |mut response, _request| async move {
        let meta = tokio::fs::metadata(&target).await.map_err(Fault::from)?;
        if meta.is_dir() {
            return Err(Fault::forbidden(format!(
                "Cannot send a directory: {}",
                target.display()
            )));
        }
        let bytes = tokio::fs::read(&target).await.map_err(Fault::from)?;

        response.set_header("content-type", content_type(&target));
        response.set_header("content-length", bytes.len().to_string());
        if let Some(mode) = options.mode {
            let filename = options.filename.clone().or_else(|| {
                target
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            });
            let value = match filename {
                Some(name) => format!("{}; filename=\"{}\"", mode.as_str(), name.replace('"', "")),
                None => mode.as_str().to_string(),
            };
            response.set_header("content-disposition", value);
        }
        response.set_source(Source::Bytes(bytes.into()));
        Ok(response)
    }))
}

pub(crate) fn handler(config: FileConfig) -> HandlerFn {
    route::handler(move |_request: &Request, reply: Reply| {
        drop(reply.file(config.path.clone(), config.options.clone()));
    })
}
