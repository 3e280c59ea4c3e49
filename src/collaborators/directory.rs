//! Directory handler collaborator.

use super::file::FileOptions;
use super::views::map_path;
use crate::error::{ConfigError, Fault};
use crate::reply::Reply;
use crate::request::Request;
use crate::route::{self, HandlerFn, RouteInfo};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

fn default_param() -> String {
    "path".to_string()
}

/// Route handler configuration for a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryOptions {
    /// Base directory served
    pub path: PathBuf,
    /// File served when the requested path names a directory (ends with `/` or is empty)
    #[serde(default)]
    pub index: Option<String>,
    /// Path parameter holding the requested tail
    #[serde(default = "default_param")]
    pub param: String,
}

impl DirectoryOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            index: None,
            param: default_param(),
        }
    }

    #[must_use]
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }
}

/// Builds handlers for `HandlerConfig::Directory` routes.
pub trait DirectoryHandler: Send + Sync {
    fn handler(&self, route: &RouteInfo, options: &DirectoryOptions)
        -> Result<HandlerFn, ConfigError>;
}

/// Serves files under a base directory through [`Reply::file`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticDirectory;

impl DirectoryHandler for StaticDirectory {
    fn handler(
        &self,
        route: &RouteInfo,
        options: &DirectoryOptions,
    ) -> Result<HandlerFn, ConfigError> {
        if options.param.is_empty() {
            return Err(ConfigError::InvalidSettings {
                reason: format!(
                    "directory handler for {} {} needs a path parameter name",
                    route.method, route.path
                ),
            });
        }
        let options = options.clone();
        Ok(route::handler(move |request: &Request, reply: Reply| {
            let tail = request.param(&options.param).unwrap_or("");
            match resolve_file(&options, tail) {
                Some(path) => {
                    debug!(request_id = %request.id(), path = %path.display(), "serving file");
                    drop(reply.file(path, FileOptions::default()));
                }
                None => drop(reply.fail(Fault::forbidden(format!("Invalid path: {tail}")))),
            }
        }))
    }
}

fn resolve_file(options: &DirectoryOptions, tail: &str) -> Option<PathBuf> {
    let mut path = map_path(&options.path, tail)?;
    let names_directory = tail.is_empty() || tail.ends_with('/');
    if names_directory {
        if let Some(index) = &options.index {
            path.push(index);
        }
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_file_with_index() {
        let options = DirectoryOptions::new("/srv/www").index("index.html");
        assert_eq!(
            resolve_file(&options, "docs/"),
            Some(PathBuf::from("/srv/www/docs/index.html"))
        );
        assert_eq!(
            resolve_file(&options, "docs/a.txt"),
            Some(PathBuf::from("/srv/www/docs/a.txt"))
        );
        assert_eq!(
            resolve_file(&options, ""),
            Some(PathBuf::from("/srv/www/index.html"))
        );
    }

    #[test]
    fn test_resolve_file_rejects_traversal() {
        let options = DirectoryOptions::new("/srv/www");
        assert_eq!(resolve_file(&options, "../etc/passwd"), None);
    }

    #[test]
    fn test_empty_param_is_config_error() {
        let mut options = DirectoryOptions::new("/srv/www");
        options.param.clear();
        let info = RouteInfo {
            method: http::Method::GET,
            path: "/static/{path}".to_string(),
        };
        assert!(matches!(
            StaticDirectory.handler(&info, &options),
            Err(ConfigError::InvalidSettings { .. })
        ));
    }
}
