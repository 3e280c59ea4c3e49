//! View rendering.
//!
//! [`ViewsManager`] is the rendering collaborator; [`TemplateViews`] is the
//! built-in one, rendering minijinja templates from a base directory.

use crate::error::Fault;
use crate::reply::Reply;
use crate::request::Request;
use crate::response::{preparation, Response, Source};
use crate::route::{self, HandlerFn};
use minijinja::Environment;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Options for a single render.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewOptions {
    /// Override the manager's content type
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Rendered view output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub content: String,
    pub content_type: String,
}

/// Rendering collaborator.
pub trait ViewsManager: Send + Sync {
    fn render(&self, template: &str, context: &Value, options: &ViewOptions)
        -> Result<Rendered, Fault>;
}

/// Route handler configuration for a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    pub template: String,
    /// Fixed context; defaults to `{params, query, payload, pre}` of the request
    #[serde(default)]
    pub context: Option<Value>,
    #[serde(default)]
    pub options: ViewOptions,
}

impl ViewConfig {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            context: None,
            options: ViewOptions::default(),
        }
    }
}

/// A view response whose preparation renders through `manager`.
pub(crate) fn response(
    manager: Arc<dyn ViewsManager>,
    template: &str,
    context: Value,
    options: ViewOptions,
) -> Response {
    let name = template.to_string();
    Response::view(template).with_preparation(preparation(move |mut response, _request| async move {
        let rendered = manager.render(&name, &context, &options)?;
        response.set_source(Source::Text(rendered.content));
        response.set_header("content-type", rendered.content_type);
        Ok(response)
    }))
}

pub(crate) fn handler(config: ViewConfig) -> HandlerFn {
    route::handler(move |request: &Request, reply: Reply| {
        let context = config
            .context
            .clone()
            .unwrap_or_else(|| default_context(request));
        drop(reply.view(&config.template, context, config.options.clone()));
    })
}

fn default_context(request: &Request) -> Value {
    let view = request.to_value();
    json!({
        "params": view["params"],
        "query": view["query"],
        "payload": view["payload"],
        "pre": view["pre"],
    })
}

/// Renders `<base_dir>/<template>[.extension]` with minijinja.
pub struct TemplateViews {
    base_dir: PathBuf,
    extension: Option<String>,
    content_type: String,
}

impl TemplateViews {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base_dir: base.into(),
            extension: Some("html".to_string()),
            content_type: "text/html".to_string(),
        }
    }

    /// Template file extension appended when the name has none (default `html`).
    #[must_use]
    pub fn extension(mut self, extension: Option<&str>) -> Self {
        self.extension = extension.map(str::to_string);
        self
    }

    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    fn template_path(&self, template: &str) -> Option<PathBuf> {
        let mut path = map_path(&self.base_dir, template)?;
        if path.extension().is_none() {
            if let Some(ext) = &self.extension {
                path.set_extension(ext);
            }
        }
        Some(path)
    }
}

impl ViewsManager for TemplateViews {
    fn render(
        &self,
        template: &str,
        context: &Value,
        options: &ViewOptions,
    ) -> Result<Rendered, Fault> {
        let path = self
            .template_path(template)
            .ok_or_else(|| Fault::forbidden(format!("Invalid template name: {template}")))?;
        let source = fs::read_to_string(&path).map_err(|err| {
            Fault::bad_implementation(format!("Failed to read view {template}: {err}"))
        })?;
        let mut env = Environment::new();
        env.add_template(template, &source)
            .map_err(|err| Fault::bad_implementation(format!("Invalid view {template}: {err}")))?;
        let content = env
            .get_template(template)
            .and_then(|tmpl| tmpl.render(context))
            .map_err(|err| {
                Fault::bad_implementation(format!("Failed to render view {template}: {err}"))
            })?;
        Ok(Rendered {
            content,
            content_type: options
                .content_type
                .clone()
                .unwrap_or_else(|| self.content_type.clone()),
        })
    }
}

/// Join a relative request/template path under `base`, rejecting anything
/// that would escape it.
pub(crate) fn map_path(base: &Path, relative: &str) -> Option<PathBuf> {
    let mut path = base.to_path_buf();
    for comp in Path::new(relative.trim_start_matches('/')).components() {
        match comp {
            Component::Normal(s) => path.push(s),
            Component::CurDir => {}
            _ => return None,
        }
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_map_path_prevents_traversal() {
        let base = Path::new("/srv/views");
        assert!(map_path(base, "../secret").is_none());
        assert_eq!(
            map_path(base, "/pets/list"),
            Some(PathBuf::from("/srv/views/pets/list"))
        );
    }

    #[test]
    fn test_template_views_render() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = fs::File::create(dir.path().join("hello.html")).unwrap();
        write!(f, "Hello {{{{ name }}}}!").unwrap();

        let views = TemplateViews::new(dir.path());
        let rendered = views
            .render("hello", &json!({"name": "Ada"}), &ViewOptions::default())
            .unwrap();
        assert_eq!(rendered.content, "Hello Ada!");
        assert_eq!(rendered.content_type, "text/html");
    }

    #[test]
    fn test_missing_template_is_fault() {
        let dir = tempfile::tempdir().unwrap();
        let views = TemplateViews::new(dir.path());
        let fault = views
            .render("nope", &json!({}), &ViewOptions::default())
            .unwrap_err();
        assert_eq!(fault.status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
