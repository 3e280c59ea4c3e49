//! # Routes and Handler Configuration
//!
//! A [`Route`] is the immutable per-registration configuration shared by every
//! request matching it: the resolved handler, its prerequisite groups, and the
//! bind context handed to handler code.
//!
//! Handlers are configured with the explicit [`HandlerConfig`] variant and
//! resolved once, at registration, into a single [`HandlerFn`]:
//!
//! | Variant     | Resolved by                                        |
//! |-------------|----------------------------------------------------|
//! | `Function`  | used as is                                         |
//! | `Method`    | server-method notation, see [`crate::methods`]     |
//! | `Proxy`     | the server's [`ProxyHandler`] collaborator         |
//! | `File`      | built-in file handler                              |
//! | `Directory` | the server's [`DirectoryHandler`] collaborator     |
//! | `View`      | built-in view handler (needs a views manager)      |

use crate::collaborators::{
    file, views, DirectoryHandler, DirectoryOptions, FileConfig, ProxyHandler, ProxyOptions,
    ViewConfig, ViewsManager,
};
use crate::error::{ConfigError, Fault};
use crate::methods;
use crate::prerequisites::{PrerequisiteGroupConfig, Prerequisites};
use crate::reply::Reply;
use crate::request::Request;
use crate::server::Server;
use futures::FutureExt;
use http::Method;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;

/// Opaque bind context handed to handler code.
pub type Bind = Arc<dyn Any + Send + Sync>;

/// A route handler, prerequisite method, or extension hook.
///
/// Called with the request and a single-use [`Reply`]. It may reply before
/// returning or move the reply elsewhere and reply later.
pub type HandlerFn = Arc<dyn Fn(&Request, Reply) + Send + Sync>;

/// Build a [`HandlerFn`] from a closure.
pub fn handler<F>(f: F) -> HandlerFn
where
    F: Fn(&Request, Reply) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Build a [`HandlerFn`] from an async closure.
///
/// The future is spawned on the current runtime. A panic inside it is
/// reported as a fault through the reply, unless a response was already
/// committed.
pub fn async_handler<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Request, Reply) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |request: &Request, reply: Reply| {
        let abort = reply.abort_handle();
        let future = f(request.clone(), reply);
        let request_id = request.id();
        tokio::spawn(async move {
            if let Err(panic) = AssertUnwindSafe(future).catch_unwind().await {
                let fault = Fault::from_panic(panic);
                error!(
                    request_id = %request_id,
                    message = %fault.message(),
                    "Async handler panicked - converted to fault"
                );
                abort.abort(fault);
            }
        });
    })
}

/// Method and path a route was registered under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub method: Method,
    pub path: String,
}

/// Environment a route (or extension) was registered in: the views manager
/// and default bind context that apply when the route sets none.
#[derive(Clone, Default)]
pub struct RouteEnv {
    pub views: Option<Arc<dyn ViewsManager>>,
    pub bind: Option<Bind>,
}

impl RouteEnv {
    #[must_use]
    pub fn with_views(mut self, views: Arc<dyn ViewsManager>) -> Self {
        self.views = Some(views);
        self
    }

    #[must_use]
    pub fn with_bind(mut self, bind: Bind) -> Self {
        self.bind = Some(bind);
        self
    }
}

impl fmt::Debug for RouteEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEnv")
            .field("views", &self.views.is_some())
            .field("bind", &self.bind.is_some())
            .finish()
    }
}

/// Immutable route configuration.
pub struct Route {
    info: RouteInfo,
    handler: HandlerFn,
    prerequisites: Option<Prerequisites>,
    bind: Option<Bind>,
    env: RouteEnv,
}

impl Route {
    pub(crate) fn new(
        info: RouteInfo,
        handler: HandlerFn,
        prerequisites: Option<Prerequisites>,
        bind: Option<Bind>,
        env: RouteEnv,
    ) -> Self {
        Self {
            info,
            handler,
            prerequisites,
            bind,
            env,
        }
    }

    #[must_use]
    pub fn info(&self) -> &RouteInfo {
        &self.info
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.info.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.info.path
    }

    #[must_use]
    pub fn handler(&self) -> &HandlerFn {
        &self.handler
    }

    #[must_use]
    pub fn prerequisites(&self) -> Option<&Prerequisites> {
        self.prerequisites.as_ref()
    }

    #[must_use]
    pub fn env(&self) -> &RouteEnv {
        &self.env
    }

    /// `route.bind`, else the environment's default bind.
    #[must_use]
    pub fn resolved_bind(&self) -> Option<Bind> {
        self.bind.clone().or_else(|| self.env.bind.clone())
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.info.method)
            .field("path", &self.info.path)
            .field(
                "prerequisite_groups",
                &self.prerequisites.as_ref().map_or(0, Prerequisites::len),
            )
            .field("bind", &self.bind.is_some())
            .field("env", &self.env)
            .finish()
    }
}

/// How a route's handler is specified.
#[derive(Clone)]
pub enum HandlerConfig {
    Function(HandlerFn),
    /// Server-method notation, e.g. `users.get(params.id)`
    Method(String),
    Proxy(ProxyOptions),
    File(FileConfig),
    Directory(DirectoryOptions),
    View(ViewConfig),
}

impl From<HandlerFn> for HandlerConfig {
    fn from(f: HandlerFn) -> Self {
        HandlerConfig::Function(f)
    }
}

impl fmt::Debug for HandlerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerConfig::Function(_) => f.write_str("Function(..)"),
            HandlerConfig::Method(n) => f.debug_tuple("Method").field(n).finish(),
            HandlerConfig::Proxy(o) => f.debug_tuple("Proxy").field(o).finish(),
            HandlerConfig::File(c) => f.debug_tuple("File").field(c).finish(),
            HandlerConfig::Directory(o) => f.debug_tuple("Directory").field(o).finish(),
            HandlerConfig::View(c) => f.debug_tuple("View").field(c).finish(),
        }
    }
}

/// Everything needed to register a route.
pub struct RouteConfig {
    pub(crate) info: RouteInfo,
    pub(crate) handler: HandlerConfig,
    pub(crate) pre: Vec<PrerequisiteGroupConfig>,
    pub(crate) bind: Option<Bind>,
    pub(crate) env: Option<RouteEnv>,
}

impl RouteConfig {
    pub fn new(method: Method, path: impl Into<String>, handler: impl Into<HandlerConfig>) -> Self {
        Self {
            info: RouteInfo {
                method,
                path: path.into(),
            },
            handler: handler.into(),
            pre: Vec::new(),
            bind: None,
            env: None,
        }
    }

    /// Append one prerequisite group; groups run in the order added.
    #[must_use]
    pub fn pre(mut self, group: impl Into<PrerequisiteGroupConfig>) -> Self {
        self.pre.push(group.into());
        self
    }

    #[must_use]
    pub fn bind(mut self, bind: Bind) -> Self {
        self.bind = Some(bind);
        self
    }

    /// Registration environment (defaults to the server's).
    #[must_use]
    pub fn env(mut self, env: RouteEnv) -> Self {
        self.env = Some(env);
        self
    }
}

/// Resolve a handler configuration into a callable.
pub(crate) fn configure(
    config: HandlerConfig,
    info: &RouteInfo,
    env: &RouteEnv,
    server: &Server,
) -> Result<HandlerFn, ConfigError> {
    match config {
        HandlerConfig::Function(f) => Ok(f),
        HandlerConfig::Method(notation) => {
            methods::resolve(&notation, server.methods()).map(|resolved| resolved.handler)
        }
        HandlerConfig::Proxy(options) => {
            let proxy: &Arc<dyn ProxyHandler> =
                server.proxy().ok_or(ConfigError::MissingCollaborator {
                    collaborator: "proxy handler",
                })?;
            proxy.handler(info, &options)
        }
        HandlerConfig::File(config) => Ok(file::handler(config)),
        HandlerConfig::Directory(options) => {
            let directory: &Arc<dyn DirectoryHandler> = server.directory();
            directory.handler(info, &options)
        }
        HandlerConfig::View(config) => {
            if env.views.is_none() && server.views().is_none() {
                return Err(ConfigError::MissingCollaborator {
                    collaborator: "views manager",
                });
            }
            Ok(views::handler(config))
        }
    }
}
