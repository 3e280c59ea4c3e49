use crate::collaborators::{DirectoryHandler, ProxyHandler, Tracer, ViewsManager};
use crate::config::RouteSettings;
use crate::error::{ConfigError, Fault};
use crate::executor;
use crate::extensions::{ExtensionRegistry, LifecycleEvent};
use crate::methods::MethodRegistry;
use crate::prerequisites;
use crate::request::{Request, RequestBuilder};
use crate::response::Response;
use crate::route::{self, Route, RouteConfig, RouteEnv};
use crate::runtime_config::RuntimeConfig;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::builder::ServerBuilder;

/// Events run before the route handler, in order.
const PRE_HANDLER_EVENTS: [LifecycleEvent; 4] = [
    LifecycleEvent::OnRequest,
    LifecycleEvent::OnPreAuth,
    LifecycleEvent::OnPostAuth,
    LifecycleEvent::OnPreHandler,
];

/// Server-wide registries and collaborators shared by every route.
pub struct Server {
    pub(super) config: RuntimeConfig,
    pub(super) methods: MethodRegistry,
    pub(super) extensions: ExtensionRegistry,
    pub(super) views: Option<Arc<dyn ViewsManager>>,
    pub(super) proxy: Option<Arc<dyn ProxyHandler>>,
    pub(super) directory: Arc<dyn DirectoryHandler>,
    pub(super) tracer: Arc<dyn Tracer>,
    pub(super) env: RouteEnv,
}

impl Server {
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Register a route: resolve its handler configuration and compile its
    /// prerequisites.
    pub fn route(&self, config: RouteConfig) -> Result<Arc<Route>, ConfigError> {
        let RouteConfig {
            info,
            handler,
            pre,
            bind,
            env,
        } = config;
        let env = env.unwrap_or_else(|| self.env.clone());
        let handler = route::configure(handler, &info, &env, self)?;
        let prerequisites = prerequisites::compile(pre, &self.methods)?;

        info!(
            method = %info.method,
            path = %info.path,
            prerequisite_groups = prerequisites
                .as_ref()
                .map_or(0, prerequisites::Prerequisites::len),
            "Route registered"
        );
        Ok(Arc::new(Route::new(info, handler, prerequisites, bind, env)))
    }

    /// Register a route from parsed settings.
    pub fn route_settings(&self, settings: RouteSettings) -> Result<Arc<Route>, ConfigError> {
        self.route(settings.into_config()?)
    }

    /// Start building a request bound to `route`.
    pub fn request(self: &Arc<Self>, route: &Arc<Route>) -> RequestBuilder {
        Request::builder(Arc::clone(self), Arc::clone(route))
    }

    /// Run the hooks registered for `event`.
    pub async fn invoke(
        &self,
        request: &Request,
        event: LifecycleEvent,
    ) -> Result<Option<Response>, Fault> {
        self.extensions.invoke(request, event).await
    }

    /// Drive a request through its whole lifecycle.
    ///
    /// ```text
    /// onRequest → onPreAuth → onPostAuth → onPreHandler → handler → onPostHandler → onPreResponse
    /// ```
    ///
    /// A hook that replies or faults before the handler ends the request
    /// early; `onPreResponse` always runs. The final outcome is left on the
    /// request.
    pub async fn process(&self, request: &Request) {
        let mut handled = true;
        for event in PRE_HANDLER_EVENTS {
            match self.invoke(request, event).await {
                Ok(None) => {}
                Ok(Some(response)) => {
                    request.set_response(Ok(response));
                    handled = false;
                    break;
                }
                Err(fault) => {
                    request.set_response(Err(fault));
                    handled = false;
                    break;
                }
            }
        }

        if handled {
            executor::execute(request).await;
            self.replace_response(request, LifecycleEvent::OnPostHandler)
                .await;
        } else {
            debug!(request_id = %request.id(), "Request answered before the handler");
        }

        self.replace_response(request, LifecycleEvent::OnPreResponse)
            .await;
    }

    async fn replace_response(&self, request: &Request, event: LifecycleEvent) {
        match self.invoke(request, event).await {
            Ok(None) => {}
            Ok(Some(response)) => request.set_response(Ok(response)),
            Err(fault) => request.set_response(Err(fault)),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn methods(&self) -> &MethodRegistry {
        &self.methods
    }

    #[must_use]
    pub fn extensions(&self) -> &ExtensionRegistry {
        &self.extensions
    }

    #[must_use]
    pub fn views(&self) -> Option<&Arc<dyn ViewsManager>> {
        self.views.as_ref()
    }

    #[must_use]
    pub fn proxy(&self) -> Option<&Arc<dyn ProxyHandler>> {
        self.proxy.as_ref()
    }

    #[must_use]
    pub fn directory(&self) -> &Arc<dyn DirectoryHandler> {
        &self.directory
    }

    #[must_use]
    pub fn tracer(&self) -> &Arc<dyn Tracer> {
        &self.tracer
    }

    /// Default environment for routes registered without one.
    #[must_use]
    pub fn env(&self) -> &RouteEnv {
        &self.env
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("methods", &self.methods)
            .field("extensions", &self.extensions)
            .field("views", &self.views.is_some())
            .field("proxy", &self.proxy.is_some())
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}
