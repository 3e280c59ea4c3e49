use super::core::Server;
use crate::collaborators::{
    DirectoryHandler, LogTracer, NoopTracer, ProxyHandler, StaticDirectory, Tracer, ViewsManager,
};
use crate::error::ConfigError;
use crate::extensions::{Extension, ExtensionRegistry, LifecycleEvent};
use crate::methods::{MethodCall, MethodRegistry};
use crate::reply::Reply;
use crate::route::{Bind, RouteEnv};
use crate::runtime_config::RuntimeConfig;
use std::sync::Arc;

/// Builder for [`Server`].
///
/// Methods and extensions must be registered here; a built server is
/// immutable and shared by every route and request.
pub struct ServerBuilder {
    config: RuntimeConfig,
    methods: MethodRegistry,
    extensions: Vec<(LifecycleEvent, Extension)>,
    views: Option<Arc<dyn ViewsManager>>,
    proxy: Option<Arc<dyn ProxyHandler>>,
    directory: Option<Arc<dyn DirectoryHandler>>,
    tracer: Option<Arc<dyn Tracer>>,
    bind: Option<Bind>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::from_env(),
            methods: MethodRegistry::new(),
            extensions: Vec::new(),
            views: None,
            proxy: None,
            directory: None,
            tracer: None,
            bind: None,
        }
    }

    /// Replace the environment-derived runtime configuration.
    #[must_use]
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a server method referenced by notation.
    pub fn method<F>(mut self, name: &str, method: F) -> Result<Self, ConfigError>
    where
        F: Fn(MethodCall, Reply) + Send + Sync + 'static,
    {
        self.methods.add(name, method)?;
        Ok(self)
    }

    /// Register a lifecycle hook. Hooks for one event run in the order added.
    #[must_use]
    pub fn ext(mut self, event: LifecycleEvent, extension: impl Into<Extension>) -> Self {
        self.extensions.push((event, extension.into()));
        self
    }

    #[must_use]
    pub fn views(mut self, views: Arc<dyn ViewsManager>) -> Self {
        self.views = Some(views);
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: Arc<dyn ProxyHandler>) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Replace the built-in [`StaticDirectory`] handler.
    #[must_use]
    pub fn directory(mut self, directory: Arc<dyn DirectoryHandler>) -> Self {
        self.directory = Some(directory);
        self
    }

    #[must_use]
    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    /// Default bind context for routes that set none.
    #[must_use]
    pub fn bind(mut self, bind: Bind) -> Self {
        self.bind = Some(bind);
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<Server> {
        let mut extensions = ExtensionRegistry::new(self.config.ext_yield);
        for (event, extension) in self.extensions {
            extensions.add(event, extension);
        }
        let tracer: Arc<dyn Tracer> = match self.tracer {
            Some(tracer) => tracer,
            None if self.config.trace_events => Arc::new(LogTracer),
            None => Arc::new(NoopTracer),
        };
        Arc::new(Server {
            config: self.config,
            methods: self.methods,
            extensions,
            env: RouteEnv {
                views: None,
                bind: self.bind,
            },
            views: self.views,
            proxy: self.proxy,
            directory: self
                .directory
                .unwrap_or_else(|| Arc::new(StaticDirectory)),
            tracer,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
