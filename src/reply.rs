//! # Reply Interface
//!
//! [`Reply`] is the capability object handler code uses to produce its
//! response. Every terminal method consumes it, so a handler answers at most
//! once by construction; the [`Finalize`] sink it reports to is once-only as
//! well, which absorbs the remaining double-completion paths (a panic after
//! replying, an abort after a committed response).
//!
//! | Method      | Produces                                                  |
//! |-------------|-----------------------------------------------------------|
//! | `reply`     | wrapped payload, through the commit protocol              |
//! | `fail`      | a fault, finalized immediately                            |
//! | `proceed`   | nothing: pass-through in extensions, empty reply otherwise |
//! | `view`      | view response rendered during preparation                 |
//! | `file`      | file response read during preparation                     |
//! | `proxy`     | whatever the proxy collaborator replies with              |
//! | `close`     | close marker, finalized immediately                       |
//!
//! `state` / `unstate` only record outgoing request state.
//!
//! ## Nested replies
//!
//! Extension hooks receive a nested reply: `proceed()` advances to the next
//! hook, while any payload goes through the same wrap/commit path as a route
//! handler's reply and reaches the invoker's filtering finalize.

use crate::collaborators::{file, views, FileOptions, ProxyOptions, ViewOptions, ViewsManager};
use crate::error::Fault;
use crate::protect::Finalize;
use crate::request::{Request, StateOptions};
use crate::response::{wrap, Payload, PendingResponse, Response};
use crate::route::{Bind, RouteEnv};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

type Passthrough = Box<dyn FnOnce() + Send>;

/// Options for [`Reply::close`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseOptions {
    /// End the underlying stream (default: true)
    #[serde(default)]
    pub end: Option<bool>,
}

/// Reports a fault for a reply that has been moved away, e.g. into a task.
#[derive(Clone)]
pub struct AbortHandle {
    finalize: Finalize,
}

impl AbortHandle {
    /// Finalize with `fault` unless an outcome was already delivered.
    pub fn abort(&self, fault: Fault) -> bool {
        self.finalize.call(Err(fault))
    }
}

/// Single-use reply interface.
pub struct Reply {
    request: Request,
    finalize: Finalize,
    bind: Option<Bind>,
    views: Option<Arc<dyn ViewsManager>>,
    passthrough: Option<Passthrough>,
}

impl Reply {
    /// Root reply interface for a route handler or prerequisite.
    pub(crate) fn new(request: Request, finalize: Finalize) -> Self {
        let bind = request.bind();
        let views = resolve_views(&request, None);
        Self {
            request,
            finalize,
            bind,
            views,
            passthrough: None,
        }
    }

    /// Nested reply interface for an extension hook.
    pub(crate) fn nested<P>(
        request: Request,
        finalize: Finalize,
        passthrough: P,
        env: Option<&RouteEnv>,
        bind: Option<Bind>,
    ) -> Self
    where
        P: FnOnce() + Send + 'static,
    {
        let views = resolve_views(&request, env);
        Self {
            request,
            finalize,
            bind,
            views,
            passthrough: Some(Box::new(passthrough)),
        }
    }

    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Bind context for this invocation.
    #[must_use]
    pub fn bind(&self) -> Option<&Bind> {
        self.bind.as_ref()
    }

    /// Bind context downcast to a concrete type.
    #[must_use]
    pub fn bind_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.bind.as_deref()?.downcast_ref::<T>()
    }

    /// Whether [`Reply::view`] can render.
    #[must_use]
    pub fn has_views(&self) -> bool {
        self.views.is_some()
    }

    /// Handle to fault this reply after it has been moved.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            finalize: self.finalize.clone(),
        }
    }

    /// Answer with any payload.
    ///
    /// Faults finalize immediately. Anything else enters the commit protocol:
    /// hold the returned [`PendingResponse`] to keep it open, or let it drop
    /// to commit.
    pub fn reply(self, payload: impl Into<Payload>) -> PendingResponse {
        match wrap(payload) {
            Err(fault) => {
                self.finalize.call(Err(fault));
                PendingResponse::finalized()
            }
            Ok(response) => PendingResponse::open(response, self.request, self.finalize),
        }
    }

    /// Answer with a fault.
    pub fn fail(self, fault: impl Into<Fault>) -> PendingResponse {
        self.reply(Payload::Fault(fault.into()))
    }

    /// Continue without a result. In an extension hook this advances to the
    /// next hook; elsewhere it is an empty reply.
    pub fn proceed(mut self) {
        match self.passthrough.take() {
            Some(pass) => pass(),
            None => drop(self.reply(Payload::Empty)),
        }
    }

    /// Render `template` with `context` through the resolved views manager.
    pub fn view(
        self,
        template: &str,
        context: impl Serialize,
        options: ViewOptions,
    ) -> PendingResponse {
        let Some(manager) = self.views.clone() else {
            return self.fail(Fault::bad_implementation(
                "Cannot render a view without a views manager",
            ));
        };
        match serde_json::to_value(context) {
            Ok(context) => self.reply(views::response(manager, template, context, options)),
            Err(err) => self.fail(Fault::bad_implementation(format!(
                "Failed to serialize view context: {err}"
            ))),
        }
    }

    /// Answer with the contents of a file.
    pub fn file(self, path: impl Into<PathBuf>, options: FileOptions) -> PendingResponse {
        self.reply(file::response(path.into(), options))
    }

    /// Hand this reply to the proxy collaborator, which answers through it.
    pub fn proxy(self, options: ProxyOptions) {
        let server = Arc::clone(self.request.server());
        let Some(proxy) = server.proxy() else {
            drop(self.fail(Fault::bad_implementation("No proxy handler configured")));
            return;
        };
        match proxy.handler(self.request.route().info(), &options) {
            Ok(handler) => {
                let request = self.request.clone();
                handler(&request, self);
            }
            Err(err) => drop(self.fail(Fault::bad_implementation(err.to_string()))),
        }
    }

    /// Terminate the stream with a close marker.
    pub fn close(self, options: CloseOptions) {
        debug!(request_id = %self.request.id(), "reply closed");
        self.finalize
            .call(Ok(Response::closed(options.end.unwrap_or(true))));
    }

    /// Set outgoing request state (e.g. a cookie).
    pub fn state(&self, name: &str, value: impl Into<Value>, options: StateOptions) {
        self.request.set_state(name, value.into(), options);
    }

    /// Clear outgoing request state.
    pub fn unstate(&self, name: &str) {
        self.request.clear_state(name);
    }
}

/// Extension env, then route env, then server.
fn resolve_views(request: &Request, env: Option<&RouteEnv>) -> Option<Arc<dyn ViewsManager>> {
    env.and_then(|e| e.views.clone())
        .or_else(|| request.route().env().views.clone())
        .or_else(|| request.server().views().cloned())
}
