//! # Extension Invoker
//!
//! Lifecycle hooks registered per [`LifecycleEvent`] and run strictly in
//! registration order. Each hook gets a nested [`Reply`] and ends in one of
//! three ways:
//!
//! - **pass**: `reply.proceed()`, or a reply whose response turned out empty
//!   (e.g. a view that rendered nothing); the next hook runs
//! - **override**: a populated response; remaining hooks are skipped and the
//!   response is the outcome of the event
//! - **abort**: a fault (returned or panicked); remaining hooks are skipped
//!   and the fault is the outcome of the event
//!
//! A hook's response is prepared before the next hook starts.

use crate::error::Fault;
use crate::executor::elapsed_ms;
use crate::protect::{run_protected, Finalize};
use crate::reply::Reply;
use crate::request::Request;
use crate::response::Response;
use crate::route::{Bind, HandlerFn, RouteEnv};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Request lifecycle points hooks can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleEvent {
    #[serde(rename = "onRequest")]
    OnRequest,
    #[serde(rename = "onPreAuth")]
    OnPreAuth,
    #[serde(rename = "onPostAuth")]
    OnPostAuth,
    #[serde(rename = "onPreHandler")]
    OnPreHandler,
    #[serde(rename = "onPostHandler")]
    OnPostHandler,
    #[serde(rename = "onPreResponse")]
    OnPreResponse,
}

impl LifecycleEvent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleEvent::OnRequest => "onRequest",
            LifecycleEvent::OnPreAuth => "onPreAuth",
            LifecycleEvent::OnPostAuth => "onPostAuth",
            LifecycleEvent::OnPreHandler => "onPreHandler",
            LifecycleEvent::OnPostHandler => "onPostHandler",
            LifecycleEvent::OnPreResponse => "onPreResponse",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered hook.
#[derive(Clone)]
pub struct Extension {
    func: HandlerFn,
    bind: Option<Bind>,
    env: Option<RouteEnv>,
}

impl Extension {
    pub fn new(func: HandlerFn) -> Self {
        Self {
            func,
            bind: None,
            env: None,
        }
    }

    #[must_use]
    pub fn with_bind(mut self, bind: Bind) -> Self {
        self.bind = Some(bind);
        self
    }

    /// Environment the hook was registered in (views manager, default bind).
    #[must_use]
    pub fn with_env(mut self, env: RouteEnv) -> Self {
        self.env = Some(env);
        self
    }

    fn resolved_bind(&self) -> Option<Bind> {
        self.bind
            .clone()
            .or_else(|| self.env.as_ref().and_then(|env| env.bind.clone()))
    }
}

impl From<HandlerFn> for Extension {
    fn from(func: HandlerFn) -> Self {
        Self::new(func)
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("bind", &self.bind.is_some())
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

/// Hooks per event, populated while the server is built.
#[derive(Debug, Clone)]
pub struct ExtensionRegistry {
    events: HashMap<LifecycleEvent, Vec<Extension>>,
    yield_when_empty: bool,
}

impl ExtensionRegistry {
    #[must_use]
    pub fn new(yield_when_empty: bool) -> Self {
        Self {
            events: HashMap::new(),
            yield_when_empty,
        }
    }

    pub fn add(&mut self, event: LifecycleEvent, extension: impl Into<Extension>) {
        self.events.entry(event).or_default().push(extension.into());
    }

    #[must_use]
    pub fn hooks(&self, event: LifecycleEvent) -> &[Extension] {
        self.events.get(&event).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Run the hooks of `event` in order.
    ///
    /// `Ok(None)` when every hook passed (or none is registered), `Ok(Some)`
    /// for an override, `Err` for an abort.
    pub async fn invoke(
        &self,
        request: &Request,
        event: LifecycleEvent,
    ) -> Result<Option<Response>, Fault> {
        let hooks = self.hooks(event);
        if hooks.is_empty() {
            if self.yield_when_empty {
                tokio::task::yield_now().await;
            }
            return Ok(None);
        }

        for (index, ext) in hooks.iter().enumerate() {
            match run_hook(request, event, ext).await {
                Ok(None) => {}
                Ok(Some(response)) => {
                    debug!(
                        request_id = %request.id(),
                        event = %event,
                        hook = index,
                        "Extension replied - skipping remaining hooks"
                    );
                    return Ok(Some(response));
                }
                Err(fault) => {
                    debug!(
                        request_id = %request.id(),
                        event = %event,
                        hook = index,
                        status = fault.status().as_u16(),
                        "Extension aborted - skipping remaining hooks"
                    );
                    return Err(fault);
                }
            }
        }
        Ok(None)
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new(true)
    }
}

async fn run_hook(
    request: &Request,
    event: LifecycleEvent,
    ext: &Extension,
) -> Result<Option<Response>, Fault> {
    let started = Instant::now();
    request
        .server()
        .tracer()
        .report("ext.start", &json!({ "event": event.as_str() }));

    let func = Arc::clone(&ext.func);
    let outcome = run_protected(|protected, exit| {
        let pass = exit.clone();
        let filter = Finalize::new(move |outcome| {
            exit.exit(outcome.map(|response| (!response.is_empty()).then_some(response)));
        });
        let reply = Reply::nested(
            request.clone(),
            filter,
            move || {
                pass.ok(None);
            },
            ext.env.as_ref(),
            ext.resolved_bind(),
        );
        protected.enter(|| func(request, reply));
    })
    .await;

    let msec = elapsed_ms(started);
    match &outcome {
        Err(fault) => request.log(
            &["ext", "error"],
            json!({ "msec": msec, "event": event.as_str(), "error": fault.body() }),
        ),
        Ok(_) => request.log(&["ext"], json!({ "msec": msec, "event": event.as_str() })),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::handler;

    #[test]
    fn test_event_names() {
        assert_eq!(LifecycleEvent::OnPreHandler.as_str(), "onPreHandler");
        let parsed: LifecycleEvent = serde_json::from_str(r#""onPostAuth""#).unwrap();
        assert_eq!(parsed, LifecycleEvent::OnPostAuth);
    }

    #[test]
    fn test_hooks_keep_registration_order() {
        let mut registry = ExtensionRegistry::default();
        registry.add(
            LifecycleEvent::OnRequest,
            handler(|_request, reply| reply.proceed()),
        );
        registry.add(
            LifecycleEvent::OnRequest,
            Extension::new(handler(|_request, reply| reply.proceed()))
                .with_bind(Arc::new(7_u32)),
        );
        let hooks = registry.hooks(LifecycleEvent::OnRequest);
        assert_eq!(hooks.len(), 2);
        assert!(hooks[0].resolved_bind().is_none());
        assert!(hooks[1].resolved_bind().is_some());
        assert!(registry.hooks(LifecycleEvent::OnPreResponse).is_empty());
    }
}
