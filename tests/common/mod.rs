#![allow(dead_code)]

use brrtexec::{
    execute, handler, HandlerConfig, Outcome, Request, Route, RouteConfig, RuntimeConfig, Server,
    ServerBuilder, Source, Tracer,
};
use http::Method;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// Builder with deterministic runtime configuration (ignores the environment).
pub fn builder() -> ServerBuilder {
    Server::builder().config(RuntimeConfig::default())
}

pub fn server() -> Arc<Server> {
    builder().build()
}

/// Register a GET route on `server`.
pub fn route(server: &Arc<Server>, config: impl Into<HandlerConfig>) -> Arc<Route> {
    server
        .route(RouteConfig::new(Method::GET, "/test", config))
        .unwrap()
}

/// Build a request for `route` and run it through the executor.
pub async fn execute_route(server: &Arc<Server>, route: &Arc<Route>) -> Request {
    let request = server.request(route).build();
    execute(&request).await;
    request
}

/// JSON view of a successful outcome's source.
pub fn body(outcome: &Outcome) -> Value {
    match outcome {
        Ok(response) => response.source().to_value(),
        Err(fault) => panic!("expected a response, got fault {fault}"),
    }
}

pub fn text(outcome: &Outcome) -> String {
    match outcome.as_ref().map(|r| r.source()) {
        Ok(Source::Text(s)) => s.clone(),
        Ok(Source::Bytes(b)) => String::from_utf8_lossy(b).into_owned(),
        other => panic!("expected a text body, got {other:?}"),
    }
}

/// A handler that answers with `value`.
pub fn replying(value: Value) -> HandlerConfig {
    handler(move |_request, reply| drop(reply.reply(value.clone()))).into()
}

/// Tracer collaborator that keeps every reported event.
#[derive(Default)]
pub struct RecordingTracer {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingTracer {
    pub fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(|(name, _)| name.clone()).collect()
    }
}

impl Tracer for RecordingTracer {
    fn report(&self, event: &str, data: &Value) {
        self.events.lock().push((event.to_string(), data.clone()));
    }
}
