//! # Request Context
//!
//! [`Request`] is the mutable per-call context the pipeline owns for the
//! duration of one request. It is a cheap handle (`Arc` inside) so handlers
//! that finish asynchronously can keep it alive across tasks.
//!
//! Besides the incoming data (method, path, params, query, headers, payload)
//! it carries:
//!
//! - `pre`: raw prerequisite results keyed by assignment key
//! - `responses`: the full prerequisite outcomes under the same keys
//! - the final response slot, set once execution completes
//! - outgoing request-scoped state (cookies) set through the reply interface
//! - the request log: every `log(tags, data)` call is recorded and forwarded
//!   to `tracing`

use crate::ids::RequestId;
use crate::response::{HeaderVec, Outcome};
use crate::route::{Bind, Route};
use crate::server::Server;
use http::Method;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Maximum inline path/query parameters before heap allocation
pub const MAX_INLINE_PARAMS: usize = 8;

/// Path/query parameter storage
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Options for an outgoing state entry (cookie attributes).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateOptions {
    #[serde(default)]
    pub ttl: Option<Duration>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub is_http_only: bool,
    #[serde(default)]
    pub is_secure: bool,
}

/// One change to outgoing state. The last change per name wins.
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    Set {
        name: String,
        value: Value,
        options: StateOptions,
    },
    Clear {
        name: String,
    },
}

impl StateChange {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            StateChange::Set { name, .. } | StateChange::Clear { name } => name,
        }
    }
}

/// A recorded `Request::log` call.
#[derive(Debug, Clone)]
pub struct RequestLogEntry {
    pub tags: Vec<String>,
    pub data: Value,
    pub at: Instant,
}

impl RequestLogEntry {
    #[must_use]
    pub fn has_tags(&self, tags: &[&str]) -> bool {
        tags.iter().all(|t| self.tags.iter().any(|own| own == t))
    }
}

/// Per-request context handle.
#[derive(Clone)]
pub struct Request {
    inner: Arc<RequestInner>,
}

struct RequestInner {
    id: RequestId,
    method: Method,
    path: String,
    params: ParamVec,
    query: ParamVec,
    headers: HeaderVec,
    payload: Option<Value>,
    route: Arc<Route>,
    server: Arc<Server>,
    pre: RwLock<HashMap<String, Value>>,
    responses: Mutex<HashMap<String, Outcome>>,
    states: Mutex<Vec<StateChange>>,
    response: Mutex<Option<Outcome>>,
    logs: Mutex<Vec<RequestLogEntry>>,
}

impl Request {
    pub fn builder(server: Arc<Server>, route: Arc<Route>) -> RequestBuilder {
        RequestBuilder::new(server, route)
    }

    #[must_use]
    pub fn id(&self) -> RequestId {
        self.inner.id
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Path parameter by name; last occurrence wins.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner
            .params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Query parameter by name; last occurrence wins.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.inner
            .query
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Header by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.inner.payload.as_ref()
    }

    #[must_use]
    pub fn route(&self) -> &Arc<Route> {
        &self.inner.route
    }

    #[must_use]
    pub fn server(&self) -> &Arc<Server> {
        &self.inner.server
    }

    /// Route bind context, falling back to the route environment's.
    #[must_use]
    pub fn bind(&self) -> Option<Bind> {
        self.inner.route.resolved_bind()
    }

    /// Raw prerequisite result assigned under `key`.
    #[must_use]
    pub fn pre(&self, key: &str) -> Option<Value> {
        self.inner.pre.read().get(key).cloned()
    }

    /// Snapshot of every assigned prerequisite result.
    #[must_use]
    pub fn pre_all(&self) -> HashMap<String, Value> {
        self.inner.pre.read().clone()
    }

    /// Full prerequisite outcome assigned under `key`.
    #[must_use]
    pub fn prerequisite_response(&self, key: &str) -> Option<Outcome> {
        self.inner.responses.lock().get(key).cloned()
    }

    /// Record a prerequisite result. Each key is written at most once.
    pub(crate) fn assign(&self, key: &str, value: Value, outcome: Outcome) -> bool {
        let mut pre = self.inner.pre.write();
        if pre.contains_key(key) {
            warn!(
                request_id = %self.inner.id,
                assign = %key,
                "Prerequisite key already assigned - ignoring second write"
            );
            return false;
        }
        pre.insert(key.to_string(), value);
        self.inner.responses.lock().insert(key.to_string(), outcome);
        true
    }

    /// The final response, once execution has completed.
    #[must_use]
    pub fn response(&self) -> Option<Outcome> {
        self.inner.response.lock().clone()
    }

    #[must_use]
    pub fn has_response(&self) -> bool {
        self.inner.response.lock().is_some()
    }

    pub fn take_response(&self) -> Option<Outcome> {
        self.inner.response.lock().take()
    }

    pub(crate) fn set_response(&self, outcome: Outcome) {
        debug!(
            request_id = %self.inner.id,
            fault = outcome.is_err(),
            "Request response set"
        );
        *self.inner.response.lock() = Some(outcome);
    }

    pub(crate) fn set_state(&self, name: &str, value: Value, options: StateOptions) {
        let mut states = self.inner.states.lock();
        states.retain(|s| s.name() != name);
        states.push(StateChange::Set {
            name: name.to_string(),
            value,
            options,
        });
    }

    pub(crate) fn clear_state(&self, name: &str) {
        let mut states = self.inner.states.lock();
        states.retain(|s| s.name() != name);
        states.push(StateChange::Clear {
            name: name.to_string(),
        });
    }

    /// Outgoing state changes, in the order they were last made.
    #[must_use]
    pub fn states(&self) -> Vec<StateChange> {
        self.inner.states.lock().clone()
    }

    /// Record a log entry on the request and emit it through `tracing`.
    pub fn log(&self, tags: &[&str], data: Value) {
        let is_error = tags.contains(&"error");
        if is_error {
            warn!(request_id = %self.inner.id, tags = ?tags, data = %data, "request log");
        } else {
            debug!(request_id = %self.inner.id, tags = ?tags, data = %data, "request log");
        }
        self.inner.logs.lock().push(RequestLogEntry {
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            data,
            at: Instant::now(),
        });
    }

    #[must_use]
    pub fn logs(&self) -> Vec<RequestLogEntry> {
        self.inner.logs.lock().clone()
    }

    /// Dotted path lookup over the request, e.g. `params.id` or
    /// `pre.user.name`. Missing paths resolve to `null`.
    #[must_use]
    pub fn reach(&self, path: &str) -> Value {
        let root = self.to_value();
        path.split('.')
            .try_fold(&root, |node, segment| match node {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// JSON view used by [`Request::reach`] and default view contexts.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "id": self.inner.id.to_string(),
            "method": self.inner.method.as_str(),
            "path": self.inner.path,
            "params": params_to_map(&self.inner.params),
            "query": params_to_map(&self.inner.query),
            "headers": Value::Object(
                self.inner
                    .headers
                    .iter()
                    .map(|(k, v)| (k.to_ascii_lowercase(), Value::String(v.clone())))
                    .collect(),
            ),
            "payload": self.inner.payload.clone().unwrap_or(Value::Null),
            "pre": Value::Object(self.pre_all().into_iter().collect()),
        })
    }
}

fn params_to_map(params: &ParamVec) -> Value {
    let mut map = Map::new();
    for (k, v) in params {
        map.insert(k.to_string(), Value::String(v.clone()));
    }
    Value::Object(map)
}

/// Builder for a [`Request`] bound to a route.
pub struct RequestBuilder {
    server: Arc<Server>,
    route: Arc<Route>,
    id: Option<RequestId>,
    path: Option<String>,
    params: ParamVec,
    query: ParamVec,
    headers: HeaderVec,
    payload: Option<Value>,
}

impl RequestBuilder {
    fn new(server: Arc<Server>, route: Arc<Route>) -> Self {
        Self {
            server,
            route,
            id: None,
            path: None,
            params: ParamVec::new(),
            query: ParamVec::new(),
            headers: HeaderVec::new(),
            payload: None,
        }
    }

    #[must_use]
    pub fn id(mut self, id: RequestId) -> Self {
        self.id = Some(id);
        self
    }

    /// Concrete request path (defaults to the route's path pattern).
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.push((Arc::from(name), value.into()));
        self
    }

    #[must_use]
    pub fn query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.push((Arc::from(name), value.into()));
        self
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((Arc::from(name), value.into()));
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    #[must_use]
    pub fn build(self) -> Request {
        let id = self.id.unwrap_or_else(|| {
            let upstream = self
                .headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("x-request-id"))
                .map(|(_, v)| v.as_str());
            RequestId::from_header_or_new(upstream)
        });
        let path = self
            .path
            .unwrap_or_else(|| self.route.path().to_string());
        Request {
            inner: Arc::new(RequestInner {
                id,
                method: self.route.method().clone(),
                path,
                params: self.params,
                query: self.query,
                headers: self.headers,
                payload: self.payload,
                route: self.route,
                server: self.server,
                pre: RwLock::new(HashMap::new()),
                responses: Mutex::new(HashMap::new()),
                states: Mutex::new(Vec::new()),
                response: Mutex::new(None),
                logs: Mutex::new(Vec::new()),
            }),
        }
    }
}
