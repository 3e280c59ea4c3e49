//! # Prerequisite Resolver
//!
//! Prerequisites are named pre-computations that run before a route handler.
//! They are configured as an ordered list of groups:
//!
//! ```text
//! [[A, B], C]
//!   group 0: A and B start together; the group ends when both completed
//!   group 1: C starts only after group 0 ended
//! ```
//!
//! Each prerequisite runs inside the same fault boundary as a route handler.
//! Its outcome decides how resolution continues:
//!
//! | Outcome                  | Effect                                              |
//! |--------------------------|-----------------------------------------------------|
//! | response, not takeover   | assigned (if `assign` is set), resolution continues |
//! | takeover response        | resolution stops, the response becomes final        |
//! | fault, `failAction=error`| resolution stops, the fault becomes final           |
//! | fault, `log` / `ignore`  | fault payload assigned, resolution continues        |
//!
//! Stopping early drops the futures of the current group that are still
//! waiting; work they already started completes on its own and its outcome is
//! discarded by the once-only completion.

use crate::collaborators::Tracer;
use crate::error::{ConfigError, Fault};
use crate::executor::elapsed_ms;
use crate::methods::{self, MethodRegistry};
use crate::protect::{run_protected, Finalize};
use crate::reply::Reply;
use crate::request::Request;
use crate::response::{Outcome, Response};
use crate::route::HandlerFn;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// What happens when a prerequisite faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailAction {
    /// Abort resolution; the fault becomes the request's response
    #[default]
    Error,
    /// Log the fault and continue
    Log,
    /// Continue silently
    Ignore,
}

/// How a prerequisite's method is given.
#[derive(Clone)]
pub enum MethodRef {
    Function(HandlerFn),
    /// Server-method notation, resolved at registration
    Notation(String),
}

impl fmt::Debug for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodRef::Function(_) => f.write_str("Function(..)"),
            MethodRef::Notation(n) => f.debug_tuple("Notation").field(n).finish(),
        }
    }
}

/// One prerequisite as configured on a route.
#[derive(Debug, Clone)]
pub struct PrerequisiteConfig {
    pub method: MethodRef,
    pub assign: Option<String>,
    pub fail_action: FailAction,
}

impl PrerequisiteConfig {
    pub fn function(method: HandlerFn) -> Self {
        Self {
            method: MethodRef::Function(method),
            assign: None,
            fail_action: FailAction::default(),
        }
    }

    /// A server method by notation; `assign` defaults to the method name.
    pub fn notation(notation: impl Into<String>) -> Self {
        Self {
            method: MethodRef::Notation(notation.into()),
            assign: None,
            fail_action: FailAction::default(),
        }
    }

    #[must_use]
    pub fn assign(mut self, key: impl Into<String>) -> Self {
        self.assign = Some(key.into());
        self
    }

    #[must_use]
    pub fn fail_action(mut self, action: FailAction) -> Self {
        self.fail_action = action;
        self
    }
}

impl From<HandlerFn> for PrerequisiteConfig {
    fn from(method: HandlerFn) -> Self {
        Self::function(method)
    }
}

impl From<&str> for PrerequisiteConfig {
    fn from(notation: &str) -> Self {
        Self::notation(notation)
    }
}

/// Serialized form of a prerequisite: a notation string or an object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PrerequisiteItemConfig {
    Notation(String),
    Spec {
        method: String,
        #[serde(default)]
        assign: Option<String>,
        #[serde(default, rename = "failAction")]
        fail_action: FailAction,
    },
}

impl From<PrerequisiteItemConfig> for PrerequisiteConfig {
    fn from(item: PrerequisiteItemConfig) -> Self {
        match item {
            PrerequisiteItemConfig::Notation(notation) => Self::notation(notation),
            PrerequisiteItemConfig::Spec {
                method,
                assign,
                fail_action,
            } => Self {
                method: MethodRef::Notation(method),
                assign,
                fail_action,
            },
        }
    }
}

/// A group of prerequisites that start together. A single item is a group
/// of one.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "GroupRepr")]
pub enum PrerequisiteGroupConfig {
    Many(Vec<PrerequisiteItemConfig>),
    One(PrerequisiteItemConfig),
    Configured(Vec<PrerequisiteConfig>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GroupRepr {
    Many(Vec<PrerequisiteItemConfig>),
    One(PrerequisiteItemConfig),
}

impl From<GroupRepr> for PrerequisiteGroupConfig {
    fn from(repr: GroupRepr) -> Self {
        match repr {
            GroupRepr::Many(items) => PrerequisiteGroupConfig::Many(items),
            GroupRepr::One(item) => PrerequisiteGroupConfig::One(item),
        }
    }
}

impl PrerequisiteGroupConfig {
    fn into_items(self) -> Vec<PrerequisiteConfig> {
        match self {
            PrerequisiteGroupConfig::Many(items) => items.into_iter().map(Into::into).collect(),
            PrerequisiteGroupConfig::One(item) => vec![item.into()],
            PrerequisiteGroupConfig::Configured(items) => items,
        }
    }
}

impl From<PrerequisiteConfig> for PrerequisiteGroupConfig {
    fn from(item: PrerequisiteConfig) -> Self {
        PrerequisiteGroupConfig::Configured(vec![item])
    }
}

impl From<Vec<PrerequisiteConfig>> for PrerequisiteGroupConfig {
    fn from(items: Vec<PrerequisiteConfig>) -> Self {
        PrerequisiteGroupConfig::Configured(items)
    }
}

impl From<&str> for PrerequisiteGroupConfig {
    fn from(notation: &str) -> Self {
        PrerequisiteConfig::notation(notation).into()
    }
}

/// A compiled prerequisite.
#[derive(Clone)]
pub struct Prerequisite {
    pub(crate) handler: HandlerFn,
    pub(crate) assign: Option<String>,
    pub(crate) fail_action: FailAction,
}

impl Prerequisite {
    #[must_use]
    pub fn assign(&self) -> Option<&str> {
        self.assign.as_deref()
    }

    #[must_use]
    pub fn fail_action(&self) -> FailAction {
        self.fail_action
    }
}

impl fmt::Debug for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prerequisite")
            .field("assign", &self.assign)
            .field("fail_action", &self.fail_action)
            .finish_non_exhaustive()
    }
}

/// Compiled, non-empty prerequisite groups of a route.
#[derive(Debug, Clone)]
pub struct Prerequisites {
    groups: Vec<Vec<Prerequisite>>,
}

impl Prerequisites {
    #[must_use]
    pub fn groups(&self) -> &[Vec<Prerequisite>] {
        &self.groups
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Resolve notation, default assignment keys and drop empty groups.
///
/// Returns `None` when no group has any prerequisite.
pub fn compile(
    configs: Vec<PrerequisiteGroupConfig>,
    registry: &MethodRegistry,
) -> Result<Option<Prerequisites>, ConfigError> {
    let mut assigned = HashSet::new();
    let mut groups = Vec::new();

    for group in configs {
        let mut compiled = Vec::new();
        for item in group.into_items() {
            let (handler, assign) = match item.method {
                MethodRef::Function(handler) => (handler, item.assign),
                MethodRef::Notation(notation) => {
                    let resolved = methods::resolve(&notation, registry)?;
                    (resolved.handler, item.assign.or(Some(resolved.name)))
                }
            };
            if let Some(key) = &assign {
                if !assigned.insert(key.clone()) {
                    return Err(ConfigError::DuplicateAssign {
                        assign: key.clone(),
                    });
                }
            }
            compiled.push(Prerequisite {
                handler,
                assign,
                fail_action: item.fail_action,
            });
        }
        if !compiled.is_empty() {
            groups.push(compiled);
        }
    }

    Ok((!groups.is_empty()).then_some(Prerequisites { groups }))
}

/// How prerequisite resolution ended.
pub(crate) enum Resolution {
    /// Every group completed; run the route handler
    Proceed,
    /// A prerequisite took over the request
    Takeover(Response),
    /// A prerequisite with `failAction=error` faulted
    Failed(Fault),
}

enum Step {
    Continue,
    Takeover(Response),
    Failed(Fault),
}

/// Run every group in order, the members of a group concurrently.
pub(crate) async fn resolve(request: &Request, prerequisites: &Prerequisites) -> Resolution {
    for (index, group) in prerequisites.groups().iter().enumerate() {
        debug!(
            request_id = %request.id(),
            group = index,
            size = group.len(),
            "Starting prerequisite group"
        );
        let mut running: FuturesUnordered<_> =
            group.iter().map(|pre| run_one(request, pre)).collect();
        while let Some(step) = running.next().await {
            match step {
                Step::Continue => {}
                Step::Takeover(response) => {
                    debug!(request_id = %request.id(), group = index, "Prerequisite takeover");
                    return Resolution::Takeover(response);
                }
                Step::Failed(fault) => return Resolution::Failed(fault),
            }
        }
    }
    Resolution::Proceed
}

async fn run_one(request: &Request, pre: &Prerequisite) -> Step {
    let started = Instant::now();
    let tracer: &Arc<dyn Tracer> = request.server().tracer();
    let handler = Arc::clone(&pre.handler);

    let outcome: Outcome = run_protected(|protected, exit| {
        let reply = Reply::new(request.clone(), Finalize::to_exit(exit));
        protected.enter(|| {
            tracer.report("pre.start", &json!({ "assign": pre.assign }));
            handler(request, reply);
        });
    })
    .await;

    let msec = elapsed_ms(started);
    tracer.report(
        "pre.end",
        &json!({ "assign": pre.assign, "fault": outcome.is_err() }),
    );

    match outcome {
        Err(fault) => {
            if pre.fail_action != FailAction::Ignore {
                request.log(
                    &["pre", "error"],
                    json!({ "msec": msec, "assign": pre.assign, "error": fault.body() }),
                );
            }
            if pre.fail_action == FailAction::Error {
                return Step::Failed(fault);
            }
            if let Some(key) = &pre.assign {
                request.assign(key, fault.payload(), Err(fault));
            }
            Step::Continue
        }
        Ok(response) => {
            request.log(&["pre"], json!({ "msec": msec, "assign": pre.assign }));
            if let Some(key) = &pre.assign {
                request.assign(key, response.source().to_value(), Ok(response.clone()));
            }
            if response.is_takeover() {
                Step::Takeover(response)
            } else {
                Step::Continue
            }
        }
    }
}
