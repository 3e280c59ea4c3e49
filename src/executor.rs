//! # Handler Executor
//!
//! Drives one request through its route:
//!
//! ```text
//! execute
//!   ├─ prerequisites configured ─▶ resolve ─┬─ proceed ──▶ invoke_handler
//!   │                                       ├─ takeover ─▶ final response
//!   │                                       └─ fault ────▶ final response
//!   └─ none ─────────────────────▶ invoke_handler
//! ```
//!
//! Whatever path is taken, the outcome is stored on the request
//! ([`Request::response`]); `execute` itself returns nothing.

use crate::collaborators::Tracer;
use crate::prerequisites::{self, Resolution};
use crate::protect::{run_protected, Finalize};
use crate::reply::Reply;
use crate::request::Request;
use crate::response::Outcome;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Milliseconds since `started`.
pub(crate) fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Run prerequisites (if any) and the route handler, then set the request's
/// final response.
pub async fn execute(request: &Request) {
    let outcome = match request.route().prerequisites() {
        Some(prerequisites) => match prerequisites::resolve(request, prerequisites).await {
            Resolution::Proceed => invoke_handler(request).await,
            Resolution::Takeover(response) => Ok(response),
            Resolution::Failed(fault) => Err(fault),
        },
        None => invoke_handler(request).await,
    };
    request.set_response(outcome);
}

/// Invoke the route handler inside the fault boundary.
pub(crate) async fn invoke_handler(request: &Request) -> Outcome {
    let started = Instant::now();
    let handler = Arc::clone(request.route().handler());
    let tracer: &Arc<dyn Tracer> = request.server().tracer();

    let outcome: Outcome = run_protected(|protected, exit| {
        let reply = Reply::new(request.clone(), Finalize::to_exit(exit));
        protected.enter(|| {
            tracer.report(
                "request.handler",
                &json!({
                    "id": request.id().to_string(),
                    "path": request.route().path(),
                }),
            );
            handler(request, reply);
        });
    })
    .await;

    let msec = elapsed_ms(started);
    match &outcome {
        Ok(response) => {
            debug!(
                request_id = %request.id(),
                status = response.status().as_u16(),
                elapsed_ms = msec,
                "Handler completed"
            );
            request.log(&["handler"], json!({ "msec": msec }));
        }
        Err(fault) => request.log(
            &["handler", "error"],
            json!({ "msec": msec, "error": fault.body() }),
        ),
    }
    outcome
}
