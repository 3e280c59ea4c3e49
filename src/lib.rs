//! # brrtexec
//!
//! **brrtexec** is the per-request execution pipeline of a route-based server
//! framework. Given a request bound to a route, it resolves the route's
//! prerequisites, runs the route handler (or a lifecycle extension), and
//! reduces whatever the handler produces into exactly one final outcome,
//! exactly once, whether the handler replies synchronously, from a spawned
//! task, or by panicking.
//!
//! Transport, route matching and response rendering are not part of this
//! crate; they are reached through collaborator traits.
//!
//! ## Architecture
//!
//! - **[`protect`]** - fault boundary and settle-once completion tokens
//! - **[`reply`]** - the single-use [`Reply`] capability handlers answer through
//! - **[`response`]** - responses, payload wrapping and the hold/send commit protocol
//! - **[`prerequisites`]** - ordered groups of concurrent pre-computations
//! - **[`extensions`]** - lifecycle hooks that pass, override or abort
//! - **[`executor`]** - prerequisites-then-handler orchestration
//! - **[`server`]** - registries, collaborators and the request lifecycle
//! - **[`route`]** / **[`methods`]** / **[`config`]** - registration-time configuration
//! - **[`collaborators`]** - views, files, directories, proxying, event tracing
//! - **[`telemetry`]** / **[`runtime_config`]** - logging setup and env configuration
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Transport
//!     participant Server as Server::process
//!     participant Ext as ExtensionRegistry
//!     participant Exec as executor::execute
//!     participant Pre as Prerequisite resolver
//!     participant Guard as run_protected
//!     participant Handler
//!     participant Commit as Commit protocol
//!
//!     Transport->>Server: process(&request)
//!     Server->>Ext: onRequest / onPreAuth / onPostAuth / onPreHandler
//!     alt Hook replies or faults
//!         Ext-->>Server: override / abort
//!     else All hooks pass
//!         Server->>Exec: execute(&request)
//!         opt Route has prerequisites
//!             loop Each group in order
//!                 Exec->>Pre: start every prerequisite of the group
//!                 Pre->>Guard: protected call
//!                 Guard-->>Pre: outcome (assign / takeover / fault)
//!             end
//!         end
//!         Exec->>Guard: protected handler call
//!         Guard->>Handler: handler(&request, reply)
//!         Handler->>Commit: reply.reply(payload)
//!         Note over Commit: hold() keeps it open<br/>until send()
//!         Commit->>Commit: preparation step (view / file)
//!         Commit-->>Guard: finalize(outcome) once
//!         Guard-->>Exec: Result<Response, Fault>
//!         Exec->>Exec: request.set_response(..)
//!         Server->>Ext: onPostHandler
//!     end
//!     Server->>Ext: onPreResponse
//!     Server-->>Transport: request.response()
//! ```
//!
//! ### Key Guarantees
//!
//! 1. **One outcome per request**: completion tokens settle once; repeated
//!    replies, panics after replying and aborts after commit are absorbed
//! 2. **No hangs**: a dropped reply or held response still finalizes
//! 3. **Ordered prerequisites**: group *k+1* starts only after every member of
//!    group *k* completed
//! 4. **Configuration errors never reach requests**: notation, method names and
//!    collaborators are checked when a route is registered
//!
//! ## Example
//!
//! ```rust,no_run
//! use brrtexec::{handler, PrerequisiteConfig, RouteConfig, Server};
//! use http::Method;
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), brrtexec::ConfigError> {
//! let server = Server::builder()
//!     .method("users.get", |call, reply| {
//!         let id = call.arg(0).clone();
//!         drop(reply.reply(json!({ "id": id, "name": "Ada" })));
//!     })?
//!     .build();
//!
//! let route = server.route(
//!     RouteConfig::new(
//!         Method::GET,
//!         "/users/{id}",
//!         handler(|request, reply| {
//!             let user = request.pre("user").unwrap_or_default();
//!             drop(reply.reply(json!({ "user": user })));
//!         }),
//!     )
//!     .pre(PrerequisiteConfig::notation("users.get(params.id)").assign("user")),
//! )?;
//!
//! let request = server.request(&route).param("id", "42").build();
//! server.process(&request).await;
//! # Ok(())
//! # }
//! ```

pub mod collaborators;
pub mod config;
pub mod error;
pub mod executor;
pub mod extensions;
pub mod ids;
pub mod methods;
pub mod prerequisites;
pub mod protect;
pub mod reply;
pub mod request;
pub mod response;
pub mod route;
pub mod runtime_config;
pub mod server;
pub mod telemetry;

pub use collaborators::{
    DirectoryHandler, DirectoryOptions, FileConfig, FileOptions, ProxyHandler, ProxyOptions,
    StaticDirectory, TemplateViews, Tracer, ViewConfig, ViewOptions, ViewsManager,
};
pub use config::{HandlerSettings, RouteSettings};
pub use error::{ConfigError, Fault};
pub use executor::execute;
pub use extensions::{Extension, ExtensionRegistry, LifecycleEvent};
pub use ids::RequestId;
pub use methods::{MethodCall, MethodRegistry};
pub use prerequisites::{FailAction, PrerequisiteConfig, PrerequisiteGroupConfig};
pub use protect::{run_protected, Completion, Exit, Finalize};
pub use reply::{AbortHandle, CloseOptions, Reply};
pub use request::{Request, RequestBuilder, StateChange, StateOptions};
pub use response::{
    preparation, CommitState, HeldResponse, Outcome, Payload, PendingResponse, Response, Source,
    Variant,
};
pub use route::{async_handler, handler, HandlerConfig, HandlerFn, Route, RouteConfig, RouteEnv};
pub use runtime_config::RuntimeConfig;
pub use server::{Server, ServerBuilder};
