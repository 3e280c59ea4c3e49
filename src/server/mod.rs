//! # Server Module
//!
//! The [`Server`] owns everything routes and requests share: the server-method
//! registry, the extension registry, the runtime configuration and the
//! collaborators (views, proxy, directory, tracer). It is built once through
//! [`ServerBuilder`] and then only read.
//!
//! ```rust,no_run
//! use brrtexec::{handler, RouteConfig, Server};
//! use http::Method;
//!
//! # async fn demo() -> Result<(), brrtexec::ConfigError> {
//! let server = Server::builder().build();
//! let route = server.route(RouteConfig::new(
//!     Method::GET,
//!     "/health",
//!     handler(|_request, reply| drop(reply.reply("ok"))),
//! ))?;
//! let request = server.request(&route).build();
//! server.process(&request).await;
//! assert!(request.response().is_some());
//! # Ok(())
//! # }
//! ```

mod builder;
mod core;

pub use self::core::Server;
pub use builder::ServerBuilder;
