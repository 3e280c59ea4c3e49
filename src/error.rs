//! # Error Types
//!
//! Two families of error live here and they never mix:
//!
//! - [`Fault`] is a *handler fault*: an error-carrying outcome produced while a
//!   request is being executed (by handler code, a prerequisite, an extension,
//!   or internally when user code panics). It is always delivered through the
//!   request's completion path and ends up as the request's response.
//! - [`ConfigError`] is a *configuration fault*: detected while routes, server
//!   methods and prerequisites are being registered. It aborts registration and
//!   never reaches request handling.

use http::StatusCode;
use serde_json::{json, Value};
use std::any::Any;
use std::fmt;

/// An error-carrying response.
///
/// A fault has a machine-readable status, a human message, and an optional
/// carried payload. The transport renders it as the error body returned by
/// [`Fault::body`].
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    status: StatusCode,
    message: String,
    data: Option<Value>,
}

impl Fault {
    /// Create a fault with an explicit status code.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// A 500 caused by a defect in server-side code rather than the request
    /// (uncaught panics, replies without a configured collaborator, a reply
    /// interface dropped without answering).
    pub fn bad_implementation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    /// Attach a carried payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Convert a caught unwind payload into a fault.
    pub fn from_panic(panic: Box<dyn Any + Send>) -> Self {
        let detail = if let Some(s) = panic.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = panic.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::bad_implementation(format!("Uncaught error: {detail}"))
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Canonical reason phrase for the status ("Not Found", ...).
    #[must_use]
    pub fn error(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("Unknown")
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// The rendered error body: `{statusCode, error, message}`.
    #[must_use]
    pub fn body(&self) -> Value {
        json!({
            "statusCode": self.status.as_u16(),
            "error": self.error(),
            "message": self.message,
        })
    }

    /// The value this fault carries when it is used as a non-fatal
    /// prerequisite result: the attached data if any, otherwise the body.
    #[must_use]
    pub fn payload(&self) -> Value {
        self.data.clone().unwrap_or_else(|| self.body())
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.status.as_u16(), self.error(), self.message)
    }
}

impl std::error::Error for Fault {}

impl From<std::io::Error> for Fault {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Fault::not_found(err.to_string()),
            std::io::ErrorKind::PermissionDenied => Fault::forbidden(err.to_string()),
            _ => Fault::internal(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for Fault {
    fn from(err: anyhow::Error) -> Self {
        // A Fault wrapped in anyhow keeps its status
        match err.downcast::<Fault>() {
            Ok(fault) => fault,
            Err(err) => Fault::internal(format!("{err:#}")),
        }
    }
}

/// Configuration-time error raised while registering methods, routes and
/// prerequisites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Method notation does not match `name` or `name(arg.path, ...)`
    InvalidNotation { notation: String },
    /// Method name is not a dotted identifier
    InvalidMethodName { name: String },
    /// Notation refers to a method that is not registered
    UnknownMethod { notation: String },
    /// A server method with this name is already registered
    DuplicateMethod { name: String },
    /// Two prerequisites on the same route assign the same key
    DuplicateAssign { assign: String },
    /// The handler configuration needs a collaborator the server was built without
    MissingCollaborator { collaborator: &'static str },
    /// Route settings could not be parsed
    InvalidSettings { reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidNotation { notation } => {
                write!(f, "Invalid server method string notation: {notation}")
            }
            ConfigError::InvalidMethodName { name } => {
                write!(f, "Invalid server method name: {name}")
            }
            ConfigError::UnknownMethod { notation } => {
                write!(f, "Unknown server method in string notation: {notation}")
            }
            ConfigError::DuplicateMethod { name } => {
                write!(f, "Server method function name already exists: {name}")
            }
            ConfigError::DuplicateAssign { assign } => {
                write!(f, "Prerequisite assignment key used more than once: {assign}")
            }
            ConfigError::MissingCollaborator { collaborator } => {
                write!(f, "Route handler requires a {collaborator} but none is configured")
            }
            ConfigError::InvalidSettings { reason } => {
                write!(f, "Invalid route settings: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
