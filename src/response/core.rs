use crate::error::Fault;
use crate::request::Request;
use bytes::Bytes;
use futures::future::BoxFuture;
use http::StatusCode;
use serde_json::Value;
use smallvec::SmallVec;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

/// Maximum inline headers before heap allocation
pub const MAX_INLINE_HEADERS: usize = 8;

/// Response header storage; names are shared `Arc<str>` (cheap clone)
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// The result every handler, prerequisite and extension reduces to.
pub type Outcome = Result<Response, Fault>;

/// Asynchronous step run once before a response is considered complete
/// (rendering a view, reading a file). Receives the response by value and
/// returns the completed one or a fault.
pub type Preparation = Box<dyn FnOnce(Response, Request) -> BoxFuture<'static, Outcome> + Send>;

/// Build a [`Preparation`] from an async closure.
pub fn preparation<F, Fut>(step: F) -> Preparation
where
    F: FnOnce(Response, Request) -> Fut + Send + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    Box::new(
        move |response: Response, request: Request| -> BoxFuture<'static, Outcome> {
            Box::pin(step(response, request))
        },
    )
}

/// The raw value a response carries.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Source {
    #[default]
    Empty,
    Json(Value),
    Text(String),
    Bytes(Bytes),
}

impl Source {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Source::Empty)
    }

    /// JSON view of the source. Byte bodies are decoded lossily as UTF-8.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Source::Empty => Value::Null,
            Source::Json(v) => v.clone(),
            Source::Text(s) => Value::String(s.clone()),
            Source::Bytes(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
        }
    }
}

impl From<Value> for Source {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Source::Empty,
            other => Source::Json(other),
        }
    }
}

impl From<String> for Source {
    fn from(value: String) -> Self {
        Source::Text(value)
    }
}

impl From<&str> for Source {
    fn from(value: &str) -> Self {
        Source::Text(value.to_string())
    }
}

impl From<Bytes> for Source {
    fn from(value: Bytes) -> Self {
        Source::Bytes(value)
    }
}

impl From<Vec<u8>> for Source {
    fn from(value: Vec<u8>) -> Self {
        Source::Bytes(Bytes::from(value))
    }
}

/// Which subsystem produced the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variant {
    /// A plain value returned by a handler
    Raw,
    /// File contents, read by the preparation step
    File { path: PathBuf },
    /// Rendered template, produced by the preparation step
    View { template: String },
    /// Produced by a proxy collaborator on behalf of an upstream
    Proxy { upstream: String },
    /// Explicit stream termination
    Closed { end: bool },
}

/// A non-fault response on its way to the transport.
pub struct Response {
    status: StatusCode,
    headers: HeaderVec,
    source: Source,
    variant: Variant,
    takeover: bool,
    preparation: Option<Preparation>,
}

impl Response {
    fn with_variant(variant: Variant, source: Source) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderVec::new(),
            source,
            variant,
            takeover: false,
            preparation: None,
        }
    }

    /// Wrap a plain value.
    pub fn raw(source: impl Into<Source>) -> Self {
        Self::with_variant(Variant::Raw, source.into())
    }

    /// A file response; its preparation step fills the body.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::with_variant(Variant::File { path: path.into() }, Source::Empty)
    }

    /// A view response; its preparation step renders the body.
    pub fn view(template: impl Into<String>) -> Self {
        Self::with_variant(
            Variant::View {
                template: template.into(),
            },
            Source::Empty,
        )
    }

    pub fn proxied(upstream: impl Into<String>, status: StatusCode, source: impl Into<Source>) -> Self {
        let mut response = Self::with_variant(
            Variant::Proxy {
                upstream: upstream.into(),
            },
            source.into(),
        );
        response.status = status;
        response
    }

    pub fn closed(end: bool) -> Self {
        Self::with_variant(Variant::Closed { end }, Source::Empty)
    }

    /// Attach the preparation step.
    #[must_use]
    pub fn with_preparation(mut self, step: Preparation) -> Self {
        self.preparation = Some(step);
        self
    }

    #[must_use]
    pub fn code(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Mark this response as a takeover: returned from a prerequisite, it
    /// replaces the route handler and becomes the final response.
    #[must_use]
    pub fn takeover(mut self) -> Self {
        self.takeover = true;
        self
    }

    pub fn set_takeover(&mut self) {
        self.takeover = true;
    }

    #[must_use]
    pub fn is_takeover(&self) -> bool {
        self.takeover
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    /// Get a header by name (case-insensitive)
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or replace a header
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value.into()));
    }

    #[must_use]
    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn set_source(&mut self, source: impl Into<Source>) {
        self.source = source.into();
    }

    #[must_use]
    pub fn into_source(self) -> Source {
        self.source
    }

    #[must_use]
    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    /// A response with nothing to send. Extensions treat it as pass-through.
    /// A close marker is never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.source.is_empty() && !matches!(self.variant, Variant::Closed { .. })
    }

    #[must_use]
    pub fn has_preparation(&self) -> bool {
        self.preparation.is_some()
    }

    pub(crate) fn take_preparation(&mut self) -> Option<Preparation> {
        self.preparation.take()
    }
}

/// Clones never carry a pending preparation step; it runs at most once, on
/// the response it was prepared for.
impl Clone for Response {
    fn clone(&self) -> Self {
        Self {
            status: self.status,
            headers: self.headers.clone(),
            source: self.source.clone(),
            variant: self.variant.clone(),
            takeover: self.takeover,
            preparation: None,
        }
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("source", &self.source)
            .field("variant", &self.variant)
            .field("takeover", &self.takeover)
            .field("has_preparation", &self.preparation.is_some())
            .finish()
    }
}
