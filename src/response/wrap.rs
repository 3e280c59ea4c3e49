use super::core::{Outcome, Response, Source};
use crate::error::Fault;
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

/// Anything a handler may answer with.
///
/// Handlers pass values through `Into<Payload>`: plain values become raw
/// responses, faults and error types become faults, `Result`s pick the
/// matching side and `None` is an empty reply.
#[derive(Debug)]
pub enum Payload {
    Empty,
    Fault(Fault),
    Response(Response),
    Source(Source),
}

impl Payload {
    /// Serialize any value into a JSON payload.
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => Payload::Source(v.into()),
            Err(err) => Payload::Fault(Fault::bad_implementation(format!(
                "Failed to serialize reply: {err}"
            ))),
        }
    }
}

/// Reduce a payload to a response or a fault.
///
/// Responses pass through untouched; anything fault-flagged becomes the
/// fault; every other value is wrapped as a [`Variant::Raw`](super::Variant::Raw)
/// response.
pub fn wrap(payload: impl Into<Payload>) -> Outcome {
    match payload.into() {
        Payload::Empty => Ok(Response::raw(Source::Empty)),
        Payload::Fault(fault) => Err(fault),
        Payload::Response(response) => Ok(response),
        Payload::Source(source) => Ok(Response::raw(source)),
    }
}

impl From<Fault> for Payload {
    fn from(fault: Fault) -> Self {
        Payload::Fault(fault)
    }
}

impl From<Response> for Payload {
    fn from(response: Response) -> Self {
        Payload::Response(response)
    }
}

impl From<Source> for Payload {
    fn from(source: Source) -> Self {
        Payload::Source(source)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Source(value.into())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Source(value.into())
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Source(value.into())
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Payload::Source(value.into())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Source(value.into())
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Payload::Empty
    }
}

impl From<std::io::Error> for Payload {
    fn from(err: std::io::Error) -> Self {
        Payload::Fault(err.into())
    }
}

impl From<anyhow::Error> for Payload {
    fn from(err: anyhow::Error) -> Self {
        Payload::Fault(err.into())
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map_or(Payload::Empty, Into::into)
    }
}

impl<T, E> From<Result<T, E>> for Payload
where
    T: Into<Payload>,
    E: Into<Fault>,
{
    fn from(value: Result<T, E>) -> Self {
        match value {
            Ok(v) => v.into(),
            Err(e) => Payload::Fault(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Variant;
    use serde_json::json;

    #[test]
    fn test_plain_value_becomes_raw() {
        let response = wrap(json!({"id": 1})).unwrap();
        assert_eq!(response.variant(), &Variant::Raw);
        assert_eq!(response.source().to_value(), json!({"id": 1}));
    }

    #[test]
    fn test_fault_bypasses_response() {
        let outcome = wrap(Fault::unauthorized("who are you"));
        assert_eq!(outcome.unwrap_err().status(), http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_response_passes_through() {
        let response = wrap(Response::raw("x").takeover()).unwrap();
        assert!(response.is_takeover());
    }

    #[test]
    fn test_result_and_option_pick_side() {
        let ok: Result<&str, Fault> = Ok("fine");
        assert_eq!(wrap(ok).unwrap().source().to_value(), json!("fine"));
        let err: Result<&str, std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(wrap(err).is_err());
        assert!(wrap(None::<String>).unwrap().is_empty());
    }
}
