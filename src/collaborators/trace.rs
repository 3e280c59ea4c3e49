//! Tracing collaborator: best-effort event reports that never affect
//! control flow.

use serde_json::Value;
use tracing::trace;

pub trait Tracer: Send + Sync {
    fn report(&self, event: &str, data: &Value);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn report(&self, _event: &str, _data: &Value) {}
}

/// Emits every event as a `trace`-level `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn report(&self, event: &str, data: &Value) {
        trace!(target: "brrtexec::events", event = %event, data = %data, "pipeline event");
    }
}
