//! # Runtime Configuration Module
//!
//! Environment variable-based configuration for the execution pipeline.
//!
//! ## Environment Variables
//!
//! ### `BRRTEXEC_TRACE_EVENTS`
//!
//! When `true`, servers built without an explicit tracer report pipeline
//! events (`request.handler`, `pre.start`, `pre.end`, `ext.start`) through
//! [`LogTracer`](crate::collaborators::LogTracer) at `TRACE` level.
//! Default: `false` (events are discarded).
//!
//! ### `BRRTEXEC_EXT_YIELD`
//!
//! When `true`, invoking a lifecycle event that has no registered hooks
//! yields to the scheduler once before completing, so an empty event never
//! completes inside the caller's current poll. Default: `true`.
//!
//! ## Usage
//!
//! ```rust
//! use brrtexec::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! println!("trace events: {}", config.trace_events);
//! ```

use std::env;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Report pipeline events to the tracing collaborator (default: false)
    pub trace_events: bool,
    /// Yield once when an extension event has no hooks (default: true)
    pub ext_yield: bool,
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            trace_events: parse_bool("BRRTEXEC_TRACE_EVENTS").unwrap_or(defaults.trace_events),
            ext_yield: parse_bool("BRRTEXEC_EXT_YIELD").unwrap_or(defaults.ext_yield),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            trace_events: false,
            ext_yield: true,
        }
    }
}

fn parse_bool(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
