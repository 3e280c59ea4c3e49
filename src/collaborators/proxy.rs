//! Proxy handler collaborator.
//!
//! No transport ships with this crate; a [`ProxyHandler`] is supplied by the
//! embedding server. The handler it builds answers through the same reply
//! interface it is given, usually with [`Response::proxied`](crate::Response::proxied).

use crate::error::ConfigError;
use crate::route::{HandlerFn, RouteInfo};
use serde::{Deserialize, Serialize};

/// Upstream settings for a proxied route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyOptions {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub protocol: Option<String>,
    /// Full upstream URI; takes precedence over host/port/protocol
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub pass_through: bool,
    #[serde(default)]
    pub x_forward: bool,
}

impl ProxyOptions {
    pub fn uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Self::default()
        }
    }

    /// Upstream base: `uri`, else `protocol://host[:port]`.
    #[must_use]
    pub fn upstream(&self) -> Option<String> {
        if let Some(uri) = &self.uri {
            return Some(uri.clone());
        }
        let host = self.host.as_ref()?;
        let protocol = self.protocol.as_deref().unwrap_or("http");
        Some(match self.port {
            Some(port) => format!("{protocol}://{host}:{port}"),
            None => format!("{protocol}://{host}"),
        })
    }
}

/// Builds handlers for proxied routes.
pub trait ProxyHandler: Send + Sync {
    fn handler(&self, route: &RouteInfo, options: &ProxyOptions) -> Result<HandlerFn, ConfigError>;
}
