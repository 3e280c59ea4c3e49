//! # Route Settings
//!
//! Serializable route configuration, for routes declared in YAML or JSON
//! rather than built in code:
//!
//! ```yaml
//! - method: GET
//!   path: /users/{id}
//!   handler:
//!     method: users.get(params.id)
//!   pre:
//!     - [session.load, { method: "flags.load", assign: flags, failAction: log }]
//!     - audit.start
//! - method: GET
//!   path: /static/{path}
//!   handler:
//!     directory: { path: ./public, index: index.html }
//! ```
//!
//! Function handlers cannot be expressed here; everything else
//! ([`HandlerSettings`]) maps one to one onto
//! [`HandlerConfig`](crate::route::HandlerConfig).

use crate::collaborators::{DirectoryOptions, FileConfig, ProxyOptions, ViewConfig};
use crate::error::ConfigError;
use crate::prerequisites::PrerequisiteGroupConfig;
use crate::route::{HandlerConfig, RouteConfig};
use http::Method;
use serde::Deserialize;

/// Non-function handler variants.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerSettings {
    /// Server-method notation
    Method(String),
    Proxy(ProxyOptions),
    File(FileConfig),
    Directory(DirectoryOptions),
    View(ViewConfig),
}

impl From<HandlerSettings> for HandlerConfig {
    fn from(settings: HandlerSettings) -> Self {
        match settings {
            HandlerSettings::Method(notation) => HandlerConfig::Method(notation),
            HandlerSettings::Proxy(options) => HandlerConfig::Proxy(options),
            HandlerSettings::File(config) => HandlerConfig::File(config),
            HandlerSettings::Directory(options) => HandlerConfig::Directory(options),
            HandlerSettings::View(config) => HandlerConfig::View(config),
        }
    }
}

/// One route as declared in settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteSettings {
    pub method: String,
    pub path: String,
    #[serde(deserialize_with = "serde_yaml::with::singleton_map::deserialize")]
    pub handler: HandlerSettings,
    #[serde(default)]
    pub pre: Vec<PrerequisiteGroupConfig>,
}

impl RouteSettings {
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(source).map_err(|err| ConfigError::InvalidSettings {
            reason: err.to_string(),
        })
    }

    /// Parse a YAML sequence of routes.
    pub fn list_from_yaml_str(source: &str) -> Result<Vec<Self>, ConfigError> {
        serde_yaml::from_str(source).map_err(|err| ConfigError::InvalidSettings {
            reason: err.to_string(),
        })
    }

    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(source).map_err(|err| ConfigError::InvalidSettings {
            reason: err.to_string(),
        })
    }

    /// Convert into a [`RouteConfig`] ready for `Server::route`.
    pub fn into_config(self) -> Result<RouteConfig, ConfigError> {
        let method = Method::from_bytes(self.method.to_ascii_uppercase().as_bytes()).map_err(
            |_| ConfigError::InvalidSettings {
                reason: format!("invalid HTTP method: {}", self.method),
            },
        )?;
        let mut config = RouteConfig::new(method, self.path, HandlerConfig::from(self.handler));
        for group in self.pre {
            config = config.pre(group);
        }
        Ok(config)
    }
}
