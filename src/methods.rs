//! # Server Methods
//!
//! Registry of named server methods and the string notation that references
//! them from route configuration:
//!
//! ```text
//! users.get                 -> users.get(request)
//! users.get(params.id)      -> users.get([request.params.id])
//! users.find(query.q, pre.user.id)
//! ```
//!
//! Notation is resolved once, at registration time. Malformed notation,
//! invalid names and unknown methods are [`ConfigError`]s; they never reach
//! request handling.

use crate::error::ConfigError;
use crate::reply::Reply;
use crate::request::Request;
use crate::route::{self, HandlerFn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[allow(clippy::expect_used)]
static METHOD_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z]\w*(?:\.[a-zA-Z]\w*)*$").expect("method name regex should be valid")
});

#[allow(clippy::expect_used)]
static ARG_PATH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w+(?:\.\w+)*$").expect("argument path regex should be valid"));

/// What a server method is called with.
#[derive(Clone)]
pub struct MethodCall {
    pub request: Request,
    /// Arguments resolved from notation; `None` when the notation had no
    /// parentheses
    pub args: Option<Vec<Value>>,
}

impl MethodCall {
    /// Argument at `index`, `Null` when absent.
    #[must_use]
    pub fn arg(&self, index: usize) -> &Value {
        self.args
            .as_ref()
            .and_then(|args| args.get(index))
            .unwrap_or(&Value::Null)
    }
}

pub type ServerMethod = Arc<dyn Fn(MethodCall, Reply) + Send + Sync>;

/// Named server methods, populated while the server is built.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: HashMap<String, ServerMethod>,
}

impl MethodRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&mut self, name: &str, method: F) -> Result<(), ConfigError>
    where
        F: Fn(MethodCall, Reply) + Send + Sync + 'static,
    {
        if !METHOD_NAME_REGEX.is_match(name) {
            return Err(ConfigError::InvalidMethodName {
                name: name.to_string(),
            });
        }
        if self.methods.contains_key(name) {
            return Err(ConfigError::DuplicateMethod {
                name: name.to_string(),
            });
        }
        self.methods.insert(name.to_string(), Arc::new(method));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ServerMethod> {
        self.methods.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.methods.keys().collect();
        names.sort();
        f.debug_struct("MethodRegistry").field("methods", &names).finish()
    }
}

/// Parsed method notation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notation {
    pub name: String,
    /// Argument paths; `None` without parentheses, possibly empty with them
    pub args: Option<Vec<String>>,
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Parse `name` or `name(path, ...)`.
///
/// The name is checked only for its character set here; [`resolve`] also
/// validates it as a method name.
pub fn parse_notation(notation: &str) -> Result<Notation, ConfigError> {
    let invalid = || ConfigError::InvalidNotation {
        notation: notation.to_string(),
    };

    let (head, tail) = match notation.find('(') {
        Some(open) => (&notation[..open], Some(&notation[open + 1..])),
        None => (notation, None),
    };
    let name = head.trim_end();
    if name.is_empty() || !name.chars().all(|c| is_word(c) || c == '.') {
        return Err(invalid());
    }

    let args = match tail {
        None => None,
        Some(rest) => {
            let inner = rest.trim_end().strip_suffix(')').ok_or_else(invalid)?.trim();
            if inner.is_empty() {
                Some(Vec::new())
            } else {
                let args = inner
                    .split(',')
                    .map(str::trim)
                    .map(|arg| {
                        if ARG_PATH_REGEX.is_match(arg) {
                            Ok(arg.to_string())
                        } else {
                            Err(invalid())
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Some(args)
            }
        }
    };

    Ok(Notation {
        name: name.to_string(),
        args,
    })
}

/// Notation resolved against a registry.
#[derive(Clone)]
pub struct ResolvedMethod {
    pub name: String,
    pub handler: HandlerFn,
}

impl fmt::Debug for ResolvedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedMethod")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Resolve `notation` into a handler calling the registered method.
pub fn resolve(notation: &str, registry: &MethodRegistry) -> Result<ResolvedMethod, ConfigError> {
    let Notation { name, args } = parse_notation(notation)?;
    if !METHOD_NAME_REGEX.is_match(&name) {
        return Err(ConfigError::InvalidMethodName { name });
    }
    let method = registry
        .get(&name)
        .cloned()
        .ok_or_else(|| ConfigError::UnknownMethod {
            notation: notation.to_string(),
        })?;

    let handler = route::handler(move |request: &Request, reply: Reply| {
        let args = args
            .as_ref()
            .map(|paths| paths.iter().map(|path| request.reach(path)).collect());
        method(
            MethodCall {
                request: request.clone(),
                args,
            },
            reply,
        );
    });

    Ok(ResolvedMethod { name, handler })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_name() {
        let notation = parse_notation("users.get").unwrap();
        assert_eq!(notation.name, "users.get");
        assert_eq!(notation.args, None);
    }

    #[test]
    fn test_parse_arguments() {
        let notation = parse_notation("users.find ( params.id ,  query.q )").unwrap();
        assert_eq!(notation.name, "users.find");
        assert_eq!(
            notation.args,
            Some(vec!["params.id".to_string(), "query.q".to_string()])
        );
    }

    #[test]
    fn test_parse_empty_parens() {
        let notation = parse_notation("now()").unwrap();
        assert_eq!(notation.args, Some(vec![]));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "a b", "user(params.id", "user(params..id)", "user(a,)", "x)"] {
            assert!(
                matches!(parse_notation(bad), Err(ConfigError::InvalidNotation { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_registry_rejects_bad_and_duplicate_names() {
        let mut registry = MethodRegistry::new();
        registry.add("users.get", |_call, reply| reply.proceed()).unwrap();
        assert!(matches!(
            registry.add("users.get", |_call, reply| reply.proceed()),
            Err(ConfigError::DuplicateMethod { .. })
        ));
        assert!(matches!(
            registry.add("1users", |_call, reply| reply.proceed()),
            Err(ConfigError::InvalidMethodName { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_errors() {
        let registry = MethodRegistry::new();
        assert!(matches!(
            resolve("users.get", &registry),
            Err(ConfigError::UnknownMethod { .. })
        ));
        assert!(matches!(
            resolve("_private", &registry),
            Err(ConfigError::InvalidMethodName { .. })
        ));
        assert!(matches!(
            resolve("users.get(", &registry),
            Err(ConfigError::InvalidNotation { .. })
        ));
    }
}
