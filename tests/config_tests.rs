//! Tests for registration-time configuration
//!
//! # Test Coverage
//!
//! - YAML route settings with notation handlers and prerequisite groups
//! - Configuration errors (unknown methods, bad notation, missing collaborators)
//! - Proxy collaborator integration

mod common;

use brrtexec::{
    handler, ConfigError, HandlerConfig, HandlerFn, ProxyHandler, ProxyOptions, Response,
    RouteConfig, RouteSettings, Variant, ViewConfig,
};
use brrtexec::route::RouteInfo;
use common::body;
use http::{Method, StatusCode};
use serde_json::json;
use std::sync::Arc;

const ROUTES: &str = r#"
- method: get
  path: /users/{id}
  handler:
    method: users.show(params.id, pre.session)
  pre:
    - [{ method: session.load, assign: session }, { method: "flags.load", assign: flags, failAction: ignore }]
- method: post
  path: /users
  handler:
    method: users.create
"#;

fn server() -> Arc<brrtexec::Server> {
    common::builder()
        .method("session.load", |_call, reply| {
            drop(reply.reply(json!({ "user": "ada" })));
        })
        .unwrap()
        .method("flags.load", |_call, reply| {
            drop(reply.fail(brrtexec::Fault::service_unavailable("flags offline")));
        })
        .unwrap()
        .method("users.show", |call, reply| {
            drop(reply.reply(json!({
                "id": call.arg(0),
                "session": call.arg(1),
                "flags": call.request.pre("flags"),
            })));
        })
        .unwrap()
        .method("users.create", |call, reply| {
            let payload = call.request.payload().cloned().unwrap_or_default();
            drop(reply.reply(Response::raw(payload).code(StatusCode::CREATED)));
        })
        .unwrap()
        .build()
}

#[tokio::test]
async fn test_yaml_routes_resolve_and_run() {
    let server = server();
    let routes: Vec<_> = RouteSettings::list_from_yaml_str(ROUTES)
        .unwrap()
        .into_iter()
        .map(|settings| server.route_settings(settings).unwrap())
        .collect();
    assert_eq!(routes.len(), 2);
    assert_eq!(routes[0].method(), &Method::GET);
    assert_eq!(routes[0].prerequisites().map(|p| p.len()), Some(1));
    assert!(routes[1].prerequisites().is_none());

    let request = server.request(&routes[0]).param("id", "7").build();
    server.process(&request).await;
    let result = body(&request.response().unwrap());
    assert_eq!(result["id"], json!("7"));
    assert_eq!(result["session"], json!({ "user": "ada" }));
    assert_eq!(result["flags"]["statusCode"], json!(503));

    let request = server
        .request(&routes[1])
        .payload(json!({ "name": "grace" }))
        .build();
    server.process(&request).await;
    let response = request.response().unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.source().to_value(), json!({ "name": "grace" }));
}

#[test]
fn test_registration_errors() {
    let server = server();

    let unknown = server.route(RouteConfig::new(
        Method::GET,
        "/x",
        HandlerConfig::Method("users.delete".to_string()),
    ));
    assert!(matches!(unknown, Err(ConfigError::UnknownMethod { .. })));

    let malformed = server.route(
        RouteConfig::new(Method::GET, "/x", common::replying(json!(1))).pre("users.show(params.)"),
    );
    assert!(matches!(malformed, Err(ConfigError::InvalidNotation { .. })));

    let duplicate = server.route(
        RouteConfig::new(Method::GET, "/x", common::replying(json!(1)))
            .pre("session.load")
            .pre("session.load"),
    );
    assert!(matches!(duplicate, Err(ConfigError::DuplicateAssign { .. })));

    let no_proxy = server.route(RouteConfig::new(
        Method::GET,
        "/x",
        HandlerConfig::Proxy(ProxyOptions::uri("http://upstream")),
    ));
    assert_eq!(
        no_proxy.unwrap_err(),
        ConfigError::MissingCollaborator {
            collaborator: "proxy handler"
        }
    );

    let no_views = server.route(RouteConfig::new(
        Method::GET,
        "/x",
        HandlerConfig::View(ViewConfig::new("index")),
    ));
    assert!(matches!(
        no_views,
        Err(ConfigError::MissingCollaborator { .. })
    ));

    let duplicate_method = common::builder()
        .method("a", |_call, reply| reply.proceed())
        .unwrap()
        .method("a", |_call, reply| reply.proceed());
    assert!(matches!(
        duplicate_method,
        Err(ConfigError::DuplicateMethod { .. })
    ));
}

/// Answers locally instead of forwarding, recording the upstream it was given.
struct LoopbackProxy;

impl ProxyHandler for LoopbackProxy {
    fn handler(&self, route: &RouteInfo, options: &ProxyOptions) -> Result<HandlerFn, ConfigError> {
        let upstream = options.upstream().ok_or(ConfigError::InvalidSettings {
            reason: format!("proxy for {} has no upstream", route.path),
        })?;
        Ok(handler(move |request, reply| {
            let target = format!("{upstream}{}", request.path());
            drop(reply.reply(Response::proxied(
                upstream.clone(),
                StatusCode::OK,
                json!({ "forwarded": target }),
            )));
        }))
    }
}

#[tokio::test]
async fn test_proxy_collaborator() {
    let server = common::builder().proxy(Arc::new(LoopbackProxy)).build();

    let configured = server
        .route(RouteConfig::new(
            Method::GET,
            "/api/pets",
            HandlerConfig::Proxy(ProxyOptions {
                host: Some("pets".to_string()),
                port: Some(9000),
                ..ProxyOptions::default()
            }),
        ))
        .unwrap();
    let request = server.request(&configured).build();
    server.process(&request).await;
    let response = request.response().unwrap().unwrap();
    assert_eq!(
        response.variant(),
        &Variant::Proxy {
            upstream: "http://pets:9000".to_string()
        }
    );
    assert_eq!(
        response.source().to_value(),
        json!({ "forwarded": "http://pets:9000/api/pets" })
    );

    // reply.proxy() from inside a handler goes through the same collaborator
    let delegating = server
        .route(RouteConfig::new(
            Method::GET,
            "/legacy",
            handler(|_request, reply| reply.proxy(ProxyOptions::uri("http://legacy"))),
        ))
        .unwrap();
    let request = server.request(&delegating).build();
    server.process(&request).await;
    assert_eq!(
        body(&request.response().unwrap()),
        json!({ "forwarded": "http://legacy/legacy" })
    );

    let missing_upstream = server.route(RouteConfig::new(
        Method::GET,
        "/nowhere",
        HandlerConfig::Proxy(ProxyOptions::default()),
    ));
    assert!(matches!(
        missing_upstream,
        Err(ConfigError::InvalidSettings { .. })
    ));
}
