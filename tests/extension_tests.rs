//! Tests for lifecycle extensions and the full request lifecycle
//!
//! # Test Coverage
//!
//! - Empty hook lists complete without error
//! - Pass / override / abort semantics and strict ordering, including
//!   hooks whose response is prepared asynchronously
//! - Empty prepared responses count as pass-through
//! - `Server::process` event order, early answers and response replacement
//! - Tracer events reported by the pipeline

mod common;

use brrtexec::collaborators::TemplateViews;
use brrtexec::{
    handler, preparation, Extension, Fault, HandlerFn, LifecycleEvent, Response, RouteEnv,
    ViewOptions,
};
use common::{body, replying, route, RecordingTracer};
use http::StatusCode;
use parking_lot::Mutex;
use serde_json::json;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

type Trail = Arc<Mutex<Vec<String>>>;

fn passing(trail: &Trail, name: &str) -> HandlerFn {
    let trail = Arc::clone(trail);
    let name = name.to_string();
    handler(move |_request, reply| {
        trail.lock().push(name.clone());
        reply.proceed();
    })
}

fn recording_handler(trail: &Trail) -> HandlerFn {
    let trail = Arc::clone(trail);
    handler(move |_request, reply| {
        trail.lock().push("handler".to_string());
        drop(reply.reply(json!("from handler")));
    })
}

#[tokio::test]
async fn test_empty_event_completes() {
    let server = common::server();
    let route = route(&server, replying(json!(1)));
    let request = server.request(&route).build();

    let outcome = server.invoke(&request, LifecycleEvent::OnRequest).await;
    assert!(matches!(outcome, Ok(None)));
    assert!(request.logs().is_empty());
}

#[tokio::test]
async fn test_fault_in_second_hook_skips_third() {
    let trail: Trail = Arc::default();
    let third = Arc::clone(&trail);
    let server = common::builder()
        .ext(LifecycleEvent::OnPreAuth, passing(&trail, "first"))
        .ext(
            LifecycleEvent::OnPreAuth,
            handler(|_request, reply| drop(reply.fail(Fault::forbidden("blocked")))),
        )
        .ext(
            LifecycleEvent::OnPreAuth,
            handler(move |_request, reply| {
                third.lock().push("third".to_string());
                reply.proceed();
            }),
        )
        .build();
    let route = route(&server, replying(json!(1)));
    let request = server.request(&route).build();

    let fault = server
        .invoke(&request, LifecycleEvent::OnPreAuth)
        .await
        .unwrap_err();
    assert_eq!(fault.status(), StatusCode::FORBIDDEN);
    assert_eq!(trail.lock().as_slice(), &["first".to_string()]);
    assert!(request
        .logs()
        .iter()
        .any(|entry| entry.has_tags(&["ext", "error"])));
}

#[tokio::test]
async fn test_all_hooks_pass_in_order() {
    let trail: Trail = Arc::default();
    let server = common::builder()
        .ext(LifecycleEvent::OnRequest, passing(&trail, "a"))
        .ext(LifecycleEvent::OnRequest, passing(&trail, "b"))
        .ext(LifecycleEvent::OnRequest, passing(&trail, "c"))
        .build();
    let route = route(&server, replying(json!(1)));
    let request = server.request(&route).build();

    let outcome = server.invoke(&request, LifecycleEvent::OnRequest).await;
    assert!(matches!(outcome, Ok(None)));
    assert_eq!(trail.lock().as_slice(), &["a", "b", "c"].map(String::from));
}

#[tokio::test]
async fn test_override_and_empty_responses() {
    let trail: Trail = Arc::default();
    let server = common::builder()
        // An empty reply passes
        .ext(
            LifecycleEvent::OnPreHandler,
            handler(|_request, reply| drop(reply.reply(()))),
        )
        // A prepared response that stays empty passes
        .ext(
            LifecycleEvent::OnPreHandler,
            handler(|_request, reply| {
                drop(reply.reply(
                    Response::view("empty")
                        .with_preparation(preparation(|response, _request| async move {
                            Ok(response)
                        })),
                ));
            }),
        )
        .ext(
            LifecycleEvent::OnPreHandler,
            handler(|_request, reply| drop(reply.reply(json!({ "maintenance": true })))),
        )
        .ext(LifecycleEvent::OnPreHandler, passing(&trail, "never"))
        .build();
    let route = route(&server, replying(json!(1)));
    let request = server.request(&route).build();

    let response = server
        .invoke(&request, LifecycleEvent::OnPreHandler)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.source().to_value(), json!({ "maintenance": true }));
    assert!(trail.lock().is_empty());
}

#[tokio::test]
async fn test_next_hook_waits_for_async_preparation() {
    let prepared_at: Arc<Mutex<Option<Instant>>> = Arc::default();
    let started_at: Arc<Mutex<Option<Instant>>> = Arc::default();
    let prepared = Arc::clone(&prepared_at);
    let started = Arc::clone(&started_at);
    let server = common::builder()
        .ext(
            LifecycleEvent::OnPostAuth,
            handler(move |_request, reply| {
                let prepared = Arc::clone(&prepared);
                drop(reply.reply(Response::view("slow").with_preparation(preparation(
                    move |response, _request| async move {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        *prepared.lock() = Some(Instant::now());
                        Ok(response)
                    },
                ))));
            }),
        )
        .ext(
            LifecycleEvent::OnPostAuth,
            handler(move |_request, reply| {
                *started.lock() = Some(Instant::now());
                reply.proceed();
            }),
        )
        .build();
    let route = route(&server, replying(json!(1)));
    let request = server.request(&route).build();

    let outcome = server.invoke(&request, LifecycleEvent::OnPostAuth).await;
    assert!(matches!(outcome, Ok(None)));

    let prepared = prepared_at.lock().unwrap();
    let started = started_at.lock().unwrap();
    assert!(started >= prepared);
}

#[tokio::test]
async fn test_panicking_hook_aborts() {
    let server = common::builder()
        .ext(
            LifecycleEvent::OnPostAuth,
            handler(|_request, _reply| panic!("hook exploded")),
        )
        .build();
    let route = route(&server, replying(json!(1)));
    let request = server.request(&route).build();

    let fault = server
        .invoke(&request, LifecycleEvent::OnPostAuth)
        .await
        .unwrap_err();
    assert!(fault.message().contains("hook exploded"));
}

#[tokio::test]
async fn test_hook_view_uses_extension_env() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("banner.html"), "<b>{{ who }}</b>").unwrap();
    let env = RouteEnv::default()
        .with_views(Arc::new(TemplateViews::new(dir.path())))
        .with_bind(Arc::new("ops".to_string()));

    let server = common::builder()
        .ext(
            LifecycleEvent::OnRequest,
            Extension::new(handler(|_request, reply| {
                let who = reply.bind_as::<String>().cloned().unwrap_or_default();
                drop(reply.view("banner", json!({ "who": who }), ViewOptions::default()));
            }))
            .with_env(env),
        )
        .build();
    let route = route(&server, replying(json!(1)));
    let request = server.request(&route).build();

    let response = server
        .invoke(&request, LifecycleEvent::OnRequest)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.source().to_value(), json!("<b>ops</b>"));
}

#[tokio::test]
async fn test_process_runs_lifecycle_in_order() {
    let trail: Trail = Arc::default();
    let tracer = Arc::new(RecordingTracer::default());
    let server = common::builder()
        .tracer(Arc::clone(&tracer) as Arc<dyn brrtexec::Tracer>)
        .ext(LifecycleEvent::OnRequest, passing(&trail, "onRequest"))
        .ext(LifecycleEvent::OnPreAuth, passing(&trail, "onPreAuth"))
        .ext(LifecycleEvent::OnPostAuth, passing(&trail, "onPostAuth"))
        .ext(LifecycleEvent::OnPreHandler, passing(&trail, "onPreHandler"))
        .ext(LifecycleEvent::OnPostHandler, passing(&trail, "onPostHandler"))
        .ext(LifecycleEvent::OnPreResponse, passing(&trail, "onPreResponse"))
        .build();
    let route = route(&server, recording_handler(&trail));
    let request = server.request(&route).build();

    server.process(&request).await;

    assert_eq!(
        trail.lock().as_slice(),
        &[
            "onRequest",
            "onPreAuth",
            "onPostAuth",
            "onPreHandler",
            "handler",
            "onPostHandler",
            "onPreResponse",
        ]
        .map(String::from)
    );
    assert_eq!(body(&request.response().unwrap()), json!("from handler"));
    let events = tracer.names();
    assert_eq!(events.iter().filter(|e| *e == "ext.start").count(), 6);
    assert!(events.iter().any(|e| e == "request.handler"));
}

#[tokio::test]
async fn test_process_early_answer_skips_handler() {
    let trail: Trail = Arc::default();
    let server = common::builder()
        .ext(
            LifecycleEvent::OnPreAuth,
            handler(|_request, reply| drop(reply.fail(Fault::unauthorized("missing token")))),
        )
        .ext(LifecycleEvent::OnPostAuth, passing(&trail, "onPostAuth"))
        .ext(LifecycleEvent::OnPostHandler, passing(&trail, "onPostHandler"))
        .ext(LifecycleEvent::OnPreResponse, passing(&trail, "onPreResponse"))
        .build();
    let route = route(&server, recording_handler(&trail));
    let request = server.request(&route).build();

    server.process(&request).await;

    assert_eq!(trail.lock().as_slice(), &["onPreResponse".to_string()]);
    assert_eq!(
        request.response().unwrap().unwrap_err().status(),
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_pre_response_replaces_response() {
    let server = common::builder()
        .ext(
            LifecycleEvent::OnPostHandler,
            handler(|request, reply| {
                let original = request
                    .response()
                    .and_then(Result::ok)
                    .map(|r| r.source().to_value());
                drop(reply.reply(json!({ "wrapped": original })));
            }),
        )
        .ext(
            LifecycleEvent::OnPreResponse,
            handler(|request, reply| {
                let status = match request.response() {
                    Some(Ok(_)) => "ok",
                    _ => "failed",
                };
                drop(reply.reply(Response::raw(json!({ "status": status })).code(StatusCode::ACCEPTED)));
            }),
        )
        .build();
    let route = route(&server, replying(json!("payload")));
    let request = server.request(&route).build();

    server.process(&request).await;

    let response = request.response().unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.source().to_value(), json!({ "status": "ok" }));
}
