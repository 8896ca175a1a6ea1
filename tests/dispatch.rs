//! End-to-end dispatch through the axum router built from compiled routes.

use architect_dispatch::filter::REQUEST_ID_KEY;
use architect_dispatch::route::{RouteSink, RouteSlot};
use architect_dispatch::{
    Action, Envelope, Exchange, Filter, FilterChain, HandlerKind, Next, RelayBus, Reply,
    RequestIdFilter, RouteCompiler, RouteDescriptor, Routes, ServerConfig, WebError,
};
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

fn counted(counter: &Arc<AtomicUsize>, reply: Value) -> Action {
    let counter = Arc::clone(counter);
    Action::sync(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(reply.clone())
    })
}

fn router(descriptors: &[RouteDescriptor], filters: FilterChain) -> Router {
    router_with_bus(descriptors, filters, RelayBus::empty())
}

fn router_with_bus(descriptors: &[RouteDescriptor], filters: FilterChain, bus: RelayBus) -> Router {
    let (routes, report) = RouteCompiler::new(Arc::new(bus)).build(descriptors);
    assert!(report.rejected.is_empty(), "{:?}", report.rejected);
    routes.into_router(filters)
}

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn list_route_wins_over_param_route_for_bare_collection_path() {
    let get_user = Arc::new(AtomicUsize::new(0));
    let list_users = Arc::new(AtomicUsize::new(0));
    let descriptors = vec![
        RouteDescriptor::get("/users/:id").action(counted(&get_user, json!({ "id": 1 }))),
        RouteDescriptor::get("/users")
            .action(counted(&list_users, json!([{ "id": 1 }])))
            .order(1),
    ];
    let (routes, _) = RouteCompiler::new(Arc::new(RelayBus::empty())).build(&descriptors);
    assert_eq!(routes.len(), 2);

    let app = routes.into_router(FilterChain::new());
    let response = app.oneshot(request(Method::GET, "/users")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([{ "id": 1 }]));
    assert_eq!(list_users.load(Ordering::SeqCst), 1);
    assert_eq!(get_user.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn live_route_count_equals_descriptors_with_actions() {
    let hits = Arc::new(AtomicUsize::new(0));
    let descriptors: Vec<RouteDescriptor> = (0..7)
        .map(|i| {
            let d = RouteDescriptor::get(format!("/r{}", i));
            if i % 3 == 0 {
                d
            } else {
                d.action(counted(&hits, json!(i)))
            }
        })
        .collect();
    let expected = descriptors.iter().filter(|d| d.action.is_some()).count();
    let (routes, report) = RouteCompiler::new(Arc::new(RelayBus::empty())).build(&descriptors);
    assert_eq!(routes.len(), expected);
    assert_eq!(report.skipped, descriptors.len() - expected);
}

#[tokio::test]
async fn route_without_action_is_never_reachable() {
    let descriptors = vec![RouteDescriptor::get("/ghost")];
    let app = router(&descriptors, FilterChain::new());
    let response = app.oneshot(request(Method::GET, "/ghost")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], -60001);
}

#[tokio::test]
async fn excluded_content_type_never_reaches_handler() {
    let hits = Arc::new(AtomicUsize::new(0));
    let descriptors = vec![RouteDescriptor::post("/upload")
        .action(counted(&hits, json!("ok")))
        .consumes(["application/json"])];
    let app = router(&descriptors, FilterChain::new());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/upload")
                .header(header::CONTENT_TYPE, "text/plain")
                .body(Body::from("hello"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body_json(response).await["code"], -60004);

    let missing = app
        .clone()
        .oneshot(request(Method::POST, "/upload"))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    let accepted = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/upload")
                .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
                .body(Body::from(r#"{"a":1}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(accepted.status(), StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unacceptable_accept_header_is_rejected() {
    let hits = Arc::new(AtomicUsize::new(0));
    let descriptors = vec![RouteDescriptor::get("/report")
        .action(counted(&hits, json!({})))
        .produces(["application/json"])];
    let app = router(&descriptors, FilterChain::new());
    let response = app
        .oneshot(
            Request::builder()
                .uri("/report")
                .header(header::ACCEPT, "text/csv")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn wrong_verb_on_known_path_is_method_not_allowed() {
    let hits = Arc::new(AtomicUsize::new(0));
    let descriptors = vec![RouteDescriptor::get("/items").action(counted(&hits, json!([])))];
    let app = router(&descriptors, FilterChain::new());
    let response = app.oneshot(request(Method::DELETE, "/items")).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body = body_json(response).await;
    assert_eq!(body["code"], -60002);
    assert!(body["message"].as_str().unwrap().starts_with("[ERR-60002]"));
}

#[tokio::test]
async fn path_params_query_and_body_reach_the_action() {
    let descriptors = vec![RouteDescriptor::put("/orders/:id")
        .action(Action::deferred(|env: Envelope| async move {
            Ok::<_, WebError>(json!({
                "id": env.param("id"),
                "dry": env.query("dry"),
                "body": env.body,
            }))
        }))
        .kind(HandlerKind::Async)];
    let app = router(&descriptors, FilterChain::new());
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::PUT)
                .uri("/orders/42?dry=yes")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"qty":3}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "id": "42", "dry": "yes", "body": { "qty": 3 } })
    );
}

#[tokio::test]
async fn malformed_json_body_is_bad_request() {
    let hits = Arc::new(AtomicUsize::new(0));
    let descriptors = vec![RouteDescriptor::post("/things").action(counted(&hits, json!(1)))];
    let app = router(&descriptors, FilterChain::new());
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/things")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn null_result_is_no_content() {
    let descriptors = vec![RouteDescriptor::delete("/things/:id").action(Action::sync(|_| Ok(Value::Null)))];
    let app = router(&descriptors, FilterChain::new());
    let response = app.oneshot(request(Method::DELETE, "/things/1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

struct Gate;

#[async_trait]
impl Filter for Gate {
    fn name(&self) -> &'static str {
        "gate"
    }

    async fn do_filter(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), WebError> {
        if exchange.headers().contains_key(header::AUTHORIZATION) {
            let ctx = self.context(exchange)?;
            ctx.put("user", "ann");
            next.run(exchange).await
        } else {
            exchange.end(Reply::status(StatusCode::UNAUTHORIZED));
            Ok(())
        }
    }
}

#[tokio::test]
async fn filters_run_in_order_and_may_end_the_exchange() {
    let descriptors = vec![RouteDescriptor::get("/me").action(Action::sync(|env: Envelope| {
        Ok(json!({
            "user": env.context("user"),
            "has_request_id": env.context(REQUEST_ID_KEY).is_some(),
        }))
    }))];
    let filters = FilterChain::new().with(RequestIdFilter).with(Gate);
    let app = router(&descriptors, filters);

    let denied = app.clone().oneshot(request(Method::GET, "/me")).await.unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let allowed = app
        .oneshot(
            Request::builder()
                .uri("/me")
                .header(header::AUTHORIZATION, "Bearer t")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
    assert_eq!(
        body_json(allowed).await,
        json!({ "user": "ann", "has_request_id": true })
    );
}

struct Silent;

#[async_trait]
impl Filter for Silent {
    fn name(&self) -> &'static str {
        "silent"
    }

    async fn do_filter(&self, _exchange: &mut Exchange, _next: Next<'_>) -> Result<(), WebError> {
        Ok(())
    }
}

#[tokio::test]
async fn filter_that_neither_replies_nor_continues_is_a_server_error() {
    let hits = Arc::new(AtomicUsize::new(0));
    let descriptors = vec![RouteDescriptor::get("/x").action(counted(&hits, json!(1)))];
    let app = router(&descriptors, FilterChain::new().with(Silent));
    let response = app.oneshot(request(Method::GET, "/x")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["code"], -60006);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn relay_route_answers_with_worker_reply() {
    let bus = RelayBus::builder()
        .worker("audit", |message: Envelope| async move {
            Ok::<_, WebError>(json!({ "audited": message.body }))
        })
        .build();
    let descriptors = vec![
        RouteDescriptor::post("/events")
            .action(Action::sync(|env: Envelope| Ok(json!({ "event": env.body }))))
            .relay("audit"),
        RouteDescriptor::post("/lost")
            .action(Action::sync(|_| Ok(json!(1))))
            .relay("nowhere"),
    ];
    let app = router_with_bus(&descriptors, FilterChain::new(), bus);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/events")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#""login""#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({ "audited": { "event": "login" } })
    );

    let lost = app.oneshot(request(Method::POST, "/lost")).await.unwrap();
    assert_eq!(lost.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(lost).await["code"], -60011);
}

#[tokio::test]
async fn action_error_is_rendered_with_its_payload() {
    let descriptors = vec![RouteDescriptor::get("/accounts/:id").action(Action::sync(
        |env: Envelope| {
            Err(WebError::record_missing("accounts", env.param("id").unwrap_or("?"))
                .with_readable("Account {0} does not exist"))
        },
    ))];
    let app = router(&descriptors, FilterChain::new());
    let response = app.oneshot(request(Method::GET, "/accounts/9")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["code"], -60008);
    assert_eq!(body["info"], "Account 9 does not exist");
}

#[tokio::test]
async fn panicking_action_is_rendered_as_internal_error() {
    let descriptors = vec![
        RouteDescriptor::get("/boom").action(Action::sync(|_: Envelope| -> Result<Value, WebError> {
            panic!("kaboom")
        })),
        RouteDescriptor::get("/fine").action(Action::sync(|_| Ok(json!("fine")))),
    ];
    let app = router(&descriptors, FilterChain::new().with(RequestIdFilter));

    let response = app
        .clone()
        .oneshot(request(Method::GET, "/boom"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["code"], -60019);
    assert!(body["message"].as_str().unwrap().contains("kaboom"));

    let response = app.oneshot(request(Method::GET, "/fine")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!("fine"));
}

struct Timing;

#[async_trait]
impl Filter for Timing {
    fn name(&self) -> &'static str {
        "timing"
    }

    async fn do_filter(&self, exchange: &mut Exchange, next: Next<'_>) -> Result<(), WebError> {
        next.run(exchange).await?;
        if let Some(reply) = exchange.reply_mut() {
            reply
                .headers
                .insert("x-handled-by", header::HeaderValue::from_static("timing"));
        }
        Ok(())
    }
}

#[tokio::test]
async fn filter_headers_added_after_handler_reach_the_client() {
    let descriptors = vec![RouteDescriptor::get("/ping").action(Action::sync(|_| Ok(json!("pong"))))];
    let app = router(&descriptors, FilterChain::new().with(Timing));
    let response = app.oneshot(request(Method::GET, "/ping")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-handled-by").unwrap(), "timing");
    assert_eq!(body_json(response).await, json!("pong"));
}

#[tokio::test]
async fn chunked_body_over_limit_is_payload_too_large() {
    let hits = Arc::new(AtomicUsize::new(0));
    let descriptors = vec![RouteDescriptor::post("/upload").action(counted(&hits, json!("stored")))];
    let (routes, _) = RouteCompiler::new(Arc::new(RelayBus::empty())).build(&descriptors);
    let config = ServerConfig {
        body_limit_bytes: 8,
        ..ServerConfig::default()
    };
    let app = architect_dispatch::server::app(&config, routes, FilterChain::new());

    let oversized = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("\"far more than eight bytes\""))
        .unwrap();
    let response = app.oneshot(oversized).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(response).await["code"], -60007);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

/// Sink that numbers its slots from a base offset and keeps them for inspection.
struct Ledger {
    base: usize,
    slots: Vec<RouteSlot>,
}

impl RouteSink for Ledger {
    fn route(&mut self) -> &mut RouteSlot {
        let declared = self.base + self.slots.len();
        self.slots.push(RouteSlot::new(declared));
        let last = self.slots.len() - 1;
        &mut self.slots[last]
    }
}

#[tokio::test]
async fn compiler_mounts_onto_a_caller_supplied_sink() {
    let descriptors = vec![
        RouteDescriptor::get("/items/:id").action(Action::sync(|env: Envelope| {
            Ok(json!({ "id": env.param("id") }))
        })),
        RouteDescriptor::get("/items/latest").action(Action::sync(|_| Ok(json!("latest")))),
    ];
    let mut sink = Ledger {
        base: 100,
        slots: Vec::new(),
    };
    let report = RouteCompiler::new(Arc::new(RelayBus::empty())).compile(&descriptors, &mut sink);
    assert_eq!(report.mounted, 2);

    let seen: Vec<(usize, Option<&str>, bool)> = sink
        .slots
        .iter()
        .map(|s| (s.declared(), s.path(), s.is_attached()))
        .collect();
    assert_eq!(
        seen,
        vec![(100, Some("/items/:id"), true), (101, Some("/items/latest"), true)]
    );
    assert!(sink.slots.iter().all(|s| s.method() == Some(&Method::GET)));

    let app = Routes::from_slots(sink.slots).into_router(FilterChain::new());
    let response = app.oneshot(request(Method::GET, "/items/latest")).await.unwrap();
    assert_eq!(body_json(response).await, json!("latest"));
}
