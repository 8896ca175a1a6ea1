//! Router sink: hands out route slots, freezes attached slots into live routes and
//! dispatches inbound requests to them.

use crate::error::WebError;
use crate::filter::{Exchange, FilterChain};
use crate::route::constraint::ConstraintBinder;
use crate::route::negotiation::MediaSet;
use crate::route::pattern::PathPattern;
use crate::route::resolver::RouteHandler;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, request::Parts, Method, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use http_body_util::LengthLimitError;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;

/// Supplies empty route slots to the compiler.
///
/// Implementors own the slots they hand out and turn them into [`Routes`] with
/// [`Routes::from_slots`] once compilation is done.
pub trait RouteSink {
    fn route(&mut self) -> &mut RouteSlot;
}

/// A route under construction. Becomes live once a handler is attached.
pub struct RouteSlot {
    pub(crate) declared: usize,
    pub(crate) method: Option<Method>,
    pub(crate) pattern: Option<PathPattern>,
    pub(crate) order: i32,
    pub(crate) media: MediaSet,
    pub(crate) handler: Option<Arc<dyn RouteHandler>>,
}

impl RouteSlot {
    /// Empty slot. `declared` is the tie-breaker between routes of equal precedence.
    pub fn new(declared: usize) -> Self {
        RouteSlot {
            declared,
            method: None,
            pattern: None,
            order: 0,
            media: MediaSet::default(),
            handler: None,
        }
    }

    pub fn declared(&self) -> usize {
        self.declared
    }

    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    pub fn path(&self) -> Option<&str> {
        self.pattern.as_ref().map(PathPattern::as_str)
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn attach(&mut self, handler: Arc<dyn RouteHandler>) {
        self.handler = Some(handler);
    }

    pub fn is_attached(&self) -> bool {
        self.handler.is_some()
    }

    /// `None` unless verb, pattern and handler are all bound.
    pub fn into_live(self) -> Option<LiveRoute> {
        match (self.method, self.pattern, self.handler) {
            (Some(method), Some(pattern), Some(handler)) => Some(LiveRoute {
                declared: self.declared,
                method,
                pattern,
                order: self.order,
                media: self.media,
                handler,
            }),
            _ => {
                tracing::debug!(slot = self.declared, "dropping unattached route slot");
                None
            }
        }
    }
}

#[derive(Default)]
pub struct RouteTable {
    slots: Vec<RouteSlot>,
}

impl RouteSink for RouteTable {
    fn route(&mut self) -> &mut RouteSlot {
        let idx = self.slots.len();
        self.slots.push(RouteSlot::new(idx));
        &mut self.slots[idx]
    }
}

impl RouteTable {
    pub fn new() -> Self {
        RouteTable::default()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn freeze(self) -> Routes {
        Routes::from_slots(self.slots)
    }
}

pub struct LiveRoute {
    pub(crate) declared: usize,
    pub(crate) method: Method,
    pub(crate) pattern: PathPattern,
    pub(crate) order: i32,
    pub(crate) media: MediaSet,
    pub(crate) handler: Arc<dyn RouteHandler>,
}

impl LiveRoute {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn handler_name(&self) -> &'static str {
        self.handler.name()
    }
}

/// Immutable, ordered set of live routes.
pub struct Routes {
    routes: Vec<LiveRoute>,
}

impl Routes {
    /// Keeps attached slots and sorts them by match precedence.
    pub fn from_slots(slots: impl IntoIterator<Item = RouteSlot>) -> Self {
        let mut routes: Vec<LiveRoute> = slots.into_iter().filter_map(RouteSlot::into_live).collect();
        routes.sort_by(ConstraintBinder::precedence);
        Routes { routes }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LiveRoute> {
        self.routes.iter()
    }

    /// First route in precedence order matching verb and path.
    pub fn find(
        &self,
        method: &Method,
        path: &str,
    ) -> Result<(&LiveRoute, HashMap<String, String>), WebError> {
        let mut path_matched = false;
        for route in &self.routes {
            if let Some(params) = route.pattern.matches(path) {
                if route.method == *method {
                    return Ok((route, params));
                }
                path_matched = true;
            }
        }
        if path_matched {
            Err(WebError::method_not_allowed(method.as_str(), path))
        } else {
            Err(WebError::route_not_found(path))
        }
    }

    pub async fn dispatch(&self, filters: &FilterChain, request: Request) -> Response {
        let (parts, body) = request.into_parts();
        match self.serve(filters, parts, body).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        }
    }

    async fn serve(
        &self,
        filters: &FilterChain,
        parts: Parts,
        body: Body,
    ) -> Result<Response, WebError> {
        let (route, params) = self.find(&parts.method, parts.uri.path())?;
        let content_type = header_str(&parts, header::CONTENT_TYPE);
        let produces = route
            .media
            .negotiate(content_type, header_str(&parts, header::ACCEPT))?;

        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(body_error)?;
        let body = decode_body(content_type, &bytes)?;

        let mut exchange = Exchange::new(parts.method, parts.uri, parts.headers, body)
            .with_params(params)
            .with_produces(produces.clone());
        filters.execute(&mut exchange, route.handler.as_ref()).await?;
        let reply = exchange
            .into_reply()
            .ok_or_else(|| WebError::unexpected("dispatch", "exchange ended without reply"))?;
        Ok(reply.into_response(&produces))
    }

    /// Axum router whose fallback dispatches every request through these routes.
    /// A panicking action ends only its own exchange, with an internal error payload.
    pub fn into_router(self, filters: FilterChain) -> Router {
        let state = AppState {
            routes: Arc::new(self),
            filters: Arc::new(filters),
        };
        Router::new()
            .fallback(dispatch)
            .with_state(state)
            .layer(CatchPanicLayer::custom(panic_response))
    }
}

async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    state.routes.dispatch(&state.filters, request).await
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let cause = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "action panicked".to_string());
    WebError::unexpected("dispatch", cause).into_response()
}

/// Bodies cut off by the body-limit layer are reported as 413.
fn body_error(err: axum::Error) -> WebError {
    let mut source: Option<&(dyn StdError + 'static)> = Some(&err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return WebError::invalid_body(e).with_status(StatusCode::PAYLOAD_TOO_LARGE);
        }
        source = e.source();
    }
    WebError::invalid_body(err)
}

fn header_str(parts: &Parts, name: header::HeaderName) -> Option<&str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

/// Empty bodies become `null`; JSON is parsed; anything else is kept as text.
fn decode_body(content_type: Option<&str>, bytes: &[u8]) -> Result<Value, WebError> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    let is_json = content_type
        .and_then(|ct| ct.parse::<mime::Mime>().ok())
        .map(|m| m.subtype() == mime::JSON || m.suffix() == Some(mime::JSON))
        .unwrap_or(true);
    if is_json {
        serde_json::from_slice(bytes).map_err(WebError::invalid_body)
    } else {
        Ok(Value::String(String::from_utf8_lossy(bytes).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::relay::RelayBus;
    use crate::route::descriptor::{Action, RouteDescriptor};
    use crate::route::resolver::HandlerResolver;
    use serde_json::json;

    fn table(descriptors: &[RouteDescriptor]) -> Routes {
        let resolver = HandlerResolver::new(Arc::new(RelayBus::empty()));
        let mut table = RouteTable::new();
        for d in descriptors {
            let slot = table.route();
            ConstraintBinder::bind(slot, d).unwrap();
            crate::route::negotiation::NegotiationBinder::bind(slot, d).unwrap();
            slot.attach(resolver.resolve(d).unwrap());
        }
        table.freeze()
    }

    fn ok() -> Action {
        Action::sync(|_| Ok(json!("ok")))
    }

    #[test]
    fn unattached_slots_are_not_live() {
        let mut t = RouteTable::new();
        t.route();
        assert_eq!(t.slot_count(), 1);
        assert!(t.freeze().is_empty());
    }

    #[test]
    fn order_then_literal_prefix_then_declaration() {
        let routes = table(&[
            RouteDescriptor::get("/a/:x").action(ok()),
            RouteDescriptor::get("/a/b").action(ok()),
            RouteDescriptor::get("/a/:y").action(ok()),
            RouteDescriptor::get("/z").action(ok()).order(-1),
        ]);
        let paths: Vec<&str> = routes.iter().map(|r| r.path()).collect();
        assert_eq!(paths, vec!["/z", "/a/b", "/a/:x", "/a/:y"]);

        let (route, params) = routes.find(&Method::GET, "/a/c").unwrap();
        assert_eq!(route.path(), "/a/:x");
        assert_eq!(params["x"], "c");
        assert_eq!(routes.find(&Method::GET, "/a/b").unwrap().0.path(), "/a/b");
    }

    #[test]
    fn verb_mismatch_is_method_not_allowed() {
        let routes = table(&[RouteDescriptor::get("/a").action(ok())]);
        let err = routes.find(&Method::POST, "/a").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::MethodNotAllowed);
        let err = routes.find(&Method::GET, "/b").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::RouteNotFound);
    }

    #[test]
    fn body_decoding() {
        assert_eq!(decode_body(None, b"").unwrap(), Value::Null);
        assert_eq!(decode_body(None, b"{\"a\":1}").unwrap(), json!({ "a": 1 }));
        assert_eq!(decode_body(Some("text/plain"), b"hi").unwrap(), json!("hi"));
        let err = decode_body(Some("application/json"), b"{").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidBody);
    }

    #[tokio::test]
    async fn truncated_body_is_payload_too_large() {
        let limited = http_body_util::Limited::new(Body::from("0123456789"), 4);
        let err = axum::body::to_bytes(Body::new(limited), usize::MAX)
            .await
            .map_err(body_error)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidBody);
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn panic_payload_becomes_internal_error() {
        let response = panic_response(Box::new("kaboom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let response = panic_response(Box::new(String::from("owned")));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
