//! Route descriptors: passive data describing one endpoint before compilation.

use crate::error::WebError;
use axum::http::{HeaderMap, Method};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type SyncAction = Arc<dyn Fn(Envelope) -> Result<Value, WebError> + Send + Sync>;

pub type AsyncAction =
    Arc<dyn Fn(Envelope) -> BoxFuture<'static, Result<Value, WebError>> + Send + Sync>;

/// The code a route runs. Cheap to clone; resolving a descriptor only clones the handle.
#[derive(Clone)]
pub enum Action {
    Sync(SyncAction),
    Async(AsyncAction),
}

impl Action {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Envelope) -> Result<Value, WebError> + Send + Sync + 'static,
    {
        Action::Sync(Arc::new(f))
    }

    pub fn deferred<F, Fut>(f: F) -> Self
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, WebError>> + Send + 'static,
    {
        Action::Async(Arc::new(move |envelope| Box::pin(f(envelope))))
    }

    /// Runs the action on the calling task.
    pub async fn invoke(&self, envelope: Envelope) -> Result<Value, WebError> {
        match self {
            Action::Sync(f) => f(envelope),
            Action::Async(f) => f(envelope).await,
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Sync(_) => f.write_str("Action::Sync"),
            Action::Async(_) => f.write_str("Action::Async"),
        }
    }
}

/// Handler strategy selected for a descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerKind {
    /// Run on the dispatching task.
    Direct,
    /// Offload to the worker pool and await completion.
    Async,
    /// Send the action's output to a named relay destination and answer with its reply.
    Relay { address: String },
}

#[derive(Clone, Debug)]
pub struct RouteDescriptor {
    pub action: Option<Action>,
    pub path: String,
    pub method: Method,
    /// Lower runs first; ties fall back to literal prefix length, then declaration order.
    pub order: i32,
    pub consumes: Vec<String>,
    pub produces: Vec<String>,
    pub kind: HandlerKind,
}

impl RouteDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        RouteDescriptor {
            action: None,
            path: path.into(),
            method,
            order: 0,
            consumes: Vec::new(),
            produces: Vec::new(),
            kind: HandlerKind::Direct,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn consumes<I, S>(mut self, media: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.consumes = media.into_iter().map(Into::into).collect();
        self
    }

    pub fn produces<I, S>(mut self, media: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.produces = media.into_iter().map(Into::into).collect();
        self
    }

    pub fn kind(mut self, kind: HandlerKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn relay(self, address: impl Into<String>) -> Self {
        self.kind(HandlerKind::Relay {
            address: address.into(),
        })
    }
}

/// Request data handed to an action (and to relay destinations).
#[derive(Clone, Debug)]
pub struct Envelope {
    pub method: Method,
    pub path: String,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Value,
    /// Snapshot of the exchange context taken when the handler started.
    pub context: HashMap<String, Value>,
}

impl Envelope {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Envelope {
            method,
            path: path.into(),
            params: HashMap::new(),
            query: HashMap::new(),
            headers: HeaderMap::new(),
            body: Value::Null,
            context: HashMap::new(),
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn context(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }
}
