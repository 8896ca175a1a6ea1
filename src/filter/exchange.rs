//! One in-flight request/response cycle and its context store.

use crate::response::Reply;
use crate::route::descriptor::Envelope;
use axum::extract::Query;
use axum::http::{header, HeaderMap, Method, Uri};
use mime::Mime;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// Session data exposed to filters. Creating or persisting sessions is up to the caller.
#[derive(Clone, Debug, Default)]
pub struct Session {
    pub id: String,
    pub data: HashMap<String, Value>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Session {
            id: id.into(),
            data: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }
}

/// Per-exchange key/value store plus session and cookie data.
#[derive(Clone, Debug, Default)]
pub struct ContextStore {
    values: HashMap<String, Value>,
    session: Option<Session>,
    cookies: Vec<Cookie>,
}

impl ContextStore {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        ContextStore {
            values: HashMap::new(),
            session: None,
            cookies: parse_cookies(headers),
        }
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    pub fn set_session(&mut self, session: Session) {
        self.session = Some(session);
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.value.as_str())
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.values.clone()
    }
}

pub struct Exchange {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Value,
    params: HashMap<String, String>,
    produces: Mime,
    context: Option<ContextStore>,
    reply: Option<Reply>,
}

impl Exchange {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Value) -> Self {
        Exchange {
            method,
            uri,
            headers,
            body,
            params: HashMap::new(),
            produces: mime::APPLICATION_JSON,
            context: None,
            reply: None,
        }
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.params = params;
        self
    }

    pub fn with_produces(mut self, produces: Mime) -> Self {
        self.produces = produces;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn produces(&self) -> &Mime {
        &self.produces
    }

    /// Creates the context store if the exchange has none yet.
    pub fn init_context(&mut self) {
        if self.context.is_none() {
            self.context = Some(ContextStore::from_headers(&self.headers));
        }
    }

    pub fn context(&self) -> Option<&ContextStore> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut ContextStore> {
        self.context.as_mut()
    }

    pub fn ended(&self) -> bool {
        self.reply.is_some()
    }

    /// Writes the terminal response. Refused once the exchange has ended.
    pub fn end(&mut self, reply: Reply) -> bool {
        if self.ended() {
            tracing::warn!(path = %self.uri.path(), "response already ended, ignoring second write");
            return false;
        }
        self.reply = Some(reply);
        true
    }

    pub fn reply(&self) -> Option<&Reply> {
        self.reply.as_ref()
    }

    /// The written reply, for filters amending it after `next.run` returns.
    pub fn reply_mut(&mut self) -> Option<&mut Reply> {
        self.reply.as_mut()
    }

    pub fn into_reply(self) -> Option<Reply> {
        self.reply
    }

    pub fn envelope(&self) -> Envelope {
        let query = Query::<HashMap<String, String>>::try_from_uri(&self.uri)
            .map(|Query(q)| q)
            .unwrap_or_default();
        Envelope {
            method: self.method.clone(),
            path: self.uri.path().to_string(),
            params: self.params.clone(),
            query,
            headers: self.headers.clone(),
            body: self.body.clone(),
            context: self.context.as_ref().map(ContextStore::snapshot).unwrap_or_default(),
        }
    }
}

fn parse_cookies(headers: &HeaderMap) -> Vec<Cookie> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            if name.is_empty() {
                return None;
            }
            Some(Cookie {
                name: name.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}
