//! Typed errors and HTTP mapping.
//!
//! [`WebError`] is the only error that crosses the HTTP boundary. Each [`ErrorKind`]
//! owns a stable negative code and a default status; instances may override the
//! status and attach a human-readable `info` text rendered from positional arguments.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("environment variable {key}: {reason}")]
    Env { key: &'static str, reason: String },
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by a persistence collaborator.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("worker: {0}")]
    Worker(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MissingAction,
    InvalidDescriptor,
    RouteNotFound,
    MethodNotAllowed,
    NotAcceptable,
    UnsupportedMediaType,
    FilterContextMissing,
    FilterChainIncomplete,
    InvalidBody,
    InvalidParameter,
    RecordMissing,
    PersistenceFailure,
    RelayUnavailable,
    UnexpectedInternal,
}

impl ErrorKind {
    pub const fn code(self) -> i32 {
        match self {
            ErrorKind::MissingAction => -40004,
            ErrorKind::InvalidDescriptor => -40005,
            ErrorKind::RouteNotFound => -60001,
            ErrorKind::MethodNotAllowed => -60002,
            ErrorKind::NotAcceptable => -60003,
            ErrorKind::UnsupportedMediaType => -60004,
            ErrorKind::FilterContextMissing => -60005,
            ErrorKind::FilterChainIncomplete => -60006,
            ErrorKind::InvalidBody => -60007,
            ErrorKind::InvalidParameter => -60009,
            ErrorKind::RecordMissing => -60008,
            ErrorKind::PersistenceFailure => -60010,
            ErrorKind::RelayUnavailable => -60011,
            ErrorKind::UnexpectedInternal => -60019,
        }
    }

    pub const fn status(self) -> StatusCode {
        match self {
            ErrorKind::RouteNotFound | ErrorKind::RecordMissing => StatusCode::NOT_FOUND,
            ErrorKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            ErrorKind::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ErrorKind::InvalidBody | ErrorKind::InvalidParameter => StatusCode::BAD_REQUEST,
            ErrorKind::RelayUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::MissingAction
            | ErrorKind::InvalidDescriptor
            | ErrorKind::FilterContextMissing
            | ErrorKind::FilterChainIncomplete
            | ErrorKind::PersistenceFailure
            | ErrorKind::UnexpectedInternal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message template; `{n}` is replaced by the n-th argument.
    const fn template(self) -> &'static str {
        match self {
            ErrorKind::MissingAction => "route {0} {1} has no action attached",
            ErrorKind::InvalidDescriptor => "route {0} {1} rejected: {2}",
            ErrorKind::RouteNotFound => "no route matches path {0}",
            ErrorKind::MethodNotAllowed => "method {0} is not bound on path {1}",
            ErrorKind::NotAcceptable => "accept '{0}' matches none of [{1}]",
            ErrorKind::UnsupportedMediaType => "content type '{0}' is not one of [{1}]",
            ErrorKind::FilterContextMissing => "filter {0} ran before the exchange context was initialised",
            ErrorKind::FilterChainIncomplete => "exchange on {0} finished without a response",
            ErrorKind::InvalidBody => "request body rejected: {0}",
            ErrorKind::InvalidParameter => "parameter {0} rejected: {1}",
            ErrorKind::RecordMissing => "no record with key {0}",
            ErrorKind::PersistenceFailure => "persistence call failed: {0}",
            ErrorKind::RelayUnavailable => "no relay destination registered at {0}",
            ErrorKind::UnexpectedInternal => "unexpected failure: {0}",
        }
    }
}

/// Wire payload: `{ "code", "message", "info"? }`.
#[derive(Serialize, Debug, PartialEq)]
pub struct ErrorPayload {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct WebError {
    kind: ErrorKind,
    status: StatusCode,
    message: String,
    params: Vec<String>,
    readable: Option<String>,
}

impl WebError {
    /// Builds the message from origin, code and the kind's template.
    pub fn new<I, A>(kind: ErrorKind, origin: &str, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: fmt::Display,
    {
        let params: Vec<String> = args.into_iter().map(|a| a.to_string()).collect();
        let message = format!(
            "[ERR{}] ({}) {}",
            kind.code(),
            origin,
            render(kind.template(), &params)
        );
        WebError {
            kind,
            status: kind.status(),
            message,
            params,
            readable: None,
        }
    }

    pub fn literal(kind: ErrorKind, message: impl Into<String>) -> Self {
        WebError {
            kind,
            status: kind.status(),
            message: message.into(),
            params: Vec::new(),
            readable: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> i32 {
        self.kind.code()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn readable(&self) -> Option<&str> {
        self.readable.as_deref()
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Attaches the `info` text. Literal errors keep the template verbatim.
    pub fn with_readable(mut self, template: &str) -> Self {
        self.readable = Some(if self.params.is_empty() {
            template.to_string()
        } else {
            render(template, &self.params)
        });
        self
    }

    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code(),
            message: self.message.clone(),
            info: self.readable.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.payload()).unwrap_or(serde_json::Value::Null)
    }

    pub fn missing_action(origin: &str, method: &str, path: &str) -> Self {
        Self::new(ErrorKind::MissingAction, origin, [method, path])
    }

    pub fn invalid_descriptor(origin: &str, method: &str, path: &str, reason: &str) -> Self {
        Self::new(ErrorKind::InvalidDescriptor, origin, [method, path, reason])
    }

    pub fn route_not_found(path: &str) -> Self {
        Self::new(ErrorKind::RouteNotFound, "dispatch", [path])
    }

    pub fn method_not_allowed(method: &str, path: &str) -> Self {
        Self::new(ErrorKind::MethodNotAllowed, "dispatch", [method, path])
    }

    pub fn not_acceptable(accept: &str, produces: &str) -> Self {
        Self::new(ErrorKind::NotAcceptable, "negotiation", [accept, produces])
    }

    pub fn unsupported_media_type(content_type: &str, consumes: &str) -> Self {
        Self::new(ErrorKind::UnsupportedMediaType, "negotiation", [content_type, consumes])
    }

    pub fn filter_context_missing(filter: &str) -> Self {
        Self::new(ErrorKind::FilterContextMissing, filter, [filter])
    }

    pub fn filter_chain_incomplete(path: &str) -> Self {
        Self::new(ErrorKind::FilterChainIncomplete, "filter", [path])
    }

    pub fn invalid_body(reason: impl fmt::Display) -> Self {
        Self::new(ErrorKind::InvalidBody, "dispatch", [reason])
    }

    pub fn invalid_param(name: &str, reason: impl fmt::Display) -> Self {
        Self::new(ErrorKind::InvalidParameter, "dispatch", [name.to_string(), reason.to_string()])
    }

    pub fn record_missing(origin: &str, key: impl fmt::Display) -> Self {
        Self::new(ErrorKind::RecordMissing, origin, [key])
    }

    pub fn persistence(origin: &str, cause: impl fmt::Display) -> Self {
        Self::new(ErrorKind::PersistenceFailure, origin, [cause])
    }

    pub fn relay_unavailable(address: &str) -> Self {
        Self::new(ErrorKind::RelayUnavailable, "relay", [address])
    }

    pub fn unexpected(origin: &str, cause: impl fmt::Display) -> Self {
        Self::new(ErrorKind::UnexpectedInternal, origin, [cause])
    }
}

impl From<PersistError> for WebError {
    fn from(e: PersistError) -> Self {
        WebError::persistence("persistence", e)
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code(), message = %self.message, "request failed");
        } else {
            tracing::debug!(code = self.code(), message = %self.message, "request rejected");
        }
        (self.status, Json(self.payload())).into_response()
    }
}

/// Single left-to-right pass, so `{n}` inside an argument is never expanded.
fn render(template: &str, params: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let slot = tail[1..]
            .find('}')
            .and_then(|close| Some((close, tail[1..1 + close].parse::<usize>().ok()?)))
            .and_then(|(close, idx)| Some((close, params.get(idx)?)));
        match slot {
            Some((close, param)) => {
                out.push_str(param);
                rest = &tail[close + 2..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
