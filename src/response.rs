//! Terminal replies and the standard response envelope helpers.

use crate::error::WebError;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use mime::Mime;
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub struct SuccessOne<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct SuccessMany<T> {
    pub data: Vec<T>,
    pub meta: MetaCount,
}

#[derive(Serialize)]
pub struct MetaCount {
    pub count: u64,
}

pub fn success_one<T: Serialize>(data: T) -> Result<Value, WebError> {
    serde_json::to_value(SuccessOne { data, meta: None })
        .map_err(|e| WebError::unexpected("response", e))
}

pub fn success_many<T: Serialize>(data: Vec<T>) -> Result<Value, WebError> {
    let count = data.len() as u64;
    serde_json::to_value(SuccessMany {
        data,
        meta: MetaCount { count },
    })
    .map_err(|e| WebError::unexpected("response", e))
}

/// Response written onto an exchange by a filter or handler.
#[derive(Clone, Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl Reply {
    /// 200 with the value as body; `null` becomes an empty 204.
    pub fn json(value: Value) -> Self {
        if value.is_null() {
            return Reply::status(StatusCode::NO_CONTENT);
        }
        Reply {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Some(value),
        }
    }

    pub fn status(status: StatusCode) -> Self {
        Reply {
            status,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn error(err: &WebError) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        Reply {
            status: err.status(),
            headers,
            body: Some(err.to_json()),
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serializes the body as `produces` unless a content type was set explicitly.
    pub fn into_response(self, produces: &Mime) -> Response {
        let Reply {
            status,
            mut headers,
            body,
        } = self;
        let bytes = match body {
            None => Vec::new(),
            Some(value) => {
                if !headers.contains_key(header::CONTENT_TYPE) {
                    if let Ok(ct) = HeaderValue::from_str(produces.as_ref()) {
                        headers.insert(header::CONTENT_TYPE, ct);
                    }
                }
                encode(&value, produces)
            }
        };
        let mut response = (status, Body::from(bytes)).into_response();
        response.headers_mut().extend(headers);
        response
    }
}

fn is_json(media: &Mime) -> bool {
    media.subtype() == mime::JSON || media.suffix() == Some(mime::JSON)
}

fn encode(value: &Value, produces: &Mime) -> Vec<u8> {
    match value {
        Value::String(s) if !is_json(produces) => s.clone().into_bytes(),
        other => serde_json::to_vec(other).unwrap_or_default(),
    }
}
