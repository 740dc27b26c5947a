//! Raw request/response model and binding helpers.
//!
//! This is the boundary with the HTTP server collaborator: the server owns
//! sockets and path-pattern matching, then hands over a [`RawRequest`] whose
//! `path_params` are already extracted. The executor hands back a
//! [`RawResponse`] for the server to write.

use std::collections::HashMap;
use std::fmt;

use http::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DecodeError;

/// HTTP status carried through a call chain.
///
/// A handler can take `Status` as a parameter to observe the current value
/// and return `Status` (or `Option<Status>`) to rebind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status(pub u16);

impl Status {
    pub const OK: Status = Status(200);

    #[must_use]
    pub fn as_u16(self) -> u16 {
        self.0
    }
}

impl From<u16> for Status {
    fn from(code: u16) -> Self {
        Status(code)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An uninterpreted header bag.
///
/// Usable both as an extractor (the raw request headers, shared per request)
/// and as a return value (merged into the outgoing response headers). Header
/// names are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(pub HashMap<String, String>);

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Headers(HashMap::new())
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The raw platform request handed over by the HTTP server collaborator.
///
/// Path matching already happened upstream: `path_params` holds the segments
/// extracted for the route's pattern, keyed by parameter name.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: Method,
    pub path: String,
    pub path_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
    pub headers: Headers,
    pub body: Option<Vec<u8>>,
}

impl RawRequest {
    /// Build a request from a method and a path that may carry a query string.
    pub fn new(method: Method, path: &str) -> Self {
        let (path, query) = match path.split_once('?') {
            Some((p, q)) => (p.to_string(), parse_query(q)),
            None => (path.to_string(), HashMap::new()),
        };
        RawRequest {
            method,
            path,
            path_params: HashMap::new(),
            query_params: query,
            headers: Headers::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_path_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.path_params.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query_params.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body.
    #[must_use]
    pub fn with_json<T: Serialize>(mut self, value: &T) -> Self {
        self.body = serde_json::to_vec(value).ok();
        self
    }
}

/// What the executor hands back to the server collaborator.
///
/// `body: None` means "write the status with an empty body".
#[derive(Debug, Clone, Serialize)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
}

fn parse_query(raw: &str) -> HashMap<String, String> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (decode_component(k), decode_component(v)),
            None => (decode_component(pair), String::new()),
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}

/// Decode the JSON request body into `T`.
pub(crate) fn bind_body<T: DeserializeOwned>(raw: &RawRequest) -> Result<T, DecodeError> {
    let bytes = raw
        .body
        .as_deref()
        .filter(|b| !b.is_empty())
        .ok_or(DecodeError::EmptyBody)?;
    serde_json::from_slice(bytes).map_err(|e| DecodeError::Json(e.to_string()))
}

pub(crate) fn body_is_empty(raw: &RawRequest) -> bool {
    raw.body.as_deref().map_or(true, <[u8]>::is_empty)
}

/// Decode the query parameters into `T`.
pub(crate) fn bind_query<T: DeserializeOwned>(raw: &RawRequest) -> Result<T, DecodeError> {
    bind_map(&raw.query_params, "query")
}

/// Decode the request headers into `T`.
pub(crate) fn bind_headers<T: DeserializeOwned>(raw: &RawRequest) -> Result<T, DecodeError> {
    bind_map(&raw.headers.0, "header")
}

/// Decode a string map into `T` via a JSON object.
///
/// Scalar values are coerced first (integer, float, boolean), falling back to
/// an all-strings object when the target type rejects the coerced shape.
fn bind_map<T: DeserializeOwned>(
    map: &HashMap<String, String>,
    category: &'static str,
) -> Result<T, DecodeError> {
    let coerced = Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), coerce_scalar(v)))
            .collect(),
    );
    let first_err = match serde_json::from_value(coerced) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };
    let plain = Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    );
    serde_json::from_value(plain).map_err(|_| DecodeError::Bind {
        category,
        detail: first_err.to_string(),
    })
}

fn coerce_scalar(value: &str) -> Value {
    if let Ok(n) = value.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(n) = value.parse::<f64>() {
        return Value::from(n);
    }
    if let Ok(b) = value.parse::<bool>() {
        return Value::from(b);
    }
    Value::String(value.to_string())
}
