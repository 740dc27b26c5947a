//! Error values: request-time failures, registration-time configuration
//! errors, and the built-in fallback error handler.
//!
//! Every request-time failure, whether it comes from binding, a middleware,
//! the target handler or a recovered panic, is captured as a [`CaughtError`]
//! and resolved through the route's dispatch table. Nothing is ever thrown
//! past the executor.

use std::any::{Any, TypeId};
use std::fmt;

use http::Method;
use serde::Serialize;
use thiserror::Error;

use crate::request::Status;
use crate::responds;

/// Classification of a captured request-time failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required path segment was missing or unparsable.
    NotFound,
    /// The body, query or headers failed to decode or validate.
    Decode,
    /// A recovered runtime panic.
    Panic,
    /// An error value returned by a handler or middleware.
    Application,
}

/// A captured request-time failure.
///
/// Carries the concrete error value (type-erased), its exact runtime type for
/// dispatch, a display message, and a kind tag used by the built-in fallback
/// handler to pick a status code.
pub struct CaughtError {
    value: Box<dyn Any>,
    type_id: TypeId,
    type_name: &'static str,
    message: String,
    kind: ErrorKind,
}

impl CaughtError {
    fn capture<E: fmt::Display + 'static>(err: E, kind: ErrorKind) -> Self {
        CaughtError {
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
            message: err.to_string(),
            value: Box::new(err),
            kind,
        }
    }

    /// Capture an error value returned by a handler or middleware.
    pub fn application<E: std::error::Error + 'static>(err: E) -> Self {
        CaughtError::capture(err, ErrorKind::Application)
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The exact runtime type of the captured value; dispatch key.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Take back the concrete error value.
    pub fn downcast<E: 'static>(self) -> Result<E, CaughtError> {
        if self.type_id != TypeId::of::<E>() {
            return Err(self);
        }
        let CaughtError {
            value,
            type_id,
            type_name,
            message,
            kind,
        } = self;
        match value.downcast::<E>() {
            Ok(boxed) => Ok(*boxed),
            Err(value) => Err(CaughtError {
                value,
                type_id,
                type_name,
                message,
                kind,
            }),
        }
    }

    #[must_use]
    pub fn downcast_ref<E: 'static>(&self) -> Option<&E> {
        self.value.downcast_ref::<E>()
    }
}

impl fmt::Debug for CaughtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaughtError")
            .field("type", &self.type_name)
            .field("kind", &self.kind)
            .field("message", &self.message)
            .finish()
    }
}

impl fmt::Display for CaughtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

/// A required path segment was absent or failed to parse.
#[derive(Debug, Error)]
#[error("path parameter '{name}' does not exist or is not {kind}")]
pub struct NotFound {
    pub name: String,
    pub kind: &'static str,
}

impl From<NotFound> for CaughtError {
    fn from(err: NotFound) -> Self {
        CaughtError::capture(err, ErrorKind::NotFound)
    }
}

/// Binding failures for body, query and header payloads.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("request body is empty")]
    EmptyBody,
    #[error("malformed json: {0}")]
    Json(String),
    #[error("invalid {category} parameters: {detail}")]
    Bind {
        category: &'static str,
        detail: String,
    },
}

impl From<DecodeError> for CaughtError {
    fn from(err: DecodeError) -> Self {
        CaughtError::capture(err, ErrorKind::Decode)
    }
}

/// A panic recovered at a call unit boundary.
///
/// The backtrace goes to the operational log only; the built-in fallback
/// handler never echoes it to the client.
#[derive(Debug, Error)]
#[error("handler panicked: {message}")]
pub struct Panicked {
    pub message: String,
    pub backtrace: String,
}

impl From<Panicked> for CaughtError {
    fn from(err: Panicked) -> Self {
        CaughtError::capture(err, ErrorKind::Panic)
    }
}

/// A produced dependency slot was read before any unit populated it.
#[derive(Debug, Error)]
#[error("dependency '{type_name}' was not populated by any earlier unit")]
pub struct Unpopulated {
    pub type_name: &'static str,
}

impl From<Unpopulated> for CaughtError {
    fn from(err: Unpopulated) -> Self {
        CaughtError::capture(err, ErrorKind::Application)
    }
}

/// Registration-time configuration failures. Fatal at startup: the plain
/// registration helpers panic on these, the `try_*` twins return them.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("ambiguous body type on {method} {path}: {first} and {second}")]
    AmbiguousBody {
        method: Method,
        path: String,
        first: &'static str,
        second: &'static str,
    },
    #[error("ambiguous query type on {method} {path}: {first} and {second}")]
    AmbiguousQuery {
        method: Method,
        path: String,
        first: &'static str,
        second: &'static str,
    },
    #[error("ambiguous response type on {method} {path}: {first} and {second}")]
    AmbiguousResponse {
        method: Method,
        path: String,
        first: &'static str,
        second: &'static str,
    },
    #[error("after-middleware on {method} {path} cannot return an error")]
    AfterCannotFail { method: Method, path: String },
    #[error("cannot infer a payload category for {method} {path}; declare Body<T> or Query<T> explicitly")]
    UnsupportedMethod { method: Method, path: String },
    #[error("more path parameters declared than pattern '{path}' provides ({declared} > {available})")]
    TooManyPathParams {
        path: String,
        declared: usize,
        available: usize,
    },
    #[error("dependency '{type_name}' on {method} {path} is not produced by any earlier unit")]
    UnknownDependency {
        method: Method,
        path: String,
        type_name: &'static str,
    },
}

/// Body of the built-in fallback error handler's reply.
#[derive(Debug, Clone, Serialize)]
pub struct DefaultErrorResponse {
    pub message: String,
    pub details: Vec<String>,
    pub success: bool,
}

responds!(DefaultErrorResponse, default_status = 500, codes = ["4XX", "5XX"]);

impl DefaultErrorResponse {
    fn new(message: impl Into<String>) -> Self {
        DefaultErrorResponse {
            message: message.into(),
            details: Vec::new(),
            success: false,
        }
    }
}

/// The built-in generic-error entry: 404 for missing path segments, 400 for
/// binding failures, 500 for panics and unrecognized application errors.
/// Diagnostic detail stays in the operational log.
pub(crate) fn default_error_handler(err: CaughtError) -> (Status, DefaultErrorResponse) {
    match err.kind() {
        ErrorKind::NotFound => (Status(404), DefaultErrorResponse::new(err.message())),
        ErrorKind::Decode => {
            let mut response = match err.downcast_ref::<DecodeError>() {
                Some(DecodeError::Json(_)) => DefaultErrorResponse::new("malformed json"),
                Some(DecodeError::Bind { .. }) => DefaultErrorResponse::new("validation error"),
                _ => DefaultErrorResponse::new("invalid payload"),
            };
            response.details.push(err.message().to_string());
            (Status(400), response)
        }
        ErrorKind::Panic => {
            if let Some(panicked) = err.downcast_ref::<Panicked>() {
                tracing::error!(panic = %panicked.message, backtrace = %panicked.backtrace, "recovered panic");
            }
            (Status(500), DefaultErrorResponse::new("internal server error"))
        }
        ErrorKind::Application => {
            tracing::error!(error = %err, "unhandled error");
            (Status(500), DefaultErrorResponse::new("internal server error"))
        }
    }
}
