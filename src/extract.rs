//! Argument extractors: the parameter side of a unit signature.
//!
//! Each parameter type is classified exactly once, at registration time, into
//! an [`ArgResolver`]: a closure that produces the argument from the
//! [`CallContext`] on every request. Payload categories (body, query,
//! headers) decode once per request into a slot and are shared by every unit
//! that declares them, so a mutation made by a middleware is visible to the
//! units that run after it.

use std::any::{type_name, TypeId};
use std::str::FromStr;

use serde::de::DeserializeOwned;

use crate::context::{CallContext, Shared};
use crate::errors::{CaughtError, ConfigError, NotFound, Unpopulated};
use crate::inspect::{Inspector, PayloadKind, Role};
use crate::request::{bind_body, bind_headers, bind_query, body_is_empty, Headers, RawRequest, Status};

/// Produces one argument from the per-request context.
pub type ArgResolver<T> =
    Box<dyn Fn(&mut CallContext) -> Result<T, CaughtError> + Send + Sync>;

/// A type usable as a handler or middleware parameter.
pub trait FromCall: Sized + 'static {
    fn classify(insp: &mut Inspector) -> Result<ArgResolver<Self>, ConfigError>;
}

/// A required path segment, parsed from the pattern's next `{name}` in
/// declaration order. A missing or unparsable segment fails the request with
/// a not-found error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Path<T>(pub T);

/// An optional path segment: `None` when the matched pattern did not provide
/// it, or when the segment does not parse as `T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptPath<T>(pub Option<T>);

/// The JSON request body, decoded once per request into a shared cell.
#[derive(Debug, Clone)]
pub struct Body<T>(pub Shared<T>);

/// The JSON request body when it may legitimately be absent.
#[derive(Debug, Clone)]
pub struct OptBody<T>(pub Shared<Option<T>>);

/// The query parameters, decoded once per request into a shared cell.
#[derive(Debug, Clone)]
pub struct Query<T>(pub Shared<T>);

/// A typed selection of request headers, decoded once per request.
#[derive(Debug, Clone)]
pub struct HeaderBag<T>(pub Shared<T>);

/// The request payload with its category inferred from the HTTP method:
/// query for GET/HEAD/DELETE/OPTIONS, body for POST/PUT/PATCH.
#[derive(Debug, Clone)]
pub struct Payload<T>(pub Shared<T>);

/// The raw platform request handle.
#[derive(Debug, Clone)]
pub struct Raw(pub Shared<RawRequest>);

fn scalar_kind<T: 'static>() -> &'static str {
    let id = TypeId::of::<T>();
    if id == TypeId::of::<i8>()
        || id == TypeId::of::<i16>()
        || id == TypeId::of::<i32>()
        || id == TypeId::of::<i64>()
        || id == TypeId::of::<u8>()
        || id == TypeId::of::<u16>()
        || id == TypeId::of::<u32>()
        || id == TypeId::of::<u64>()
    {
        "integer"
    } else if id == TypeId::of::<f32>() || id == TypeId::of::<f64>() {
        "number"
    } else if id == TypeId::of::<bool>() {
        "boolean"
    } else if id == TypeId::of::<String>() {
        "string"
    } else {
        type_name::<T>()
    }
}

impl<T: FromStr + 'static> FromCall for Path<T> {
    fn classify(insp: &mut Inspector) -> Result<ArgResolver<Self>, ConfigError> {
        let kind = scalar_kind::<T>();
        let name = insp.next_path_param(kind, true)?;
        Ok(Box::new(move |ctx| {
            let raw = ctx.raw();
            let raw = raw.borrow();
            raw.path_params
                .get(&name)
                .and_then(|segment| segment.parse::<T>().ok())
                .map(Path)
                .ok_or_else(|| {
                    NotFound {
                        name: name.clone(),
                        kind,
                    }
                    .into()
                })
        }))
    }
}

impl<T: FromStr + 'static> FromCall for OptPath<T> {
    fn classify(insp: &mut Inspector) -> Result<ArgResolver<Self>, ConfigError> {
        let kind = scalar_kind::<T>();
        let name = insp.next_path_param(kind, false)?;
        Ok(Box::new(move |ctx| {
            let raw = ctx.raw();
            let raw = raw.borrow();
            let value = raw
                .path_params
                .get(&name)
                .and_then(|segment| segment.parse::<T>().ok());
            Ok(OptPath(value))
        }))
    }
}

impl FromCall for Status {
    fn classify(_: &mut Inspector) -> Result<ArgResolver<Self>, ConfigError> {
        Ok(Box::new(|ctx| Ok(ctx.status())))
    }
}

impl FromCall for Raw {
    fn classify(_: &mut Inspector) -> Result<ArgResolver<Self>, ConfigError> {
        Ok(Box::new(|ctx| Ok(Raw(ctx.raw()))))
    }
}

impl FromCall for Headers {
    fn classify(insp: &mut Inspector) -> Result<ArgResolver<Self>, ConfigError> {
        // Backed by the same slot as `HeaderBag<Headers>`: the bag is copied
        // out of the request once, and each unit reads the cell's current
        // contents, so edits made through the shared handle stay visible.
        let index = insp.claim_headers::<Headers>(false);
        Ok(Box::new(move |ctx| {
            if let Some(cell) = ctx.slot_get::<Headers>(index) {
                return Ok(cell.borrow().clone());
            }
            let headers = ctx.raw().borrow().headers.clone();
            ctx.slot_put(index, Shared::new(headers.clone()));
            Ok(headers)
        }))
    }
}

impl<T: Default + 'static> FromCall for Shared<T> {
    fn classify(insp: &mut Inspector) -> Result<ArgResolver<Self>, ConfigError> {
        // Error handlers and after-middlewares run even when the producing
        // unit never did, so they fall back to the type's default value.
        let lenient = matches!(insp.role(), Role::After | Role::ErrorHandler);
        let index = if lenient {
            insp.slot_for::<T>()
        } else {
            insp.require_slot::<T>()?
        };
        Ok(Box::new(move |ctx| match ctx.slot_get::<T>(index) {
            Some(cell) => Ok(cell),
            None if lenient => {
                let cell = Shared::new(T::default());
                ctx.slot_put(index, cell.clone());
                Ok(cell)
            }
            None => Err(Unpopulated {
                type_name: type_name::<T>(),
            }
            .into()),
        }))
    }
}

fn body_resolver<T: DeserializeOwned + 'static>(index: usize) -> ArgResolver<Shared<T>> {
    Box::new(move |ctx| {
        if let Some(cell) = ctx.slot_get::<T>(index) {
            return Ok(cell);
        }
        let decoded: T = bind_body(&ctx.raw().borrow())?;
        let cell = Shared::new(decoded);
        ctx.slot_put(index, cell.clone());
        Ok(cell)
    })
}

fn query_resolver<T: DeserializeOwned + 'static>(index: usize) -> ArgResolver<Shared<T>> {
    Box::new(move |ctx| {
        if let Some(cell) = ctx.slot_get::<T>(index) {
            return Ok(cell);
        }
        let decoded: T = bind_query(&ctx.raw().borrow())?;
        let cell = Shared::new(decoded);
        ctx.slot_put(index, cell.clone());
        Ok(cell)
    })
}

impl<T: DeserializeOwned + 'static> FromCall for Body<T> {
    fn classify(insp: &mut Inspector) -> Result<ArgResolver<Self>, ConfigError> {
        let index = insp.claim_body::<T>()?;
        let inner = body_resolver::<T>(index);
        Ok(Box::new(move |ctx| inner(ctx).map(Body)))
    }
}

impl<T: DeserializeOwned + 'static> FromCall for OptBody<T> {
    fn classify(insp: &mut Inspector) -> Result<ArgResolver<Self>, ConfigError> {
        let index = insp.claim_opt_body::<T>()?;
        Ok(Box::new(move |ctx| {
            if let Some(cell) = ctx.slot_get::<Option<T>>(index) {
                return Ok(OptBody(cell));
            }
            let decoded = if body_is_empty(&ctx.raw().borrow()) {
                None
            } else {
                Some(bind_body::<T>(&ctx.raw().borrow())?)
            };
            let cell = Shared::new(decoded);
            ctx.slot_put(index, cell.clone());
            Ok(OptBody(cell))
        }))
    }
}

impl<T: DeserializeOwned + 'static> FromCall for Query<T> {
    fn classify(insp: &mut Inspector) -> Result<ArgResolver<Self>, ConfigError> {
        let index = insp.claim_query::<T>()?;
        let inner = query_resolver::<T>(index);
        Ok(Box::new(move |ctx| inner(ctx).map(Query)))
    }
}

impl<T: DeserializeOwned + 'static> FromCall for HeaderBag<T> {
    fn classify(insp: &mut Inspector) -> Result<ArgResolver<Self>, ConfigError> {
        let documented = TypeId::of::<T>() != TypeId::of::<Headers>();
        let index = insp.claim_headers::<T>(documented);
        Ok(Box::new(move |ctx| {
            if let Some(cell) = ctx.slot_get::<T>(index) {
                return Ok(HeaderBag(cell));
            }
            let decoded: T = bind_headers(&ctx.raw().borrow())?;
            let cell = Shared::new(decoded);
            ctx.slot_put(index, cell.clone());
            Ok(HeaderBag(cell))
        }))
    }
}

impl<T: DeserializeOwned + 'static> FromCall for Payload<T> {
    fn classify(insp: &mut Inspector) -> Result<ArgResolver<Self>, ConfigError> {
        let inner = match insp.payload_kind()? {
            PayloadKind::Body => {
                let index = insp.claim_body::<T>()?;
                body_resolver::<T>(index)
            }
            PayloadKind::Query => {
                let index = insp.claim_query::<T>()?;
                query_resolver::<T>(index)
            }
        };
        Ok(Box::new(move |ctx| inner(ctx).map(Payload)))
    }
}
