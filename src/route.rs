//! A compiled route: its call chain, fallback table, dispatch table and
//! response emitters.
//!
//! Everything signature-shaped happens in [`Route::compile`]; serving a
//! request is a plain loop over pre-built closures.

use http::Method;

use crate::chain::{ChainLayout, Middleware};
use crate::context::CallContext;
use crate::dispatch::{DispatchTable, ErrorHandlers};
use crate::docs::Endpoint;
use crate::errors::ConfigError;
use crate::handler::{CallUnit, Handler};
use crate::inspect::{Inspector, Role};
use crate::outcome::Emitter;
use crate::request::{RawRequest, RawResponse, Status};

pub struct Route {
    method: Method,
    path: String,
    units: Vec<CallUnit>,
    fallback: Vec<Option<usize>>,
    dispatch: DispatchTable,
    emitters: Vec<(usize, Emitter)>,
    slot_count: usize,
    default_status: Status,
}

impl Route {
    /// Classify the whole chain against one shared slot table and freeze it.
    ///
    /// Order matters: before-units in registration order, then the target,
    /// then the scope's error handlers, then after-units. Error handlers see
    /// every type the befores and the target produced.
    pub(crate) fn compile<F, Args>(
        method: Method,
        path: &str,
        middlewares: &[std::sync::Arc<Middleware>],
        handler: F,
        errors: &ErrorHandlers,
    ) -> Result<(Route, Endpoint), ConfigError>
    where
        F: Handler<Args>,
    {
        let mut insp = Inspector::new(method.clone(), path);

        let mut befores = Vec::new();
        for mw in middlewares {
            if let Some(unit) = mw.compile_before(&mut insp)? {
                befores.push(unit);
            }
        }

        insp.begin_unit(Role::Target);
        let target = handler.compile(&mut insp)?;

        let dispatch = errors.compile(&mut insp)?;

        let mut afters = Vec::new();
        for mw in middlewares.iter().rev() {
            if let Some(unit) = mw.compile_after(&mut insp)? {
                afters.push(unit);
            }
        }

        let shape: Vec<(bool, bool)> = middlewares
            .iter()
            .map(|mw| (mw.has_before(), mw.has_after()))
            .collect();
        let layout = ChainLayout::plan(&shape);

        let mut units = befores;
        units.push(target);
        units.extend(afters);
        debug_assert_eq!(units.len(), layout.before_count + 1 + layout.after_count);
        debug_assert_eq!(units.len(), layout.fallback.len());

        let (slot_count, emitters, doc, default_status) = insp.finish();

        tracing::debug!(
            %method,
            path,
            units = units.len(),
            slots = slot_count,
            "route compiled"
        );

        Ok((
            Route {
                method,
                path: path.to_string(),
                units,
                fallback: layout.fallback,
                dispatch,
                emitters,
                slot_count,
                default_status,
            },
            doc,
        ))
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run the chain for one request.
    ///
    /// A failing unit hands its error to the dispatch table, then execution
    /// resumes at the unit's fallback position; `None` aborts the walk.
    /// Either way the reply is assembled from whatever the context holds: a
    /// populated response slot wins, otherwise the status goes out alone.
    pub fn handle(&self, raw: RawRequest) -> RawResponse {
        let mut ctx = CallContext::new(raw, self.slot_count, self.default_status);

        let mut pos = 0;
        while pos < self.units.len() {
            self.units[pos].call(&mut ctx);
            match ctx.take_error() {
                None => pos += 1,
                Some(err) => {
                    self.dispatch.dispatch(err, &mut ctx);
                    match self.fallback[pos] {
                        Some(resume) => pos = resume,
                        None => break,
                    }
                }
            }
        }

        self.finalize(&ctx)
    }

    fn finalize(&self, ctx: &CallContext) -> RawResponse {
        let body = ctx.response.and_then(|slot| {
            let emitter = self
                .emitters
                .iter()
                .find(|(index, _)| *index == slot)
                .map(|(_, emit)| emit)?;
            match emitter(ctx) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!(error = %err, path = %self.path, "response serialization failed");
                    None
                }
            }
        });
        RawResponse {
            status: ctx.status.as_u16(),
            headers: ctx.out_headers.0.clone(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Path;
    use serde::Serialize;

    #[derive(Debug, Clone, Serialize)]
    struct Greeting {
        text: String,
    }

    crate::responds!(Greeting);

    #[test]
    fn plain_route_serializes_its_response_slot() {
        let (route, _) = Route::compile(
            Method::GET,
            "/hello/{name}",
            &[],
            |Path(name): Path<String>| Greeting {
                text: format!("hello {name}"),
            },
            &ErrorHandlers::with_default(),
        )
        .unwrap();

        let raw = RawRequest::new(Method::GET, "/hello/ada").with_path_param("name", "ada");
        let response = route.handle(raw);
        assert_eq!(response.status, 200);
        assert_eq!(
            response.body.unwrap()["text"],
            serde_json::json!("hello ada")
        );
    }

    #[test]
    fn status_only_route_has_an_empty_body() {
        let (route, _) = Route::compile(
            Method::GET,
            "/ping",
            &[],
            || Status(204),
            &ErrorHandlers::with_default(),
        )
        .unwrap();

        let response = route.handle(RawRequest::new(Method::GET, "/ping"));
        assert_eq!(response.status, 204);
        assert!(response.body.is_none());
    }

    #[test]
    fn missing_path_param_is_a_404() {
        let (route, _) = Route::compile(
            Method::GET,
            "/items/{id}",
            &[],
            |Path(id): Path<u32>| Status(200 + id as u16),
            &ErrorHandlers::with_default(),
        )
        .unwrap();

        let raw = RawRequest::new(Method::GET, "/items/seven").with_path_param("id", "seven");
        let response = route.handle(raw);
        assert_eq!(response.status, 404);
        let body = response.body.unwrap();
        assert_eq!(body["success"], serde_json::json!(false));
    }
}
