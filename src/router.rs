//! Route registration surface: the router and its nested groups.
//!
//! Scopes nest: a group inherits its parent's middlewares and error handlers
//! by value, so anything registered on the group afterwards never leaks back
//! out. The plain method helpers (`get`, `post`, ...) panic on a
//! configuration error, which surfaces signature mistakes at startup; the
//! `try_` twins return the error instead.

use std::sync::Arc;

use http::Method;
use regex::Regex;

use crate::chain::Middleware;
use crate::dispatch::{CatchHandler, ErrorHandlers, FallbackHandler};
use crate::docs::Docs;
use crate::errors::ConfigError;
use crate::handler::Handler;
use crate::inspect::PARAM_RE;
use crate::request::{RawRequest, RawResponse};
use crate::route::Route;

#[derive(Clone)]
struct ScopeState {
    prefix: String,
    middlewares: Vec<Arc<Middleware>>,
    errors: ErrorHandlers,
}

struct RouteEntry {
    method: Method,
    pattern: Regex,
    route: Arc<Route>,
}

/// The registration root. Compiles each route once, serves it forever.
pub struct Router {
    entries: Vec<RouteEntry>,
    docs: Docs,
    scope: ScopeState,
}

/// A nested registration scope with its own prefix, middlewares and error
/// handlers.
pub struct Group<'r> {
    router: &'r mut Router,
    scope: ScopeState,
}

fn join_paths(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        return path.to_string();
    }
    format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Compile a `{name}`-style pattern into an anchored matcher with named
/// capture groups. A trailing slash on either side is tolerated.
fn pattern_regex(path: &str) -> Regex {
    let trimmed = path.trim_end_matches('/');
    let mut pattern = String::from("^");
    let mut last = 0;
    for caps in PARAM_RE.captures_iter(trimmed) {
        let whole = caps.get(0).unwrap();
        pattern.push_str(&regex::escape(&trimmed[last..whole.start()]));
        pattern.push_str(&format!("(?P<{}>[^/]+)", &caps[1]));
        last = whole.end();
    }
    pattern.push_str(&regex::escape(&trimmed[last..]));
    pattern.push_str("/?$");
    Regex::new(&pattern).unwrap()
}

macro_rules! scope_methods {
    () => {
        /// Add a middleware to this scope.
        pub fn with(&mut self, middleware: Middleware) -> &mut Self {
            self.scope.middlewares.push(Arc::new(middleware));
            self
        }

        /// Register (or shadow) the error handler for one error type in this
        /// scope.
        pub fn on_error<F, Args>(&mut self, f: F) -> &mut Self
        where
            F: CatchHandler<Args> + Clone,
        {
            self.scope.errors.on_error(f);
            self
        }

        /// Replace this scope's generic-error handler.
        pub fn on_any_error<F, Args>(&mut self, f: F) -> &mut Self
        where
            F: FallbackHandler<Args> + Clone,
        {
            self.scope.errors.on_any_error(f);
            self
        }
    };
}

macro_rules! route_methods {
    ($($name:ident / $try_name:ident => $method:ident),+ $(,)?) => {
        /// Register a route under an explicit method; panics on a
        /// configuration error.
        pub fn on<F, Args>(&mut self, method: Method, path: &str, handler: F) -> &mut Self
        where
            F: Handler<Args>,
        {
            if let Err(err) = self.try_on(method, path, handler) {
                panic!("{err}");
            }
            self
        }

        /// Register a route under an explicit method, surfacing configuration
        /// errors.
        pub fn try_on<F, Args>(
            &mut self,
            method: Method,
            path: &str,
            handler: F,
        ) -> Result<(), ConfigError>
        where
            F: Handler<Args>,
        {
            self.register(method, path, handler)
        }

        /// Register the same handler under every supported method; panics on
        /// a configuration error.
        pub fn any<F, Args>(&mut self, path: &str, handler: F) -> &mut Self
        where
            F: Handler<Args> + Clone,
        {
            if let Err(err) = self.try_any(path, handler) {
                panic!("{err}");
            }
            self
        }

        /// Register the same handler under every supported method. Each
        /// method compiles its own route, so method-inferred payloads bind
        /// per method.
        pub fn try_any<F, Args>(&mut self, path: &str, handler: F) -> Result<(), ConfigError>
        where
            F: Handler<Args> + Clone,
        {
            for method in [
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::HEAD,
                Method::OPTIONS,
            ] {
                self.register(method, path, handler.clone())?;
            }
            Ok(())
        }

        $(
            /// Register a route; panics on a configuration error.
            pub fn $name<F, Args>(&mut self, path: &str, handler: F) -> &mut Self
            where
                F: Handler<Args>,
            {
                if let Err(err) = self.$try_name(path, handler) {
                    panic!("{err}");
                }
                self
            }

            /// Register a route, surfacing configuration errors.
            pub fn $try_name<F, Args>(
                &mut self,
                path: &str,
                handler: F,
            ) -> Result<(), ConfigError>
            where
                F: Handler<Args>,
            {
                self.register(Method::$method, path, handler)
            }
        )+
    };
}

impl Default for Router {
    fn default() -> Self {
        Router::new()
    }
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Router {
            entries: Vec::new(),
            docs: Docs::default(),
            scope: ScopeState {
                prefix: String::new(),
                middlewares: Vec::new(),
                errors: ErrorHandlers::with_default(),
            },
        }
    }

    /// Open a nested scope under `prefix`.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        let scope = ScopeState {
            prefix: join_paths(&self.scope.prefix, prefix),
            ..self.scope.clone()
        };
        Group {
            router: self,
            scope,
        }
    }

    fn register<F, Args>(
        &mut self,
        method: Method,
        path: &str,
        handler: F,
    ) -> Result<(), ConfigError>
    where
        F: Handler<Args>,
    {
        let scope = self.scope.clone();
        self.register_scoped(method, path, handler, &scope)
    }

    fn register_scoped<F, Args>(
        &mut self,
        method: Method,
        path: &str,
        handler: F,
        scope: &ScopeState,
    ) -> Result<(), ConfigError>
    where
        F: Handler<Args>,
    {
        let full_path = join_paths(&scope.prefix, path);
        let (route, endpoint) = Route::compile(
            method.clone(),
            &full_path,
            &scope.middlewares,
            handler,
            &scope.errors,
        )?;
        self.docs.set_path(&full_path, &method, endpoint);
        tracing::info!(%method, path = %full_path, "route registered");
        self.entries.push(RouteEntry {
            method,
            pattern: pattern_regex(&full_path),
            route: Arc::new(route),
        });
        Ok(())
    }

    /// Match and serve one request. Unknown paths get a bare 404.
    ///
    /// Path matching here is a convenience for embedding and tests; a host
    /// server that matched the path itself can call
    /// [`Route::handle`] through [`route`](Self::route) directly.
    pub fn handle(&self, mut raw: RawRequest) -> RawResponse {
        for entry in &self.entries {
            if entry.method != raw.method {
                continue;
            }
            let Some(caps) = entry.pattern.captures(&raw.path) else {
                continue;
            };
            for name in entry.pattern.capture_names().flatten() {
                if let Some(segment) = caps.name(name) {
                    raw.path_params
                        .insert(name.to_string(), segment.as_str().to_string());
                }
            }
            return entry.route.handle(raw);
        }
        tracing::debug!(method = %raw.method, path = %raw.path, "no route matched");
        RawResponse {
            status: 404,
            headers: Default::default(),
            body: None,
        }
    }

    /// The compiled route registered for exactly this method and pattern.
    #[must_use]
    pub fn route(&self, method: &Method, path: &str) -> Option<Arc<Route>> {
        self.entries
            .iter()
            .find(|entry| entry.method == *method && entry.route.path() == path)
            .map(|entry| Arc::clone(&entry.route))
    }

    /// Documentation metadata collected during registration.
    #[must_use]
    pub fn docs(&self) -> &Docs {
        &self.docs
    }

    scope_methods!();
    route_methods! {
        get / try_get => GET,
        post / try_post => POST,
        put / try_put => PUT,
        patch / try_patch => PATCH,
        delete / try_delete => DELETE,
        head / try_head => HEAD,
        options / try_options => OPTIONS,
    }
}

impl Group<'_> {
    /// Open a nested scope under this group.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        let scope = ScopeState {
            prefix: join_paths(&self.scope.prefix, prefix),
            ..self.scope.clone()
        };
        Group {
            router: &mut *self.router,
            scope,
        }
    }

    fn register<F, Args>(
        &mut self,
        method: Method,
        path: &str,
        handler: F,
    ) -> Result<(), ConfigError>
    where
        F: Handler<Args>,
    {
        let scope = self.scope.clone();
        self.router.register_scoped(method, path, handler, &scope)
    }

    scope_methods!();
    route_methods! {
        get / try_get => GET,
        post / try_post => POST,
        put / try_put => PUT,
        patch / try_patch => PATCH,
        delete / try_delete => DELETE,
        head / try_head => HEAD,
        options / try_options => OPTIONS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Status;

    #[test]
    fn pattern_matching_fills_path_params() {
        let mut router = Router::new();
        router.get("/shop/{name}/", || Status(204));

        let response = router.handle(RawRequest::new(Method::GET, "/shop/corner"));
        assert_eq!(response.status, 204);

        let response = router.handle(RawRequest::new(Method::GET, "/shop/corner/"));
        assert_eq!(response.status, 204);

        let response = router.handle(RawRequest::new(Method::GET, "/shop"));
        assert_eq!(response.status, 404);
    }

    #[test]
    fn group_prefix_applies_to_nested_routes() {
        let mut router = Router::new();
        {
            let mut api = router.group("/api");
            api.get("/ping", || Status(200));
        }
        assert_eq!(
            router.handle(RawRequest::new(Method::GET, "/api/ping")).status,
            200
        );
        assert_eq!(
            router.handle(RawRequest::new(Method::GET, "/ping")).status,
            404
        );
    }

    #[test]
    fn any_serves_every_supported_method() {
        let mut router = Router::new();
        router.any("/echo", || Status(200));
        for method in [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS] {
            assert_eq!(router.handle(RawRequest::new(method, "/echo")).status, 200);
        }
    }

    #[test]
    fn explicit_method_registration() {
        let mut router = Router::new();
        router.on(Method::PUT, "/items/{id}", || Status(204));
        assert_eq!(
            router.handle(RawRequest::new(Method::PUT, "/items/3")).status,
            204
        );
    }

    #[test]
    fn method_mismatch_does_not_match() {
        let mut router = Router::new();
        router.get("/ping", || Status(200));
        assert_eq!(
            router.handle(RawRequest::new(Method::POST, "/ping")).status,
            404
        );
    }
}
