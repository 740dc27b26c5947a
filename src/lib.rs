//! # routewire
//!
//! **routewire** is a declarative request-handling layer: plain functions
//! become handlers and middlewares, and every piece of wiring is derived from
//! their signatures at route-registration time.
//!
//! ## Overview
//!
//! Registering a route inspects each function in the chain exactly once and
//! compiles the whole thing into a fixed pipeline: a slot table mapping types
//! to integer indices, an argument resolver per parameter, a result sink per
//! return position, and a fallback jump table for error-driven control flow.
//! Serving a request is then a plain loop over pre-built closures; no
//! signature inspection happens on the request path.
//!
//! ## Architecture
//!
//! - **[`router`]** - Registration surface: [`Router`], nested [`Group`]s,
//!   method helpers and their `try_` twins
//! - **[`route`]** - A compiled route: call chain, fallback table, dispatch
//!   table, response emitters
//! - **[`inspect`]** - The per-route [`Inspector`]: slot table and category
//!   claims (body, query, response)
//! - **[`extract`]** - Parameter extractors: [`Path`], [`Body`], [`Query`],
//!   [`HeaderBag`], [`Payload`], [`Shared`] and friends
//! - **[`outcome`]** - Return-value classification and sinks: [`Responds`],
//!   [`HandlerOutput`], the [`responds!`] macro
//! - **[`chain`]** - [`Middleware`] declarations and chain assembly
//! - **[`dispatch`]** - Error handlers keyed by error type, with a built-in
//!   generic fallback
//! - **[`errors`]** - Captured failures, configuration errors, the default
//!   error reply
//! - **[`context`]** - Per-request state: [`CallContext`] and [`Shared`]
//!   cells
//! - **[`request`]** - The raw request/response boundary with the host HTTP
//!   server
//! - **[`docs`]** - Endpoint metadata collected during registration
//!
//! ## Example
//!
//! ```
//! use routewire::{responds, Path, Query, Router};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Deserialize)]
//! struct Filter {
//!     search: Option<String>,
//! }
//!
//! #[derive(Debug, Serialize)]
//! struct Shop {
//!     name: String,
//!     query: Option<String>,
//! }
//!
//! responds!(Shop);
//!
//! fn get_shop(Path(name): Path<String>, Query(filter): Query<Filter>) -> Shop {
//!     Shop {
//!         name,
//!         query: filter.borrow().search.clone(),
//!     }
//! }
//!
//! let mut router = Router::new();
//! router.get("/shop/{name}/", get_shop);
//!
//! let raw = routewire::RawRequest::new(http::Method::GET, "/shop/corner/?search=tea");
//! let response = router.handle(raw);
//! assert_eq!(response.status, 200);
//! ```

pub mod chain;
pub mod context;
pub mod dispatch;
pub mod docs;
pub mod errors;
pub mod extract;
pub mod handler;
pub mod inspect;
pub mod outcome;
pub mod request;
pub mod route;
pub mod router;

pub use chain::Middleware;
pub use context::{CallContext, Shared};
pub use dispatch::{CatchHandler, ErrorHandlers, FallbackHandler};
pub use docs::{Docs, Endpoint};
pub use errors::{
    CaughtError, ConfigError, DecodeError, DefaultErrorResponse, ErrorKind, NotFound, Panicked,
};
pub use extract::{Body, FromCall, HeaderBag, OptBody, OptPath, Path, Payload, Query, Raw};
pub use handler::{CallUnit, Handler};
pub use inspect::{Inspector, Role};
pub use outcome::{HandlerOutput, OutPlan, Provide, Responds};
pub use request::{Headers, RawRequest, RawResponse, Status};
pub use route::Route;
pub use router::{Group, Router};
