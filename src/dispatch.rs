//! Error dispatch: per-scope handler registration and the per-route
//! dispatch table.
//!
//! Error handlers are registered against a concrete error type and resolved
//! by the exact runtime type of the captured failure. Every scope carries a
//! generic-error entry as well, so dispatch always finds a handler; the
//! built-in one maps failure kinds to 404/400/500 replies.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{default_error_handler, CaughtError, ConfigError, Unpopulated};
use crate::extract::{ArgResolver, FromCall};
use crate::handler::CallUnit;
use crate::inspect::{Inspector, Role};
use crate::outcome::HandlerOutput;
use crate::request::Status;

/// A compiled error handler: its call unit plus the status the context is
/// rebound to before the unit runs.
pub(crate) struct ErrorUnit {
    pub unit: CallUnit,
    pub default_status: Status,
}

type ErrorUnitCompiler = Arc<dyn Fn(&mut Inspector) -> Result<ErrorUnit, ConfigError> + Send + Sync>;

/// Dispatch key for the generic-error entry.
fn fallback_key() -> TypeId {
    TypeId::of::<CaughtError>()
}

/// A handler for one concrete error type.
///
/// The first parameter is the error value itself; up to four extractor
/// parameters may follow. The return type is classified like any unit's,
/// except that a fresh response type becomes an error response of the route
/// and its default status (500 when the type declares none) is bound before
/// the handler runs.
pub trait CatchHandler<Args>: Send + Sync + 'static {
    type Error: std::error::Error + 'static;
    fn compile(self, insp: &mut Inspector) -> Result<ErrorUnit, ConfigError>;
}

/// A handler for failures no typed entry matches. Receives the captured
/// error as-is.
pub trait FallbackHandler<Args>: Send + Sync + 'static {
    fn compile(self, insp: &mut Inspector) -> Result<ErrorUnit, ConfigError>;
}

fn pending_resolver<E: 'static>() -> ArgResolver<E> {
    Box::new(|ctx| match ctx.take_pending() {
        Some(err) => err.downcast::<E>(),
        None => Err(Unpopulated {
            type_name: std::any::type_name::<E>(),
        }
        .into()),
    })
}

fn caught_resolver() -> ArgResolver<CaughtError> {
    Box::new(|ctx| {
        ctx.take_pending().ok_or_else(|| {
            Unpopulated {
                type_name: "CaughtError",
            }
            .into()
        })
    })
}

macro_rules! impl_error_handlers {
    ($($arg:ident),*) => {
        impl<F, E, Out, $($arg,)*> CatchHandler<(E, $($arg,)*)> for F
        where
            F: Fn(E, $($arg),*) -> Out + Send + Sync + 'static,
            E: std::error::Error + 'static,
            Out: HandlerOutput,
            $($arg: FromCall,)*
        {
            type Error = E;

            #[allow(non_snake_case, unused_variables)]
            fn compile(self, insp: &mut Inspector) -> Result<ErrorUnit, ConfigError> {
                let pending = pending_resolver::<E>();
                $(let $arg = <$arg as FromCall>::classify(insp)?;)*
                let plan = Out::classify(insp)?;
                let default_status = Status(insp.take_unit_response_status().unwrap_or(500));
                let unit = CallUnit::new(move |ctx| {
                    let err = match pending(ctx) {
                        Ok(err) => err,
                        Err(err) => {
                            ctx.fail(err);
                            return;
                        }
                    };
                    $(
                        let $arg = match $arg(ctx) {
                            Ok(value) => value,
                            Err(err) => {
                                ctx.fail(err);
                                return;
                            }
                        };
                    )*
                    let out = (self)(err, $($arg),*);
                    out.apply(&plan, ctx);
                });
                Ok(ErrorUnit { unit, default_status })
            }
        }

        impl<F, Out, $($arg,)*> FallbackHandler<(CaughtError, $($arg,)*)> for F
        where
            F: Fn(CaughtError, $($arg),*) -> Out + Send + Sync + 'static,
            Out: HandlerOutput,
            $($arg: FromCall,)*
        {
            #[allow(non_snake_case, unused_variables)]
            fn compile(self, insp: &mut Inspector) -> Result<ErrorUnit, ConfigError> {
                let pending = caught_resolver();
                $(let $arg = <$arg as FromCall>::classify(insp)?;)*
                let plan = Out::classify(insp)?;
                let default_status = Status(insp.take_unit_response_status().unwrap_or(500));
                let unit = CallUnit::new(move |ctx| {
                    let err = match pending(ctx) {
                        Ok(err) => err,
                        Err(err) => {
                            ctx.fail(err);
                            return;
                        }
                    };
                    $(
                        let $arg = match $arg(ctx) {
                            Ok(value) => value,
                            Err(err) => {
                                ctx.fail(err);
                                return;
                            }
                        };
                    )*
                    let out = (self)(err, $($arg),*);
                    out.apply(&plan, ctx);
                });
                Ok(ErrorUnit { unit, default_status })
            }
        }
    };
}

impl_error_handlers!();
impl_error_handlers!(A1);
impl_error_handlers!(A1, A2);
impl_error_handlers!(A1, A2, A3);
impl_error_handlers!(A1, A2, A3, A4);

/// Error handlers registered on a scope, keyed by the error type they catch.
///
/// Cloning a registry is cheap; nested scopes clone their parent's and may
/// shadow individual entries.
#[derive(Clone)]
pub struct ErrorHandlers {
    table: HashMap<TypeId, ErrorUnitCompiler>,
}

impl ErrorHandlers {
    /// A registry seeded with the built-in generic-error handler.
    pub(crate) fn with_default() -> Self {
        let mut handlers = ErrorHandlers {
            table: HashMap::new(),
        };
        handlers.on_any_error(default_error_handler);
        handlers
    }

    /// Register (or shadow) the handler for `F::Error`.
    pub fn on_error<F, Args>(&mut self, f: F)
    where
        F: CatchHandler<Args> + Clone,
    {
        self.table.insert(
            TypeId::of::<F::Error>(),
            Arc::new(move |insp| f.clone().compile(insp)),
        );
    }

    /// Replace the generic-error entry.
    pub fn on_any_error<F, Args>(&mut self, f: F)
    where
        F: FallbackHandler<Args> + Clone,
    {
        self.table.insert(
            fallback_key(),
            Arc::new(move |insp| f.clone().compile(insp)),
        );
    }

    /// Compile every registered handler against the route under inspection.
    pub(crate) fn compile(&self, insp: &mut Inspector) -> Result<DispatchTable, ConfigError> {
        let mut table = HashMap::with_capacity(self.table.len());
        for (key, compile) in &self.table {
            insp.begin_unit(Role::ErrorHandler);
            table.insert(*key, compile(insp)?);
        }
        Ok(DispatchTable { table })
    }
}

/// Per-route compiled dispatch table.
pub(crate) struct DispatchTable {
    table: HashMap<TypeId, ErrorUnit>,
}

impl DispatchTable {
    /// Resolve and run the handler for `err`.
    ///
    /// The context's status is rebound to the handler's default before the
    /// unit runs. A failure inside the error handler itself is logged and
    /// dropped; the reply falls back to whatever the handler managed to bind.
    pub(crate) fn dispatch(&self, err: CaughtError, ctx: &mut crate::context::CallContext) {
        let entry = self
            .table
            .get(&err.type_id())
            .or_else(|| self.table.get(&fallback_key()));
        let Some(entry) = entry else {
            tracing::warn!(error = %err, "no handler for captured error");
            return;
        };
        ctx.status = entry.default_status;
        ctx.set_pending(err);
        entry.unit.call(ctx);
        if let Some(secondary) = ctx.take_error() {
            tracing::warn!(error = %secondary, "error handler failed; keeping its default reply");
        }
    }
}
