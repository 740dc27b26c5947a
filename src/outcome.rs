//! Return-value classification and the result sinks.
//!
//! At registration time each unit's return type is classified once into an
//! [`OutPlan`]; at request time [`HandlerOutput::apply`] routes the produced
//! value into the matching sink on the [`CallContext`]: the status field, the
//! outgoing header bag, a value slot, or the response slot.

use serde::Serialize;
use serde_json::Value;

use crate::context::{CallContext, Shared};
use crate::errors::{CaughtError, ConfigError};
use crate::inspect::{Inspector, Role};
use crate::request::{Headers, Status};

/// Serializes one response slot out of a finished context.
pub type Emitter = Box<dyn Fn(&CallContext) -> serde_json::Result<Value> + Send + Sync>;

/// Compiled routing decision for one return position.
#[derive(Debug)]
pub enum OutPlan {
    /// Nothing to route.
    Unit,
    /// Rebind the response status.
    Status,
    /// Merge into the outgoing headers.
    Headers,
    /// Store into a value slot.
    Value(usize),
    /// Store into a response slot and select it as the final payload.
    Response(usize),
    Tuple(Vec<OutPlan>),
    Fallible(Box<OutPlan>),
}

/// A type that can be classified as a response payload.
///
/// Implement through the [`responds!`](crate::responds) macro, which also
/// wires up [`HandlerOutput`] for the type.
pub trait Responds: Serialize + 'static {
    /// Status bound to the route when this type is its response. `None`
    /// defaults to 200, or 500 when returned from an error handler.
    const DEFAULT_STATUS: Option<u16>;
    /// Extra documented status classes, e.g. `"4XX"`.
    const STATUS_CODES: &'static [&'static str];
}

/// Return-type side of a unit signature.
pub trait HandlerOutput: 'static {
    fn classify(insp: &mut Inspector) -> Result<OutPlan, ConfigError>;
    fn apply(self, plan: &OutPlan, ctx: &mut CallContext);
}

impl HandlerOutput for () {
    fn classify(_: &mut Inspector) -> Result<OutPlan, ConfigError> {
        Ok(OutPlan::Unit)
    }

    fn apply(self, _: &OutPlan, _: &mut CallContext) {}
}

impl HandlerOutput for Status {
    fn classify(_: &mut Inspector) -> Result<OutPlan, ConfigError> {
        Ok(OutPlan::Status)
    }

    fn apply(self, _: &OutPlan, ctx: &mut CallContext) {
        ctx.status = self;
    }
}

impl HandlerOutput for Option<Status> {
    fn classify(_: &mut Inspector) -> Result<OutPlan, ConfigError> {
        Ok(OutPlan::Status)
    }

    fn apply(self, _: &OutPlan, ctx: &mut CallContext) {
        if let Some(status) = self {
            ctx.status = status;
        }
    }
}

impl HandlerOutput for Headers {
    fn classify(_: &mut Inspector) -> Result<OutPlan, ConfigError> {
        Ok(OutPlan::Headers)
    }

    fn apply(self, _: &OutPlan, ctx: &mut CallContext) {
        for (name, value) in self.0 {
            ctx.out_headers.insert(&name, value);
        }
    }
}

impl HandlerOutput for Option<Headers> {
    fn classify(_: &mut Inspector) -> Result<OutPlan, ConfigError> {
        Ok(OutPlan::Headers)
    }

    fn apply(self, plan: &OutPlan, ctx: &mut CallContext) {
        if let Some(headers) = self {
            headers.apply(plan, ctx);
        }
    }
}

/// Publish a value into the chain's slot table without making it the
/// response: later units can consume it as `Shared<T>`.
#[derive(Debug)]
pub struct Provide<T>(pub T);

impl<T: 'static> HandlerOutput for Provide<T> {
    fn classify(insp: &mut Inspector) -> Result<OutPlan, ConfigError> {
        Ok(OutPlan::Value(insp.slot_for::<T>()))
    }

    fn apply(self, plan: &OutPlan, ctx: &mut CallContext) {
        if let OutPlan::Value(index) | OutPlan::Response(index) = plan {
            store(ctx, *index, self.0);
        }
    }
}

impl<T: HandlerOutput, E: std::error::Error + 'static> HandlerOutput for Result<T, E> {
    fn classify(insp: &mut Inspector) -> Result<OutPlan, ConfigError> {
        if insp.role() == Role::After {
            return Err(insp.err_after_cannot_fail());
        }
        Ok(OutPlan::Fallible(Box::new(T::classify(insp)?)))
    }

    fn apply(self, plan: &OutPlan, ctx: &mut CallContext) {
        let OutPlan::Fallible(inner) = plan else {
            return;
        };
        match self {
            Ok(value) => value.apply(inner, ctx),
            Err(err) => ctx.fail(CaughtError::application(err)),
        }
    }
}

macro_rules! impl_tuple_output {
    ($(($($name:ident/$idx:tt),+)),+ $(,)?) => {
        $(
            impl<$($name: HandlerOutput),+> HandlerOutput for ($($name,)+) {
                fn classify(insp: &mut Inspector) -> Result<OutPlan, ConfigError> {
                    Ok(OutPlan::Tuple(vec![$($name::classify(insp)?),+]))
                }

                fn apply(self, plan: &OutPlan, ctx: &mut CallContext) {
                    let OutPlan::Tuple(plans) = plan else {
                        return;
                    };
                    $(self.$idx.apply(&plans[$idx], ctx);)+
                }
            }
        )+
    };
}

impl_tuple_output! {
    (A/0, B/1),
    (A/0, B/1, C/2),
    (A/0, B/1, C/2, D/3),
}

fn store<T: 'static>(ctx: &mut CallContext, index: usize, value: T) {
    match ctx.slot_get::<T>(index) {
        Some(cell) => cell.set(value),
        None => ctx.slot_put(index, Shared::new(value)),
    }
}

#[doc(hidden)]
pub fn respond_classify<T: Responds>(insp: &mut Inspector) -> Result<OutPlan, ConfigError> {
    insp.respond::<T>()
}

#[doc(hidden)]
pub fn respond_apply<T: 'static>(value: T, plan: &OutPlan, ctx: &mut CallContext) {
    match plan {
        OutPlan::Response(index) => {
            store(ctx, *index, value);
            ctx.set_response(*index);
        }
        OutPlan::Value(index) => store(ctx, *index, value),
        _ => {}
    }
}

/// Declare a serializable type as a response payload.
///
/// Generates the [`Responds`](crate::Responds) and
/// [`HandlerOutput`](crate::HandlerOutput) impls for a concrete type:
///
/// ```ignore
/// responds!(Pet);
/// responds!(Created, default_status = 201);
/// responds!(Problem, default_status = 422, codes = ["4XX"]);
/// ```
#[macro_export]
macro_rules! responds {
    ($ty:ty) => {
        $crate::responds!(@impl $ty, ::core::option::Option::None, []);
    };
    ($ty:ty, default_status = $status:expr) => {
        $crate::responds!(@impl $ty, ::core::option::Option::Some($status), []);
    };
    ($ty:ty, codes = [$($code:expr),* $(,)?]) => {
        $crate::responds!(@impl $ty, ::core::option::Option::None, [$($code),*]);
    };
    ($ty:ty, default_status = $status:expr, codes = [$($code:expr),* $(,)?]) => {
        $crate::responds!(@impl $ty, ::core::option::Option::Some($status), [$($code),*]);
    };
    (@impl $ty:ty, $status:expr, [$($code:expr),*]) => {
        impl $crate::Responds for $ty {
            const DEFAULT_STATUS: ::core::option::Option<u16> = $status;
            const STATUS_CODES: &'static [&'static str] = &[$($code),*];
        }

        impl $crate::HandlerOutput for $ty {
            fn classify(
                insp: &mut $crate::Inspector,
            ) -> ::core::result::Result<$crate::OutPlan, $crate::ConfigError> {
                $crate::outcome::respond_classify::<$ty>(insp)
            }

            fn apply(self, plan: &$crate::OutPlan, ctx: &mut $crate::CallContext) {
                $crate::outcome::respond_apply(self, plan, ctx)
            }
        }
    };
}
