//! Compiling a plain function into a call unit.
//!
//! [`Handler`] is implemented for functions of up to eight parameters whose
//! types implement [`FromCall`] and whose return type implements
//! [`HandlerOutput`]. Compilation classifies the whole signature against the
//! route's [`Inspector`] once; the resulting [`CallUnit`] is a closure that
//! resolves the arguments, invokes the function and routes its return value,
//! with no signature inspection left on the request path.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::context::CallContext;
use crate::errors::{ConfigError, Panicked};
use crate::extract::FromCall;
use crate::inspect::Inspector;
use crate::outcome::HandlerOutput;

/// One compiled link of a call chain.
pub struct CallUnit {
    invoke: Box<dyn Fn(&mut CallContext) + Send + Sync>,
}

impl CallUnit {
    pub(crate) fn new(invoke: impl Fn(&mut CallContext) + Send + Sync + 'static) -> Self {
        CallUnit {
            invoke: Box::new(invoke),
        }
    }

    /// Run the unit. A panic inside the function (or an extractor) is
    /// recovered here and recorded on the context as a failure, so one bad
    /// request never takes the process down.
    pub(crate) fn call(&self, ctx: &mut CallContext) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| (self.invoke)(ctx)));
        if let Err(payload) = result {
            let message = panic_message(payload.as_ref());
            tracing::error!(panic = %message, "recovered panic in call unit");
            ctx.fail(
                Panicked {
                    message,
                    backtrace: std::backtrace::Backtrace::force_capture().to_string(),
                }
                .into(),
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// A function registrable as a handler or middleware unit.
///
/// `Args` is a marker for the parameter tuple; it lets the blanket impls for
/// different arities coexist.
pub trait Handler<Args>: Send + Sync + 'static {
    fn compile(self, insp: &mut Inspector) -> Result<CallUnit, ConfigError>;
}

macro_rules! impl_handler {
    ($($arg:ident),*) => {
        impl<F, Out, $($arg,)*> Handler<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> Out + Send + Sync + 'static,
            Out: HandlerOutput,
            $($arg: FromCall,)*
        {
            #[allow(non_snake_case, unused_variables)]
            fn compile(self, insp: &mut Inspector) -> Result<CallUnit, ConfigError> {
                $(let $arg = <$arg as FromCall>::classify(insp)?;)*
                let plan = Out::classify(insp)?;
                Ok(CallUnit::new(move |ctx| {
                    $(
                        let $arg = match $arg(ctx) {
                            Ok(value) => value,
                            Err(err) => {
                                ctx.fail(err);
                                return;
                            }
                        };
                    )*
                    let out = (self)($($arg),*);
                    out.apply(&plan, ctx);
                }))
            }
        }
    };
}

impl_handler!();
impl_handler!(A1);
impl_handler!(A1, A2);
impl_handler!(A1, A2, A3);
impl_handler!(A1, A2, A3, A4);
impl_handler!(A1, A2, A3, A4, A5);
impl_handler!(A1, A2, A3, A4, A5, A6);
impl_handler!(A1, A2, A3, A4, A5, A6, A7);
impl_handler!(A1, A2, A3, A4, A5, A6, A7, A8);
