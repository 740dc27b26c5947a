//! Middleware declarations and chain assembly.
//!
//! A [`Middleware`] holds deferred compilers for its optional before and
//! after units; it is classified per route, against that route's own slot
//! table. [`ChainLayout`] fixes the execution order and the fallback jump
//! table: before-units in registration order, the target, then after-units in
//! reverse registration order. The fallback entry of a position says where
//! execution resumes when that unit fails, after error dispatch: a failing
//! before-unit jumps to its own middleware's cleanup side so that only the
//! middlewares that actually ran get their after-units executed.

use crate::errors::ConfigError;
use crate::handler::{CallUnit, Handler};
use crate::inspect::{Inspector, Role};

pub(crate) type UnitCompiler =
    Box<dyn Fn(&mut Inspector) -> Result<CallUnit, ConfigError> + Send + Sync>;

/// A before/after pair registered on a scope.
///
/// Either side may be omitted. The same middleware value may back any number
/// of routes; each route compiles its own units.
#[derive(Default)]
pub struct Middleware {
    before: Option<UnitCompiler>,
    after: Option<UnitCompiler>,
}

impl Middleware {
    #[must_use]
    pub fn new() -> Self {
        Middleware::default()
    }

    /// Unit that runs before the target, in registration order.
    #[must_use]
    pub fn before<F, Args>(mut self, f: F) -> Self
    where
        F: Handler<Args> + Clone,
    {
        self.before = Some(Box::new(move |insp| f.clone().compile(insp)));
        self
    }

    /// Unit that runs after the target, in reverse registration order.
    #[must_use]
    pub fn after<F, Args>(mut self, f: F) -> Self
    where
        F: Handler<Args> + Clone,
    {
        self.after = Some(Box::new(move |insp| f.clone().compile(insp)));
        self
    }

    pub(crate) fn compile_before(
        &self,
        insp: &mut Inspector,
    ) -> Result<Option<CallUnit>, ConfigError> {
        match &self.before {
            Some(compile) => {
                insp.begin_unit(Role::Before);
                Ok(Some(compile(insp)?))
            }
            None => Ok(None),
        }
    }

    pub(crate) fn compile_after(
        &self,
        insp: &mut Inspector,
    ) -> Result<Option<CallUnit>, ConfigError> {
        match &self.after {
            Some(compile) => {
                insp.begin_unit(Role::After);
                Ok(Some(compile(insp)?))
            }
            None => Ok(None),
        }
    }

    pub(crate) fn has_before(&self) -> bool {
        self.before.is_some()
    }

    pub(crate) fn has_after(&self) -> bool {
        self.after.is_some()
    }
}

/// Positions and fallback targets for one route's chain.
///
/// Positions: before-units at `0..before_count` in middleware order, the
/// target at `before_count`, after-units from `before_count + 1` in reverse
/// middleware order. `fallback[p] == None` aborts the chain.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ChainLayout {
    pub before_count: usize,
    pub after_count: usize,
    pub fallback: Vec<Option<usize>>,
}

impl ChainLayout {
    /// `shape` gives each middleware's `(has_before, has_after)` flags in
    /// registration order.
    pub(crate) fn plan(shape: &[(bool, bool)]) -> ChainLayout {
        let before_count = shape.iter().filter(|(b, _)| *b).count();
        let after_count = shape.iter().filter(|(_, a)| *a).count();
        let len = before_count + 1 + after_count;
        let mut fallback = vec![None; len];

        // After-unit of the middleware at index `mw`, if it has one.
        let after_pos = |mw: usize| -> Option<usize> {
            if !shape[mw].1 {
                return None;
            }
            let later = shape[mw + 1..].iter().filter(|(_, a)| *a).count();
            Some(before_count + 1 + later)
        };

        let mut before_rank = 0;
        for (mw, (has_before, _)) in shape.iter().enumerate() {
            if !has_before {
                continue;
            }
            // Resume at the cleanup side of the nearest middleware, at or
            // before this one, that has an after-unit.
            fallback[before_rank] = (0..=mw).rev().find_map(after_pos);
            before_rank += 1;
        }

        if after_count > 0 {
            fallback[before_count] = Some(before_count + 1);
        }
        for pos in before_count + 1..len {
            fallback[pos] = if pos + 1 < len { Some(pos + 1) } else { None };
        }

        ChainLayout {
            before_count,
            after_count,
            fallback,
        }
    }
}
