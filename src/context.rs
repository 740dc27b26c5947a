//! Per-request execution state.
//!
//! A [`CallContext`] is created fresh for every inbound request and discarded
//! once the response is written. It is exclusively owned by the single
//! request execution that created it and never crosses threads, so values
//! live in [`Shared`] cells (`Rc<RefCell<T>>`) with no synchronization.

use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::errors::CaughtError;
use crate::request::{Headers, RawRequest, Status};

/// A request-scoped cell holding one produced value.
///
/// Every slot-resident value sits behind a `Shared<T>`: a type requested by
/// several units in the same chain is produced exactly once per request, and
/// mutations made by one unit are visible to the next. As a handler
/// parameter, `Shared<T>` reads the slot a previous unit populated.
pub struct Shared<T>(Rc<RefCell<T>>);

impl<T: 'static> Shared<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Shared(Rc::new(RefCell::new(value)))
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.0.borrow_mut()
    }

    /// Clone the inner value out of the cell.
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.0.borrow().clone()
    }

    pub fn set(&self, value: T) {
        *self.0.borrow_mut() = value;
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared(Rc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Shared").field(&self.0.borrow()).finish()
    }
}

/// Mutable state threaded through one route execution.
///
/// Slots are populated lazily: each entry holds a `Shared<T>` for the type
/// the slot was assigned to at registration time.
pub struct CallContext {
    raw: Shared<RawRequest>,
    slots: Vec<Option<Box<dyn Any>>>,
    error: Option<CaughtError>,
    pending: Option<CaughtError>,
    pub(crate) status: Status,
    pub(crate) response: Option<usize>,
    pub(crate) out_headers: Headers,
}

impl CallContext {
    pub(crate) fn new(raw: RawRequest, slot_count: usize, status: Status) -> Self {
        CallContext {
            raw: Shared::new(raw),
            slots: (0..slot_count).map(|_| None).collect(),
            error: None,
            pending: None,
            status,
            response: None,
            out_headers: Headers::new(),
        }
    }

    /// The raw platform request handle; one per request, shared by all units.
    #[must_use]
    pub fn raw(&self) -> Shared<RawRequest> {
        self.raw.clone()
    }

    /// The status the response will carry unless a later unit rebinds it.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    pub(crate) fn slot_get<T: 'static>(&self, index: usize) -> Option<Shared<T>> {
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .and_then(|cell| cell.downcast_ref::<Shared<T>>())
            .cloned()
    }

    pub(crate) fn slot_put<T: 'static>(&mut self, index: usize, cell: Shared<T>) {
        self.slots[index] = Some(Box::new(cell));
    }

    /// Record a failure; the executor dispatches it after the unit returns.
    pub fn fail(&mut self, err: CaughtError) {
        self.error = Some(err);
    }

    pub(crate) fn take_error(&mut self) -> Option<CaughtError> {
        self.error.take()
    }

    pub(crate) fn set_pending(&mut self, err: CaughtError) {
        self.pending = Some(err);
    }

    pub(crate) fn take_pending(&mut self) -> Option<CaughtError> {
        self.pending.take()
    }

    pub(crate) fn set_response(&mut self, index: usize) {
        self.response = Some(index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[test]
    fn slot_handles_are_shared_not_copied() {
        let raw = RawRequest::new(Method::GET, "/");
        let mut ctx = CallContext::new(raw, 1, Status::OK);
        ctx.slot_put(0, Shared::new(vec![1u8]));

        let first: Shared<Vec<u8>> = ctx.slot_get(0).unwrap();
        first.borrow_mut().push(2);

        let second: Shared<Vec<u8>> = ctx.slot_get(0).unwrap();
        assert_eq!(*second.borrow(), vec![1, 2]);
    }

    #[test]
    fn slot_get_rejects_type_mismatch() {
        let raw = RawRequest::new(Method::GET, "/");
        let mut ctx = CallContext::new(raw, 1, Status::OK);
        ctx.slot_put(0, Shared::new(1u32));
        assert!(ctx.slot_get::<String>(0).is_none());
    }
}
