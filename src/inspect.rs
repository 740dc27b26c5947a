//! Signature inspection state: the per-route slot table and category claims.
//!
//! One [`Inspector`] lives for the duration of a route's compilation. Every
//! unit (before-middleware, target handler, after-middleware, error handler)
//! classifies its parameter and return types against it, in chain order.
//! Types map to integer slot indices exactly once; re-registering the same
//! type reuses the index (the value becomes shared state), while two
//! unrelated types claiming the body or query category is an ambiguity error
//! that aborts registration.

use std::any::{type_name, TypeId};
use std::collections::HashMap;

use http::Method;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::CallContext;
use crate::docs::Endpoint;
use crate::errors::ConfigError;
use crate::outcome::{Emitter, OutPlan, Responds};
use crate::request::Status;

pub(crate) static PARAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").unwrap());

/// The role of the unit currently under inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Before,
    Target,
    After,
    ErrorHandler,
}

/// Where a method-inferred payload should be decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Body,
    Query,
}

/// Route-compilation state: slot table, category claims, doc metadata.
pub struct Inspector {
    method: Method,
    path: String,
    param_names: Vec<String>,
    role: Role,
    cursor: usize,
    slots: HashMap<TypeId, usize>,
    values: usize,
    body: Option<(TypeId, &'static str)>,
    query: Option<(TypeId, &'static str)>,
    response: Option<(TypeId, &'static str)>,
    response_slots: Vec<usize>,
    emitters: Vec<(usize, Emitter)>,
    unit_response_status: Option<u16>,
    route_default_status: Option<u16>,
    doc: Endpoint,
}

impl Inspector {
    pub(crate) fn new(method: Method, path: &str) -> Self {
        let param_names = PARAM_RE
            .captures_iter(path)
            .map(|c| c[1].to_string())
            .collect();
        Inspector {
            method,
            path: path.to_string(),
            param_names,
            role: Role::Target,
            cursor: 0,
            slots: HashMap::new(),
            values: 0,
            body: None,
            query: None,
            response: None,
            response_slots: Vec::new(),
            emitters: Vec::new(),
            unit_response_status: None,
            route_default_status: None,
            doc: Endpoint::new(path),
        }
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Reset per-unit state; called before each unit is classified.
    pub(crate) fn begin_unit(&mut self, role: Role) {
        self.role = role;
        self.cursor = 0;
        self.unit_response_status = None;
    }

    /// Consume the next declared path segment for a path-typed parameter.
    pub fn next_path_param(
        &mut self,
        kind: &'static str,
        required: bool,
    ) -> Result<String, ConfigError> {
        let Some(name) = self.param_names.get(self.cursor) else {
            return Err(ConfigError::TooManyPathParams {
                path: self.path.clone(),
                declared: self.cursor + 1,
                available: self.param_names.len(),
            });
        };
        let name = name.clone();
        self.cursor += 1;
        self.doc.add_path_param(&name, kind, required);
        Ok(name)
    }

    fn existing<T: 'static>(&self) -> Option<usize> {
        self.slots.get(&TypeId::of::<T>()).copied()
    }

    fn new_slot<T: 'static>(&mut self) -> usize {
        let index = self.values;
        self.slots.insert(TypeId::of::<T>(), index);
        self.values += 1;
        index
    }

    /// Slot for a produced value: reuses the index if `T` is already slotted.
    pub fn slot_for<T: 'static>(&mut self) -> usize {
        match self.existing::<T>() {
            Some(index) => index,
            None => self.new_slot::<T>(),
        }
    }

    /// Slot for a consumed dependency: `T` must have been produced by an
    /// earlier unit in the same chain.
    pub fn require_slot<T: 'static>(&self) -> Result<usize, ConfigError> {
        self.existing::<T>()
            .ok_or_else(|| ConfigError::UnknownDependency {
                method: self.method.clone(),
                path: self.path.clone(),
                type_name: type_name::<T>(),
            })
    }

    /// Claim the route's unique body type and return its slot.
    pub fn claim_body<T: 'static>(&mut self) -> Result<usize, ConfigError> {
        if let Some(index) = self.existing::<T>() {
            return Ok(index);
        }
        self.claim_body_category::<T>()?;
        Ok(self.new_slot::<T>())
    }

    /// Like [`claim_body`](Self::claim_body) but the slot stores `Option<T>`
    /// (optional bind: an absent body yields `None`).
    pub fn claim_opt_body<T: 'static>(&mut self) -> Result<usize, ConfigError> {
        if let Some(index) = self.existing::<Option<T>>() {
            return Ok(index);
        }
        self.claim_body_category::<T>()?;
        Ok(self.new_slot::<Option<T>>())
    }

    fn claim_body_category<T: 'static>(&mut self) -> Result<(), ConfigError> {
        match self.body {
            Some((id, first)) if id != TypeId::of::<T>() => Err(ConfigError::AmbiguousBody {
                method: self.method.clone(),
                path: self.path.clone(),
                first,
                second: type_name::<T>(),
            }),
            Some(_) => Ok(()),
            None => {
                self.body = Some((TypeId::of::<T>(), type_name::<T>()));
                self.doc.set_body_type(type_name::<T>());
                Ok(())
            }
        }
    }

    /// Claim the route's unique query type and return its slot.
    pub fn claim_query<T: 'static>(&mut self) -> Result<usize, ConfigError> {
        if let Some(index) = self.existing::<T>() {
            return Ok(index);
        }
        match self.query {
            Some((id, first)) if id != TypeId::of::<T>() => Err(ConfigError::AmbiguousQuery {
                method: self.method.clone(),
                path: self.path.clone(),
                first,
                second: type_name::<T>(),
            }),
            _ => {
                if self.query.is_none() {
                    self.query = Some((TypeId::of::<T>(), type_name::<T>()));
                    self.doc.set_query_type(type_name::<T>());
                }
                Ok(self.new_slot::<T>())
            }
        }
    }

    /// Slot for a header-bag type. `documented` is false for the generic
    /// key-value map, which has no named fields to document.
    pub fn claim_headers<T: 'static>(&mut self, documented: bool) -> usize {
        if let Some(index) = self.existing::<T>() {
            return index;
        }
        if documented {
            self.doc.add_header_type(type_name::<T>());
        }
        self.new_slot::<T>()
    }

    /// Infer the payload category from the route's HTTP method.
    pub fn payload_kind(&self) -> Result<PayloadKind, ConfigError> {
        if [Method::GET, Method::HEAD, Method::DELETE, Method::OPTIONS].contains(&self.method) {
            Ok(PayloadKind::Query)
        } else if [Method::POST, Method::PUT, Method::PATCH].contains(&self.method) {
            Ok(PayloadKind::Body)
        } else {
            Err(ConfigError::UnsupportedMethod {
                method: self.method.clone(),
                path: self.path.clone(),
            })
        }
    }

    /// Classify a `Responds` return value.
    ///
    /// A new type becomes the route's response type (or, for an error
    /// handler, one of its error-response types); a type already routed to a
    /// response slot is an explicit override of the final payload.
    pub fn respond<T: Responds>(&mut self) -> Result<OutPlan, ConfigError> {
        let role_default = match self.role {
            Role::ErrorHandler => 500,
            _ => 200,
        };
        let status = T::DEFAULT_STATUS.unwrap_or(role_default);
        self.unit_response_status = Some(status);

        if let Some(index) = self.existing::<T>() {
            if self.response_slots.contains(&index) {
                return Ok(OutPlan::Response(index));
            }
            return Ok(OutPlan::Value(index));
        }

        if self.role == Role::ErrorHandler {
            self.doc
                .add_error_response(type_name::<T>(), status, T::STATUS_CODES);
        } else {
            if let Some((id, first)) = self.response {
                if id != TypeId::of::<T>() {
                    return Err(ConfigError::AmbiguousResponse {
                        method: self.method.clone(),
                        path: self.path.clone(),
                        first,
                        second: type_name::<T>(),
                    });
                }
            }
            self.response = Some((TypeId::of::<T>(), type_name::<T>()));
            self.route_default_status = Some(status);
            self.doc
                .add_response(type_name::<T>(), status, T::STATUS_CODES);
        }

        let index = self.new_slot::<T>();
        self.response_slots.push(index);
        self.emitters.push((
            index,
            Box::new(move |ctx: &CallContext| match ctx.slot_get::<T>(index) {
                Some(cell) => serde_json::to_value(&*cell.borrow()),
                None => Ok(serde_json::Value::Null),
            }),
        ));
        Ok(OutPlan::Response(index))
    }

    pub(crate) fn err_after_cannot_fail(&self) -> ConfigError {
        ConfigError::AfterCannotFail {
            method: self.method.clone(),
            path: self.path.clone(),
        }
    }

    /// Default status the unit just classified resolved for itself, if any.
    pub(crate) fn take_unit_response_status(&mut self) -> Option<u16> {
        self.unit_response_status.take()
    }

    pub(crate) fn finish(self) -> (usize, Vec<(usize, Emitter)>, Endpoint, Status) {
        let default_status = Status(self.route_default_status.unwrap_or(200));
        (self.values, self.emitters, self.doc, default_status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_indices_are_stable_per_type() {
        let mut insp = Inspector::new(Method::GET, "/pets/{id}");
        let a = insp.slot_for::<String>();
        let b = insp.slot_for::<u32>();
        assert_eq!(insp.slot_for::<String>(), a);
        assert_ne!(a, b);
    }

    #[test]
    fn second_body_type_is_ambiguous() {
        let mut insp = Inspector::new(Method::POST, "/pets");
        insp.claim_body::<String>().unwrap();
        // same type: shared state, same slot
        assert!(insp.claim_body::<String>().is_ok());
        let err = insp.claim_body::<u32>().unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousBody { .. }));
    }

    #[test]
    fn path_params_follow_the_pattern() {
        let mut insp = Inspector::new(Method::GET, "/shop/{name}/items/{id}");
        assert_eq!(insp.next_path_param("string", true).unwrap(), "name");
        assert_eq!(insp.next_path_param("integer", true).unwrap(), "id");
        let err = insp.next_path_param("string", true).unwrap_err();
        assert!(matches!(err, ConfigError::TooManyPathParams { .. }));
    }

    #[test]
    fn method_inference_rejects_unroutable_methods() {
        let insp = Inspector::new(Method::GET, "/x");
        assert_eq!(insp.payload_kind().unwrap(), PayloadKind::Query);
        let insp = Inspector::new(Method::POST, "/x");
        assert_eq!(insp.payload_kind().unwrap(), PayloadKind::Body);
        let insp = Inspector::new(Method::CONNECT, "/x");
        assert!(insp.payload_kind().is_err());
    }
}
