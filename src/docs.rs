//! Registration-time documentation metadata.
//!
//! The core feeds type and path metadata into these structures while it
//! inspects signatures; rendering (OpenAPI JSON/YAML, interactive HTML) is
//! owned by an external collaborator and never consulted at request time.
//! Everything here is serializable so a renderer can consume it as-is.

use std::collections::BTreeMap;

use http::Method;
use serde::Serialize;

/// Metadata for one registered endpoint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Endpoint {
    pub tags: Vec<String>,
    pub path_params: Vec<PathParamDoc>,
    pub body_type: Option<String>,
    pub query_type: Option<String>,
    pub header_types: Vec<String>,
    pub responses: Vec<ResponseDoc>,
    pub error_responses: Vec<ResponseDoc>,
}

/// A named, typed path parameter.
#[derive(Debug, Clone, Serialize)]
pub struct PathParamDoc {
    pub name: String,
    pub kind: &'static str,
    pub required: bool,
}

/// A response payload type with its default status and any extra documented
/// status classes (e.g. "4XX").
#[derive(Debug, Clone, Serialize)]
pub struct ResponseDoc {
    pub type_name: String,
    pub status: u16,
    pub extra_codes: Vec<String>,
}

impl Endpoint {
    /// Seed the endpoint with tags derived from the path's literal segments.
    pub(crate) fn new(path: &str) -> Self {
        let tags = path
            .split('/')
            .filter(|word| !word.is_empty() && !word.contains('{'))
            .map(str::to_string)
            .collect();
        Endpoint {
            tags,
            ..Endpoint::default()
        }
    }

    pub(crate) fn add_path_param(&mut self, name: &str, kind: &'static str, required: bool) {
        if self.path_params.iter().any(|p| p.name == name) {
            return;
        }
        self.path_params.push(PathParamDoc {
            name: name.to_string(),
            kind,
            required,
        });
    }

    pub(crate) fn set_body_type(&mut self, type_name: &str) {
        self.body_type = Some(type_name.to_string());
    }

    pub(crate) fn set_query_type(&mut self, type_name: &str) {
        self.query_type = Some(type_name.to_string());
    }

    pub(crate) fn add_header_type(&mut self, type_name: &str) {
        let name = type_name.to_string();
        if !self.header_types.contains(&name) {
            self.header_types.push(name);
        }
    }

    pub(crate) fn add_response(&mut self, type_name: &str, status: u16, codes: &[&str]) {
        self.responses.push(ResponseDoc {
            type_name: type_name.to_string(),
            status,
            extra_codes: codes.iter().map(|c| (*c).to_string()).collect(),
        });
    }

    pub(crate) fn add_error_response(&mut self, type_name: &str, status: u16, codes: &[&str]) {
        if self.error_responses.iter().any(|r| r.type_name == type_name) {
            return;
        }
        self.error_responses.push(ResponseDoc {
            type_name: type_name.to_string(),
            status,
            extra_codes: codes.iter().map(|c| (*c).to_string()).collect(),
        });
    }
}

/// Documentation collected for every registered route, keyed by path then
/// method. Populated at registration time only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Docs {
    paths: BTreeMap<String, BTreeMap<String, Endpoint>>,
}

impl Docs {
    pub(crate) fn set_path(&mut self, path: &str, method: &Method, endpoint: Endpoint) {
        self.paths
            .entry(path.to_string())
            .or_default()
            .insert(method.as_str().to_string(), endpoint);
    }

    #[must_use]
    pub fn endpoint(&self, method: &Method, path: &str) -> Option<&Endpoint> {
        self.paths.get(path)?.get(method.as_str())
    }

    #[must_use]
    pub fn paths(&self) -> &BTreeMap<String, BTreeMap<String, Endpoint>> {
        &self.paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_come_from_literal_path_segments() {
        let endpoint = Endpoint::new("/shop/{name}/items");
        assert_eq!(endpoint.tags, vec!["shop", "items"]);
    }

    #[test]
    fn path_params_are_deduplicated() {
        let mut endpoint = Endpoint::new("/shop/{name}");
        endpoint.add_path_param("name", "string", true);
        endpoint.add_path_param("name", "string", true);
        assert_eq!(endpoint.path_params.len(), 1);
    }
}
