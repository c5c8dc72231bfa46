//! Named collections of endpoints.

use std::collections::HashSet;
use std::sync::Arc;

use crate::endpoint::Endpoint;
use crate::error::{ProtocolError, ProtocolResult};

/// Insertion-ordered, immutable mapping from endpoint name to definition.
///
/// The name is the join key between server handlers and client call
/// sites. Cloning a registry is cheap.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    endpoints: Arc<Vec<(String, Endpoint)>>,
}

impl Registry {
    /// Starts a new registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Looks up an endpoint by name.
    pub fn get(&self, name: &str) -> Option<&Endpoint> {
        self.endpoints
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, endpoint)| endpoint)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over `(name, endpoint)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Endpoint)> {
        self.endpoints
            .iter()
            .map(|(name, endpoint)| (name.as_str(), endpoint))
    }

    /// Endpoint names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.endpoints.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Builder for [`Registry`]. Validation happens in [`RegistryBuilder::build`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    endpoints: Vec<(String, Endpoint)>,
}

impl RegistryBuilder {
    /// Adds an endpoint under `name`.
    pub fn endpoint(mut self, name: impl Into<String>, endpoint: Endpoint) -> Self {
        self.endpoints.push((name.into(), endpoint));
        self
    }

    /// Validates names and paths and freezes the registry.
    ///
    /// # Errors
    ///
    /// Returns an error on a duplicate name, a path that does not start
    /// with `/`, or trailing path segments not declared as a tuple.
    pub fn build(self) -> ProtocolResult<Registry> {
        let mut seen = HashSet::new();
        for (name, endpoint) in &self.endpoints {
            if !seen.insert(name.as_str()) {
                return Err(ProtocolError::DuplicateEndpoint(name.clone()));
            }
            if !endpoint.path().starts_with('/') {
                return Err(ProtocolError::InvalidPath {
                    name: name.clone(),
                    path: endpoint.path().to_string(),
                });
            }
            if !endpoint.has_tuple_paths() {
                return Err(ProtocolError::InvalidAdditionalPaths { name: name.clone() });
            }
        }
        Ok(Registry {
            endpoints: Arc::new(self.endpoints),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contractkit_core::schema;

    #[test]
    fn keeps_insertion_order() {
        let registry = Registry::builder()
            .endpoint("zeta", Endpoint::get("/z", schema::any()))
            .endpoint("alpha", Endpoint::get("/a", schema::any()))
            .endpoint("mid", Endpoint::post("/m", schema::any()))
            .build()
            .unwrap();
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        assert_eq!(registry.len(), 3);
        assert!(registry.contains("alpha"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = Registry::builder()
            .endpoint("same", Endpoint::get("/a", schema::any()))
            .endpoint("same", Endpoint::get("/b", schema::any()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ProtocolError::DuplicateEndpoint(name) if name == "same"));
    }

    #[test]
    fn relative_paths_are_rejected() {
        let err = Registry::builder()
            .endpoint("rel", Endpoint::get("people", schema::any()))
            .build()
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPath { .. }));
    }

    #[test]
    fn additional_paths_must_be_a_tuple() {
        let err = Registry::builder()
            .endpoint(
                "bad",
                Endpoint::get("/files", schema::any())
                    .with_additional_paths(schema::array(schema::string())),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidAdditionalPaths { name } if name == "bad"));
    }

    #[test]
    fn empty_registry() {
        let registry = Registry::builder().build().unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.iter().count(), 0);
    }
}
