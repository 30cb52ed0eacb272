//! JSON Schema validation adapter.
//!
//! Implements the domain's [`SchemaValidator`] port with the `jsonschema`
//! crate. Property metadata and action input schemas are compiled once and
//! cached by their serialized form.

pub mod error;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value as Json;

use webthing_domain::error::InvalidJson;
use webthing_domain::validation::SchemaValidator;

pub use error::SchemaError;

/// Validator backed by compiled JSON Schema documents.
#[derive(Default)]
pub struct JsonSchemaValidator {
    compiled: RwLock<HashMap<String, Arc<jsonschema::Validator>>>,
}

impl JsonSchemaValidator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct schemas compiled so far.
    #[must_use]
    pub fn cached_schemas(&self) -> usize {
        self.compiled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn compile(&self, schema: &Json) -> Result<Arc<jsonschema::Validator>, SchemaError> {
        let key = schema.to_string();
        if let Some(found) = self
            .compiled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(found));
        }

        let validator = jsonschema::validator_for(schema)
            .map(Arc::new)
            .map_err(|err| SchemaError::InvalidSchema(err.to_string()))?;
        tracing::debug!(schema = %key, "compiled json schema");
        self.compiled
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&validator));
        Ok(validator)
    }

    /// Check `value` against `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidSchema`] when `schema` does not compile
    /// and [`SchemaError::Rejected`] when `value` does not satisfy it.
    pub fn check(&self, value: &Json, schema: &Json) -> Result<(), SchemaError> {
        let validator = self.compile(schema)?;
        validator
            .validate(value)
            .map_err(|err| SchemaError::Rejected(err.to_string()))
    }
}

impl std::fmt::Debug for JsonSchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonSchemaValidator")
            .field("cached_schemas", &self.cached_schemas())
            .finish()
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, value: &Json, schema: &Json) -> Result<(), InvalidJson> {
        self.check(value, schema).map_err(|err| {
            tracing::debug!(%err, "value rejected by schema");
            err.into_domain()
        })
    }
}
