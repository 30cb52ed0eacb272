//! Validation gateway port.
//!
//! The resource model never interprets JSON Schema itself. Property writes
//! and action inputs are checked through an injected [`SchemaValidator`];
//! adapters provide real implementations.

use serde_json::Value as Json;

use crate::error::InvalidJson;

/// Validates a JSON value against a JSON Schema document.
pub trait SchemaValidator: Send + Sync {
    /// Check `value` against `schema`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidJson`] carrying the validator's message when the
    /// value does not satisfy the schema.
    fn validate(&self, value: &Json, schema: &Json) -> Result<(), InvalidJson>;
}

impl<F> SchemaValidator for F
where
    F: Fn(&Json, &Json) -> Result<(), InvalidJson> + Send + Sync,
{
    fn validate(&self, value: &Json, schema: &Json) -> Result<(), InvalidJson> {
        self(value, schema)
    }
}

/// Accepts every value. Used when no gateway is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl SchemaValidator for AcceptAll {
    fn validate(&self, _value: &Json, _schema: &Json) -> Result<(), InvalidJson> {
        Ok(())
    }
}
