//! Schema adapter error types.

use webthing_domain::error::InvalidJson;

/// Errors specific to the schema adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// The metadata could not be compiled as a JSON Schema.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// The value does not satisfy the schema.
    #[error("{0}")]
    Rejected(String),
}

impl SchemaError {
    /// Convert into an [`InvalidJson`] for propagation across the
    /// validation port.
    #[must_use]
    pub fn into_domain(self) -> InvalidJson {
        match self {
            Self::Rejected(message) => InvalidJson::new(message),
            other => InvalidJson::new(other.to_string()),
        }
    }
}

impl From<SchemaError> for InvalidJson {
    fn from(err: SchemaError) -> Self {
        err.into_domain()
    }
}
