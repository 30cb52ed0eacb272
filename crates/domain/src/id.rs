//! Identifier generation for things and actions.
//!
//! Ids are plain strings on the wire. Generation goes through an injected
//! [`IdGenerator`] so tests can pin the ids a thing hands out.

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of fresh identifiers.
pub trait IdGenerator: Send + Sync {
    /// Produce the next identifier.
    fn next_id(&self) -> String;
}

/// Random UUID v4 identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Always hands out the same identifier.
#[derive(Debug, Clone)]
pub struct FixedId(String);

impl FixedId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl IdGenerator for FixedId {
    fn next_id(&self) -> String {
        self.0.clone()
    }
}

/// `<prefix>-1`, `<prefix>-2`, … in call order.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIds {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{n}", self.prefix)
    }
}
