//! Time and timestamp helpers.
//!
//! Time is read through an injected [`Clock`] so that action and event
//! timestamps can be made deterministic per thing.

use chrono::{DateTime, SecondsFormat, Utc};

/// UTC timestamp used for `timeRequested`, `timeCompleted` and event times.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Format a timestamp the way it appears on the wire,
/// e.g. `2023-02-17T01:23:45.000+00:00`.
#[must_use]
pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        now()
    }
}

/// A clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(Timestamp);

impl FixedClock {
    #[must_use]
    pub fn new(ts: Timestamp) -> Self {
        Self(ts)
    }

    /// Parse an RFC 3339 timestamp such as `2023-02-17T01:23:45.000+00:00`.
    ///
    /// # Errors
    ///
    /// Returns the chrono parse error when `text` is not RFC 3339.
    pub fn parse(text: &str) -> Result<Self, chrono::ParseError> {
        DateTime::parse_from_rfc3339(text).map(|ts| Self(ts.with_timezone(&Utc)))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.0
    }
}
