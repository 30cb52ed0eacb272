//! # webthing-domain
//!
//! Resource model of a Web of Things device.
//!
//! ## Responsibilities
//! - Observed values and typed **Properties** with read-only and schema checks
//! - **Actions** with a `created → pending → completed` lifecycle and
//!   cooperative cancellation
//! - Immutable, timestamped **Events**
//! - Bounded **history storage** for actions and events
//! - The **Thing** aggregate, its descriptions and its notification fan-out
//! - Wire **messages** (`propertyStatus`, `actionStatus`, `event`, `error`)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies** and performs no IO.
//! Time, ids and JSON Schema validation are injected through the [`time::Clock`],
//! [`id::IdGenerator`] and [`validation::SchemaValidator`] traits.

pub mod error;
pub mod id;
pub mod time;
pub mod validation;

pub mod action;
pub mod event;
pub mod message;
pub mod notification;
pub mod property;
pub mod storage;
pub mod thing;
pub mod value;

mod sync;
