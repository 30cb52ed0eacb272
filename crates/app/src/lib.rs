//! # webthing-app
//!
//! Application layer: wiring between things and the clients that follow them.
//!
//! ## Responsibilities
//! - Define the **port** transports publish through: `MessagePublisher`
//! - Provide **in-process infrastructure** that doesn't need IO:
//!   - `InProcessMessageBus`: topic-filtered fan-out of thing messages
//!   - `ActionRunner`: runs accepted actions on blocking tasks
//! - Implement the **subscriber session protocol** (`ThingSession`) that a
//!   WebSocket transport drives frame by frame
//!
//! ## Dependency rule
//! Depends on `webthing-domain` only (plus `tokio` for channels and tasks).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod action_runner;
pub mod message_bus;
pub mod ports;
pub mod session;
