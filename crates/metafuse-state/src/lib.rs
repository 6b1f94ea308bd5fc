//! # metafuse-state
//!
//! The event-processing side of metafuse.
//!
//! - [`StateBuilder`]: applies one log entry at a time: key parsing,
//!   relevance filtering, lazy value fetches, per-file property maps, and
//!   completeness notifications
//! - [`StateService`]: the long-running loop around the builder:
//!   bootstrap from position zero, blocking live tail from the handoff
//!   cursor, and rule-triggered refreshes that rebuild property state
//!   without ever emptying the projection
//!
//! Exactly one task mutates the builder and (through it) the projection;
//! everything the API reads is a consistent prefix of the applied log.

pub mod builder;
pub mod service;

pub use builder::{StateBuilder, StateStats};
pub use service::{spawn, StateService, StateServiceConfig};
