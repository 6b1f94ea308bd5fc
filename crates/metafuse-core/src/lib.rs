//! # metafuse-core
//!
//! Core types and traits for metafuse, the metadata-to-virtual-filesystem
//! projection engine.
//!
//! An upstream writer persists per-file properties in a shared key-value
//! store and appends every mutation to an ordered change log. metafuse
//! consumes that log and projects the files into an organized, read-only
//! virtual filesystem. This crate holds the pieces every other crate agrees
//! on:
//!
//! - **Store access**: the [`MetaStore`] trait for point GETs, set members,
//!   prefix scan, and ordered stream reads
//! - **Change notifications**: the [`StateObserver`] trait connecting the
//!   event consumer to the projection
//! - **Event log**: [`StreamEntry`], [`StreamBatch`], [`EventId`]
//! - **Metadata**: [`FileMetadata`], the typed view over a file's raw
//!   string properties, with derived name/extension/kind
//! - **Errors**: [`Error`], [`StoreError`], [`RuleError`]
//!
//! ## Related Crates
//!
//! - `metafuse-store`: Redis and in-memory `MetaStore` implementations
//! - `metafuse-rules`: rename rules, templates, property extraction
//! - `metafuse-state`: event-log consumption and per-file property state
//! - `metafuse-vfs`: the projected directory tree and its indices
//! - `metafuse-api`: the HTTP query surface

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result, RuleError, StoreError};
pub use traits::*;
pub use types::*;
