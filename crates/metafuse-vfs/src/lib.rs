//! # metafuse-vfs
//!
//! The in-memory virtual filesystem the rest of the system reads from.
//!
//! [`Vfs`] owns a directory tree rooted at `/` plus three indices
//! (path → node, fileId → path, sourcePath → path) and answers every
//! filesystem query the drivers issue: `readdir`, `getattr`, `exists`,
//! read resolution, metadata snapshots, and enumeration. It implements
//! [`StateObserver`](metafuse_core::StateObserver), so the event task
//! drives all mutations (adds, moves, deletes, empty-parent cleanup)
//! while readers observe a consistent prefix of the applied event log.
//!
//! Nothing here touches file bytes. `read` resolves to the upstream
//! source path (and, when configured, an external share URL) for the
//! caller to fetch.

pub mod paths;
pub mod projection;

pub use projection::{FileAttributes, ReadResolution, Vfs, VfsConfig, VfsStats};
