//! # metafuse-store
//!
//! [`MetaStore`](metafuse_core::MetaStore) implementations:
//!
//! - [`RedisStore`]: the production adapter, speaking GET / SMEMBERS /
//!   SCAN / XRANGE / XREAD against the shared store the writer populates
//! - [`MemoryStore`]: an in-memory keyspace plus event log for tests
//!
//! Both are read-only with respect to the real keyspace; metafuse never
//! writes back. The memory store's `append_*` helpers exist so tests can
//! play the writer's role.

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;
