//! Storage layer for the shard registry
//!
//! This crate provides the collaborators the registry sits on:
//! - [`StateStore`]: durable, namespace-scannable record store
//! - [`InMemoryStateStore`]: sharded in-memory store for tests and embedding
//! - [`FileStateStore`]: one checksummed file per record
//! - [`Cache`] / [`ConcurrentCache`]: in-memory caches in front of the store

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod file;
pub mod format;
pub mod memory;
pub mod store;

pub use cache::{Cache, ConcurrentCache};
pub use file::FileStateStore;
pub use memory::InMemoryStateStore;
pub use store::{ScanCallback, StateStore};
