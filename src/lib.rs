//! # Shardreg
//!
//! Shard registry for distributed search indexes.
//!
//! Shard instances report how far they have indexed; readers ask for one
//! healthy, sufficiently fresh replica per shard of the best index covering
//! a set of content stores.
//!
//! ## Quick Start
//!
//! ```
//! use shardreg::prelude::*;
//! use std::collections::BTreeSet;
//!
//! let registry = ShardRegistry::in_memory(RegistryConfig::default())?;
//!
//! let store = StoreRef::new("workspace", "SpacesStore");
//! let floc = Floc::new([store.clone()], 2);
//! let now = SystemClock.now_millis();
//!
//! for shard in 0..2 {
//!     let instance = ShardInstance::new(floc.shard(shard), "solr-1", 8983, format!("/solr/shard-{}", shard));
//!     registry.register_shard_state(&ShardState::new(instance, 1_000, now))?;
//! }
//!
//! let slice = registry.get_index_slice(&BTreeSet::from([store]))?;
//! assert_eq!(slice.len(), 2);
//! # Ok::<(), shardreg::Error>(())
//! ```
//!
//! ## Guarantees
//!
//! Every instance in a slice reported within the instance timeout and lags
//! the freshest replica of its shard by at most the configured transaction
//! difference. Consistency across shards is best effort.

#![warn(missing_docs)]

mod error;
mod types;

pub mod prelude;

// Re-export main entry points
pub use error::{Error, Result};
pub use shardreg_engine::{
    selection, Clock, ManualClock, PurgeFailure, RegistryConfig, RegistryMetrics, ShardRegistry,
    ShardRegistryBuilder, SystemClock, SHARD_STATE_NAMESPACE,
};

// Collaborators
pub use shardreg_concurrency::{RetryPolicy, RetryingExecutor, TransactionRunner};
pub use shardreg_storage::{Cache, ConcurrentCache, FileStateStore, InMemoryStateStore, StateStore};

// Re-export types
pub use types::*;
