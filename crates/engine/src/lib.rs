//! Shard registry engine
//!
//! This crate implements the registry proper:
//! - [`ShardRegistry`]: registration, slice selection, purge
//! - [`selection`]: floc scoring and replica admission
//! - [`KnownFlocs`]: discovered index groups
//! - [`RegistryConfig`]: timeouts, lag tolerance, retry policy
//! - [`RegistryError`]: the error taxonomy callers see

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod collector;
pub mod config;
pub mod error;
pub mod known_flocs;
pub mod registry;
pub mod selection;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RegistryConfig, DEFAULT_INSTANCE_TIMEOUT_SECS, DEFAULT_MAX_REPLICA_TX_DIFFERENCE};
pub use error::{PurgeFailure, RegistryError, Result};
pub use known_flocs::KnownFlocs;
pub use registry::{
    GuidCache, RegistryMetrics, ShardRegistry, ShardRegistryBuilder, StateCache,
    SHARD_STATE_NAMESPACE,
};
