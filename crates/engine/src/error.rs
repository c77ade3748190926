//! Registry error taxonomy
//!
//! Every failure surfaced by [`crate::ShardRegistry`] is one of these
//! variants. "Nothing matched" ([`RegistryError::NoMatchingIndexGroup`]) is
//! kept distinct from "something is broken" (everything else).

use shardreg_concurrency::TransactionError;
use shardreg_core::error::Error as StoreError;
use shardreg_core::types::{Floc, RecordGuid, ShardInstance, StoreRef};
use thiserror::Error;

/// A record that purge could not delete
#[derive(Debug)]
pub struct PurgeFailure {
    /// Guid of the record left behind
    pub guid: RecordGuid,
    /// Instance the record belongs to, if it could be decoded
    pub instance: Option<ShardInstance>,
    /// Why the delete failed
    pub error: TransactionError,
}

/// Errors returned by the shard registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A required collaborator is missing or the configuration is invalid
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A reported state was rejected before anything was written
    #[error("invalid shard state: {0}")]
    InvalidShardState(#[source] StoreError),

    /// A durable write or delete failed after the executor gave up
    ///
    /// The operation had no visible effect.
    #[error("persistence failure during {operation}: {source}")]
    PersistenceFailure {
        /// Operation that failed
        operation: &'static str,
        /// Executor failure
        #[source]
        source: TransactionError,
    },

    /// No known floc covers the requested stores, even after a forced scan
    #[error("no index group covers stores [{}]", join_stores(.stores))]
    NoMatchingIndexGroup {
        /// Requested stores
        stores: Vec<StoreRef>,
    },

    /// The best floc has shards with no live, fresh-enough replica
    #[error("incomplete slice for {floc}: no admissible replica for shards {missing_shards:?}")]
    IncompleteSlice {
        /// Floc that won scoring
        floc: Floc,
        /// Ordinals with zero admissible replicas
        missing_shards: Vec<u32>,
    },

    /// Purge deleted some records but not all
    ///
    /// Deletions that succeeded are final.
    #[error(
        "purge incomplete: {} records could not be deleted, {deleted} records were deleted and stay deleted",
        .failed.len()
    )]
    AggregatePurgeFailure {
        /// Records left behind
        failed: Vec<PurgeFailure>,
        /// Records deleted before and after the failures
        deleted: usize,
    },

    /// Read-side store scan failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl RegistryError {
    /// True for the "nothing matched" outcome
    pub fn is_no_match(&self) -> bool {
        matches!(self, RegistryError::NoMatchingIndexGroup { .. })
    }

    /// True if calling again later may succeed without operator action
    pub fn is_retryable(&self) -> bool {
        match self {
            RegistryError::PersistenceFailure { source, .. } => {
                source.store_error().is_transient()
            }
            RegistryError::Store(e) => e.is_transient(),
            RegistryError::IncompleteSlice { .. } => true,
            _ => false,
        }
    }

    /// Guids of records purge failed to delete
    pub fn failed_guids(&self) -> Vec<&RecordGuid> {
        match self {
            RegistryError::AggregatePurgeFailure { failed, .. } => {
                failed.iter().map(|f| &f.guid).collect()
            }
            _ => Vec::new(),
        }
    }
}

fn join_stores(stores: &[StoreRef]) -> String {
    stores
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
