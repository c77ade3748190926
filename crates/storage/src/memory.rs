//! In-memory state store
//!
//! DashMap keyed by namespace, FxHashMap within.
//!
//! # Design
//!
//! - DashMap: 16-way sharded by default, lock-free reads
//! - FxHashMap: O(1) lookups, fast non-crypto hash
//! - Per-namespace: record kinds never contend with each other
//!
//! Nothing survives a restart. Use [`crate::FileStateStore`] when records
//! must outlive the process.

use crate::store::{ScanCallback, StateStore};
use dashmap::DashMap;
use rustc_hash::FxHashMap;
use shardreg_core::error::Result;
use shardreg_core::types::{RecordGuid, RecordId, RecordKey};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone)]
struct StoredRecord {
    id: RecordId,
    value: Vec<u8>,
}

/// Per-namespace partition
#[derive(Debug, Default)]
struct Partition {
    records: FxHashMap<RecordGuid, StoredRecord>,
}

/// Sharded in-memory implementation of [`StateStore`]
///
/// # Example
///
/// ```
/// use shardreg_core::types::{RecordGuid, RecordKey};
/// use shardreg_storage::{InMemoryStateStore, StateStore};
///
/// let store = InMemoryStateStore::new();
/// let key = RecordKey::new(".SHARD_STATE", RecordGuid::generate());
/// store.put(&key, b"state").unwrap();
/// assert_eq!(store.record_count(".SHARD_STATE").unwrap(), 1);
/// ```
pub struct InMemoryStateStore {
    partitions: DashMap<String, Partition>,
    next_id: AtomicU64,
}

impl InMemoryStateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            partitions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Read a single record's value
    pub fn get(&self, key: &RecordKey) -> Option<Vec<u8>> {
        self.partitions
            .get(&key.namespace)
            .and_then(|p| p.records.get(&key.guid).map(|r| r.value.clone()))
    }

    /// Total records across all namespaces
    pub fn total_records(&self) -> usize {
        self.partitions.iter().map(|p| p.value().records.len()).sum()
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for InMemoryStateStore {
    fn put(&self, key: &RecordKey, value: &[u8]) -> Result<RecordId> {
        let mut partition = self.partitions.entry(key.namespace.clone()).or_default();
        let id = match partition.records.get(&key.guid) {
            Some(existing) => existing.id,
            None => self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        partition.records.insert(
            key.guid.clone(),
            StoredRecord {
                id,
                value: value.to_vec(),
            },
        );
        Ok(id)
    }

    fn scan(&self, namespace: &str, callback: &mut ScanCallback<'_>) -> Result<()> {
        // Copy out under the shard lock so the callback may call back into the store.
        let records: Vec<(RecordGuid, StoredRecord)> = match self.partitions.get(namespace) {
            Some(p) => p
                .records
                .iter()
                .map(|(guid, rec)| (guid.clone(), rec.clone()))
                .collect(),
            None => return Ok(()),
        };

        for (guid, record) in records {
            let key = RecordKey::new(namespace, guid);
            if !callback(record.id, &key, &record.value) {
                break;
            }
        }
        Ok(())
    }

    fn delete(&self, key: &RecordKey) -> Result<bool> {
        Ok(self
            .partitions
            .get_mut(&key.namespace)
            .map(|mut p| p.records.remove(&key.guid).is_some())
            .unwrap_or(false))
    }

    fn record_count(&self, namespace: &str) -> Result<usize> {
        Ok(self
            .partitions
            .get(namespace)
            .map(|p| p.records.len())
            .unwrap_or(0))
    }
}
