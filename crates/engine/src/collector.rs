//! Reduction of a store scan into per-floc shard state
//!
//! A scan of the shard-state namespace is folded into a
//! [`PersistedShardStates`] value: which guid each instance is persisted
//! under, and every persisted state grouped by floc and shard.

use shardreg_core::error::Result;
use shardreg_core::types::{Floc, RecordGuid, Shard, ShardInstance, ShardState};
use shardreg_storage::StateStore;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Everything one scan of the shard-state namespace found
#[derive(Debug, Default)]
pub struct PersistedShardStates {
    /// Every record seen, decodable or not
    pub records: Vec<(RecordGuid, Option<ShardInstance>)>,
    /// Guid each instance is persisted under
    pub guids: HashMap<ShardInstance, RecordGuid>,
    /// Persisted states grouped by floc, then shard
    pub indexes: HashMap<Floc, HashMap<Shard, HashMap<ShardInstance, ShardState>>>,
}

impl PersistedShardStates {
    /// Scan `namespace` and fold every record into a new collection
    pub fn scan(store: &dyn StateStore, namespace: &str) -> Result<Self> {
        let mut collected = Self::default();
        store.scan(namespace, &mut |_, key, value| {
            collected.accept(key.guid.clone(), value);
            true
        })?;
        debug!(
            namespace,
            records = collected.records.len(),
            flocs = collected.indexes.len(),
            "Scanned persisted shard states"
        );
        Ok(collected)
    }

    fn accept(&mut self, guid: RecordGuid, value: &[u8]) {
        let state = match ShardState::from_bytes(value) {
            Ok(state) => state,
            Err(e) => {
                warn!(guid = %guid, error = %e, "Undecodable shard state record");
                self.records.push((guid, None));
                return;
            }
        };

        let instance = state.shard_instance.clone();
        self.records.push((guid.clone(), Some(instance.clone())));
        self.guids.insert(instance.clone(), guid);
        self.indexes
            .entry(instance.floc().clone())
            .or_default()
            .entry(instance.shard.clone())
            .or_default()
            .insert(instance, state);
    }

    /// Flocs with at least one persisted state
    pub fn flocs(&self) -> impl Iterator<Item = &Floc> {
        self.indexes.keys()
    }

    /// Every persisted state belonging to `floc`
    pub fn states_for<'a>(&'a self, floc: &Floc) -> impl Iterator<Item = &'a ShardState> + 'a {
        self.indexes
            .get(floc)
            .into_iter()
            .flat_map(|shards| shards.values())
            .flat_map(|instances| instances.values())
    }
}
