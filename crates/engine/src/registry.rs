//! Shard registry
//!
//! Tracks where every shard of every floc lives and how fresh each replica
//! is, and answers "give me one healthy, fresh-enough replica per shard of
//! the best index covering these stores".
//!
//! ## Layers
//!
//! ```text
//!            register_shard_state            get_index_slice
//!                   │                              │
//!   ┌───────────────▼──────────────┐   ┌───────────▼───────────┐
//!   │ retryable transaction        │   │ known flocs (DashSet) │
//!   │  resolve guid → store.put    │   └───────────┬───────────┘
//!   └───────────────┬──────────────┘               │ miss: scan store
//!                   │ committed                    ▼
//!   ┌───────────────▼──────────────┐   ┌───────────────────────┐
//!   │ state cache, known flocs     │──▶│ state cache           │
//!   └──────────────────────────────┘   └───────────┬───────────┘
//!                                                  │ gaps: scan store
//!                                                  ▼
//!                                      score flocs → pick replicas
//! ```
//!
//! ## Consistency
//!
//! No global lock. The caches and the known-floc set are individually
//! thread-safe; compound read-modify-write sequences across them are not
//! atomic. A reader may or may not observe a registration that commits
//! concurrently with its read. Staleness is bounded by policy: reports older
//! than the instance timeout are ignored, and replicas lagging their shard's
//! freshest replica by more than the allowed difference are never picked.

use crate::clock::{Clock, SystemClock};
use crate::collector::PersistedShardStates;
use crate::config::RegistryConfig;
use crate::error::{PurgeFailure, RegistryError, Result};
use crate::known_flocs::KnownFlocs;
use crate::selection::{rank_candidates, select_slice, Candidate, ShardReplicas};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shardreg_concurrency::{RetryingExecutor, TransactionRunner, TransactionRunnerExt};
use shardreg_core::error::Error as StoreError;
use shardreg_core::types::{Floc, RecordGuid, RecordKey, ShardInstance, ShardState, StoreRef};
use shardreg_storage::{Cache, ConcurrentCache, FileStateStore, InMemoryStateStore, StateStore};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Namespace holding one record per shard instance
pub const SHARD_STATE_NAMESPACE: &str = ".SHARD_STATE";

/// Cache of instance → last reported state
pub type StateCache = dyn Cache<ShardInstance, ShardState>;

/// Cache of instance → persisted record guid
pub type GuidCache = dyn Cache<ShardInstance, RecordGuid>;

/// Registry counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryMetrics {
    /// Successful registrations
    pub registrations: u64,
    /// Slices returned to callers
    pub slices_served: u64,
    /// Full scans of the shard-state namespace
    pub store_scans: u64,
    /// Records deleted by purge
    pub purged_records: u64,
}

#[derive(Debug, Default)]
struct Counters {
    registrations: AtomicU64,
    slices_served: AtomicU64,
    store_scans: AtomicU64,
    purged_records: AtomicU64,
}

/// Registry of shard placement and freshness
///
/// # Example
///
/// ```
/// use shardreg_core::types::{Floc, ShardInstance, ShardState, StoreRef};
/// use shardreg_engine::{RegistryConfig, ShardRegistry};
/// use std::collections::BTreeSet;
///
/// let registry = ShardRegistry::in_memory(RegistryConfig::default()).unwrap();
/// let store = StoreRef::new("workspace", "SpacesStore");
/// let floc = Floc::new([store.clone()], 1);
/// let now = chrono::Utc::now().timestamp_millis();
///
/// let instance = ShardInstance::new(floc.shard(0), "solr-1", 8983, "/solr/alfresco");
/// registry.register_shard_state(&ShardState::new(instance.clone(), 42, now)).unwrap();
///
/// let slice = registry.get_index_slice(&BTreeSet::from([store])).unwrap();
/// assert_eq!(slice, vec![instance]);
/// ```
pub struct ShardRegistry {
    store: Arc<dyn StateStore>,
    executor: Arc<dyn TransactionRunner>,
    state_cache: Arc<StateCache>,
    guid_cache: Arc<GuidCache>,
    known_flocs: KnownFlocs,
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    rng: Mutex<StdRng>,
    /// Serializes guid assignment on a cache miss
    guid_lock: Mutex<()>,
    counters: Counters,
}

impl ShardRegistry {
    /// Create a builder
    pub fn builder() -> ShardRegistryBuilder {
        ShardRegistryBuilder::new()
    }

    /// Registry over a fresh in-memory store
    pub fn in_memory(config: RegistryConfig) -> Result<Self> {
        let executor = RetryingExecutor::new(config.retry.clone());
        Self::builder()
            .store(Arc::new(InMemoryStateStore::new()))
            .executor(Arc::new(executor))
            .config(config)
            .build()
    }

    /// Registry over a file-backed store rooted at `path`
    pub fn open(path: impl AsRef<Path>, config: RegistryConfig) -> Result<Self> {
        let store = FileStateStore::open(path)?;
        let executor = RetryingExecutor::new(config.retry.clone());
        Self::builder()
            .store(Arc::new(store))
            .executor(Arc::new(executor))
            .config(config)
            .build()
    }

    /// Active configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Snapshot of every known floc
    pub fn known_flocs(&self) -> Vec<Floc> {
        self.known_flocs.snapshot()
    }

    /// Snapshot of the counters
    pub fn metrics(&self) -> RegistryMetrics {
        RegistryMetrics {
            registrations: self.counters.registrations.load(Ordering::Relaxed),
            slices_served: self.counters.slices_served.load(Ordering::Relaxed),
            store_scans: self.counters.store_scans.load(Ordering::Relaxed),
            purged_records: self.counters.purged_records.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Record the latest state reported by a shard instance
    ///
    /// The durable write runs inside a retryable transaction. The state cache
    /// and the known-floc set are only updated after it commits, so a
    /// [`RegistryError::PersistenceFailure`] leaves no visible trace. The
    /// one exception is the guid cache: a guid assigned during a failed
    /// attempt stays cached and is reused by the next registration.
    /// Re-registering identical state is a no-op in effect.
    ///
    /// A state for a floc without shards, or for an ordinal outside the
    /// floc, fails with [`RegistryError::InvalidShardState`] and is never
    /// written.
    pub fn register_shard_state(&self, state: &ShardState) -> Result<()> {
        state.validate().map_err(RegistryError::InvalidShardState)?;
        let value = state.to_bytes()?;
        let instance = &state.shard_instance;

        self.executor
            .run_in_transaction("register_shard_state", || {
                let guid = self.resolve_guid(instance)?;
                self.store
                    .put(&RecordKey::new(SHARD_STATE_NAMESPACE, guid), &value)?;
                Ok(())
            })
            .map_err(|source| RegistryError::PersistenceFailure {
                operation: "register_shard_state",
                source,
            })?;

        self.state_cache.put(instance.clone(), state.clone());
        self.known_flocs.add(instance.floc().clone());
        self.counters.registrations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Guid the instance's record is (or will be) stored under
    ///
    /// Cache hit → reuse. Miss → scan the store once and backfill every
    /// instance not yet cached. Still missing → generate and cache a new one.
    fn resolve_guid(&self, instance: &ShardInstance) -> std::result::Result<RecordGuid, StoreError> {
        if let Some(guid) = self.guid_cache.get(instance) {
            return Ok(guid);
        }

        let _guard = self.guid_lock.lock();
        // Another registration may have assigned it while we waited.
        if let Some(guid) = self.guid_cache.get(instance) {
            return Ok(guid);
        }

        let persisted = self.scan_persisted()?;
        for (known, guid) in persisted.guids {
            if !self.guid_cache.contains(&known) {
                self.guid_cache.put(known, guid);
            }
        }
        if let Some(guid) = self.guid_cache.get(instance) {
            return Ok(guid);
        }

        let guid = RecordGuid::generate();
        debug!(instance = %instance, guid = %guid, "Assigned record guid");
        self.guid_cache.put(instance.clone(), guid.clone());
        Ok(guid)
    }

    // ========================================================================
    // Slice selection
    // ========================================================================

    /// One live, fresh-enough replica per shard of the best floc covering
    /// `constraints`
    ///
    /// The returned instances are ordered by shard ordinal. Performs at most
    /// two store scans: one to discover flocs when none is known, one to
    /// repair cache gaps.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NoMatchingIndexGroup`] if no floc covers the stores
    ///   even after rescanning the store
    /// - [`RegistryError::IncompleteSlice`] if the winning floc has a shard
    ///   with no admissible replica
    pub fn get_index_slice(&self, constraints: &BTreeSet<StoreRef>) -> Result<Vec<ShardInstance>> {
        let mut flocs = self.servable_flocs(constraints);
        if flocs.is_empty() {
            debug!("No known floc matches, rescanning store");
            self.scan_persisted()?;
            flocs = self.servable_flocs(constraints);
        }
        if flocs.is_empty() {
            return Err(RegistryError::NoMatchingIndexGroup {
                stores: constraints.iter().cloned().collect(),
            });
        }

        let now = self.clock.now_millis();
        let mut persisted: Option<PersistedShardStates> = None;
        let mut candidates = Vec::with_capacity(flocs.len());
        for floc in flocs {
            let mut replicas = self.replicas_from_cache(&floc, now);
            if replicas.len() < floc.number_of_shards as usize {
                if persisted.is_none() {
                    persisted = Some(self.scan_persisted()?);
                }
                if let Some(persisted) = &persisted {
                    self.refresh_state_cache(&floc, persisted);
                }
                replicas = self.replicas_from_cache(&floc, now);
            }
            candidates.push(Candidate::new(floc, replicas));
        }

        let Some(best) = rank_candidates(candidates).into_iter().next() else {
            return Err(RegistryError::NoMatchingIndexGroup {
                stores: constraints.iter().cloned().collect(),
            });
        };

        let selected = {
            let mut rng = self.rng.lock();
            select_slice(
                &best,
                self.config.max_allowed_replica_tx_count_difference,
                &mut *rng,
            )
        };

        match selected {
            Ok(slice) => {
                self.counters.slices_served.fetch_add(1, Ordering::Relaxed);
                Ok(slice)
            }
            Err(missing_shards) => {
                warn!(
                    floc = %best.floc,
                    missing = ?missing_shards,
                    "Best floc has shards without an admissible replica"
                );
                Err(RegistryError::IncompleteSlice {
                    floc: best.floc,
                    missing_shards,
                })
            }
        }
    }

    /// Known flocs covering `constraints` that can yield a non-empty slice
    fn servable_flocs(&self, constraints: &BTreeSet<StoreRef>) -> Vec<Floc> {
        let mut flocs = self.known_flocs.matching(constraints);
        flocs.retain(|floc| floc.number_of_shards > 0);
        flocs
    }

    /// Live cached replicas of `floc`, keyed by shard ordinal
    fn replicas_from_cache(&self, floc: &Floc, now: i64) -> ShardReplicas {
        let timeout = self.config.instance_timeout_millis();
        let mut replicas = ShardReplicas::new();
        let mut stale = 0usize;

        for instance in self.state_cache.keys() {
            if instance.floc() != floc || instance.shard.instance >= floc.number_of_shards {
                continue;
            }
            // Evicted or purged since keys() was taken.
            let Some(state) = self.state_cache.get(&instance) else {
                continue;
            };
            if state.age_millis(now) > timeout {
                stale += 1;
                continue;
            }
            replicas
                .entry(instance.shard.instance)
                .or_default()
                .push(state);
        }

        for states in replicas.values_mut() {
            states.sort_by(|a, b| a.shard_instance.cmp(&b.shard_instance));
        }
        if stale > 0 {
            debug!(floc = %floc, stale, "Ignoring timed-out shard instances");
        }
        replicas
    }

    /// Copy the persisted states of `floc` into the state cache
    ///
    /// A cached state newer than the persisted one is kept.
    fn refresh_state_cache(&self, floc: &Floc, persisted: &PersistedShardStates) {
        let mut refreshed = 0usize;
        for state in persisted.states_for(floc) {
            let instance = &state.shard_instance;
            let newer_cached = self
                .state_cache
                .get(instance)
                .map(|cached| cached.last_updated > state.last_updated)
                .unwrap_or(false);
            if !newer_cached {
                self.state_cache.put(instance.clone(), state.clone());
                refreshed += 1;
            }
        }
        debug!(floc = %floc, refreshed, "Refreshed shard state cache from store");
    }

    /// Scan the store and learn every floc it mentions
    fn scan_persisted(&self) -> std::result::Result<PersistedShardStates, StoreError> {
        self.counters.store_scans.fetch_add(1, Ordering::Relaxed);
        let persisted = PersistedShardStates::scan(self.store.as_ref(), SHARD_STATE_NAMESPACE)?;
        self.known_flocs.extend(persisted.flocs().cloned());
        Ok(persisted)
    }

    // ========================================================================
    // Purge
    // ========================================================================

    /// Delete every persisted shard-state record
    ///
    /// Each delete runs in its own retryable transaction; a failure does not
    /// roll back deletes that already committed. Cache entries of deleted
    /// records are dropped. The known-floc set is reset to the flocs of the
    /// records left behind.
    ///
    /// # Errors
    ///
    /// [`RegistryError::AggregatePurgeFailure`] listing the records left
    /// behind. Every other record is gone for good.
    pub fn purge(&self) -> Result<()> {
        let persisted = self.scan_persisted()?;
        let total = persisted.records.len();
        let mut deleted = 0usize;
        let mut failed = Vec::new();

        for (guid, instance) in persisted.records {
            let key = RecordKey::new(SHARD_STATE_NAMESPACE, guid.clone());
            match self
                .executor
                .run_in_transaction("purge_shard_state", || self.store.delete(&key))
            {
                Ok(_) => {
                    deleted += 1;
                    if let Some(instance) = &instance {
                        self.state_cache.remove(instance);
                        self.guid_cache.remove(instance);
                    }
                }
                Err(error) => failed.push(PurgeFailure {
                    guid,
                    instance,
                    error,
                }),
            }
        }

        // Flocs of records left behind are still in the store.
        self.known_flocs.clear();
        self.known_flocs.extend(
            failed
                .iter()
                .filter_map(|f| f.instance.as_ref().map(|i| i.floc().clone())),
        );
        self.counters
            .purged_records
            .fetch_add(deleted as u64, Ordering::Relaxed);

        if failed.is_empty() {
            // Nothing persisted remains, so nothing cached may outlive it.
            self.state_cache.clear();
            self.guid_cache.clear();
            info!(deleted, "Purged shard state records");
            Ok(())
        } else {
            warn!(
                deleted,
                failed = failed.len(),
                total,
                "Purge left shard state records behind"
            );
            Err(RegistryError::AggregatePurgeFailure { failed, deleted })
        }
    }
}

/// Builder for [`ShardRegistry`]
///
/// The store and the executor are required; caches default to
/// [`ConcurrentCache`], the clock to [`SystemClock`].
#[derive(Default)]
pub struct ShardRegistryBuilder {
    store: Option<Arc<dyn StateStore>>,
    executor: Option<Arc<dyn TransactionRunner>>,
    state_cache: Option<Arc<StateCache>>,
    guid_cache: Option<Arc<GuidCache>>,
    clock: Option<Arc<dyn Clock>>,
    config: RegistryConfig,
}

impl ShardRegistryBuilder {
    /// Create a builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Durable store (required)
    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Transaction executor (required)
    pub fn executor(mut self, executor: Arc<dyn TransactionRunner>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Instance → state cache
    pub fn state_cache(mut self, cache: Arc<StateCache>) -> Self {
        self.state_cache = Some(cache);
        self
    }

    /// Instance → guid cache
    pub fn guid_cache(mut self, cache: Arc<GuidCache>) -> Self {
        self.guid_cache = Some(cache);
        self
    }

    /// Time source for staleness checks
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Registry configuration
    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate and build, purging first if configured to
    pub fn build(self) -> Result<ShardRegistry> {
        let store = self
            .store
            .ok_or_else(|| RegistryError::Configuration("no state store configured".into()))?;
        let executor = self.executor.ok_or_else(|| {
            RegistryError::Configuration("no transaction executor configured".into())
        })?;
        self.config.validate()?;

        let rng = match self.config.selection_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let state_cache: Arc<StateCache> = match self.state_cache {
            Some(cache) => cache,
            None => Arc::new(ConcurrentCache::<ShardInstance, ShardState>::new()),
        };
        let guid_cache: Arc<GuidCache> = match self.guid_cache {
            Some(cache) => cache,
            None => Arc::new(ConcurrentCache::<ShardInstance, RecordGuid>::new()),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };

        let registry = ShardRegistry {
            store,
            executor,
            state_cache,
            guid_cache,
            known_flocs: KnownFlocs::new(),
            clock,
            rng: Mutex::new(rng),
            guid_lock: Mutex::new(()),
            counters: Counters::default(),
            config: self.config,
        };

        if registry.config.purge_on_startup {
            info!("Purging shard state on startup");
            registry.purge()?;
        }
        Ok(registry)
    }
}
