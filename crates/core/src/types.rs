//! Core types for the shard registry
//!
//! This module defines the data model tracked by the registry:
//! - [`StoreRef`]: Reference to a content store indexed by a floc
//! - [`Floc`]: A complete sharded index over a set of stores
//! - [`Shard`]: One partition (by ordinal) of a floc
//! - [`ShardInstance`]: A running replica hosting a shard
//! - [`ShardState`]: The latest freshness snapshot reported by an instance
//! - [`RecordGuid`] / [`RecordKey`]: Addressing for persisted records
//!
//! Every type here has value identity: two registrations describing the same
//! store set and shard count resolve to the same [`Floc`], and so on down the
//! hierarchy.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Reference to a content store, e.g. `workspace://SpacesStore`
///
/// # Examples
///
/// ```
/// use shardreg_core::types::StoreRef;
///
/// let store: StoreRef = "workspace://SpacesStore".parse().unwrap();
/// assert_eq!(store.protocol, "workspace");
/// assert_eq!(store.identifier, "SpacesStore");
/// assert_eq!(store.to_string(), "workspace://SpacesStore");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreRef {
    /// Store protocol (e.g. `workspace`, `archive`)
    pub protocol: String,
    /// Store identifier within the protocol
    pub identifier: String,
}

impl StoreRef {
    /// Create a new store reference
    pub fn new(protocol: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for StoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.identifier)
    }
}

impl FromStr for StoreRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once("://") {
            Some((protocol, identifier)) if !protocol.is_empty() && !identifier.is_empty() => {
                Ok(StoreRef::new(protocol, identifier))
            }
            _ => Err(Error::InvalidInput(format!(
                "store reference must look like protocol://identifier, got {:?}",
                s
            ))),
        }
    }
}

/// A logical, complete sharded index over a set of content stores
///
/// Identity is by value: the store set plus the shard count. The store set is
/// ordered so equality and hashing never depend on insertion order.
///
/// # Examples
///
/// ```
/// use shardreg_core::types::{Floc, StoreRef};
///
/// let a = Floc::new([StoreRef::new("workspace", "SpacesStore"), StoreRef::new("archive", "SpacesStore")], 4);
/// let b = Floc::new([StoreRef::new("archive", "SpacesStore"), StoreRef::new("workspace", "SpacesStore")], 4);
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Floc {
    /// Stores covered by this index
    pub store_refs: BTreeSet<StoreRef>,
    /// Total number of shards the index is split into
    pub number_of_shards: u32,
}

impl Floc {
    /// Create a new floc
    pub fn new(store_refs: impl IntoIterator<Item = StoreRef>, number_of_shards: u32) -> Self {
        Self {
            store_refs: store_refs.into_iter().collect(),
            number_of_shards,
        }
    }

    /// True if this floc covers every requested store
    ///
    /// An empty constraint set matches every floc.
    pub fn matches(&self, constraints: &BTreeSet<StoreRef>) -> bool {
        constraints.is_subset(&self.store_refs)
    }

    /// Shard handle for the given ordinal
    pub fn shard(&self, instance: u32) -> Shard {
        Shard {
            floc: self.clone(),
            instance,
        }
    }
}

impl fmt::Display for Floc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stores: Vec<String> = self.store_refs.iter().map(ToString::to_string).collect();
        write!(f, "[{}]x{}", stores.join(","), self.number_of_shards)
    }
}

/// One partition of a floc, identified by ordinal
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Shard {
    /// Owning floc
    pub floc: Floc,
    /// Shard ordinal in `0..floc.number_of_shards`
    pub instance: u32,
}

impl fmt::Display for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.floc, self.instance)
    }
}

/// A physical replica hosting one shard
///
/// Identity is the shard plus the full address. Several instances may host
/// the same shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardInstance {
    /// Hosted shard
    pub shard: Shard,
    /// Host name or address
    pub host: String,
    /// Listening port
    pub port: u16,
    /// Base URL path of the core serving this shard
    pub base_url: String,
}

impl ShardInstance {
    /// Create a new shard instance
    pub fn new(shard: Shard, host: impl Into<String>, port: u16, base_url: impl Into<String>) -> Self {
        Self {
            shard,
            host: host.into(),
            port,
            base_url: base_url.into(),
        }
    }

    /// Owning floc of the hosted shard
    pub fn floc(&self) -> &Floc {
        &self.shard.floc
    }
}

impl fmt::Display for ShardInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}{} ({})", self.host, self.port, self.base_url, self.shard)
    }
}

/// Freshness snapshot reported by one shard instance
///
/// Each report wholly replaces the previous one for the same instance; there
/// is no merging and no history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardState {
    /// Reporting instance
    pub shard_instance: ShardInstance,
    /// Last transaction id indexed by the instance (monotonic)
    pub last_indexed_tx_id: u64,
    /// Commit time of that transaction, epoch millis
    pub last_indexed_tx_commit_time: i64,
    /// When the instance sent this report, epoch millis
    pub last_updated: i64,
    /// Instance-reported metadata, carried verbatim
    pub properties: BTreeMap<String, String>,
}

impl ShardState {
    /// Create a state with no extra properties
    pub fn new(shard_instance: ShardInstance, last_indexed_tx_id: u64, last_updated: i64) -> Self {
        Self {
            shard_instance,
            last_indexed_tx_id,
            last_indexed_tx_commit_time: 0,
            last_updated,
            properties: BTreeMap::new(),
        }
    }

    /// Set the commit time of the last indexed transaction
    pub fn with_commit_time(mut self, commit_time: i64) -> Self {
        self.last_indexed_tx_commit_time = commit_time;
        self
    }

    /// Attach an instance-reported property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Check that the reporting instance addresses a real shard
    ///
    /// The floc must have at least one shard and the ordinal must be below
    /// its shard count.
    pub fn validate(&self) -> Result<()> {
        let shard = &self.shard_instance.shard;
        if shard.floc.number_of_shards == 0 {
            return Err(Error::InvalidInput(format!(
                "floc {} declares no shards",
                shard.floc
            )));
        }
        if shard.instance >= shard.floc.number_of_shards {
            return Err(Error::InvalidInput(format!(
                "shard ordinal {} is out of range for {}",
                shard.instance, shard.floc
            )));
        }
        Ok(())
    }

    /// Age of this report relative to `now`, in millis
    ///
    /// Negative if the reporter's clock is ahead of ours.
    pub fn age_millis(&self, now: i64) -> i64 {
        now - self.last_updated
    }

    /// Serialize for persistence
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Deserialize a persisted state
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::SerializationError(e.to_string()))
    }
}

/// Stable identifier of the persisted record for one shard instance
///
/// Generated once, on first persistence, and reused for the lifetime of the
/// instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordGuid(String);

impl RecordGuid {
    /// Generate a fresh random guid (UUID v4)
    ///
    /// # Examples
    ///
    /// ```
    /// use shardreg_core::types::RecordGuid;
    ///
    /// assert_ne!(RecordGuid::generate(), RecordGuid::generate());
    /// ```
    pub fn generate() -> Self {
        RecordGuid(Uuid::new_v4().to_string())
    }

    /// Wrap an existing guid string
    pub fn from_string(guid: impl Into<String>) -> Self {
        RecordGuid(guid.into())
    }

    /// Borrow the guid as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric id assigned to a record by the store
pub type RecordId = u64;

/// Full address of a persisted record: fixed namespace plus guid
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    /// Namespace constant shared by all records of one kind
    pub namespace: String,
    /// Per-record identifier
    pub guid: RecordGuid,
}

impl RecordKey {
    /// Create a new record key
    pub fn new(namespace: impl Into<String>, guid: RecordGuid) -> Self {
        Self {
            namespace: namespace.into(),
            guid,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.guid)
    }
}
