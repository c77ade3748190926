//! Public data model types.
//!
//! Re-exported from the core crate with a flat path.

pub use shardreg_core::{
    Floc, RecordGuid, RecordId, RecordKey, Shard, ShardInstance, ShardState, StoreRef,
};
