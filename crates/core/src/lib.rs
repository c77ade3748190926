//! Core types for the shard registry
//!
//! This crate defines the data model shared by every layer:
//! - Flocs, shards, shard instances, and their reported states
//! - Record addressing for the durable store
//! - Store and codec errors

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    Floc, RecordGuid, RecordId, RecordKey, Shard, ShardInstance, ShardState, StoreRef,
};
