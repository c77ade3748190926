//! Convenient imports for Shardreg.
//!
//! ```
//! use shardreg::prelude::*;
//!
//! let registry = ShardRegistry::in_memory(RegistryConfig::default())?;
//! assert!(registry.known_flocs().is_empty());
//! # Ok::<(), shardreg::Error>(())
//! ```

// Main entry point
pub use crate::{RegistryConfig, ShardRegistry, ShardRegistryBuilder};

// Error handling
pub use crate::error::{Error, Result};

// Data model
pub use crate::types::{Floc, Shard, ShardInstance, ShardState, StoreRef};

// Time
pub use crate::{Clock, SystemClock};
