//! Registry configuration
//!
//! Every field has a default, so an empty TOML document is a valid config:
//!
//! ```toml
//! instance_timeout_secs = 300
//! max_allowed_replica_tx_count_difference = 1000
//! purge_on_startup = false
//! # selection_seed = 123
//!
//! [retry]
//! max_attempts = 5
//! initial_backoff_ms = 10
//! max_backoff_ms = 500
//! ```

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use shardreg_concurrency::RetryPolicy;
use std::path::Path;
use std::time::Duration;

/// Default age after which a reported state is treated as dead
pub const DEFAULT_INSTANCE_TIMEOUT_SECS: u64 = 300;

/// Default tolerated replica lag, in transaction ids
pub const DEFAULT_MAX_REPLICA_TX_DIFFERENCE: u64 = 1000;

/// Tunables for [`crate::ShardRegistry`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Reports older than this are ignored when building a slice
    pub instance_timeout_secs: u64,

    /// A replica stays eligible while it lags the freshest replica of its
    /// shard by at most this many transaction ids
    pub max_allowed_replica_tx_count_difference: u64,

    /// Purge every persisted record when the registry is built
    pub purge_on_startup: bool,

    /// Seed for replica tie-breaking
    ///
    /// `Some` makes replica choice reproducible across restarts. `None`
    /// seeds from OS entropy so load spreads differently per process.
    pub selection_seed: Option<u64>,

    /// Retry policy for the default executor
    pub retry: RetryPolicy,
}

impl RegistryConfig {
    /// Parse a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: RegistryConfig = toml::from_str(s)
            .map_err(|e| RegistryError::Configuration(format!("invalid registry config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RegistryError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject values that would make the registry unusable
    pub fn validate(&self) -> Result<()> {
        if self.instance_timeout_secs == 0 {
            return Err(RegistryError::Configuration(
                "instance_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.instance_timeout_secs > i64::MAX as u64 / 1000 {
            return Err(RegistryError::Configuration(format!(
                "instance_timeout_secs {} is out of range",
                self.instance_timeout_secs
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(RegistryError::Configuration(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Instance timeout as a duration
    pub fn instance_timeout(&self) -> Duration {
        Duration::from_secs(self.instance_timeout_secs)
    }

    pub(crate) fn instance_timeout_millis(&self) -> i64 {
        (self.instance_timeout_secs as i64).saturating_mul(1000)
    }

    /// Set the instance timeout
    pub fn with_instance_timeout_secs(mut self, secs: u64) -> Self {
        self.instance_timeout_secs = secs;
        self
    }

    /// Set the tolerated replica lag
    pub fn with_max_replica_tx_difference(mut self, difference: u64) -> Self {
        self.max_allowed_replica_tx_count_difference = difference;
        self
    }

    /// Purge persisted records on build
    pub fn with_purge_on_startup(mut self, purge: bool) -> Self {
        self.purge_on_startup = purge;
        self
    }

    /// Fix the replica selection seed
    pub fn with_selection_seed(mut self, seed: u64) -> Self {
        self.selection_seed = Some(seed);
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            instance_timeout_secs: DEFAULT_INSTANCE_TIMEOUT_SECS,
            max_allowed_replica_tx_count_difference: DEFAULT_MAX_REPLICA_TX_DIFFERENCE,
            purge_on_startup: false,
            selection_seed: None,
            retry: RetryPolicy::default(),
        }
    }
}
