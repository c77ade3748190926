//! Durable store capability
//!
//! The registry persists one record per shard instance under a fixed
//! namespace. A store only needs to support keyed put/delete and a
//! namespace-wide scan; everything else is built on top.

use shardreg_core::error::Result;
use shardreg_core::types::{RecordId, RecordKey};

/// Callback invoked once per scanned record
///
/// Return `false` to stop the scan early.
pub type ScanCallback<'a> = dyn FnMut(RecordId, &RecordKey, &[u8]) -> bool + 'a;

/// Durable, prefix-scannable key/value store
///
/// # Thread Safety
///
/// Implementations must be safe to share across threads. Individual calls
/// are atomic; sequences of calls are not.
pub trait StateStore: Send + Sync {
    /// Insert or overwrite the record at `key`
    ///
    /// A record keeps its numeric id across overwrites.
    fn put(&self, key: &RecordKey, value: &[u8]) -> Result<RecordId>;

    /// Visit every record in `namespace`
    ///
    /// Records that fail validation are still visited, with an empty
    /// payload, so they can be deleted.
    fn scan(&self, namespace: &str, callback: &mut ScanCallback<'_>) -> Result<()>;

    /// Delete the record at `key`, returning whether it existed
    fn delete(&self, key: &RecordKey) -> Result<bool>;

    /// Number of records in `namespace`
    fn record_count(&self, namespace: &str) -> Result<usize> {
        let mut count = 0;
        self.scan(namespace, &mut |_, _, _| {
            count += 1;
            true
        })?;
        Ok(count)
    }
}
