//! File-backed state store
//!
//! Layout on disk:
//!
//! ```text
//! <root>/
//!   <namespace>/
//!     <guid>.rec     one record, see [`crate::format`]
//! ```
//!
//! Writes go to `<guid>.rec.tmp` and are renamed into place, so a reader
//! never observes a half-written record. A corrupt record file is logged and
//! still visited by scans, with record id 0 and an empty payload, so callers
//! can see and delete it.

use crate::format::{decode_record, encode_record};
use crate::store::{ScanCallback, StateStore};
use parking_lot::Mutex;
use shardreg_core::error::{Error, Result};
use shardreg_core::types::{RecordGuid, RecordId, RecordKey};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

const RECORD_EXTENSION: &str = "rec";

/// Durable implementation of [`StateStore`] with one file per record
pub struct FileStateStore {
    root: PathBuf,
    next_id: AtomicU64,
    /// fsync each record before the rename
    sync_writes: bool,
    /// Serializes put/delete so record id assignment is race-free
    write_lock: Mutex<()>,
}

impl FileStateStore {
    /// Open (or create) a store rooted at `root`
    ///
    /// Existing records are scanned once to recover the record id counter.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let max_id = recover_max_id(&root)?;
        debug!(root = %root.display(), max_id, "Opened file state store");

        Ok(Self {
            root,
            next_id: AtomicU64::new(max_id + 1),
            sync_writes: true,
            write_lock: Mutex::new(()),
        })
    }

    /// Skip fsync on writes (tests and throwaway deployments)
    pub fn without_sync(mut self) -> Self {
        self.sync_writes = false;
        self
    }

    /// Root directory of this store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn namespace_dir(&self, namespace: &str) -> Result<PathBuf> {
        check_path_component(namespace)?;
        Ok(self.root.join(namespace))
    }

    fn record_path(&self, key: &RecordKey) -> Result<PathBuf> {
        check_path_component(key.guid.as_str())?;
        Ok(self
            .namespace_dir(&key.namespace)?
            .join(format!("{}.{}", key.guid, RECORD_EXTENSION)))
    }
}

impl StateStore for FileStateStore {
    fn put(&self, key: &RecordKey, value: &[u8]) -> Result<RecordId> {
        let path = self.record_path(key)?;
        let _guard = self.write_lock.lock();

        let id = match fs::read(&path) {
            Ok(bytes) => match decode_record(&bytes) {
                Ok((id, _)) => id,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Overwriting corrupt record");
                    self.next_id.fetch_add(1, Ordering::Relaxed)
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.next_id.fetch_add(1, Ordering::Relaxed)
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let tmp = path.with_extension(format!("{}.tmp", RECORD_EXTENSION));
        let mut file = File::create(&tmp)?;
        file.write_all(&encode_record(id, value)?)?;
        if self.sync_writes {
            file.sync_all()?;
        }
        drop(file);
        fs::rename(&tmp, &path)?;
        Ok(id)
    }

    fn scan(&self, namespace: &str, callback: &mut ScanCallback<'_>) -> Result<()> {
        let dir = self.namespace_dir(namespace)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let path = entry?.path();
            let Some(guid) = record_guid(&path) else {
                continue;
            };

            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                // Deleted between read_dir and read.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            let (id, payload) = match decode_record(&bytes) {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Corrupt record, visiting with empty payload");
                    (0, Vec::new())
                }
            };
            let key = RecordKey::new(namespace, guid);
            if !callback(id, &key, &payload) {
                break;
            }
        }
        Ok(())
    }

    fn delete(&self, key: &RecordKey) -> Result<bool> {
        let path = self.record_path(key)?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn check_path_component(component: &str) -> Result<()> {
    if component.is_empty()
        || component == "."
        || component == ".."
        || component.contains(['/', '\\'])
    {
        return Err(Error::InvalidInput(format!(
            "{:?} cannot be used as a store path component",
            component
        )));
    }
    Ok(())
}

fn record_guid(path: &Path) -> Option<RecordGuid> {
    if path.extension()? != RECORD_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    Some(RecordGuid::from_string(stem))
}

fn recover_max_id(root: &Path) -> Result<RecordId> {
    let mut max_id = 0;
    for namespace in fs::read_dir(root)? {
        let namespace = namespace?;
        if !namespace.file_type()?.is_dir() {
            continue;
        }
        for entry in fs::read_dir(namespace.path())? {
            let path = entry?.path();
            if record_guid(&path).is_none() {
                continue;
            }
            if let Ok((id, _)) = decode_record(&fs::read(&path)?) {
                max_id = max_id.max(id);
            }
        }
    }
    Ok(max_id)
}
