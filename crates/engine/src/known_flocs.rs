//! Set of discovered flocs
//!
//! Fed by registrations and by store scans. Grows monotonically; only a
//! purge clears it.

use dashmap::DashSet;
use shardreg_core::types::{Floc, StoreRef};
use std::collections::BTreeSet;

/// Concurrent set of known flocs
#[derive(Debug, Default)]
pub struct KnownFlocs {
    flocs: DashSet<Floc>,
}

impl KnownFlocs {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a floc, returning true if it was new
    pub fn add(&self, floc: Floc) -> bool {
        self.flocs.insert(floc)
    }

    /// Record several flocs
    pub fn extend<I: IntoIterator<Item = Floc>>(&self, flocs: I) {
        for floc in flocs {
            self.flocs.insert(floc);
        }
    }

    /// Known flocs covering every store in `constraints`
    pub fn matching(&self, constraints: &BTreeSet<StoreRef>) -> Vec<Floc> {
        self.flocs
            .iter()
            .filter(|floc| floc.matches(constraints))
            .map(|floc| floc.key().clone())
            .collect()
    }

    /// True if `floc` is known
    pub fn contains(&self, floc: &Floc) -> bool {
        self.flocs.contains(floc)
    }

    /// Snapshot of every known floc
    pub fn snapshot(&self) -> Vec<Floc> {
        self.flocs.iter().map(|floc| floc.key().clone()).collect()
    }

    /// Number of known flocs
    pub fn len(&self) -> usize {
        self.flocs.len()
    }

    /// True if no floc is known
    pub fn is_empty(&self) -> bool {
        self.flocs.is_empty()
    }

    /// Forget every floc
    pub(crate) fn clear(&self) {
        self.flocs.clear();
    }
}
