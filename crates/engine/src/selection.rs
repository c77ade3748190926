//! Floc scoring and replica selection
//!
//! Pure functions over a snapshot of candidate replicas; nothing here touches
//! the cache or the store.
//!
//! ```text
//! score(floc)   = Σ_shards max(tx of live replicas in shard) / number_of_shards
//! admitted(s)   = { r in s : max_tx(s) - r.tx <= max_difference }
//! pick(s)       = uniform random choice from admitted(s)
//! ```

use rand::Rng;
use shardreg_core::types::{Floc, ShardInstance, ShardState};
use std::collections::BTreeMap;

/// Live replicas of one floc, keyed by shard ordinal
pub type ShardReplicas = BTreeMap<u32, Vec<ShardState>>;

/// A floc together with its live replicas and score
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The floc
    pub floc: Floc,
    /// Live replicas per shard
    pub replicas: ShardReplicas,
    /// Freshness score, see [`floc_score`]
    pub score: f64,
}

impl Candidate {
    /// Build a candidate and compute its score
    pub fn new(floc: Floc, replicas: ShardReplicas) -> Self {
        let score = floc_score(&floc, &max_tx_per_shard(&replicas));
        Self {
            floc,
            replicas,
            score,
        }
    }

    /// Number of shards with at least one live replica
    pub fn populated_shards(&self) -> usize {
        self.replicas.values().filter(|r| !r.is_empty()).count()
    }
}

/// Highest transaction id among each shard's replicas
pub fn max_tx_per_shard(replicas: &ShardReplicas) -> BTreeMap<u32, u64> {
    replicas
        .iter()
        .filter_map(|(&shard, states)| {
            states
                .iter()
                .map(|s| s.last_indexed_tx_id)
                .max()
                .map(|max| (shard, max))
        })
        .collect()
}

/// Freshness score of a floc given its per-shard maximum transaction ids
///
/// Shards without replicas contribute nothing, so incomplete flocs score
/// lower than complete ones at the same freshness.
pub fn floc_score(floc: &Floc, per_shard_max: &BTreeMap<u32, u64>) -> f64 {
    if floc.number_of_shards == 0 {
        return 0.0;
    }
    let shards = f64::from(floc.number_of_shards);
    per_shard_max.values().map(|&max| max as f64 / shards).sum()
}

/// Replicas lagging the freshest replica by at most `max_difference`
pub fn admit_replicas(states: &[ShardState], max_difference: u64) -> Vec<&ShardState> {
    let Some(max_tx) = states.iter().map(|s| s.last_indexed_tx_id).max() else {
        return Vec::new();
    };
    states
        .iter()
        .filter(|s| max_tx - s.last_indexed_tx_id <= max_difference)
        .collect()
}

/// Sort candidates best first
///
/// The sort is stable, so equal scores keep their input order. Callers feed
/// candidates in set-iteration order, which makes ties arbitrary.
pub fn rank_candidates(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates
}

/// Pick one admitted replica per shard of `candidate`
///
/// Returns the slice ordered by shard ordinal, or the ordinals that had no
/// admissible replica. A floc without shards has no slice and yields an
/// empty list of missing ordinals.
pub fn select_slice<R: Rng + ?Sized>(
    candidate: &Candidate,
    max_difference: u64,
    rng: &mut R,
) -> Result<Vec<ShardInstance>, Vec<u32>> {
    if candidate.floc.number_of_shards == 0 {
        return Err(Vec::new());
    }
    let mut slice = Vec::with_capacity(candidate.floc.number_of_shards as usize);
    let mut missing = Vec::new();

    for ordinal in 0..candidate.floc.number_of_shards {
        let states = candidate
            .replicas
            .get(&ordinal)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let admitted = admit_replicas(states, max_difference);
        if admitted.is_empty() {
            missing.push(ordinal);
            continue;
        }
        let pick = rng.gen_range(0..admitted.len());
        slice.push(admitted[pick].shard_instance.clone());
    }

    if missing.is_empty() {
        Ok(slice)
    } else {
        Err(missing)
    }
}
