//! Hot (recent, in-memory HNSW) + cold (historical, immutable segment)
//! split with merged top-k search (§4.5a).
//!
//! The cold tier reuses [`VectorIndex`] rather than a second ANN
//! implementation: once a segment is frozen it is never upserted into
//! again, so a brute-force-capable HNSW graph searched read-only behaves
//! like the "immutable segment" §4.5a describes without a second crate.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use remdb_core::error::CResult;
use remdb_core::id::Id;

use crate::index::VectorIndex;
use crate::types::{SearchHit, VectorIndexConfig};

pub struct TieredIndex {
    hot: RwLock<Arc<VectorIndex>>,
    cold: RwLock<Arc<VectorIndex>>,
}

impl TieredIndex {
    pub fn new(config: VectorIndexConfig) -> Self {
        TieredIndex { hot: RwLock::new(Arc::new(VectorIndex::new(config))), cold: RwLock::new(Arc::new(VectorIndex::new(config))) }
    }

    pub fn upsert_hot(&self, id: Id, vector: Vec<f32>) -> CResult<()> {
        self.hot.read().upsert(id, vector)
    }

    pub fn remove_hot(&self, id: Id) -> CResult<bool> {
        self.hot.read().remove(id)
    }

    /// Atomically swaps in a freshly rebuilt hot index (§4.5a: "a background
    /// task periodically rebuilds the hot index from the time range and
    /// atomically swaps it"). Readers already holding the old `Arc` finish
    /// against it; new reads see `rebuilt` from this call onward.
    pub fn swap_hot(&self, rebuilt: VectorIndex) {
        *self.hot.write() = Arc::new(rebuilt);
    }

    /// Replaces the cold segment wholesale (e.g. after a new window of
    /// history ages out of the hot tier and is folded into it).
    pub fn swap_cold(&self, rebuilt: VectorIndex) {
        *self.cold.write() = Arc::new(rebuilt);
    }

    pub fn hot(&self) -> Arc<VectorIndex> {
        self.hot.read().clone()
    }

    pub fn cold(&self) -> Arc<VectorIndex> {
        self.cold.read().clone()
    }

    /// Searches both tiers for up to `k` candidates each, merges by
    /// ascending score (ties by id), and truncates to `k`. The result is
    /// always a subset of the union of both tiers' top-2k, satisfying
    /// §4.5a's correctness contract regardless of how the two tiers'
    /// candidate sets overlap.
    pub fn search(&self, query: &[f32], k: usize, ef_search: usize) -> CResult<Vec<SearchHit>> {
        let hot = self.hot();
        let cold = self.cold();
        let mut combined = hot.search(query, k, ef_search)?;
        combined.extend(cold.search(query, k, ef_search)?);
        combined.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal).then(a.id.cmp(&b.id)));

        let mut seen = HashSet::new();
        combined.retain(|hit| seen.insert(hit.id));
        combined.truncate(k);
        Ok(combined)
    }
}
