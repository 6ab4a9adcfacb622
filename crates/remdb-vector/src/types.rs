//! Tuning parameters and result types for the HNSW index (§4.5).

use remdb_core::id::Id;

/// `M=16`, `ef_construction=200`, `ef_search` default 64, per §4.5. Exposed
/// as constructor parameters (not hardcoded) so a schema can override them,
/// per the "tiered-index parameters are starting points only" resolution in
/// the design ledger.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VectorIndexConfig {
    pub max_connections: usize,
    pub ef_construction: usize,
    pub ef_search_default: usize,
    pub max_layers: usize,
    pub capacity_hint: usize,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        VectorIndexConfig {
            max_connections: 16,
            ef_construction: 200,
            ef_search_default: 64,
            max_layers: 16,
            capacity_hint: 10_000,
        }
    }
}

/// One `search` result: the entity id and its distance (ascending = closer).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchHit {
    pub id: Id,
    pub score: f32,
}
