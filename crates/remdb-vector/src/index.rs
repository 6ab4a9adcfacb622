//! A single HNSW graph for one `(tenant, schema_fqn, field)` (§4.5).
//!
//! `hnsw_rs` has no node-removal API, which is exactly what §4.5's `remove`
//! contract already asks for: "tombstones" rather than deletes. A removed or
//! superseded vector's graph node stays reachable during traversal but is
//! filtered out of every `search` result; `build` is the only way to
//! actually shrink the graph, by throwing it away and reinserting every live
//! vector from scratch.

use std::collections::{BTreeMap, HashMap, HashSet};

use anndists::dist::DistCosine;
use hnsw_rs::prelude::*;
use parking_lot::RwLock;
use remdb_core::error::{CResult, Error};
use remdb_core::id::Id;

use crate::types::{SearchHit, VectorIndexConfig};

struct Inner {
    dim: Option<usize>,
    graph: Hnsw<'static, f32, DistCosine>,
    id_to_graph: HashMap<Id, usize>,
    graph_to_id: HashMap<usize, Id>,
    tombstoned: HashSet<usize>,
    next_graph_id: usize,
    /// The current live vector for every non-tombstoned id, kept around so
    /// `build`/checkpointing never need to reverse-engineer it from the
    /// graph itself.
    live_vectors: BTreeMap<Id, Vec<f32>>,
}

impl Inner {
    fn fresh(config: &VectorIndexConfig) -> Self {
        Inner {
            dim: None,
            graph: Hnsw::new(config.max_connections, config.capacity_hint, config.max_layers, config.ef_construction, DistCosine {}),
            id_to_graph: HashMap::new(),
            graph_to_id: HashMap::new(),
            tombstoned: HashSet::new(),
            next_graph_id: 0,
            live_vectors: BTreeMap::new(),
        }
    }
}

pub struct VectorIndex {
    config: VectorIndexConfig,
    inner: RwLock<Inner>,
}

impl VectorIndex {
    pub fn new(config: VectorIndexConfig) -> Self {
        VectorIndex { inner: RwLock::new(Inner::fresh(&config)), config }
    }

    /// Rebuilds from a checkpoint: every id's last-known-live vector,
    /// without needing to replay the upsert/remove history that produced it
    /// (tombstoned vectors are, by definition, not part of a checkpoint).
    pub fn from_checkpoint(config: VectorIndexConfig, vectors: BTreeMap<Id, Vec<f32>>) -> CResult<Self> {
        let index = VectorIndex::new(config);
        index.rebuild_from(vectors)?;
        Ok(index)
    }

    /// Inserts or replaces `id`'s vector. A prior vector for the same id is
    /// tombstoned, not overwritten in place (§4.5 "old entries... are
    /// tombstoned, kept in graph, skipped on results").
    pub fn upsert(&self, id: Id, vector: Vec<f32>) -> CResult<()> {
        let mut inner = self.inner.write();
        match inner.dim {
            Some(dim) if dim != vector.len() => {
                return Err(Error::vector_dim_mismatch(format!(
                    "index expects {}-dimensional vectors, got {}",
                    dim,
                    vector.len()
                )));
            }
            None => inner.dim = Some(vector.len()),
            _ => {}
        }

        if let Some(old_graph_id) = inner.id_to_graph.remove(&id) {
            inner.tombstoned.insert(old_graph_id);
            inner.graph_to_id.remove(&old_graph_id);
        }

        let graph_id = inner.next_graph_id;
        inner.next_graph_id += 1;
        inner.graph.insert((vector.as_slice(), graph_id));
        inner.id_to_graph.insert(id, graph_id);
        inner.graph_to_id.insert(graph_id, id);
        inner.live_vectors.insert(id, vector);
        Ok(())
    }

    /// Tombstones `id`'s vector. Returns `false` if `id` had no live vector.
    pub fn remove(&self, id: Id) -> CResult<bool> {
        let mut inner = self.inner.write();
        match inner.id_to_graph.remove(&id) {
            Some(graph_id) => {
                inner.tombstoned.insert(graph_id);
                inner.graph_to_id.remove(&graph_id);
                inner.live_vectors.remove(&id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Approximate nearest neighbours of `query`, ascending by distance,
    /// ties broken by id (§4.5). Tombstoned matches are filtered out before
    /// the `k` cut, so the caller always gets up to `k` *live* results.
    pub fn search(&self, query: &[f32], k: usize, ef_search: usize) -> CResult<Vec<SearchHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let inner = self.inner.read();
        if let Some(dim) = inner.dim {
            if dim != query.len() {
                return Err(Error::vector_dim_mismatch(format!(
                    "index expects {}-dimensional query vectors, got {}",
                    dim,
                    query.len()
                )));
            }
        }
        if inner.graph_to_id.is_empty() {
            return Ok(Vec::new());
        }

        // Over-fetch by the tombstone count so filtering still leaves `k`
        // live candidates whenever that many exist.
        let probe_k = (k + inner.tombstoned.len()).max(k);
        let neighbours = inner.graph.search(query, probe_k, ef_search);

        let mut hits: Vec<SearchHit> = neighbours
            .into_iter()
            .filter(|n| !inner.tombstoned.contains(&n.d_id))
            .filter_map(|n| inner.graph_to_id.get(&n.d_id).map(|id| SearchHit { id: *id, score: n.distance }))
            .collect();

        hits.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal).then(a.id.cmp(&b.id)));
        hits.truncate(k);
        Ok(hits)
    }

    /// Rebuilds the graph from scratch from every currently live vector
    /// (§4.5 `build`), dropping tombstoned nodes for good.
    pub fn build(&self) -> CResult<()> {
        let live: BTreeMap<Id, Vec<f32>> = self.inner.read().live_vectors.clone();
        self.rebuild_from(live)
    }

    fn rebuild_from(&self, vectors: BTreeMap<Id, Vec<f32>>) -> CResult<()> {
        let mut fresh = Inner::fresh(&self.config);
        for (id, vector) in vectors {
            if let Some(dim) = fresh.dim {
                if dim != vector.len() {
                    return Err(Error::vector_dim_mismatch(format!(
                        "checkpoint vector for {id} has {} dims, expected {dim}",
                        vector.len()
                    )));
                }
            } else {
                fresh.dim = Some(vector.len());
            }
            let graph_id = fresh.next_graph_id;
            fresh.next_graph_id += 1;
            fresh.graph.insert((vector.as_slice(), graph_id));
            fresh.id_to_graph.insert(id, graph_id);
            fresh.graph_to_id.insert(graph_id, id);
            fresh.live_vectors.insert(id, vector);
        }
        *self.inner.write() = fresh;
        Ok(())
    }

    /// A snapshot suitable for persisting to the `embeddings_meta` CF
    /// (§4.5 "Persistence"): every live vector, keyed by id.
    pub fn snapshot(&self) -> BTreeMap<Id, Vec<f32>> {
        self.inner.read().live_vectors.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().live_vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
