//! Bidirectional edge storage and BFS traversal (§4.6 "Graph Store").
//!
//! Grounded on `maskdotdev-sombra`'s `Graph::delete_node` (collect every
//! incident edge, then remove each one through the same path `remove_edge`
//! uses) for the shape of "collect, then mutate one at a time", and on
//! `forest-rs-execution`'s `access.rs` for treating a node id as an opaque,
//! `Copy` key with no structure of its own. Neither file implements BFS
//! itself; `traverse` below is a standard visited-set breadth-first walk
//! with the ordering and bound §4.6 requires.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use remdb_core::error::{CResult, Error};
use remdb_core::id::Id;
use remdb_core::tenant::{TenantId, TENANT_SEPARATOR};
use remdb_core::value::Value;
use remdb_kv::batch::WriteBatch;
use remdb_kv::cf::ColumnFamily;
use remdb_kv::store::TenantStore;
use remdb_wal::{WalOp, WalSequencer};

use crate::keys::{anchor_prefix, edge_key, split_label_and_other};
use crate::types::{Direction, Edge, TraversalStep};

/// Edges are never expanded past this many distinct nodes in one `traverse`
/// call unless the caller asks for a smaller bound; §4.6's default.
pub const DEFAULT_MAX_NODES: usize = 10_000;

pub struct GraphStore {
    store: Arc<TenantStore>,
    wal: Arc<WalSequencer>,
}

impl GraphStore {
    pub fn new(store: Arc<TenantStore>, wal: Arc<WalSequencer>) -> Self {
        GraphStore { store, wal }
    }

    /// Writes `src --label--> dst` (and its mirror in `edges_rev`) in one
    /// batch. Self-edges are allowed. Writing the exact same `(src, label,
    /// dst, props)` tuple again is a no-op; writing the same triple with
    /// different `props` overwrites the property map on both sides — the
    /// key layout gives a `(src, label, dst)` triple exactly one live row,
    /// so "parallel edges with different properties" (§3) means "this
    /// triple's properties changed," not a second row.
    pub fn add_edge(&self, src: Id, label: &str, dst: Id, props: BTreeMap<String, Value>) -> CResult<()> {
        let tenant = self.store.tenant();
        let fwd_key = edge_key(tenant, ColumnFamily::EdgesFwd, src, label, dst);
        let existing = self.store.get(ColumnFamily::EdgesFwd, &fwd_key)?;
        let encoded = serde_json::to_vec(&props)?;
        if existing.as_deref() == Some(encoded.as_slice()) {
            return Ok(());
        }

        let rev_key = edge_key(tenant, ColumnFamily::EdgesRev, dst, label, src);
        let mut batch = WriteBatch::new();
        batch.put(ColumnFamily::EdgesFwd, fwd_key, encoded.clone());
        batch.put(ColumnFamily::EdgesRev, rev_key, encoded);
        let payload = edge_payload(src, label, dst, &props);
        self.wal.append_to_batch(&mut batch, WalOp::PutEdge, serde_json::to_vec(&payload)?)?;
        self.store.commit(batch)
    }

    /// Removes `src --label--> dst` from both directions. A no-op if the
    /// edge doesn't exist.
    pub fn remove_edge(&self, src: Id, label: &str, dst: Id) -> CResult<bool> {
        let tenant = self.store.tenant();
        let fwd_key = edge_key(tenant, ColumnFamily::EdgesFwd, src, label, dst);
        if self.store.get(ColumnFamily::EdgesFwd, &fwd_key)?.is_none() {
            return Ok(false);
        }
        let rev_key = edge_key(tenant, ColumnFamily::EdgesRev, dst, label, src);

        let mut batch = WriteBatch::new();
        batch.delete(ColumnFamily::EdgesFwd, fwd_key);
        batch.delete(ColumnFamily::EdgesRev, rev_key);
        let payload = edge_endpoints_payload(src, label, dst);
        self.wal.append_to_batch(&mut batch, WalOp::DeleteEdge, serde_json::to_vec(&payload)?)?;
        self.store.commit(batch)?;
        Ok(true)
    }

    /// Removes every edge touching `id`, in either direction. Used by a
    /// caller cascading an entity delete (§3 "Deletion is explicit; cascades
    /// to edges adjacent to the entity"); this crate doesn't call it itself,
    /// matching the facade-mediated cascade already established for
    /// `remdb-entity::EntityStore::delete`.
    pub fn remove_all_incident(&self, id: Id) -> CResult<Vec<Edge>> {
        let mut removed = Vec::new();
        for edge in self.neighbor_edges(id, Direction::Out)? {
            if self.remove_edge(edge.src, &edge.label, edge.dst)? {
                removed.push(edge);
            }
        }
        for edge in self.neighbor_edges(id, Direction::In)? {
            if self.remove_edge(edge.src, &edge.label, edge.dst)? {
                removed.push(edge);
            }
        }
        Ok(removed)
    }

    /// Prefix-scans `id`'s edges in `direction`, optionally restricted to
    /// `labels`, returning the full `Edge` rows.
    pub fn neighbors(&self, id: Id, direction: Direction, labels: Option<&[String]>) -> CResult<Vec<Edge>> {
        let mut edges = self.neighbor_edges(id, direction)?;
        if let Some(labels) = labels {
            edges.retain(|e| labels.iter().any(|l| l == &e.label));
        }
        Ok(edges)
    }

    fn neighbor_edges(&self, id: Id, direction: Direction) -> CResult<Vec<Edge>> {
        let mut edges = Vec::new();
        if matches!(direction, Direction::Out | Direction::Both) {
            edges.extend(self.scan_direction(id, ColumnFamily::EdgesFwd, true)?);
        }
        if matches!(direction, Direction::In | Direction::Both) {
            edges.extend(self.scan_direction(id, ColumnFamily::EdgesRev, false)?);
        }
        Ok(edges)
    }

    /// `is_forward` picks which end of the decoded `(label, other)` pair is
    /// `src` and which is `dst`: in `edges_fwd`, `id` is the anchor (`src`)
    /// and `other` is `dst`; in `edges_rev`, `id` is the anchor (`dst`) and
    /// `other` is `src`.
    fn scan_direction(&self, id: Id, cf: ColumnFamily, is_forward: bool) -> CResult<Vec<Edge>> {
        let prefix = anchor_prefix(self.store.tenant(), cf, id);
        let rows = self.store.scan_prefix(cf, &prefix)?;
        let mut edges = Vec::with_capacity(rows.len());
        for (key, value) in rows {
            let (label, other) = split_label_and_other(&key[prefix.len()..])?;
            let props: BTreeMap<String, Value> = serde_json::from_slice(&value)?;
            let (src, dst) = if is_forward { (id, other) } else { (other, id) };
            edges.push(Edge { src, label, dst, props });
        }
        Ok(edges)
    }

    /// Breadth-first walk from `start`, visiting at most `max_nodes` distinct
    /// ids (§4.6 default 10,000). At each depth, candidate neighbours across
    /// every node in the current frontier are pooled and ordered by `(label
    /// asc, neighbour-id asc)` before being visited, so the result is
    /// deterministic regardless of KV scan order. A neighbour already
    /// visited — including `start` itself, reached again via a cycle — is
    /// skipped rather than re-queued.
    pub fn traverse(
        &self,
        start: Id,
        max_depth: u32,
        labels: Option<&[String]>,
        direction: Direction,
        max_nodes: usize,
    ) -> CResult<Vec<TraversalStep>> {
        let mut visited = HashSet::new();
        visited.insert(start);
        let mut results = vec![TraversalStep { id: start, depth: 0, path: vec![start] }];
        let mut frontier = vec![(start, vec![start])];
        let mut depth = 0u32;

        while depth < max_depth && !frontier.is_empty() && visited.len() < max_nodes {
            let mut candidates: Vec<(String, Id, Vec<Id>)> = Vec::new();
            for (node, path) in &frontier {
                for edge in self.neighbors(*node, direction, labels)? {
                    let neighbor = if edge.src == *node { edge.dst } else { edge.src };
                    let mut next_path = path.clone();
                    next_path.push(neighbor);
                    candidates.push((edge.label, neighbor, next_path));
                }
            }
            candidates.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

            let mut next_frontier = Vec::new();
            for (_, neighbor, path) in candidates {
                if visited.len() >= max_nodes {
                    break;
                }
                if !visited.insert(neighbor) {
                    continue;
                }
                results.push(TraversalStep { id: neighbor, depth: depth + 1, path: path.clone() });
                next_frontier.push((neighbor, path));
            }
            frontier = next_frontier;
            depth += 1;
        }
        Ok(results)
    }

    /// Rebuilds `edges_rev` from `edges_fwd`, or vice versa, restoring the
    /// "mutually consistent" invariant (§4.6) after an out-of-band repair.
    pub fn reindex(&self, source: ColumnFamily) -> CResult<u64> {
        let (source, target) = match source {
            ColumnFamily::EdgesFwd => (ColumnFamily::EdgesFwd, ColumnFamily::EdgesRev),
            ColumnFamily::EdgesRev => (ColumnFamily::EdgesRev, ColumnFamily::EdgesFwd),
            other => return Err(remdb_core::error::Error::internal(format!("{other} is not an edge column family"))),
        };
        let cf_prefix = remdb_core::keys::compose(self.store.tenant(), &[source.file_stem().as_bytes()]);
        let rows = self.store.scan_prefix(source, &cf_prefix)?;

        let mut batch = WriteBatch::new();
        let mut rebuilt = 0u64;
        for (key, value) in rows {
            let after_cf = key[cf_prefix.len()..]
                .strip_prefix(&[TENANT_SEPARATOR])
                .ok_or_else(|| Error::corruption("edge row key missing separator after column family"))?;
            if after_cf.len() < 16 {
                return Err(Error::corruption("edge row key too short to hold an anchor id"));
            }
            let (anchor_bytes, rest) = after_cf.split_at(16);
            let mut anchor = [0u8; 16];
            anchor.copy_from_slice(anchor_bytes);
            let anchor = Id(anchor);
            let (label, other) = split_label_and_other(rest)?;
            let mirrored = edge_key(self.store.tenant(), target, other, &label, anchor);
            batch.put(target, mirrored, value);
            rebuilt += 1;
        }
        self.store.commit(batch)?;
        Ok(rebuilt)
    }
}

fn edge_payload(src: Id, label: &str, dst: Id, props: &BTreeMap<String, Value>) -> Value {
    let mut map = edge_endpoints_map(src, label, dst);
    map.insert("props".to_string(), Value::Object(props.clone()));
    Value::Object(map)
}

fn edge_endpoints_payload(src: Id, label: &str, dst: Id) -> Value {
    Value::Object(edge_endpoints_map(src, label, dst))
}

fn edge_endpoints_map(src: Id, label: &str, dst: Id) -> BTreeMap<String, Value> {
    let mut map = BTreeMap::new();
    map.insert("src".to_string(), Value::String(src.to_hex()));
    map.insert("label".to_string(), Value::String(label.to_string()));
    map.insert("dst".to_string(), Value::String(dst.to_hex()));
    map
}

#[cfg(test)]
mod test {
    use super::*;

    fn setup() -> GraphStore {
        let tenant = TenantId::new("acme").unwrap();
        let store = Arc::new(TenantStore::open_in_memory(tenant.clone()));
        let wal = Arc::new(WalSequencer::new(tenant, 1));
        GraphStore::new(store, wal)
    }

    fn id(seed: &str) -> Id {
        Id::from_canonical_bytes(seed.as_bytes())
    }

    #[test]
    fn add_edge_is_visible_from_both_directions() {
        let graph = setup();
        let (a, b) = (id("a"), id("b"));
        graph.add_edge(a, "knows", b, BTreeMap::new()).unwrap();

        let out = graph.neighbors(a, Direction::Out, None).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].dst, b);

        let inbound = graph.neighbors(b, Direction::In, None).unwrap();
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].src, a);
    }

    #[test]
    fn exact_duplicate_add_edge_is_a_no_op() {
        let graph = setup();
        let (a, b) = (id("a"), id("b"));
        graph.add_edge(a, "knows", b, BTreeMap::new()).unwrap();
        let next_seq_before = graph.wal.peek_next();
        graph.add_edge(a, "knows", b, BTreeMap::new()).unwrap();
        assert_eq!(graph.wal.peek_next(), next_seq_before);
    }

    #[test]
    fn same_triple_different_props_overwrites_not_duplicates() {
        let graph = setup();
        let (a, b) = (id("a"), id("b"));
        let mut props = BTreeMap::new();
        props.insert("weight".to_string(), Value::Number(1.0));
        graph.add_edge(a, "knows", b, BTreeMap::new()).unwrap();
        graph.add_edge(a, "knows", b, props.clone()).unwrap();

        let out = graph.neighbors(a, Direction::Out, None).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].props, props);
    }

    #[test]
    fn self_edges_are_allowed() {
        let graph = setup();
        let a = id("a");
        graph.add_edge(a, "self_ref", a, BTreeMap::new()).unwrap();
        let out = graph.neighbors(a, Direction::Out, None).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].dst, a);
    }

    #[test]
    fn remove_edge_clears_both_directions() {
        let graph = setup();
        let (a, b) = (id("a"), id("b"));
        graph.add_edge(a, "knows", b, BTreeMap::new()).unwrap();
        assert!(graph.remove_edge(a, "knows", b).unwrap());
        assert!(graph.neighbors(a, Direction::Out, None).unwrap().is_empty());
        assert!(graph.neighbors(b, Direction::In, None).unwrap().is_empty());
    }

    #[test]
    fn remove_edge_on_a_missing_edge_is_a_no_op() {
        let graph = setup();
        let (a, b) = (id("a"), id("b"));
        assert!(!graph.remove_edge(a, "knows", b).unwrap());
    }

    #[test]
    fn label_filter_narrows_neighbors() {
        let graph = setup();
        let (a, b, c) = (id("a"), id("b"), id("c"));
        graph.add_edge(a, "knows", b, BTreeMap::new()).unwrap();
        graph.add_edge(a, "blocks", c, BTreeMap::new()).unwrap();

        let knows_only = graph.neighbors(a, Direction::Out, Some(&["knows".to_string()])).unwrap();
        assert_eq!(knows_only.len(), 1);
        assert_eq!(knows_only[0].dst, b);
    }

    #[test]
    fn traverse_respects_max_depth() {
        let graph = setup();
        let (a, b, c) = (id("a"), id("b"), id("c"));
        graph.add_edge(a, "next", b, BTreeMap::new()).unwrap();
        graph.add_edge(b, "next", c, BTreeMap::new()).unwrap();

        let one_hop = graph.traverse(a, 1, None, Direction::Out, DEFAULT_MAX_NODES).unwrap();
        let reached: Vec<Id> = one_hop.iter().map(|s| s.id).collect();
        assert!(reached.contains(&b));
        assert!(!reached.contains(&c));

        let two_hops = graph.traverse(a, 2, None, Direction::Out, DEFAULT_MAX_NODES).unwrap();
        let reached: Vec<Id> = two_hops.iter().map(|s| s.id).collect();
        assert!(reached.contains(&c));
    }

    #[test]
    fn traverse_skips_cycles_instead_of_looping_forever() {
        let graph = setup();
        let (a, b) = (id("a"), id("b"));
        graph.add_edge(a, "next", b, BTreeMap::new()).unwrap();
        graph.add_edge(b, "next", a, BTreeMap::new()).unwrap();

        let steps = graph.traverse(a, 5, None, Direction::Out, DEFAULT_MAX_NODES).unwrap();
        let ids: Vec<Id> = steps.iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a) && ids.contains(&b));
    }

    #[test]
    fn traverse_bounds_visited_set_by_max_nodes() {
        let graph = setup();
        let hub = id("hub");
        let leaves: Vec<Id> = (0..5).map(|i| id(&format!("leaf{i}"))).collect();
        for leaf in &leaves {
            graph.add_edge(hub, "has", *leaf, BTreeMap::new()).unwrap();
        }

        let steps = graph.traverse(hub, 3, None, Direction::Out, 3).unwrap();
        assert!(steps.len() <= 3);
    }

    #[test]
    fn reindex_rebuilds_reverse_from_forward() {
        let graph = setup();
        let (a, b) = (id("a"), id("b"));
        graph.add_edge(a, "knows", b, BTreeMap::new()).unwrap();

        let tenant = graph.store.tenant().clone();
        let rev_key = edge_key(&tenant, ColumnFamily::EdgesRev, b, "knows", a);
        graph.store.delete(ColumnFamily::EdgesRev, &rev_key).unwrap();
        assert!(graph.neighbors(b, Direction::In, None).unwrap().is_empty());

        let rebuilt = graph.reindex(ColumnFamily::EdgesFwd).unwrap();
        assert_eq!(rebuilt, 1);
        assert_eq!(graph.neighbors(b, Direction::In, None).unwrap().len(), 1);
    }
}
