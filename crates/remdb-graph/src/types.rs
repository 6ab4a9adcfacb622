//! `Edge` and the traversal direction enum (§3 "Edge", §4.6 "Graph Store").

use std::collections::BTreeMap;

use remdb_core::id::Id;
use remdb_core::value::Value;
use serde_derive::{Deserialize, Serialize};

/// Which side of an id's edges to read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Out,
    In,
    Both,
}

/// A labeled, directed relation with an optional property map (§3 "Edge").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub src: Id,
    pub label: String,
    pub dst: Id,
    pub props: BTreeMap<String, Value>,
}

/// One step of a BFS traversal: the id reached, its depth from the start,
/// and the full path of ids taken to reach it (§4.6 `traverse`).
#[derive(Clone, Debug, PartialEq)]
pub struct TraversalStep {
    pub id: Id,
    pub depth: u32,
    pub path: Vec<Id>,
}
