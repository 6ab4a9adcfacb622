//! Bidirectional labeled edges and BFS traversal (§4.6). Edge rows are
//! mirrored into `edges_fwd`/`edges_rev` in one batch so every read is a
//! plain prefix-scan regardless of direction. [Author fengyang]

pub mod keys;
pub mod store;
pub mod types;

pub use store::{GraphStore, DEFAULT_MAX_NODES};
pub use types::{Direction, Edge, TraversalStep};
