//! Database-wide configuration (§6 "Environment/config options", §4.9).
//! Grounded on the teacher's `kv-cli::config::ConfigLoad`: mostly-`Option`
//! fields resolved against defaults at open time, rather than a struct that
//! can't express "use whatever the database was already opened with."

use std::path::PathBuf;

use serde_derive::{Deserialize, Serialize};

/// Whether this process may write to the database, or only replay a
/// primary's WAL and serve reads (§4.9 "Role enforcement").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Primary,
    Replica,
}

impl Default for Role {
    fn default() -> Self {
        Role::Primary
    }
}

/// One `(host, port)` replication peer, as it appears in `replication_peers`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAddr {
    pub host: String,
    pub port: u16,
}

/// Every tunable the facade reads at `open` time. Fields outside
/// `data_dir`/`role` have defaults matching §4.5/§4.9's stated starting
/// points, and are deliberately not hardcoded constants so a deployment can
/// override them without a code change (the "tiered-index parameters are
/// starting points only" resolution in the design ledger).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DbConfig {
    pub data_dir: PathBuf,
    #[serde(default)]
    pub role: Role,
    /// How many of the oldest WAL entries a primary keeps once every known
    /// replica has applied past them (§4.8). `None` means "keep forever."
    #[serde(default)]
    pub wal_retention: Option<u64>,
    /// §4.7 `query_cell_budget`: the planner rejects a full scan over more
    /// than this many estimated rows.
    #[serde(default = "default_query_cell_budget")]
    pub query_cell_budget: u64,
    #[serde(default = "default_hnsw_ef_search")]
    pub hnsw_ef_search: usize,
    #[serde(default = "default_hnsw_m")]
    pub hnsw_m: usize,
    #[serde(default = "default_hnsw_ef_construction")]
    pub hnsw_ef_construction: usize,
    #[serde(default = "default_embedding_worker_count")]
    pub embedding_worker_count: usize,
    /// §4.5a: how many days of a `Moment` schema's `occurred_at` range stay
    /// in the tiered index's hot tier before the background swapper folds
    /// them into cold.
    #[serde(default = "default_hot_data_days")]
    pub hot_data_days: u32,
    /// A PEM or raw-bytes file holding the tenant's master key (§4.2). When
    /// unset, the database opens with plaintext column families.
    #[serde(default)]
    pub encryption_key_path: Option<PathBuf>,
    #[serde(default)]
    pub replication_listen_addr: Option<String>,
    #[serde(default)]
    pub replication_peers: Vec<PeerAddr>,
}

fn default_query_cell_budget() -> u64 {
    100_000
}

fn default_hnsw_ef_search() -> usize {
    64
}

fn default_hnsw_m() -> usize {
    16
}

fn default_hnsw_ef_construction() -> usize {
    200
}

fn default_embedding_worker_count() -> usize {
    1
}

fn default_hot_data_days() -> u32 {
    30
}

impl DbConfig {
    /// A primary-role config at `data_dir` with every other field at its
    /// default — the common case for a single-node embedding caller.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        DbConfig {
            data_dir: data_dir.into(),
            role: Role::default(),
            wal_retention: None,
            query_cell_budget: default_query_cell_budget(),
            hnsw_ef_search: default_hnsw_ef_search(),
            hnsw_m: default_hnsw_m(),
            hnsw_ef_construction: default_hnsw_ef_construction(),
            embedding_worker_count: default_embedding_worker_count(),
            hot_data_days: default_hot_data_days(),
            encryption_key_path: None,
            replication_listen_addr: None,
            replication_peers: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn vector_index_config(&self) -> remdb_vector::VectorIndexConfig {
        remdb_vector::VectorIndexConfig {
            max_connections: self.hnsw_m,
            ef_construction: self.hnsw_ef_construction,
            ef_search_default: self.hnsw_ef_search,
            ..remdb_vector::VectorIndexConfig::default()
        }
    }
}
