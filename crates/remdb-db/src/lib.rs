//! The REM database facade (§4.9): opens a tenant's on-disk store and
//! composes the core, kv, crypto, schema, entity, graph, vector, query and
//! wal crates behind one `Database` handle, adding role enforcement, striped
//! entity locks, replication publish/apply and background maintenance
//! tasks. [Author fengyang]

pub mod applier;
pub mod config;
pub mod facade;
pub mod lock;
pub mod logging;
pub mod tasks;

pub use config::{DbConfig, PeerAddr, Role};
pub use facade::Database;
pub use lock::DirLock;
pub use logging::init_logging;
pub use tasks::{spawn_checkpointer, spawn_embedding_worker, spawn_wal_pruner, EmbeddingProvider};
