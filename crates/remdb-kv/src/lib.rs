//! Log-structured, column-family-aware KV engine for a single tenant
//! database (§4.1). Adapted from `kv_rs::storage`: the same append-only
//! log plus in-memory keydir design, generalized to one log per named
//! column family and made checksum-aware so corruption in one row cannot
//! silently poison reads of another. [Author fengyang]

pub mod batch;
pub mod cask;
pub mod cf;
pub mod engine;
pub mod log;
pub mod memory;
pub mod store;

pub use batch::WriteBatch;
pub use cf::ColumnFamily;
pub use engine::Engine;
pub use store::TenantStore;
