//! Per-`(tenant, schema_fqn, field)` HNSW vector index (§4.5) and its
//! optional hot/cold tiered variant (§4.5a). Grounded on `draco28-PulseDB`'s
//! choice of `hnsw_rs` + `anndists` ("pure Rust, ADR-005") for the HNSW
//! graph and distance metric. [Author fengyang]

pub mod codec;
pub mod index;
pub mod registry;
pub mod tiered;
pub mod types;

pub use index::VectorIndex;
pub use registry::VectorRegistry;
pub use tiered::TieredIndex;
pub use types::{SearchHit, VectorIndexConfig};
