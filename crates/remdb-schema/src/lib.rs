//! Entity schema registration, validation and versioned storage (§4.3).
//! Grounded on `ethan-tyler-MetaFuse`'s `catalog-core` validation and
//! migration modules, adapted from SQL migrations to the KV-backed,
//! version-immutable model this spec requires. [Author fengyang]

pub mod registry;
pub mod types;
pub mod validate;

pub use registry::Registry;
pub use types::{FieldDef, FieldType, KeyField, Schema};
