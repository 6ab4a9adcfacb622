//! Typed entity CRUD with content-addressed identifiers and secondary
//! indexes (§4.4). Grounded on `draco28-PulseDB`'s `StorageEngine` cascade
//! and diff-before-write pattern, adapted to this workspace's column-family
//! layout and content addressing. [Author fengyang]

pub mod index;
pub mod store;
pub mod types;

pub use store::{kind_name, EntityStore};
pub use types::{Entity, EntityKind, ParseStatus};
