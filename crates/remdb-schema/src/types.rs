//! Schema types (§3 "Schema", §4.3).

use std::collections::BTreeMap;

use serde_derive::{Deserialize, Serialize};

/// The scalar/container kinds a schema field may declare. Indexed fields
/// are restricted to the scalar variants; embedding fields to `Text`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    Number,
    Bool,
    Timestamp,
    Binary,
    Array,
    Object,
}

impl FieldType {
    pub fn is_scalar(self) -> bool {
        matches!(self, FieldType::Text | FieldType::Number | FieldType::Bool | FieldType::Timestamp)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
}

/// Whether a schema's key is absent (content-addressed identity), a single
/// field, or a composite of several scalar fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum KeyField {
    None,
    Single(String),
    Composite(Vec<String>),
}

/// A named, versioned description of an entity kind (§3 "Schema"). Once
/// registered under a given `(fqn, version)`, never mutated — breaking
/// changes are published as a new version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub fqn: String,
    pub version: u32,
    pub short_name: String,
    pub fields: Vec<FieldDef>,
    pub key_field: KeyField,
    pub indexed_fields: Vec<String>,
    pub embedding_fields: Vec<String>,
    pub default_embedding_provider: Option<String>,
    /// Opaque MCP tool/resource references — not interpreted by the core.
    pub mcp_refs: Vec<String>,
    /// Approximate distinct-value counts for indexed fields, supplied by
    /// whoever registers the schema (§4.7 "Selectivity hints may be stored
    /// in the schema"). The query planner treats these as a ranking hint,
    /// never as a correctness guarantee — a stale or missing count just
    /// makes the planner's source choice less optimal, never wrong.
    #[serde(default)]
    pub indexed_cardinality: BTreeMap<String, u64>,
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The storage key for this schema version: `fqn|version`.
    pub fn storage_key(&self) -> Vec<u8> {
        storage_key(&self.fqn, self.version)
    }
}

pub fn storage_key(fqn: &str, version: u32) -> Vec<u8> {
    let mut key = fqn.as_bytes().to_vec();
    key.push(b'|');
    key.extend_from_slice(version.to_string().as_bytes());
    key
}
