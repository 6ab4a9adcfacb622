//! Opens an in-memory database, registers a schema, inserts a couple of
//! entities, links them with an edge, and runs an indexed query — the
//! smallest end-to-end walkthrough of the facade in §4.9.

use std::collections::BTreeMap;

use remdb_core::tenant::TenantId;
use remdb_core::value::Value;
use remdb_db::{Database, DbConfig};
use remdb_entity::EntityKind;
use remdb_graph::Direction;
use remdb_query::{Predicate, Query};
use remdb_schema::{FieldDef, FieldType, KeyField, Schema};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let tenant = TenantId::new("acme")?;
    let db = Database::open_in_memory(tenant.clone(), DbConfig::new("/tmp/unused"))?;

    let schema = Schema {
        fqn: "demo.article".to_string(),
        version: 1,
        short_name: "article".to_string(),
        fields: vec![
            FieldDef { name: "title".to_string(), field_type: FieldType::Text },
            FieldDef { name: "status".to_string(), field_type: FieldType::Text },
        ],
        key_field: KeyField::Single("title".to_string()),
        indexed_fields: vec!["status".to_string()],
        embedding_fields: vec![],
        default_embedding_provider: None,
        mcp_refs: vec![],
        indexed_cardinality: BTreeMap::new(),
    };
    db.register_schema(schema.clone())?;

    let mut hello = BTreeMap::new();
    hello.insert("title".to_string(), Value::String("Hello".to_string()));
    hello.insert("status".to_string(), Value::String("published".to_string()));
    let hello_id = db.insert(&schema, EntityKind::Entity, hello)?;

    let mut draft = BTreeMap::new();
    draft.insert("title".to_string(), Value::String("Draft".to_string()));
    draft.insert("status".to_string(), Value::String("draft".to_string()));
    let draft_id = db.insert(&schema, EntityKind::Entity, draft)?;

    db.add_edge(hello_id, "links_to", draft_id, BTreeMap::new())?;
    let neighbors = db.neighbors(hello_id, Direction::Out, None)?;
    println!("{} links to {} other entities", hello_id, neighbors.len());

    let published = db.query(&Query::new(
        tenant,
        "demo.article",
        Predicate::Eq { field: "status".into(), value: Value::String("published".into()) },
    ))?;
    for entity in &published {
        println!("published: {}", entity.fields.get("title").and_then(Value::as_str).unwrap_or("?"));
    }

    Ok(())
}
