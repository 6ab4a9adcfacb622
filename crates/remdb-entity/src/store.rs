//! The entity store (§4.4): `insert`, `get`, `get_by_key`, `update`,
//! `delete`, `batch_insert`. Grounded on `draco28-PulseDB`'s
//! `StorageEngine::save_collective`/`delete_collective` pattern (validate,
//! diff against the live row, write row plus index deltas in one
//! transaction) adapted to this store's content-addressed identity and
//! column-family layout.
//!
//! Cascading deletes of edges and vector entries are **not** done here:
//! this store only owns the entity row and its own secondary indexes.
//! `delete` returns the removed [`Entity`] so the facade (which also owns
//! the graph store and vector index) can cascade using its indexed/embedded
//! field values, matching the component boundary in §2's control flow.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use remdb_core::error::{CResult, Error};
use remdb_core::id::Id;
use remdb_core::keys;
use remdb_core::tenant::TenantId;
use remdb_core::value::Value;
use remdb_kv::batch::WriteBatch;
use remdb_kv::cf::ColumnFamily;
use remdb_kv::store::TenantStore;
use remdb_schema::{KeyField, Schema};
use remdb_wal::{WalOp, WalSequencer};

use crate::index::{index_row_key, moment_time_key, MOMENT_TIME_FIELD};
use crate::types::{validate_status_transition, Entity, EntityKind, ParseStatus};

pub struct EntityStore {
    store: Arc<TenantStore>,
    wal: Arc<WalSequencer>,
}

impl EntityStore {
    pub fn new(store: Arc<TenantStore>, wal: Arc<WalSequencer>) -> Self {
        EntityStore { store, wal }
    }

    /// Validates, canonicalizes and writes `fields` under `schema`. Returns
    /// the (possibly pre-existing) id; a call with content identical to the
    /// current row is a no-op (§4.4 "Idempotent on repeated calls").
    pub fn insert(&self, schema: &Schema, kind: EntityKind, fields: BTreeMap<String, Value>) -> CResult<Id> {
        let mut batch = WriteBatch::new();
        let (id, changed) = self.stage_upsert(schema, kind, fields, &mut batch)?;
        if let Some(entity) = changed {
            self.wal.append_to_batch(&mut batch, WalOp::PutEntity, serde_json::to_vec(&entity_payload(&entity))?)?;
            self.store.commit(batch)?;
        }
        Ok(id)
    }

    pub fn get(&self, schema_fqn: &str, id: Id) -> CResult<Option<Entity>> {
        let key = entities_key(self.store.tenant(), schema_fqn, id);
        match self.store.get(ColumnFamily::Entities, &key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Looks an entity up by its declared key fields, recomputing the same
    /// id `insert` would have assigned. Errors with `QueryInvalid` for
    /// schemas with no key field, since content-addressed identity can't be
    /// derived from a partial record.
    pub fn get_by_key(&self, schema: &Schema, key_fields: &BTreeMap<String, Value>) -> CResult<Option<Entity>> {
        if matches!(schema.key_field, KeyField::None) {
            return Err(Error::query_invalid(format!(
                "schema '{}' has no key field; look up by id instead",
                schema.fqn
            )));
        }
        let id = compute_id(schema, key_fields)?;
        self.get(&schema.fqn, id)
    }

    /// Equivalent to `insert` of the current row merged with `patch`. For
    /// schemas with no key field, identity is content-addressed over the
    /// whole record, so a patch that changes any field yields a *different*
    /// id than `id` — this mirrors content addressing rather than being a
    /// special case: the returned id is the one to use from then on.
    pub fn update(&self, schema: &Schema, id: Id, patch: BTreeMap<String, Value>) -> CResult<Id> {
        let existing = self
            .get(&schema.fqn, id)?
            .ok_or_else(|| Error::not_found(format!("entity {id} not found under schema {}", schema.fqn)))?;
        let mut merged = existing.fields;
        merged.extend(patch);
        self.insert(schema, existing.kind, merged)
    }

    /// Removes the entity row and its secondary index rows. A no-op (not an
    /// error) if the entity doesn't exist. Returns the removed row so the
    /// caller can cascade to edges and vector entries.
    pub fn delete(&self, schema: &Schema, id: Id) -> CResult<Option<Entity>> {
        let Some(existing) = self.get(&schema.fqn, id)? else {
            return Ok(None);
        };

        let mut batch = WriteBatch::new();
        batch.delete(ColumnFamily::Entities, entities_key(self.store.tenant(), &schema.fqn, id));
        for field in &schema.indexed_fields {
            if let Some(value) = existing.fields.get(field) {
                if !matches!(value, Value::Null) {
                    let key = index_row_key(self.store.tenant(), &schema.fqn, field, value, id)?;
                    batch.delete(ColumnFamily::Indexes, key);
                }
            }
        }
        if matches!(existing.kind, EntityKind::Moment) {
            if let Some(Value::Timestamp(t)) = existing.fields.get(MOMENT_TIME_FIELD) {
                batch.delete(ColumnFamily::MomentsTime, moment_time_key(self.store.tenant(), &schema.fqn, t, id));
            }
        }

        let payload = delete_payload(&existing);
        self.wal.append_to_batch(&mut batch, WalOp::DeleteEntity, serde_json::to_vec(&payload)?)?;
        self.store.commit(batch)?;
        Ok(Some(existing))
    }

    /// Inserts every record as a single atomic KV batch plus a single WAL
    /// entry whose payload is the ordered list of changed rows (§4.4).
    pub fn batch_insert(&self, records: Vec<(Schema, EntityKind, BTreeMap<String, Value>)>) -> CResult<Vec<Id>> {
        let mut batch = WriteBatch::new();
        let mut ids = Vec::with_capacity(records.len());
        let mut changed_payloads = Vec::new();

        for (schema, kind, fields) in records {
            let (id, changed) = self.stage_upsert(&schema, kind, fields, &mut batch)?;
            ids.push(id);
            if let Some(entity) = changed {
                changed_payloads.push(entity_payload(&entity));
            }
        }

        if !changed_payloads.is_empty() {
            let payload = Value::Array(changed_payloads);
            self.wal.append_to_batch(&mut batch, WalOp::PutEntity, serde_json::to_vec(&payload)?)?;
            self.store.commit(batch)?;
        }
        Ok(ids)
    }

    /// Validates and diffs `fields` against the live row (if any), staging
    /// the entity row write and its index deltas into `batch`. Returns the
    /// id and, only if something actually changed, the written [`Entity`]
    /// (so callers can build a WAL payload from exactly the changed rows).
    fn stage_upsert(
        &self,
        schema: &Schema,
        kind: EntityKind,
        mut fields: BTreeMap<String, Value>,
        batch: &mut WriteBatch,
    ) -> CResult<(Id, Option<Entity>)> {
        for value in fields.values_mut() {
            value.normalize_nfc();
        }
        let id = compute_id(schema, &fields)?;
        let existing = self.get(&schema.fqn, id)?;

        if let Some(existing) = &existing {
            if existing.fields == fields {
                return Ok((id, None));
            }
            if let (Some(current), Some(next)) =
                (existing.fields.get(ParseStatus::FIELD_NAME), fields.get(ParseStatus::FIELD_NAME))
            {
                if let (Value::String(current), Value::String(next)) = (current, next) {
                    validate_status_transition(Some(current.parse()?), next.parse()?)?;
                }
            }
        }

        let now = Utc::now();
        let embedding_pending = schema
            .embedding_fields
            .iter()
            .any(|f| fields.get(f).map_or(false, |v| !v.is_empty_text()));

        let entity = Entity {
            id,
            tenant_id: self.store.tenant().clone(),
            schema_fqn: schema.fqn.clone(),
            schema_version: schema.version,
            kind,
            fields,
            created_at: existing.as_ref().map_or(now, |e| e.created_at),
            updated_at: now,
            embedding_pending,
        };

        batch.put(
            ColumnFamily::Entities,
            entities_key(self.store.tenant(), &schema.fqn, id),
            serde_json::to_vec(&entity)?,
        );

        for field in &schema.indexed_fields {
            let old_value = existing.as_ref().and_then(|e| e.fields.get(field));
            let new_value = entity.fields.get(field);
            if old_value == new_value {
                continue;
            }
            if let Some(old_value) = old_value {
                if !matches!(old_value, Value::Null) {
                    let key = index_row_key(self.store.tenant(), &schema.fqn, field, old_value, id)?;
                    batch.delete(ColumnFamily::Indexes, key);
                }
            }
            if let Some(new_value) = new_value {
                if !matches!(new_value, Value::Null) {
                    let key = index_row_key(self.store.tenant(), &schema.fqn, field, new_value, id)?;
                    batch.put(ColumnFamily::Indexes, key, Vec::new());
                }
            }
        }

        if matches!(kind, EntityKind::Moment) {
            let old_time = existing.as_ref().and_then(|e| e.fields.get(MOMENT_TIME_FIELD));
            let new_time = entity.fields.get(MOMENT_TIME_FIELD);
            if old_time != new_time {
                if let Some(Value::Timestamp(t)) = old_time {
                    batch.delete(ColumnFamily::MomentsTime, moment_time_key(self.store.tenant(), &schema.fqn, t, id));
                }
                if let Some(Value::Timestamp(t)) = new_time {
                    batch.put(
                        ColumnFamily::MomentsTime,
                        moment_time_key(self.store.tenant(), &schema.fqn, t, id),
                        Vec::new(),
                    );
                }
            }
        }

        Ok((id, Some(entity)))
    }
}

fn entities_key(tenant: &TenantId, schema_fqn: &str, id: Id) -> Vec<u8> {
    keys::compose(
        tenant,
        &[ColumnFamily::Entities.file_stem().as_bytes(), schema_fqn.as_bytes(), id.0.as_slice()],
    )
}

/// Derives an id from `fields` per the schema's key field: the whole
/// (canonicalized) record if none is declared, otherwise just the named
/// scalar field(s) (§4.4, §3 "Entity").
fn compute_id(schema: &Schema, fields: &BTreeMap<String, Value>) -> CResult<Id> {
    let key_bytes = match &schema.key_field {
        KeyField::None => Value::Object(fields.clone()).to_canonical_bytes(),
        KeyField::Single(name) => single_field_object(schema, fields, std::slice::from_ref(name))?,
        KeyField::Composite(names) => single_field_object(schema, fields, names)?,
    };
    Ok(Id::from_canonical_bytes(&key_bytes))
}

fn single_field_object(schema: &Schema, fields: &BTreeMap<String, Value>, names: &[String]) -> CResult<Vec<u8>> {
    let mut key_map = BTreeMap::new();
    for name in names {
        let value = fields.get(name).ok_or_else(|| {
            Error::schema_mismatch(format!("key field '{name}' missing from a record of schema '{}'", schema.fqn))
        })?;
        key_map.insert(name.clone(), value.clone());
    }
    Ok(Value::Object(key_map).to_canonical_bytes())
}

fn entity_payload(entity: &Entity) -> Value {
    let mut map = BTreeMap::new();
    map.insert("id".to_string(), Value::String(entity.id.to_hex()));
    map.insert("schema_fqn".to_string(), Value::String(entity.schema_fqn.clone()));
    map.insert("schema_version".to_string(), Value::Number(entity.schema_version as f64));
    map.insert("kind".to_string(), Value::String(kind_name(entity.kind).to_string()));
    map.insert("fields".to_string(), Value::Object(entity.fields.clone()));
    // A replica replays this row directly rather than re-running `insert`, so
    // `created_at`/`updated_at` must travel with it — otherwise two nodes
    // applying the same WAL would converge on different entity bytes.
    map.insert("created_at".to_string(), Value::Timestamp(entity.created_at));
    map.insert("updated_at".to_string(), Value::Timestamp(entity.updated_at));
    Value::Object(map)
}

/// The WAL payload's spelling for [`EntityKind`] — a replica decoding a
/// `PutEntity` entry needs to know whether to also maintain the
/// `moments_time` index, which `Entity` itself doesn't derive from `fields`.
pub fn kind_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Entity => "entity",
        EntityKind::Resource => "resource",
        EntityKind::Moment => "moment",
    }
}

fn delete_payload(entity: &Entity) -> Value {
    let mut map = BTreeMap::new();
    map.insert("id".to_string(), Value::String(entity.id.to_hex()));
    map.insert("schema_fqn".to_string(), Value::String(entity.schema_fqn.clone()));
    Value::Object(map)
}

#[cfg(test)]
mod test {
    use super::*;
    use remdb_schema::{FieldDef, FieldType};

    fn setup() -> (EntityStore, Schema) {
        let tenant = TenantId::new("acme").unwrap();
        let store = Arc::new(TenantStore::open_in_memory(tenant.clone()));
        let wal = Arc::new(WalSequencer::new(tenant, 1));
        let entity_store = EntityStore::new(store, wal);
        let schema = Schema {
            fqn: "demo.article".to_string(),
            version: 1,
            short_name: "article".to_string(),
            fields: vec![
                FieldDef { name: "slug".to_string(), field_type: FieldType::Text },
                FieldDef { name: "title".to_string(), field_type: FieldType::Text },
                FieldDef { name: "views".to_string(), field_type: FieldType::Number },
            ],
            key_field: KeyField::Single("slug".to_string()),
            indexed_fields: vec!["views".to_string()],
            embedding_fields: vec!["title".to_string()],
            default_embedding_provider: None,
            mcp_refs: vec![],
            indexed_cardinality: BTreeMap::new(),
        };
        (entity_store, schema)
    }

    fn fields(slug: &str, title: &str, views: f64) -> BTreeMap<String, Value> {
        let mut m = BTreeMap::new();
        m.insert("slug".to_string(), Value::String(slug.to_string()));
        m.insert("title".to_string(), Value::String(title.to_string()));
        m.insert("views".to_string(), Value::Number(views));
        m
    }

    #[test]
    fn insert_then_get_roundtrips() {
        let (store, schema) = setup();
        let id = store.insert(&schema, EntityKind::Entity, fields("hello-world", "Hello World", 1.0)).unwrap();
        let got = store.get(&schema.fqn, id).unwrap().unwrap();
        assert_eq!(got.fields.get("title").unwrap().as_str(), Some("Hello World"));
        assert!(got.embedding_pending);
    }

    #[test]
    fn reinserting_identical_content_is_a_no_op() {
        let (store, schema) = setup();
        let id1 = store.insert(&schema, EntityKind::Entity, fields("hello-world", "Hello World", 1.0)).unwrap();
        let id2 = store.insert(&schema, EntityKind::Entity, fields("hello-world", "Hello World", 1.0)).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn same_key_fields_yield_the_same_id_regardless_of_field_insertion_order() {
        let (store, schema) = setup();
        let id1 = store.insert(&schema, EntityKind::Entity, fields("hello-world", "Hello World", 1.0)).unwrap();

        let mut reordered = BTreeMap::new();
        reordered.insert("views".to_string(), Value::Number(1.0));
        reordered.insert("title".to_string(), Value::String("Hello World".to_string()));
        reordered.insert("slug".to_string(), Value::String("hello-world".to_string()));
        let id2 = store.insert(&schema, EntityKind::Entity, reordered).unwrap();

        assert_eq!(id1, id2);
    }

    #[test]
    fn get_by_key_resolves_without_the_id() {
        let (store, schema) = setup();
        store.insert(&schema, EntityKind::Entity, fields("hello-world", "Hello World", 1.0)).unwrap();

        let mut key = BTreeMap::new();
        key.insert("slug".to_string(), Value::String("hello-world".to_string()));
        let got = store.get_by_key(&schema, &key).unwrap().unwrap();
        assert_eq!(got.fields.get("views").unwrap().as_f64(), Some(1.0));
    }

    #[test]
    fn update_bumps_indexed_field_and_moves_the_index_row() {
        let (store, schema) = setup();
        let id = store.insert(&schema, EntityKind::Entity, fields("hello-world", "Hello World", 1.0)).unwrap();

        let mut patch = BTreeMap::new();
        patch.insert("views".to_string(), Value::Number(2.0));
        let id2 = store.update(&schema, id, patch).unwrap();
        assert_eq!(id, id2);

        let got = store.get(&schema.fqn, id).unwrap().unwrap();
        assert_eq!(got.fields.get("views").unwrap().as_f64(), Some(2.0));
    }

    #[test]
    fn delete_removes_the_row_and_is_idempotent() {
        let (store, schema) = setup();
        let id = store.insert(&schema, EntityKind::Entity, fields("hello-world", "Hello World", 1.0)).unwrap();

        let removed = store.delete(&schema, id).unwrap();
        assert!(removed.is_some());
        assert!(store.get(&schema.fqn, id).unwrap().is_none());

        let removed_again = store.delete(&schema, id).unwrap();
        assert!(removed_again.is_none());
    }

    #[test]
    fn batch_insert_writes_every_record_in_one_commit() {
        let (store, schema) = setup();
        let records = vec![
            (schema.clone(), EntityKind::Entity, fields("a", "A", 1.0)),
            (schema.clone(), EntityKind::Entity, fields("b", "B", 2.0)),
        ];
        let ids = store.batch_insert(records).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(store.get(&schema.fqn, ids[0]).unwrap().is_some());
        assert!(store.get(&schema.fqn, ids[1]).unwrap().is_some());
    }

    #[test]
    fn moment_entities_are_indexed_by_occurred_at() {
        let (store, schema) = setup();
        let mut f = fields("hello-world", "Hello World", 1.0);
        let t = Utc::now();
        f.insert("occurred_at".to_string(), Value::Timestamp(t));
        let id = store.insert(&schema, EntityKind::Moment, f).unwrap();

        let prefix = keys::compose(
            store.store.tenant(),
            &[ColumnFamily::MomentsTime.file_stem().as_bytes(), schema.fqn.as_bytes()],
        );
        let rows = store.store.scan_prefix(ColumnFamily::MomentsTime, &prefix).unwrap();
        assert_eq!(rows.len(), 1);

        store.delete(&schema, id).unwrap();
        let rows = store.store.scan_prefix(ColumnFamily::MomentsTime, &prefix).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn illegal_status_transition_is_rejected() {
        let (store, schema) = setup();
        let mut f = fields("hello-world", "Hello World", 1.0);
        f.insert("status".to_string(), Value::String("registered".to_string()));
        let id = store.insert(&schema, EntityKind::Resource, f.clone()).unwrap();

        f.insert("status".to_string(), Value::String("ingested".to_string()));
        let err = store.insert(&schema, EntityKind::Resource, f).unwrap_err();
        assert_eq!(err.kind(), remdb_core::error::Kind::SchemaMismatch);

        // sanity: the entity is still at its last legal state
        let got = store.get(&schema.fqn, id).unwrap().unwrap();
        assert_eq!(got.fields.get("status").unwrap().as_str(), Some("registered"));
    }
}
