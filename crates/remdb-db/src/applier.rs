//! `impl WalApplier for Database` (§4.8): replays a replicated [`WalEntry`]
//! directly against the owned entity/graph/schema stores.
//!
//! `remdb-wal` has no dependency on `remdb-entity`/`remdb-graph`/`remdb-schema`,
//! so it can't decode a `WalEntry`'s payload into a concrete mutation itself
//! — this module is the seam its `WalApplier` trait doc comment describes.
//! Replay writes the row directly rather than calling back into
//! `EntityStore::insert`/`GraphStore::add_edge`, since those would mint a
//! *new* local `log_seq_no` for what is already a specific, numbered entry
//! in the primary's history.

use std::collections::BTreeMap;

use remdb_core::error::{CResult, Error};
use remdb_core::id::Id;
use remdb_core::keys;
use remdb_core::value::Value;
use remdb_entity::index::{index_row_key, moment_time_key, MOMENT_TIME_FIELD};
use remdb_entity::{Entity, EntityKind};
use remdb_graph::keys::edge_key;
use remdb_kv::batch::WriteBatch;
use remdb_kv::cf::ColumnFamily;
use remdb_schema::Schema;
use remdb_wal::{WalApplier, WalEntry, WalOp};

use crate::facade::Database;

fn entities_key(tenant: &remdb_core::tenant::TenantId, schema_fqn: &str, id: Id) -> Vec<u8> {
    keys::compose(tenant, &[ColumnFamily::Entities.file_stem().as_bytes(), schema_fqn.as_bytes(), id.as_bytes().as_slice()])
}

fn as_object(value: &Value) -> CResult<&BTreeMap<String, Value>> {
    value.as_object().ok_or_else(|| Error::corruption("expected a WAL payload object"))
}

fn field(obj: &BTreeMap<String, Value>, name: &str) -> CResult<Value> {
    obj.get(name).cloned().ok_or_else(|| Error::corruption(format!("WAL payload missing '{name}'")))
}

fn required_str(obj: &BTreeMap<String, Value>, name: &str) -> CResult<String> {
    field(obj, name)?.as_str().map(str::to_string).ok_or_else(|| Error::corruption(format!("'{name}' is not a string")))
}

impl WalApplier for Database {
    fn apply(&self, entry: &WalEntry) -> CResult<()> {
        self.store().check_tenant(&entry.tenant)?;
        match entry.op {
            WalOp::PutEntity => self.apply_put_entity(&entry.payload),
            WalOp::DeleteEntity => self.apply_delete_entity(&entry.payload),
            WalOp::PutEdge => self.apply_put_edge(&entry.payload),
            WalOp::DeleteEdge => self.apply_delete_edge(&entry.payload),
            WalOp::PutSchema => self.apply_put_schema(&entry.payload),
            // A local repair op (§4.6): each replica rebuilds its own
            // reverse-edge index from its own already-replicated forward
            // edges rather than replaying this as a logical mutation.
            WalOp::Reindex => Ok(()),
        }
    }
}

impl Database {
    /// Applies `entry` through this database's [`ReplicaCursor`], rejecting
    /// gaps and divergent replays before this WAL entry's mutation ever
    /// reaches a store.
    pub fn apply_replicated(&self, entry: &WalEntry) -> CResult<()> {
        self.cursor().apply(self.store(), entry, self)
    }

    fn apply_put_entity(&self, payload: &[u8]) -> CResult<()> {
        let value: Value = serde_json::from_slice(payload)?;
        match value {
            Value::Array(rows) => {
                for row in &rows {
                    self.apply_entity_row(row)?;
                }
                Ok(())
            }
            other => self.apply_entity_row(&other),
        }
    }

    fn apply_entity_row(&self, row: &Value) -> CResult<()> {
        let obj = as_object(row)?;
        let id = Id::from_hex(&required_str(obj, "id")?)?;
        let schema_fqn = required_str(obj, "schema_fqn")?;
        let version = field(obj, "schema_version")?
            .as_f64()
            .map(|v| v as u32)
            .ok_or_else(|| Error::corruption("'schema_version' is not a number"))?;
        let kind: EntityKind = required_str(obj, "kind")?.parse()?;
        let fields = field(obj, "fields")?
            .as_object()
            .cloned()
            .ok_or_else(|| Error::corruption("'fields' is not an object"))?;
        let created_at = field(obj, "created_at")?
            .as_timestamp()
            .ok_or_else(|| Error::corruption("'created_at' is not a timestamp"))?;
        let updated_at = field(obj, "updated_at")?
            .as_timestamp()
            .ok_or_else(|| Error::corruption("'updated_at' is not a timestamp"))?;

        let schema = self.schemas().get(&schema_fqn, version)?.ok_or_else(|| {
            Error::not_found(format!("schema {schema_fqn} v{version} is not registered on this replica"))
        })?;

        let existing = self.entities().get(&schema_fqn, id)?;
        let embedding_pending =
            schema.embedding_fields.iter().any(|f| fields.get(f).map_or(false, |v| !v.is_empty_text()));

        let entity = Entity {
            id,
            tenant_id: self.tenant().clone(),
            schema_fqn: schema_fqn.clone(),
            schema_version: version,
            kind,
            fields,
            created_at,
            updated_at,
            embedding_pending,
        };

        let mut batch = WriteBatch::new();
        batch.put(ColumnFamily::Entities, entities_key(self.tenant(), &schema_fqn, id), serde_json::to_vec(&entity)?);
        diff_indexes(&mut batch, self.tenant(), &schema, existing.as_ref(), &entity, id);
        self.store().commit(batch)
    }

    fn apply_delete_entity(&self, payload: &[u8]) -> CResult<()> {
        let value: Value = serde_json::from_slice(payload)?;
        let obj = as_object(&value)?;
        let id = Id::from_hex(&required_str(obj, "id")?)?;
        let schema_fqn = required_str(obj, "schema_fqn")?;

        let Some(existing) = self.entities().get(&schema_fqn, id)? else {
            return Ok(());
        };
        let schema = self.schemas().get(&schema_fqn, existing.schema_version)?.ok_or_else(|| {
            Error::not_found(format!("schema {schema_fqn} v{} is not registered on this replica", existing.schema_version))
        })?;

        let mut batch = WriteBatch::new();
        batch.delete(ColumnFamily::Entities, entities_key(self.tenant(), &schema_fqn, id));
        for f in &schema.indexed_fields {
            if let Some(v) = existing.fields.get(f) {
                if !matches!(v, Value::Null) {
                    batch.delete(ColumnFamily::Indexes, index_row_key(self.tenant(), &schema_fqn, f, v, id)?);
                }
            }
        }
        if matches!(existing.kind, EntityKind::Moment) {
            if let Some(Value::Timestamp(t)) = existing.fields.get(MOMENT_TIME_FIELD) {
                batch.delete(ColumnFamily::MomentsTime, moment_time_key(self.tenant(), &schema_fqn, t, id));
            }
        }
        self.store().commit(batch)?;

        for f in &schema.embedding_fields {
            self.vectors().remove(&schema_fqn, f, id)?;
        }
        Ok(())
    }

    fn apply_put_edge(&self, payload: &[u8]) -> CResult<()> {
        let value: Value = serde_json::from_slice(payload)?;
        let obj = as_object(&value)?;
        let src = Id::from_hex(&required_str(obj, "src")?)?;
        let label = required_str(obj, "label")?;
        let dst = Id::from_hex(&required_str(obj, "dst")?)?;
        let props = obj.get("props").and_then(Value::as_object).cloned().unwrap_or_default();

        let encoded = serde_json::to_vec(&props)?;
        let mut batch = WriteBatch::new();
        batch.put(ColumnFamily::EdgesFwd, edge_key(self.tenant(), ColumnFamily::EdgesFwd, src, &label, dst), encoded.clone());
        batch.put(ColumnFamily::EdgesRev, edge_key(self.tenant(), ColumnFamily::EdgesRev, dst, &label, src), encoded);
        self.store().commit(batch)
    }

    fn apply_delete_edge(&self, payload: &[u8]) -> CResult<()> {
        let value: Value = serde_json::from_slice(payload)?;
        let obj = as_object(&value)?;
        let src = Id::from_hex(&required_str(obj, "src")?)?;
        let label = required_str(obj, "label")?;
        let dst = Id::from_hex(&required_str(obj, "dst")?)?;

        let mut batch = WriteBatch::new();
        batch.delete(ColumnFamily::EdgesFwd, edge_key(self.tenant(), ColumnFamily::EdgesFwd, src, &label, dst));
        batch.delete(ColumnFamily::EdgesRev, edge_key(self.tenant(), ColumnFamily::EdgesRev, dst, &label, src));
        self.store().commit(batch)
    }

    fn apply_put_schema(&self, payload: &[u8]) -> CResult<()> {
        let schema: Schema = serde_json::from_slice(payload)?;
        match self.schemas().register(schema) {
            Ok(()) => Ok(()),
            // Replaying an already-applied registration is a harmless no-op
            // (`ReplicaCursor::apply` only guards against re-running the
            // same `log_seq_no` twice, not every possible replayed op).
            Err(e) if e.kind() == remdb_core::error::Kind::AlreadyExists => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn diff_indexes(
    batch: &mut WriteBatch,
    tenant: &remdb_core::tenant::TenantId,
    schema: &Schema,
    existing: Option<&Entity>,
    entity: &Entity,
    id: Id,
) {
    for f in &schema.indexed_fields {
        let old_value = existing.and_then(|e| e.fields.get(f));
        let new_value = entity.fields.get(f);
        if old_value == new_value {
            continue;
        }
        if let Some(old_value) = old_value {
            if !matches!(old_value, Value::Null) {
                if let Ok(key) = index_row_key(tenant, &schema.fqn, f, old_value, id) {
                    batch.delete(ColumnFamily::Indexes, key);
                }
            }
        }
        if let Some(new_value) = new_value {
            if !matches!(new_value, Value::Null) {
                if let Ok(key) = index_row_key(tenant, &schema.fqn, f, new_value, id) {
                    batch.put(ColumnFamily::Indexes, key, Vec::new());
                }
            }
        }
    }

    if matches!(entity.kind, EntityKind::Moment) {
        let old_time = existing.and_then(|e| e.fields.get(MOMENT_TIME_FIELD));
        let new_time = entity.fields.get(MOMENT_TIME_FIELD);
        if old_time != new_time {
            if let Some(Value::Timestamp(t)) = old_time {
                batch.delete(ColumnFamily::MomentsTime, moment_time_key(tenant, &schema.fqn, t, id));
            }
            if let Some(Value::Timestamp(t)) = new_time {
                batch.put(ColumnFamily::MomentsTime, moment_time_key(tenant, &schema.fqn, t, id), Vec::new());
            }
        }
    }
}
