//! Background maintenance (§4.9 "background tasks"): embedding generation,
//! HNSW checkpointing, and WAL pruning. Grounded on the teacher's worker-pool
//! shape (a `tokio::task` per concern, owning an `Arc` handle and a
//! `CancellationToken`, logged through `tracing`) rather than a single
//! do-everything loop.

use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;

use remdb_core::error::CResult;
use remdb_entity::index::entities_prefix;
use remdb_kv::cf::ColumnFamily;
use remdb_wal::WalEntry;
use tokio_util::sync::CancellationToken;

use crate::facade::Database;

/// Computes a schema field's embedding vector. The workspace has no
/// grounding for any specific embedding backend (no `.proto`, no HTTP
/// client call site anywhere in the retrieved examples), so this is left as
/// a seam a caller supplies rather than a hardcoded provider — mirroring how
/// `remdb-wal::replica::WalApplier` is a trait the caller implements rather
/// than this crate guessing at one.
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, schema_fqn: &str, field: &str, text: &str) -> CResult<Vec<f32>>;
}

/// Periodically scans every registered schema's embedding fields for rows
/// with `embedding_pending = true` and a non-empty value, computes a vector
/// via `provider`, and upserts it (§4.5 "Failure semantics": a background
/// worker reprocesses pending rows). Vectors are never WAL-logged — each
/// node, primary or replica, regenerates its own embeddings locally from
/// replicated entity fields rather than shipping floats through the WAL.
pub fn spawn_embedding_worker(
    db: Arc<Database>,
    provider: Arc<dyn EmbeddingProvider>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            if let Err(e) = reembed_pending(&db, provider.as_ref()) {
                tracing::warn!(target: "server_warnings", error = %e, "embedding worker pass failed");
            }
        }
    })
}

fn reembed_pending(db: &Database, provider: &dyn EmbeddingProvider) -> CResult<()> {
    for schema in db.list_schemas()? {
        if schema.embedding_fields.is_empty() {
            continue;
        }
        let prefix = entities_prefix(db.tenant(), &schema.fqn);
        for (_, bytes) in db.store().scan_prefix(ColumnFamily::Entities, &prefix)? {
            let entity: remdb_entity::Entity = serde_json::from_slice(&bytes)?;
            if !entity.embedding_pending {
                continue;
            }
            for field in &schema.embedding_fields {
                let Some(text) = entity.fields.get(field).and_then(|v| v.as_str()) else { continue };
                if text.trim().is_empty() {
                    continue;
                }
                let vector = provider.embed(&schema.fqn, field, text)?;
                db.upsert_embedding(&schema.fqn, field, entity.id, vector)?;
            }
        }
    }
    Ok(())
}

/// Periodically rebuilds every schema's embedding-field HNSW graphs from
/// their persisted rows (§4.5 "tiered-index parameters are starting points
/// only" — the swapper is what actually folds newly-upserted vectors into a
/// searchable graph).
pub fn spawn_checkpointer(db: Arc<Database>, interval: Duration, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            if let Err(e) = db.checkpoint_vector_indexes() {
                tracing::warn!(target: "server_warnings", error = %e, "vector index checkpoint failed");
            }
        }
    })
}

/// Periodically drops WAL entries older than `retention` entries behind the
/// current head (§4.8 "Retention"). A primary-only task: a replica doesn't
/// own the sequence its own `wal` CF rows were assigned under a remote
/// primary's numbering in the same way, and isn't the source of truth for
/// when it's safe to prune.
pub fn spawn_wal_pruner(db: Arc<Database>, retention: u64, interval: Duration, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            if let Err(e) = prune_wal(&db, retention) {
                tracing::warn!(target: "server_warnings", error = %e, "WAL pruning pass failed");
            }
        }
    })
}

fn prune_wal(db: &Database, retention: u64) -> CResult<()> {
    let Some(hub) = db.replication() else { return Ok(()) };
    let status = hub.status()?;
    if status.head_seq <= retention {
        return Ok(());
    }
    let floor = status.head_seq - retention;
    let rows = db.store().scan_range(ColumnFamily::Wal, Bound::Unbounded, Bound::Excluded(WalEntry::storage_key(floor).to_vec()))?;
    if rows.is_empty() {
        return Ok(());
    }
    let mut batch = remdb_kv::batch::WriteBatch::new();
    for (key, _) in rows {
        batch.delete(ColumnFamily::Wal, key);
    }
    db.store().commit(batch)
}
