//! Owns one [`VectorIndex`] per `(schema_fqn, field)` and persists every
//! live vector to the `embeddings_meta` CF as it changes (§4.5
//! "Persistence"). Loads lazily: the first operation against a given field
//! warms its index from whatever rows are already on disk.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use remdb_core::error::{CResult, Error};
use remdb_core::id::Id;
use remdb_core::keys;
use remdb_core::tenant::TENANT_SEPARATOR;
use remdb_kv::cf::ColumnFamily;
use remdb_kv::store::TenantStore;

use crate::codec::{decode_vector, encode_vector};
use crate::index::VectorIndex;
use crate::types::{SearchHit, VectorIndexConfig};

pub struct VectorRegistry {
    store: Arc<TenantStore>,
    config: VectorIndexConfig,
    indexes: Mutex<HashMap<(String, String), Arc<VectorIndex>>>,
}

impl VectorRegistry {
    pub fn new(store: Arc<TenantStore>, config: VectorIndexConfig) -> Self {
        VectorRegistry { store, config, indexes: Mutex::new(HashMap::new()) }
    }

    pub fn index_for(&self, schema_fqn: &str, field: &str) -> CResult<Arc<VectorIndex>> {
        let key = (schema_fqn.to_string(), field.to_string());
        if let Some(existing) = self.indexes.lock().get(&key) {
            return Ok(existing.clone());
        }
        let vectors = self.load_rows(schema_fqn, field)?;
        let index = Arc::new(VectorIndex::from_checkpoint(self.config, vectors)?);
        Ok(self.indexes.lock().entry(key).or_insert(index).clone())
    }

    pub fn upsert(&self, schema_fqn: &str, field: &str, id: Id, vector: Vec<f32>) -> CResult<()> {
        let index = self.index_for(schema_fqn, field)?;
        index.upsert(id, vector.clone())?;
        self.store.put(ColumnFamily::EmbeddingsMeta, &self.row_key(schema_fqn, field, id), encode_vector(&vector))
    }

    pub fn remove(&self, schema_fqn: &str, field: &str, id: Id) -> CResult<bool> {
        let index = self.index_for(schema_fqn, field)?;
        let removed = index.remove(id)?;
        if removed {
            self.store.delete(ColumnFamily::EmbeddingsMeta, &self.row_key(schema_fqn, field, id))?;
        }
        Ok(removed)
    }

    pub fn search(&self, schema_fqn: &str, field: &str, query: &[f32], k: usize, ef_search: usize) -> CResult<Vec<SearchHit>> {
        self.index_for(schema_fqn, field)?.search(query, k, ef_search)
    }

    /// Rebuilds the in-memory graph from scratch (§4.5 `build`). The
    /// persisted rows are already the source of truth, so no re-write to
    /// `embeddings_meta` is needed.
    pub fn build(&self, schema_fqn: &str, field: &str) -> CResult<()> {
        self.index_for(schema_fqn, field)?.build()
    }

    fn row_key(&self, schema_fqn: &str, field: &str, id: Id) -> Vec<u8> {
        keys::compose(
            self.store.tenant(),
            &[ColumnFamily::EmbeddingsMeta.file_stem().as_bytes(), schema_fqn.as_bytes(), field.as_bytes(), id.as_bytes().as_slice()],
        )
    }

    fn load_rows(&self, schema_fqn: &str, field: &str) -> CResult<BTreeMap<Id, Vec<f32>>> {
        let prefix = keys::compose(
            self.store.tenant(),
            &[ColumnFamily::EmbeddingsMeta.file_stem().as_bytes(), schema_fqn.as_bytes(), field.as_bytes()],
        );
        let rows = self.store.scan_prefix(ColumnFamily::EmbeddingsMeta, &prefix)?;
        let mut vectors = BTreeMap::new();
        for (key, value) in rows {
            let suffix = key[prefix.len()..]
                .strip_prefix(&[TENANT_SEPARATOR])
                .ok_or_else(|| Error::corruption("embedding row key missing separator before id"))?;
            if suffix.len() != 16 {
                return Err(Error::corruption("embedding row key's id is not 16 bytes"));
            }
            let mut id_bytes = [0u8; 16];
            id_bytes.copy_from_slice(suffix);
            vectors.insert(Id(id_bytes), decode_vector(&value)?);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use remdb_core::tenant::TenantId;

    fn id(seed: &str) -> Id {
        Id::from_canonical_bytes(seed.as_bytes())
    }

    #[test]
    fn upsert_persists_and_reopening_reloads_it() {
        let tenant = TenantId::new("acme").unwrap();
        let store = Arc::new(TenantStore::open_in_memory(tenant));
        let registry = VectorRegistry::new(store.clone(), VectorIndexConfig::default());
        registry.upsert("demo.article", "body", id("a"), vec![1.0, 0.0, 0.0]).unwrap();

        let reopened = VectorRegistry::new(store, VectorIndexConfig::default());
        let hits = reopened.search("demo.article", "body", &[1.0, 0.0, 0.0], 1, 64).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id("a"));
    }

    #[test]
    fn remove_deletes_the_persisted_row() {
        let tenant = TenantId::new("acme").unwrap();
        let store = Arc::new(TenantStore::open_in_memory(tenant));
        let registry = VectorRegistry::new(store.clone(), VectorIndexConfig::default());
        registry.upsert("demo.article", "body", id("a"), vec![1.0, 0.0, 0.0]).unwrap();
        assert!(registry.remove("demo.article", "body", id("a")).unwrap());

        let reopened = VectorRegistry::new(store, VectorIndexConfig::default());
        let hits = reopened.search("demo.article", "body", &[1.0, 0.0, 0.0], 5, 64).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn different_fields_do_not_share_an_index() {
        let tenant = TenantId::new("acme").unwrap();
        let store = Arc::new(TenantStore::open_in_memory(tenant));
        let registry = VectorRegistry::new(store, VectorIndexConfig::default());
        registry.upsert("demo.article", "title", id("a"), vec![1.0, 0.0]).unwrap();
        registry.upsert("demo.article", "body", id("b"), vec![0.0, 1.0, 0.0]).unwrap();

        let title_hits = registry.search("demo.article", "title", &[1.0, 0.0], 5, 64).unwrap();
        assert_eq!(title_hits.len(), 1);
        assert_eq!(title_hits[0].id, id("a"));
    }
}
