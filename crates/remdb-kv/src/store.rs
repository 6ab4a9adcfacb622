//! A single tenant's multi-column-family key/value store (§4.1).
//!
//! Each tenant's data lives in its own directory, with one append-only log
//! per [`ColumnFamily`] — physical isolation between tenants falls directly
//! out of this layout, rather than being enforced by key prefixing. Writes
//! across column families are made atomic by [`TenantStore::commit`], which
//! locks every touched CF (in a fixed order, to avoid deadlocks between
//! concurrent batches) before applying any of the batch's operations.

use std::collections::HashMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use remdb_core::error::{CResult, Error};
use remdb_core::tenant::TenantId;

use crate::batch::WriteBatch;
use crate::cask::Cask;
use crate::cf::ColumnFamily;
use crate::engine::Engine;
use crate::memory::Memory;

pub struct TenantStore {
    tenant: TenantId,
    engines: HashMap<ColumnFamily, Mutex<Box<dyn Engine>>>,
}

impl TenantStore {
    /// Opens (or creates) the on-disk store for `tenant` under `data_dir`,
    /// taking out an exclusive lock on every column family's log file.
    pub fn open(data_dir: &Path, tenant: TenantId) -> CResult<Self> {
        Self::open_with(data_dir, tenant, &|_cf, engine| engine)
    }

    /// Like [`TenantStore::open`], but `wrap` gets a chance to decorate each
    /// column family's base engine before it's boxed in — the seam
    /// `remdb-db` uses to layer transparent encryption-at-rest (§4.2) over
    /// the plain `Cask` engines without this crate knowing `remdb-crypto`
    /// exists.
    pub fn open_with(
        data_dir: &Path,
        tenant: TenantId,
        wrap: &dyn Fn(ColumnFamily, Box<dyn Engine>) -> Box<dyn Engine>,
    ) -> CResult<Self> {
        let tenant_dir = data_dir.join(tenant.as_str());
        let mut engines = HashMap::with_capacity(ColumnFamily::ALL.len());
        for cf in ColumnFamily::ALL {
            let path = tenant_dir.join(format!("{}.log", cf.file_stem()));
            let cask = Cask::open(path)?;
            engines.insert(cf, Mutex::new(wrap(cf, Box::new(cask))));
        }
        Ok(Self { tenant, engines })
    }

    /// An in-memory store for tests, with no data directory or file locks.
    pub fn open_in_memory(tenant: TenantId) -> Self {
        Self::open_in_memory_with(tenant, &|_cf, engine| engine)
    }

    /// Like [`TenantStore::open_in_memory`], but with the same wrapping seam
    /// as [`TenantStore::open_with`] — used by `remdb-db`'s encrypted-store
    /// tests to exercise the wrapping without touching disk.
    pub fn open_in_memory_with(tenant: TenantId, wrap: &dyn Fn(ColumnFamily, Box<dyn Engine>) -> Box<dyn Engine>) -> Self {
        let mut engines = HashMap::with_capacity(ColumnFamily::ALL.len());
        for cf in ColumnFamily::ALL {
            engines.insert(cf, Mutex::new(wrap(cf, Box::new(Memory::new()))));
        }
        Self { tenant, engines }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Errors with `TenantMismatch` unless `tenant` is the tenant this store
    /// was opened for. Callers in higher layers use this to refuse to apply
    /// an entity, edge, or query against the wrong tenant's store.
    pub fn check_tenant(&self, tenant: &TenantId) -> CResult<()> {
        if tenant == &self.tenant {
            Ok(())
        } else {
            Err(Error::tenant_mismatch(format!(
                "store is for tenant {} but operation named tenant {}",
                self.tenant, tenant
            )))
        }
    }

    fn engine(&self, cf: ColumnFamily) -> &Mutex<Box<dyn Engine>> {
        self.engines.get(&cf).expect("every ColumnFamily has an engine")
    }

    pub fn get(&self, cf: ColumnFamily, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        self.engine(cf).lock().get(key)
    }

    pub fn put(&self, cf: ColumnFamily, key: &[u8], value: Vec<u8>) -> CResult<()> {
        self.engine(cf).lock().set(key, value)
    }

    pub fn delete(&self, cf: ColumnFamily, key: &[u8]) -> CResult<()> {
        self.engine(cf).lock().delete(key)
    }

    pub fn scan_prefix(&self, cf: ColumnFamily, prefix: &[u8]) -> CResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.engine(cf).lock().scan_prefix(prefix)
    }

    /// Iterates over an arbitrary ordered range of a column family, e.g. a
    /// `wal` pull by `log_seq_no` range where the key isn't a simple prefix
    /// match.
    pub fn scan_range(&self, cf: ColumnFamily, start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> CResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.engine(cf).lock().scan_range(start, end)
    }

    pub fn len(&self, cf: ColumnFamily) -> CResult<u64> {
        self.engine(cf).lock().len()
    }

    /// Applies every write in `batch`, locking each touched column family
    /// once (in a fixed order) so no other writer can interleave a write
    /// into any of them, then flushes the touched logs. A reader taking the
    /// same per-CF lock after this returns never sees a partial batch.
    pub fn commit(&self, batch: WriteBatch) -> CResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let touched = batch.touched_cfs();
        let mut guards: Vec<_> = touched.iter().map(|cf| self.engine(*cf).lock()).collect();

        for (cf, key, value) in batch.into_ops() {
            let idx = touched.iter().position(|c| *c == cf).expect("op's cf was recorded in touched_cfs");
            match value {
                Some(value) => guards[idx].set(&key, value)?,
                None => guards[idx].delete(&key)?,
            }
        }
        for guard in guards.iter_mut() {
            guard.flush()?;
        }
        Ok(())
    }

    pub fn data_dir(data_root: &Path, tenant: &TenantId) -> PathBuf {
        data_root.join(tenant.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn tenant(name: &str) -> TenantId {
        TenantId::new(name).unwrap()
    }

    #[test]
    fn point_ops_roundtrip_on_disk() -> CResult<()> {
        let dir = tempfile::tempdir().unwrap();
        let store = TenantStore::open(dir.path(), tenant("acme"))?;

        store.put(ColumnFamily::Entities, b"e1", b"v1".to_vec())?;
        assert_eq!(store.get(ColumnFamily::Entities, b"e1")?, Some(b"v1".to_vec()));
        store.delete(ColumnFamily::Entities, b"e1")?;
        assert_eq!(store.get(ColumnFamily::Entities, b"e1")?, None);
        Ok(())
    }

    #[test]
    fn reopen_recovers_state() -> CResult<()> {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = TenantStore::open(dir.path(), tenant("acme"))?;
            store.put(ColumnFamily::Entities, b"e1", b"v1".to_vec())?;
        }
        let store = TenantStore::open(dir.path(), tenant("acme"))?;
        assert_eq!(store.get(ColumnFamily::Entities, b"e1")?, Some(b"v1".to_vec()));
        Ok(())
    }

    #[test]
    fn commit_applies_writes_across_column_families_atomically() -> CResult<()> {
        let store = TenantStore::open_in_memory(tenant("acme"));
        let mut batch = WriteBatch::new();
        batch.put(ColumnFamily::Entities, b"e1".to_vec(), b"v1".to_vec());
        batch.put(ColumnFamily::Indexes, b"idx1".to_vec(), b"e1".to_vec());
        store.commit(batch)?;

        assert_eq!(store.get(ColumnFamily::Entities, b"e1")?, Some(b"v1".to_vec()));
        assert_eq!(store.get(ColumnFamily::Indexes, b"idx1")?, Some(b"e1".to_vec()));
        Ok(())
    }

    #[test]
    fn open_in_memory_with_applies_the_wrapper_to_every_cf() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        struct CountingEngine {
            inner: Box<dyn Engine>,
            sets: Arc<AtomicUsize>,
        }
        impl Engine for CountingEngine {
            fn get(&mut self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
                self.inner.get(key)
            }
            fn set(&mut self, key: &[u8], value: Vec<u8>) -> CResult<()> {
                self.sets.fetch_add(1, Ordering::Relaxed);
                self.inner.set(key, value)
            }
            fn delete(&mut self, key: &[u8]) -> CResult<()> {
                self.inner.delete(key)
            }
            fn scan_range(&mut self, start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> CResult<Vec<(Vec<u8>, Vec<u8>)>> {
                self.inner.scan_range(start, end)
            }
            fn flush(&mut self) -> CResult<()> {
                self.inner.flush()
            }
            fn len(&mut self) -> CResult<u64> {
                self.inner.len()
            }
        }

        let sets = Arc::new(AtomicUsize::new(0));
        let wrapped = sets.clone();
        let store = TenantStore::open_in_memory_with(tenant("acme"), &move |_cf, inner| {
            Box::new(CountingEngine { inner, sets: wrapped.clone() }) as Box<dyn Engine>
        });
        store.put(ColumnFamily::Entities, b"e1", b"v1".to_vec()).unwrap();
        assert_eq!(sets.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn check_tenant_rejects_foreign_tenant() {
        let store = TenantStore::open_in_memory(tenant("acme"));
        let err = store.check_tenant(&tenant("other")).unwrap_err();
        assert_eq!(err.kind(), remdb_core::error::Kind::TenantMismatch);
    }
}
