//! Wraps a [`remdb_kv::engine::Engine`] so every value it stores is sealed
//! under one (tenant, column family) [`KeyRing`] before it ever reaches
//! disk (§4.2). This is the composition point `remdb-db` uses to turn a
//! plain `Cask`/`Memory` engine into an encrypted one — `remdb-kv` itself
//! never depends on this crate, it just exposes the wrapping seam
//! (`TenantStore::open_with`) that `EncryptingEngine` plugs into.

use std::ops::Bound;
use std::sync::Arc;

use parking_lot::Mutex;
use remdb_core::error::CResult;
use remdb_core::tenant::TenantId;
use remdb_kv::engine::Engine;

use crate::keyring::KeyRing;

/// Encrypts/decrypts every value passing through `inner`, keyed by
/// `tenant || cf_name || row key` as the AEAD associated data (§4.2
/// "Associated data = tenant_id ‖ cf ‖ key"), so a sealed value can't be
/// replayed under a different key or row without failing authentication.
pub struct EncryptingEngine {
    inner: Box<dyn Engine>,
    keyring: Arc<Mutex<KeyRing>>,
    tenant: TenantId,
    cf_name: &'static str,
}

impl EncryptingEngine {
    pub fn new(inner: Box<dyn Engine>, keyring: Arc<Mutex<KeyRing>>, tenant: TenantId, cf_name: &'static str) -> Self {
        EncryptingEngine { inner, keyring, tenant, cf_name }
    }

    fn aad(&self, key: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.tenant.as_bytes().len() + self.cf_name.len() + key.len());
        out.extend_from_slice(self.tenant.as_bytes());
        out.extend_from_slice(self.cf_name.as_bytes());
        out.extend_from_slice(key);
        out
    }
}

impl Engine for EncryptingEngine {
    fn get(&mut self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        match self.inner.get(key)? {
            Some(sealed) => {
                let aad = self.aad(key);
                Ok(Some(self.keyring.lock().open(&sealed, &aad)?))
            }
            None => Ok(None),
        }
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> CResult<()> {
        let aad = self.aad(key);
        let sealed = self.keyring.lock().seal(&value, &aad)?;
        self.inner.set(key, sealed)
    }

    fn delete(&mut self, key: &[u8]) -> CResult<()> {
        self.inner.delete(key)
    }

    fn scan_range(&mut self, start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> CResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let rows = self.inner.scan_range(start, end)?;
        let mut out = Vec::with_capacity(rows.len());
        for (key, sealed) in rows {
            let aad = self.aad(&key);
            let plain = self.keyring.lock().open(&sealed, &aad)?;
            out.push((key, plain));
        }
        Ok(out)
    }

    fn flush(&mut self) -> CResult<()> {
        self.inner.flush()
    }

    fn len(&mut self) -> CResult<u64> {
        self.inner.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::kdf::MasterKey;
    use remdb_kv::memory::Memory;

    fn ring(tenant: &TenantId) -> Arc<Mutex<KeyRing>> {
        let master = MasterKey::generate();
        Arc::new(Mutex::new(KeyRing::new(&master, tenant.clone(), "entities")))
    }

    #[test]
    fn values_are_unreadable_from_the_inner_engine_directly() {
        let tenant = TenantId::new("acme").unwrap();
        let mut inner = Box::new(Memory::new());
        let mut encrypting =
            EncryptingEngine::new(Box::new(Memory::new()), ring(&tenant), tenant.clone(), "entities");

        encrypting.set(b"row-1", b"plaintext value".to_vec()).unwrap();
        assert_eq!(encrypting.get(b"row-1").unwrap(), Some(b"plaintext value".to_vec()));

        // the plaintext never touched a bare Memory engine that wasn't wrapped
        assert_eq!(inner.get(b"row-1").unwrap(), None);
    }

    #[test]
    fn scan_range_decrypts_every_row() {
        let tenant = TenantId::new("acme").unwrap();
        let keyring = ring(&tenant);
        let mut encrypting = EncryptingEngine::new(Box::new(Memory::new()), keyring, tenant, "entities");
        encrypting.set(b"a", b"one".to_vec()).unwrap();
        encrypting.set(b"b", b"two".to_vec()).unwrap();

        let rows = encrypting.scan_range(Bound::Unbounded, Bound::Unbounded).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|(k, v)| k == b"a" && v == b"one"));
        assert!(rows.iter().any(|(k, v)| k == b"b" && v == b"two"));
    }
}
