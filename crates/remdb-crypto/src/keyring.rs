//! Per-(tenant, column family) keyring: holds the current key version's
//! [`Cipher`] for sealing, plus every still-known older version for opening
//! values written before the last rotation.

use std::collections::HashMap;

use remdb_core::error::{CResult, Error};
use remdb_core::tenant::TenantId;

use crate::aead::{peek_key_version, Cipher};
use crate::kdf::{derive_cf_key, MasterKey};

pub struct KeyRing {
    tenant: TenantId,
    cf_name: &'static str,
    current_version: u8,
    ciphers: HashMap<u8, Cipher>,
}

impl KeyRing {
    /// Builds a keyring with a single key version, freshly derived from
    /// `master`.
    pub fn new(master: &MasterKey, tenant: TenantId, cf_name: &'static str) -> Self {
        let key = derive_cf_key(master, &tenant, cf_name, 1);
        let mut ciphers = HashMap::new();
        ciphers.insert(1, Cipher::new(&key, 1));
        KeyRing { tenant, cf_name, current_version: 1, ciphers }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn current_version(&self) -> u8 {
        self.current_version
    }

    /// Derives and activates the next key version, keeping the previous
    /// version available for decrypting not-yet-rewritten rows.
    pub fn rotate(&mut self, master: &MasterKey) -> u8 {
        let next = self.current_version + 1;
        let key = derive_cf_key(master, &self.tenant, self.cf_name, next);
        self.ciphers.insert(next, Cipher::new(&key, next));
        self.current_version = next;
        next
    }

    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> CResult<Vec<u8>> {
        self.ciphers
            .get(&self.current_version)
            .expect("current_version always has a cipher")
            .seal(plaintext, aad)
    }

    /// Opens a value sealed under any key version this ring still holds.
    pub fn open(&self, sealed: &[u8], aad: &[u8]) -> CResult<Vec<u8>> {
        let version = peek_key_version(sealed)?;
        let cipher = self.ciphers.get(&version).ok_or_else(|| {
            Error::key_mismatch(format!(
                "no retained key for version {version} in column family {}",
                self.cf_name
            ))
        })?;
        cipher.open(sealed, aad)
    }

    /// Drops retained keys older than `keep_from_version`, so a completed
    /// re-encryption pass can shed superseded key material.
    pub fn forget_versions_before(&mut self, keep_from_version: u8) {
        self.ciphers.retain(|&version, _| version >= keep_from_version);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rotation_keeps_old_version_decryptable() {
        let master = MasterKey::generate();
        let tenant = TenantId::new("acme").unwrap();
        let mut ring = KeyRing::new(&master, tenant, "entities");

        let sealed_v1 = ring.seal(b"before rotation", b"row-1").unwrap();
        ring.rotate(&master);
        let sealed_v2 = ring.seal(b"after rotation", b"row-2").unwrap();

        assert_eq!(ring.open(&sealed_v1, b"row-1").unwrap(), b"before rotation");
        assert_eq!(ring.open(&sealed_v2, b"row-2").unwrap(), b"after rotation");
    }

    #[test]
    fn forgetting_old_versions_makes_them_unreadable() {
        let master = MasterKey::generate();
        let tenant = TenantId::new("acme").unwrap();
        let mut ring = KeyRing::new(&master, tenant, "entities");

        let sealed_v1 = ring.seal(b"data", b"row-1").unwrap();
        ring.rotate(&master);
        ring.forget_versions_before(2);

        let err = ring.open(&sealed_v1, b"row-1").unwrap_err();
        assert_eq!(err.kind(), remdb_core::error::Kind::KeyMismatch);
    }
}
