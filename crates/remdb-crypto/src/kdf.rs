//! HKDF-SHA256 key derivation (§4.2): every column family's encryption key
//! is derived from a tenant's master key rather than stored directly, so
//! compromising one CF's key never reveals another's.
//!
//! Grounded on `harborgrid-justin-caddy`'s `enterprise/crypto/kdf.rs`
//! (HKDF usage), simplified to the single scheme this spec needs: salt is
//! the tenant id, info is `<cf name> || <key version>`.

use hkdf::Hkdf;
use remdb_core::tenant::TenantId;
use sha2::Sha256;

use crate::key::{Key, KEY_LEN};

/// A tenant's root key, from which every column family's per-version key is
/// derived. Never written to disk directly; callers persist it wrapped by
/// an operator-held KMS key or similar, outside this crate's concern.
pub struct MasterKey(Key);

impl MasterKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        MasterKey(Key::new(bytes))
    }

    /// Generates a new random master key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut bytes);
        MasterKey::new(bytes)
    }
}

/// Derives the AEAD key for one (tenant, column family, key version).
/// `key_version` is folded into the HKDF info string so rotating the
/// version yields an unrelated key even though the master key is unchanged.
pub fn derive_cf_key(master: &MasterKey, tenant: &TenantId, cf_name: &str, key_version: u8) -> Key {
    let hk = Hkdf::<Sha256>::new(Some(tenant.as_bytes()), master.0.as_bytes());
    let mut info = Vec::with_capacity(cf_name.len() + 1);
    info.extend_from_slice(cf_name.as_bytes());
    info.push(key_version);

    let mut okm = [0u8; KEY_LEN];
    hk.expand(&info, &mut okm).expect("32 is a valid HKDF-SHA256 output length");
    Key::new(okm)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn same_inputs_derive_the_same_key() {
        let master = MasterKey::new([7u8; KEY_LEN]);
        let tenant = TenantId::new("acme").unwrap();
        let a = derive_cf_key(&master, &tenant, "entities", 1);
        let b = derive_cf_key(&master, &tenant, "entities", 1);
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn different_cfs_derive_different_keys() {
        let master = MasterKey::new([7u8; KEY_LEN]);
        let tenant = TenantId::new("acme").unwrap();
        let a = derive_cf_key(&master, &tenant, "entities", 1);
        let b = derive_cf_key(&master, &tenant, "indexes", 1);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn different_tenants_derive_different_keys() {
        let master = MasterKey::new([7u8; KEY_LEN]);
        let a = derive_cf_key(&master, &TenantId::new("acme").unwrap(), "entities", 1);
        let b = derive_cf_key(&master, &TenantId::new("globex").unwrap(), "entities", 1);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn rotating_key_version_derives_different_key() {
        let master = MasterKey::new([7u8; KEY_LEN]);
        let tenant = TenantId::new("acme").unwrap();
        let v1 = derive_cf_key(&master, &tenant, "entities", 1);
        let v2 = derive_cf_key(&master, &tenant, "entities", 2);
        assert_ne!(v1.as_bytes(), v2.as_bytes());
    }
}
