//! Byte-key composition helpers shared by every component that writes into
//! the KV engine: `tenant_id | 0x1F | cf-specific suffix` (§4.1), with a
//! `0x1F`-delimited suffix for human-auditable multi-part keys.

use crate::tenant::{TenantId, TENANT_SEPARATOR};

/// Starts a key with the tenant prefix and separator.
pub fn tenant_prefix(tenant: &TenantId) -> Vec<u8> {
    let mut key = Vec::with_capacity(tenant.as_bytes().len() + 1);
    key.extend_from_slice(tenant.as_bytes());
    key.push(TENANT_SEPARATOR);
    key
}

/// Appends further `0x1F`-delimited segments after the tenant prefix.
pub fn compose(tenant: &TenantId, segments: &[&[u8]]) -> Vec<u8> {
    let mut key = tenant_prefix(tenant);
    for (i, seg) in segments.iter().enumerate() {
        if i > 0 {
            key.push(TENANT_SEPARATOR);
        }
        key.extend_from_slice(seg);
    }
    key
}

/// Verifies a raw key begins with the expected tenant's prefix, returning
/// the suffix bytes after the separator. Used to enforce the
/// `TenantMismatch` invariant (§4.1) whenever a key crosses a component
/// boundary.
pub fn strip_tenant_prefix<'a>(tenant: &TenantId, key: &'a [u8]) -> Option<&'a [u8]> {
    let prefix = tenant_prefix(tenant);
    key.strip_prefix(prefix.as_slice())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn compose_joins_with_separator() {
        let t = TenantId::new("acme").unwrap();
        let key = compose(&t, &[b"entities", b"demo.Article", b"abc"]);
        assert_eq!(key, b"acme\x1Fentities\x1Fdemo.Article\x1Fabc".to_vec());
    }

    #[test]
    fn strip_prefix_rejects_other_tenant() {
        let a = TenantId::new("acme").unwrap();
        let b = TenantId::new("globex").unwrap();
        let key = compose(&a, &[b"entities"]);
        assert!(strip_tenant_prefix(&b, &key).is_none());
        assert!(strip_tenant_prefix(&a, &key).is_some());
    }
}
