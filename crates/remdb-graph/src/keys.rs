//! Edge key composition and parsing (§4.6 "Edges are written to two CFs").
//!
//! Both directions use the same segment shape — `cf_stem | anchor_id | label
//! | other_id` — so a single pair of helpers covers `edges_fwd` and
//! `edges_rev`: the forward key anchors on `src`, the reverse key anchors on
//! `dst`, and scanning "every edge touching this id in this direction" is
//! the same prefix-scan either way.

use remdb_core::error::{CResult, Error};
use remdb_core::id::Id;
use remdb_core::keys;
use remdb_core::tenant::{TenantId, TENANT_SEPARATOR};
use remdb_kv::cf::ColumnFamily;

/// The full row key for one direction: `cf_stem | anchor | label | other`.
pub fn edge_key(tenant: &TenantId, cf: ColumnFamily, anchor: Id, label: &str, other: Id) -> Vec<u8> {
    keys::compose(
        tenant,
        &[cf.file_stem().as_bytes(), anchor.as_bytes().as_slice(), label.as_bytes(), other.as_bytes().as_slice()],
    )
}

/// The prefix that matches every edge anchored on `anchor` in `cf`,
/// regardless of label or the id at the other end.
pub fn anchor_prefix(tenant: &TenantId, cf: ColumnFamily, anchor: Id) -> Vec<u8> {
    keys::compose(tenant, &[cf.file_stem().as_bytes(), anchor.as_bytes().as_slice()])
}

/// Splits the `label | other` suffix off a row key once the `anchor_prefix`
/// part has been stripped. The label is whatever UTF-8 text sits between the
/// two `0x1F` separators; `other` is always the trailing 16 bytes, so it's
/// read positionally rather than by splitting (id bytes may themselves
/// contain `0x1F`).
pub fn split_label_and_other(suffix: &[u8]) -> CResult<(String, Id)> {
    let rest = suffix
        .strip_prefix(&[TENANT_SEPARATOR])
        .ok_or_else(|| Error::corruption("edge key missing separator after anchor id"))?;
    if rest.len() < 16 {
        return Err(Error::corruption("edge key suffix too short to hold a neighbour id"));
    }
    let (label_and_sep, other_bytes) = rest.split_at(rest.len() - 16);
    let label_bytes = label_and_sep
        .strip_suffix(&[TENANT_SEPARATOR])
        .ok_or_else(|| Error::corruption("edge key missing separator before neighbour id"))?;
    let label = String::from_utf8(label_bytes.to_vec())
        .map_err(|e| Error::corruption(format!("edge label is not valid UTF-8: {e}")))?;
    let mut other = [0u8; 16];
    other.copy_from_slice(other_bytes);
    Ok((label, Id(other)))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn anchor_prefix_is_a_byte_prefix_of_the_full_key() {
        let tenant = TenantId::new("acme").unwrap();
        let src = Id::from_canonical_bytes(b"src");
        let dst = Id::from_canonical_bytes(b"dst");
        let full = edge_key(&tenant, ColumnFamily::EdgesFwd, src, "knows", dst);
        let prefix = anchor_prefix(&tenant, ColumnFamily::EdgesFwd, src);
        assert!(full.starts_with(&prefix));
    }

    #[test]
    fn suffix_round_trips_label_and_neighbour() {
        let tenant = TenantId::new("acme").unwrap();
        let src = Id::from_canonical_bytes(b"src");
        let dst = Id::from_canonical_bytes(b"dst");
        let full = edge_key(&tenant, ColumnFamily::EdgesFwd, src, "knows", dst);
        let prefix = anchor_prefix(&tenant, ColumnFamily::EdgesFwd, src);
        let (label, other) = split_label_and_other(&full[prefix.len()..]).unwrap();
        assert_eq!(label, "knows");
        assert_eq!(other, dst);
    }
}
