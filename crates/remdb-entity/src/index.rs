//! Secondary-index key composition and value canonicalization (§4.4 "Key
//! layout"). An index row's key is fully derivable from a live entity row,
//! so these helpers are the only place that needs to agree between writers
//! (insert/update/delete) and an offline `reindex` pass.

use chrono::{SecondsFormat, Utc};
use remdb_core::error::{CResult, Error};
use remdb_core::id::Id;
use remdb_core::keys;
use remdb_core::tenant::TenantId;
use remdb_core::value::{canonical_number_key, fold_case_nfkc_lower, Value};
use remdb_kv::cf::ColumnFamily;

/// Canonicalizes a scalar field value into the bytes used inside an index
/// key, per §4.4: strings case-fold to NFKC lower, numbers become a
/// sign-ordered fixed-width big-endian encoding, timestamps truncate to
/// second precision (index keys don't need millisecond resolution; entity
/// rows keep full precision).
pub fn canonical_index_value(value: &Value) -> CResult<Vec<u8>> {
    match value {
        Value::String(s) => Ok(fold_case_nfkc_lower(s).into_bytes()),
        Value::Number(n) => Ok(canonical_number_key(*n).to_vec()),
        Value::Bool(b) => Ok(vec![*b as u8]),
        Value::Timestamp(t) => Ok(t.to_rfc3339_opts(SecondsFormat::Secs, true).into_bytes()),
        other => Err(Error::schema_mismatch(format!(
            "field value {other:?} is not indexable (not a scalar)"
        ))),
    }
}

/// `indexes | schema_fqn | field | canonicalized_value | id` -> empty.
pub fn index_row_key(tenant: &TenantId, schema_fqn: &str, field: &str, value: &Value, id: Id) -> CResult<Vec<u8>> {
    let canon = canonical_index_value(value)?;
    Ok(keys::compose(
        tenant,
        &[
            ColumnFamily::Indexes.file_stem().as_bytes(),
            schema_fqn.as_bytes(),
            field.as_bytes(),
            canon.as_slice(),
            id.0.as_slice(),
        ],
    ))
}

/// The prefix every `index_row_key` for `(schema_fqn, field, value)` shares,
/// regardless of id — an exact-value index lookup (`Eq`/`In`'s per-value
/// probe) scans this.
pub fn index_value_prefix(tenant: &TenantId, schema_fqn: &str, field: &str, value: &Value) -> CResult<Vec<u8>> {
    let canon = canonical_index_value(value)?;
    Ok(keys::compose(
        tenant,
        &[ColumnFamily::Indexes.file_stem().as_bytes(), schema_fqn.as_bytes(), field.as_bytes(), canon.as_slice()],
    ))
}

/// The prefix every `index_row_key` for `(schema_fqn, field)` shares across
/// every value — an ordered-comparison predicate (`Lt`/`Gt`/range) scans
/// this whole span, since `canonical_index_value` keeps value byte order.
pub fn index_field_prefix(tenant: &TenantId, schema_fqn: &str, field: &str) -> Vec<u8> {
    keys::compose(tenant, &[ColumnFamily::Indexes.file_stem().as_bytes(), schema_fqn.as_bytes(), field.as_bytes()])
}

/// The prefix every entity row for `schema_fqn` shares, for a full-schema
/// scan when no predicate is indexable.
pub fn entities_prefix(tenant: &TenantId, schema_fqn: &str) -> Vec<u8> {
    keys::compose(tenant, &[ColumnFamily::Entities.file_stem().as_bytes(), schema_fqn.as_bytes()])
}

/// The prefix every `moment_time_key` row for `schema_fqn` shares.
pub fn moment_time_schema_prefix(tenant: &TenantId, schema_fqn: &str) -> Vec<u8> {
    keys::compose(tenant, &[ColumnFamily::MomentsTime.file_stem().as_bytes(), schema_fqn.as_bytes()])
}

/// Inclusive `[start, end]` key bounds over `moments_time` for one schema.
/// The upper bound appends a maximal 16-byte id so that rows whose
/// timestamp equals `end` (which always sort after the bare prefix, since
/// every real row has a trailing id) are still included.
pub fn moment_time_range_bounds(
    tenant: &TenantId,
    schema_fqn: &str,
    start: &chrono::DateTime<Utc>,
    end: &chrono::DateTime<Utc>,
) -> (Vec<u8>, Vec<u8>) {
    let lower = keys::compose(
        tenant,
        &[
            ColumnFamily::MomentsTime.file_stem().as_bytes(),
            schema_fqn.as_bytes(),
            start.to_rfc3339_opts(SecondsFormat::Millis, true).as_bytes(),
        ],
    );
    let mut upper = keys::compose(
        tenant,
        &[
            ColumnFamily::MomentsTime.file_stem().as_bytes(),
            schema_fqn.as_bytes(),
            end.to_rfc3339_opts(SecondsFormat::Millis, true).as_bytes(),
        ],
    );
    upper.push(remdb_core::tenant::TENANT_SEPARATOR);
    upper.extend_from_slice(&[0xFFu8; 16]);
    (lower, upper)
}

/// An index or moment-time row's trailing 16 bytes are always the entity id
/// it points at, regardless of what the preceding value bytes contain
/// (string values are NFKC-folded but not otherwise length-constrained).
pub fn id_from_row_key(key: &[u8]) -> CResult<Id> {
    if key.len() < 16 {
        return Err(Error::corruption("index row key shorter than a trailing id"));
    }
    let mut id = [0u8; 16];
    id.copy_from_slice(&key[key.len() - 16..]);
    Ok(Id(id))
}

/// The field every `Moment` entity carries its point-in-time on (§3
/// "Moments are indexed by time range in addition to the normal entity
/// indexes").
pub const MOMENT_TIME_FIELD: &str = "occurred_at";

/// `moments_time | schema_fqn | rfc3339(occurred_at) | id` -> empty. Kept at
/// millisecond precision (unlike a normal indexed field's truncated-to-second
/// form) since range scans over moments need to preserve insertion order for
/// events within the same second.
pub fn moment_time_key(tenant: &TenantId, schema_fqn: &str, occurred_at: &chrono::DateTime<Utc>, id: Id) -> Vec<u8> {
    keys::compose(
        tenant,
        &[
            ColumnFamily::MomentsTime.file_stem().as_bytes(),
            schema_fqn.as_bytes(),
            occurred_at.to_rfc3339_opts(SecondsFormat::Millis, true).as_bytes(),
            id.0.as_slice(),
        ],
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn string_values_fold_case() {
        assert_eq!(canonical_index_value(&Value::String("ACTIVE".into())).unwrap(), b"active".to_vec());
    }

    #[test]
    fn numbers_preserve_order() {
        let neg = canonical_index_value(&Value::Number(-1.0)).unwrap();
        let pos = canonical_index_value(&Value::Number(1.0)).unwrap();
        assert!(neg < pos);
    }

    #[test]
    fn non_scalar_values_are_rejected() {
        assert!(canonical_index_value(&Value::Array(vec![])).is_err());
    }

    #[test]
    fn index_keys_for_different_ids_share_the_same_prefix() {
        let tenant = TenantId::new("acme").unwrap();
        let a = Id::from_canonical_bytes(b"a");
        let b = Id::from_canonical_bytes(b"b");
        let ka = index_row_key(&tenant, "demo.article", "status", &Value::String("active".into()), a).unwrap();
        let kb = index_row_key(&tenant, "demo.article", "status", &Value::String("active".into()), b).unwrap();
        assert_ne!(ka, kb);
        assert!(ka.len() == kb.len());
    }

    #[test]
    fn index_value_prefix_is_a_prefix_of_the_full_row_key() {
        let tenant = TenantId::new("acme").unwrap();
        let id = Id::from_canonical_bytes(b"a");
        let full = index_row_key(&tenant, "demo.article", "status", &Value::String("active".into()), id).unwrap();
        let prefix = index_value_prefix(&tenant, "demo.article", "status", &Value::String("active".into())).unwrap();
        assert!(full.starts_with(&prefix));
        assert_eq!(id_from_row_key(&full).unwrap(), id);
    }

    #[test]
    fn index_field_prefix_covers_every_value() {
        let tenant = TenantId::new("acme").unwrap();
        let id = Id::from_canonical_bytes(b"a");
        let full = index_row_key(&tenant, "demo.article", "views", &Value::Number(3.0), id).unwrap();
        let field_prefix = index_field_prefix(&tenant, "demo.article", "views");
        assert!(full.starts_with(&field_prefix));
    }

    #[test]
    fn moment_time_range_bounds_include_rows_exactly_at_the_endpoints() {
        let tenant = TenantId::new("acme").unwrap();
        let id = Id::from_canonical_bytes(b"a");
        let start = "2024-01-01T00:00:00.000Z".parse().unwrap();
        let end = "2024-01-02T00:00:00.000Z".parse().unwrap();
        let at_start = moment_time_key(&tenant, "demo.moment", &start, id);
        let at_end = moment_time_key(&tenant, "demo.moment", &end, id);
        let (lower, upper) = moment_time_range_bounds(&tenant, "demo.moment", &start, &end);
        assert!(at_start.as_slice() >= lower.as_slice());
        assert!(at_end.as_slice() <= upper.as_slice());
    }
}
