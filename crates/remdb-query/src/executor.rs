//! Executes a [`Plan`] against the entity/index/vector stores, applying the
//! residual predicate in memory (§4.7 "Residual predicates ... are
//! evaluated in memory after deserialization").

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::ops::Bound;

use remdb_core::error::CResult;
use remdb_core::id::Id;
use remdb_core::value::Value;
use remdb_entity::index::{entities_prefix, id_from_row_key, index_field_prefix, index_value_prefix, moment_time_range_bounds};
use remdb_entity::{Entity, EntityStore};
use remdb_kv::cf::ColumnFamily;
use remdb_kv::store::TenantStore;
use remdb_schema::Schema;
use remdb_vector::registry::VectorRegistry;

use crate::planner::{Plan, Source};
use crate::predicate::Predicate;
use crate::query::SortDirection;

pub fn execute(
    entities: &EntityStore,
    store: &TenantStore,
    vectors: &VectorRegistry,
    schema: &Schema,
    plan: &Plan,
) -> CResult<Vec<Entity>> {
    let is_vector = matches!(plan.source, Source::Vector { .. });

    let mut rows = match &plan.source {
        Source::Vector { field, query_vec, top_k, min_score } => {
            execute_vector(entities, vectors, schema, field, query_vec, *top_k, *min_score, plan.limit)?
        }
        Source::IndexEq { field, value } => {
            let prefix = index_value_prefix(store.tenant(), &schema.fqn, field, value)?;
            fetch_by_index_prefix(entities, store, &schema.fqn, &prefix)?
        }
        Source::IndexIn { field, values } => {
            let mut ids = BTreeSet::new();
            for value in values {
                let prefix = index_value_prefix(store.tenant(), &schema.fqn, field, value)?;
                collect_ids(store, ColumnFamily::Indexes, &prefix, &mut ids)?;
            }
            fetch_ids(entities, &schema.fqn, ids)?
        }
        Source::IndexRange { field } => {
            let prefix = index_field_prefix(store.tenant(), &schema.fqn, field);
            fetch_by_index_prefix(entities, store, &schema.fqn, &prefix)?
        }
        Source::MomentTime { start, end } => {
            let (lower, upper) = moment_time_range_bounds(store.tenant(), &schema.fqn, start, end);
            let rows = store.scan_range(ColumnFamily::MomentsTime, Bound::Included(lower), Bound::Included(upper))?;
            let mut ids = BTreeSet::new();
            for (key, _) in rows {
                ids.insert(id_from_row_key(&key)?);
            }
            fetch_ids(entities, &schema.fqn, ids)?
        }
        Source::FullScan => {
            let prefix = entities_prefix(store.tenant(), &schema.fqn);
            store
                .scan_prefix(ColumnFamily::Entities, &prefix)?
                .into_iter()
                .map(|(_, value)| Ok(serde_json::from_slice::<Entity>(&value)?))
                .collect::<CResult<Vec<_>>>()?
        }
    };

    rows.retain(|e| evaluate(&plan.residual, e));

    // A vector source is already ordered by ANN score (closest first, per
    // §4.7 step 1); re-sorting it by a requested `order_by` would throw that
    // away, so only non-vector sources honor it.
    if !is_vector {
        if let Some((field, direction)) = &plan.order_by {
            rows.sort_by(|a, b| compare_opt(a.fields.get(field), b.fields.get(field)).unwrap_or(Ordering::Equal));
            if *direction == SortDirection::Desc {
                rows.reverse();
            }
        }
    }

    Ok(rows.into_iter().skip(plan.offset).take(plan.limit).collect())
}

fn fetch_by_index_prefix(entities: &EntityStore, store: &TenantStore, schema_fqn: &str, prefix: &[u8]) -> CResult<Vec<Entity>> {
    let mut ids = BTreeSet::new();
    collect_ids(store, ColumnFamily::Indexes, prefix, &mut ids)?;
    fetch_ids(entities, schema_fqn, ids)
}

fn collect_ids(store: &TenantStore, cf: ColumnFamily, prefix: &[u8], ids: &mut BTreeSet<Id>) -> CResult<()> {
    for (key, _) in store.scan_prefix(cf, prefix)? {
        ids.insert(id_from_row_key(&key)?);
    }
    Ok(())
}

fn fetch_ids(entities: &EntityStore, schema_fqn: &str, ids: BTreeSet<Id>) -> CResult<Vec<Entity>> {
    let mut rows = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(entity) = entities.get(schema_fqn, id)? {
            rows.push(entity);
        }
    }
    Ok(rows)
}

/// `top_k' = max(2*top_k, limit*4)` candidates (§4.7 step 1), scored
/// ascending (closer first, per [`remdb_vector::types::SearchHit`]'s own
/// convention) and filtered against `min_score` by treating a cosine
/// distance score as `1.0 - similarity`.
fn execute_vector(
    entities: &EntityStore,
    vectors: &VectorRegistry,
    schema: &Schema,
    field: &str,
    query_vec: &[f32],
    top_k: usize,
    min_score: Option<f32>,
    limit: usize,
) -> CResult<Vec<Entity>> {
    let top_k_prime = (2 * top_k).max(limit.saturating_mul(4)).max(top_k).max(1);
    let ef_search = top_k_prime.max(64);
    let hits = vectors.search(&schema.fqn, field, query_vec, top_k_prime, ef_search)?;

    let mut rows = Vec::with_capacity(hits.len());
    for hit in hits {
        if let Some(min_score) = min_score {
            if 1.0 - hit.score < min_score {
                continue;
            }
        }
        if let Some(entity) = entities.get(&schema.fqn, hit.id)? {
            rows.push(entity);
        }
    }
    Ok(rows)
}

/// Re-checks `pred` against a fully materialized row. A `VectorSimilar`
/// node is always satisfied here — it already shaped which candidates made
/// it this far (via [`execute_vector`]'s own `min_score` filter), and there
/// is no generic way to "evaluate" a raw embedding field against a query
/// vector without the index's distance function.
fn evaluate(pred: &Predicate, entity: &Entity) -> bool {
    match pred {
        Predicate::Eq { field, value } => entity.fields.get(field) == Some(value),
        Predicate::Ne { field, value } => entity.fields.get(field) != Some(value),
        Predicate::Lt { field, value } => compare_opt(entity.fields.get(field), Some(value)) == Some(Ordering::Less),
        Predicate::Lte { field, value } => {
            matches!(compare_opt(entity.fields.get(field), Some(value)), Some(Ordering::Less | Ordering::Equal))
        }
        Predicate::Gt { field, value } => compare_opt(entity.fields.get(field), Some(value)) == Some(Ordering::Greater),
        Predicate::Gte { field, value } => {
            matches!(compare_opt(entity.fields.get(field), Some(value)), Some(Ordering::Greater | Ordering::Equal))
        }
        Predicate::In { field, values } => entity.fields.get(field).is_some_and(|v| values.contains(v)),
        Predicate::NotIn { field, values } => !entity.fields.get(field).is_some_and(|v| values.contains(v)),
        Predicate::Contains { field, value } => {
            entity.fields.get(field).and_then(Value::as_str).is_some_and(|s| s.contains(value.as_str()))
        }
        Predicate::StartsWith { field, value } => {
            entity.fields.get(field).and_then(Value::as_str).is_some_and(|s| s.starts_with(value.as_str()))
        }
        Predicate::EndsWith { field, value } => {
            entity.fields.get(field).and_then(Value::as_str).is_some_and(|s| s.ends_with(value.as_str()))
        }
        Predicate::Matches { field, pattern } => entity
            .fields
            .get(field)
            .and_then(Value::as_str)
            .zip(regex::Regex::new(pattern).ok())
            .is_some_and(|(s, re)| re.is_match(s)),
        Predicate::Exists { field } => entity.fields.get(field).is_some_and(|v| !matches!(v, Value::Null)),
        Predicate::NotExists { field } => !entity.fields.get(field).is_some_and(|v| !matches!(v, Value::Null)),
        Predicate::And { preds } => preds.iter().all(|p| evaluate(p, entity)),
        Predicate::Or { preds } => preds.iter().any(|p| evaluate(p, entity)),
        Predicate::Not { pred } => !evaluate(pred, entity),
        Predicate::VectorSimilar { .. } => true,
        Predicate::TimeRange { field, start, end } => {
            entity.fields.get(field).and_then(Value::as_timestamp).is_some_and(|t| t >= *start && t <= *end)
        }
        Predicate::AlwaysTrue => true,
        Predicate::AlwaysFalse => false,
    }
}

fn compare_opt(a: Option<&Value>, b: Option<&Value>) -> Option<Ordering> {
    match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b),
        (None, None) => Some(Ordering::Equal),
        (None, Some(_)) => Some(Ordering::Greater),
        (Some(_), None) => Some(Ordering::Less),
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Timestamp(x), Value::Timestamp(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::BTreeMap as Map;
    use std::sync::Arc;

    use remdb_core::tenant::TenantId;
    use remdb_entity::EntityKind;
    use remdb_schema::{FieldDef, FieldType, KeyField};
    use remdb_vector::VectorIndexConfig;
    use remdb_wal::WalSequencer;

    use crate::planner::plan;
    use crate::query::{Query, SortDirection};

    struct Fixture {
        entities: EntityStore,
        store: Arc<TenantStore>,
        vectors: VectorRegistry,
        schema: Schema,
    }

    fn fixture() -> Fixture {
        let tenant = TenantId::new("acme").unwrap();
        let store = Arc::new(TenantStore::open_in_memory(tenant.clone()));
        let wal = Arc::new(WalSequencer::new(tenant, 1));
        let entities = EntityStore::new(store.clone(), wal);
        let vectors = VectorRegistry::new(store.clone(), VectorIndexConfig::default());
        let schema = Schema {
            fqn: "demo.article".to_string(),
            version: 1,
            short_name: "article".to_string(),
            fields: vec![
                FieldDef { name: "slug".to_string(), field_type: FieldType::Text },
                FieldDef { name: "status".to_string(), field_type: FieldType::Text },
                FieldDef { name: "views".to_string(), field_type: FieldType::Number },
                FieldDef { name: "embedding".to_string(), field_type: FieldType::Array },
            ],
            key_field: KeyField::Single("slug".to_string()),
            indexed_fields: vec!["status".to_string(), "views".to_string()],
            embedding_fields: vec!["slug".to_string()],
            default_embedding_provider: None,
            mcp_refs: vec![],
            indexed_cardinality: Map::from([("status".to_string(), 2)]),
        };
        Fixture { entities, store, vectors, schema }
    }

    fn fields(slug: &str, status: &str, views: f64) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("slug".to_string(), Value::String(slug.to_string()));
        m.insert("status".to_string(), Value::String(status.to_string()));
        m.insert("views".to_string(), Value::Number(views));
        m
    }

    #[test]
    fn eq_via_index_returns_only_matching_rows() {
        let f = fixture();
        f.entities.insert(&f.schema, EntityKind::Entity, fields("a", "active", 1.0)).unwrap();
        f.entities.insert(&f.schema, EntityKind::Entity, fields("b", "archived", 2.0)).unwrap();

        let q = Query::new(f.store.tenant().clone(), "demo.article", Predicate::Eq {
            field: "status".into(),
            value: Value::String("active".into()),
        });
        let p = plan(&f.schema, &q, 10, 1_000).unwrap();
        let rows = execute(&f.entities, &f.store, &f.vectors, &f.schema, &p).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields.get("slug").unwrap().as_str(), Some("a"));
    }

    #[test]
    fn index_probe_is_case_insensitive_but_residual_still_requires_exact_match() {
        let f = fixture();
        f.entities.insert(&f.schema, EntityKind::Entity, fields("a", "Active", 1.0)).unwrap();

        let q = Query::new(f.store.tenant().clone(), "demo.article", Predicate::Eq {
            field: "status".into(),
            value: Value::String("active".into()),
        });
        let p = plan(&f.schema, &q, 10, 1_000).unwrap();
        let rows = execute(&f.entities, &f.store, &f.vectors, &f.schema, &p).unwrap();

        assert!(rows.is_empty(), "stored value 'Active' must not match an exact eq for 'active'");
    }

    #[test]
    fn and_over_indexed_and_unindexed_fields_narrows_correctly() {
        let f = fixture();
        f.entities.insert(&f.schema, EntityKind::Entity, fields("a", "active", 1.0)).unwrap();
        f.entities.insert(&f.schema, EntityKind::Entity, fields("b", "active", 2.0)).unwrap();

        let q = Query::new(
            f.store.tenant().clone(),
            "demo.article",
            Predicate::And {
                preds: vec![
                    Predicate::Eq { field: "status".into(), value: Value::String("active".into()) },
                    Predicate::Gt { field: "views".into(), value: Value::Number(1.0) },
                ],
            },
        );
        let p = plan(&f.schema, &q, 10, 1_000).unwrap();
        let rows = execute(&f.entities, &f.store, &f.vectors, &f.schema, &p).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields.get("slug").unwrap().as_str(), Some("b"));
    }

    #[test]
    fn order_by_and_limit_offset_apply_after_filtering() {
        let f = fixture();
        f.entities.insert(&f.schema, EntityKind::Entity, fields("a", "active", 3.0)).unwrap();
        f.entities.insert(&f.schema, EntityKind::Entity, fields("b", "active", 1.0)).unwrap();
        f.entities.insert(&f.schema, EntityKind::Entity, fields("c", "active", 2.0)).unwrap();

        let mut q = Query::new(
            f.store.tenant().clone(),
            "demo.article",
            Predicate::Eq { field: "status".into(), value: Value::String("active".into()) },
        );
        q = q.order_by("views", SortDirection::Asc).limit(2);
        let p = plan(&f.schema, &q, 10, 1_000).unwrap();
        let rows = execute(&f.entities, &f.store, &f.vectors, &f.schema, &p).unwrap();

        let slugs: Vec<_> = rows.iter().map(|e| e.fields.get("slug").unwrap().as_str().unwrap()).collect();
        assert_eq!(slugs, vec!["b", "c"]);
    }

    #[test]
    fn moment_time_range_uses_the_dedicated_index() {
        let f = fixture();
        let moment_schema = Schema {
            fqn: "demo.event".to_string(),
            key_field: KeyField::None,
            fields: vec![
                FieldDef { name: "occurred_at".to_string(), field_type: FieldType::Timestamp },
                FieldDef { name: "label".to_string(), field_type: FieldType::Text },
            ],
            indexed_fields: vec![],
            ..f.schema.clone()
        };

        let mut early = Map::new();
        early.insert("occurred_at".to_string(), Value::Timestamp("2024-01-01T00:00:00Z".parse().unwrap()));
        early.insert("label".to_string(), Value::String("early".into()));
        f.entities.insert(&moment_schema, EntityKind::Moment, early).unwrap();

        let mut late = Map::new();
        late.insert("occurred_at".to_string(), Value::Timestamp("2024-06-01T00:00:00Z".parse().unwrap()));
        late.insert("label".to_string(), Value::String("late".into()));
        f.entities.insert(&moment_schema, EntityKind::Moment, late).unwrap();

        let q = Query::new(
            f.store.tenant().clone(),
            "demo.event",
            Predicate::TimeRange {
                field: "occurred_at".into(),
                start: "2023-12-31T00:00:00Z".parse().unwrap(),
                end: "2024-03-01T00:00:00Z".parse().unwrap(),
            },
        );
        let p = plan(&moment_schema, &q, 10, 1_000).unwrap();
        assert!(matches!(p.source, Source::MomentTime { .. }));
        let rows = execute(&f.entities, &f.store, &f.vectors, &moment_schema, &p).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields.get("label").unwrap().as_str(), Some("early"));
    }

    #[test]
    fn vector_search_combines_with_a_residual_filter() {
        let f = fixture();
        let id_a = f.entities.insert(&f.schema, EntityKind::Entity, fields("a", "active", 1.0)).unwrap();
        let id_b = f.entities.insert(&f.schema, EntityKind::Entity, fields("b", "archived", 2.0)).unwrap();
        f.vectors.upsert("demo.article", "embedding", id_a, vec![1.0, 0.0]).unwrap();
        f.vectors.upsert("demo.article", "embedding", id_b, vec![1.0, 0.0]).unwrap();

        let q = Query::new(
            f.store.tenant().clone(),
            "demo.article",
            Predicate::And {
                preds: vec![
                    Predicate::VectorSimilar { field: "embedding".into(), query: vec![1.0, 0.0], top_k: 5, min_score: None },
                    Predicate::Eq { field: "status".into(), value: Value::String("active".into()) },
                ],
            },
        );
        let p = plan(&f.schema, &q.limit(5), 10, 1_000).unwrap();
        let rows = execute(&f.entities, &f.store, &f.vectors, &f.schema, &p).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields.get("slug").unwrap().as_str(), Some("a"));
    }
}
