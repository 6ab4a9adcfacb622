//! The selectivity-aware planner (§4.7 "Planner"). Reduces a `Query` to a
//! single source operator plus the original predicate, which the executor
//! re-evaluates in full against every candidate row — this keeps the
//! planner's only job "pick where to start," never "decide what passes,"
//! so a wrong or stale source choice can only cost performance, never
//! correctness.
//!
//! Grounded on `risingwave`'s `catalog::table_catalog` indexed-column
//! metadata (the shape `Schema::indexed_cardinality` borrows) and
//! `ryancinsight-OxiDB`'s `query::executor` source-selection step (reduce a
//! predicate tree to "the one access path to start from," not a full
//! cost-based join planner — this system has no joins).

use remdb_core::error::{CResult, Error};
use remdb_core::value::Value;
use remdb_schema::Schema;

use crate::predicate::Predicate;
use crate::query::Query;

/// Where the executor should start reading from.
#[derive(Clone, Debug, PartialEq)]
pub enum Source {
    /// §4.7 step 1: a `VectorSimilar` clause anywhere in the predicate.
    Vector { field: String, query_vec: Vec<f32>, top_k: usize, min_score: Option<f32> },
    /// An exact-value probe against one indexed field's index rows.
    IndexEq { field: String, value: Value },
    /// A set of exact-value probes, unioned (§4.7 `In`).
    IndexIn { field: String, values: Vec<Value> },
    /// An ordered comparison on an indexed field: scans every value for
    /// that field (not just a bounded sub-range — see the design ledger for
    /// why), narrowed to the exact comparison by the residual predicate.
    IndexRange { field: String },
    /// A `TimeRange` on a `Moment` schema's `occurred_at`, served by the
    /// dedicated `moments_time` column family.
    MomentTime { start: chrono::DateTime<chrono::Utc>, end: chrono::DateTime<chrono::Utc> },
    /// No usable index; scan every row under this schema.
    FullScan,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Plan {
    pub source: Source,
    /// The query's full predicate, re-checked against every row the source
    /// yields. Never trimmed down from what the source already guarantees —
    /// see the module doc.
    pub residual: Predicate,
    pub order_by: Option<(String, crate::query::SortDirection)>,
    pub limit: usize,
    pub offset: usize,
}

/// `query_cell_budget`'s unit is "entities considered"; `estimate_rows` is
/// the planner's best guess at how many a chosen source will make it
/// consider, used only to reject a plan that would obviously blow the
/// budget with no index in play (§4.7 `QueryTooBroad`).
pub fn plan(schema: &Schema, query: &Query, total_rows_hint: u64, query_cell_budget: u64) -> CResult<Plan> {
    for field in query.predicate.referenced_fields() {
        if schema.field(field).is_none() && field != remdb_entity::index::MOMENT_TIME_FIELD {
            return Err(Error::query_invalid(format!("unknown field '{field}' for schema '{}'", schema.fqn)));
        }
    }
    validate_regexes(&query.predicate)?;

    let source = if query.predicate.has_vector_similar() {
        extract_vector_source(&query.predicate)?
    } else if let Some(source) = find_indexable_source(schema, &query.predicate) {
        source
    } else {
        if total_rows_hint > query_cell_budget {
            return Err(Error::query_too_broad(format!(
                "schema '{}' has ~{total_rows_hint} rows, no usable index for this predicate, budget is {query_cell_budget}",
                schema.fqn
            )));
        }
        Source::FullScan
    };

    Ok(Plan { source, residual: query.predicate.clone(), order_by: query.order_by.clone(), limit: query.limit, offset: query.offset })
}

fn validate_regexes(pred: &Predicate) -> CResult<()> {
    match pred {
        Predicate::Matches { pattern, .. } => regex::Regex::new(pattern)
            .map(|_| ())
            .map_err(|e| Error::query_invalid(format!("invalid regex '{pattern}': {e}"))),
        Predicate::And { preds } | Predicate::Or { preds } => preds.iter().try_for_each(validate_regexes),
        Predicate::Not { pred } => validate_regexes(pred),
        _ => Ok(()),
    }
}

/// Only supports a `VectorSimilar` that is either the whole predicate or a
/// direct conjunct of a (possibly nested) top-level `And` — the common
/// "similar to X, and status = active" shape §4.7 describes. A clause
/// buried inside an `Or`/`Not` has no single unambiguous candidate set to
/// seed the ANN search from, so it's rejected rather than guessed at.
fn extract_vector_source(pred: &Predicate) -> CResult<Source> {
    let mut found = Vec::new();
    collect_top_level_vector(pred, &mut found);
    match found.len() {
        1 => {
            let Predicate::VectorSimilar { field, query, top_k, min_score } = found[0].clone() else { unreachable!() };
            Ok(Source::Vector { field, query_vec: query, top_k, min_score })
        }
        0 => Err(Error::query_invalid(
            "predicate contains a vector-similarity clause nested inside `or`/`not`, which has no single seed for the ANN search",
        )),
        _ => Err(Error::query_invalid("predicate contains more than one vector-similarity clause")),
    }
}

fn collect_top_level_vector(pred: &Predicate, out: &mut Vec<Predicate>) {
    match pred {
        Predicate::VectorSimilar { .. } => out.push(pred.clone()),
        Predicate::And { preds } => preds.iter().for_each(|p| collect_top_level_vector(p, out)),
        _ => {}
    }
}

/// Flattens top-level `And` nodes and picks the most selective indexable
/// conjunct, per §4.7 "intersect multiple indexable predicates by smallest
/// estimated selectivity first": `indexed_cardinality` is read as "higher
/// cardinality, more selective," so the candidate with the highest hint
/// wins; an unindexed/unhinted field sorts last. The other conjuncts are
/// left in the residual, filtered in memory rather than via their own
/// index probe.
fn find_indexable_source(schema: &Schema, pred: &Predicate) -> Option<Source> {
    let mut conjuncts = Vec::new();
    flatten_and(pred, &mut conjuncts);

    conjuncts
        .into_iter()
        .filter_map(|p| indexable_source(schema, p))
        .max_by_key(|(_, selectivity)| *selectivity)
        .map(|(source, _)| source)
}

fn flatten_and<'a>(pred: &'a Predicate, out: &mut Vec<&'a Predicate>) {
    match pred {
        Predicate::And { preds } => preds.iter().for_each(|p| flatten_and(p, out)),
        other => out.push(other),
    }
}

fn indexable_source(schema: &Schema, pred: &Predicate) -> Option<(Source, u64)> {
    match pred {
        Predicate::Eq { field, value } if schema.indexed_fields.contains(field) => {
            Some((Source::IndexEq { field: field.clone(), value: value.clone() }, cardinality(schema, field)))
        }
        Predicate::In { field, values } if schema.indexed_fields.contains(field) => {
            Some((Source::IndexIn { field: field.clone(), values: values.clone() }, cardinality(schema, field)))
        }
        Predicate::Lt { field, .. } | Predicate::Lte { field, .. } | Predicate::Gt { field, .. } | Predicate::Gte { field, .. }
            if schema.indexed_fields.contains(field) =>
        {
            Some((Source::IndexRange { field: field.clone() }, cardinality(schema, field)))
        }
        Predicate::TimeRange { field, start, end } if field == remdb_entity::index::MOMENT_TIME_FIELD => {
            Some((Source::MomentTime { start: *start, end: *end }, u64::MAX))
        }
        _ => None,
    }
}

fn cardinality(schema: &Schema, field: &str) -> u64 {
    schema.indexed_cardinality.get(field).copied().unwrap_or(0)
}

#[cfg(test)]
mod test {
    use super::*;
    use remdb_core::tenant::TenantId;
    use remdb_schema::{FieldDef, FieldType, KeyField};
    use std::collections::BTreeMap;

    fn schema() -> Schema {
        Schema {
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
            embedding_fields: vec![],
            default_embedding_provider: None,
            mcp_refs: vec![],
            indexed_cardinality: BTreeMap::from([("status".to_string(), 5), ("views".to_string(), 10_000)]),
        }
    }

    fn query(pred: Predicate) -> Query {
        Query::new(TenantId::new("acme").unwrap(), "demo.article", pred)
    }

    #[test]
    fn vector_clause_always_wins_the_source() {
        let q = query(Predicate::And {
            preds: vec![
                Predicate::Eq { field: "status".into(), value: Value::String("active".into()) },
                Predicate::VectorSimilar { field: "embedding".into(), query: vec![0.1], top_k: 5, min_score: None },
            ],
        });
        let p = plan(&schema(), &q, 1_000_000, 1_000).unwrap();
        assert!(matches!(p.source, Source::Vector { .. }));
    }

    #[test]
    fn the_more_selective_indexed_conjunct_is_chosen() {
        let q = query(Predicate::And {
            preds: vec![
                Predicate::Eq { field: "status".into(), value: Value::String("active".into()) },
                Predicate::Gt { field: "views".into(), value: Value::Number(10.0) },
            ],
        });
        let p = plan(&schema(), &q, 1_000_000, 1_000).unwrap();
        assert!(matches!(p.source, Source::IndexRange { field } if field == "views"));
    }

    #[test]
    fn unindexed_eq_falls_back_to_full_scan_under_budget() {
        let q = query(Predicate::Eq { field: "slug".into(), value: Value::String("hello".into()) });
        let p = plan(&schema(), &q, 10, 1_000).unwrap();
        assert_eq!(p.source, Source::FullScan);
    }

    #[test]
    fn an_unindexed_predicate_over_budget_is_query_too_broad() {
        let q = query(Predicate::Eq { field: "slug".into(), value: Value::String("hello".into()) });
        let err = plan(&schema(), &q, 1_000_000, 1_000).unwrap_err();
        assert_eq!(err.kind(), remdb_core::error::Kind::QueryTooBroad);
    }

    #[test]
    fn unknown_field_is_rejected_before_any_scan() {
        let q = query(Predicate::Eq { field: "bogus".into(), value: Value::String("x".into()) });
        let err = plan(&schema(), &q, 10, 1_000).unwrap_err();
        assert_eq!(err.kind(), remdb_core::error::Kind::QueryInvalid);
    }

    #[test]
    fn invalid_regex_is_rejected_up_front() {
        let q = query(Predicate::Matches { field: "slug".into(), pattern: "(".into() });
        let err = plan(&schema(), &q, 10, 1_000).unwrap_err();
        assert_eq!(err.kind(), remdb_core::error::Kind::QueryInvalid);
    }

    #[test]
    fn vector_nested_under_or_is_rejected() {
        let q = query(Predicate::Or {
            preds: vec![
                Predicate::VectorSimilar { field: "embedding".into(), query: vec![0.1], top_k: 5, min_score: None },
                Predicate::Eq { field: "status".into(), value: Value::String("active".into()) },
            ],
        });
        let err = plan(&schema(), &q, 10, 1_000).unwrap_err();
        assert_eq!(err.kind(), remdb_core::error::Kind::QueryInvalid);
    }
}
