//! The predicate AST (§4.7) and its JSON wire form (§6 "Predicate wire
//! form"). Grounded on `risingwave`'s `catalog::table_catalog` for treating
//! a predicate as a plain serializable tree rather than a parsed grammar —
//! the wire form in §6 already *is* the surface syntax, so no separate
//! textual parser is introduced.

use chrono::{DateTime, Utc};
use remdb_core::value::Value;
use serde_derive::{Deserialize, Serialize};

/// A query predicate. Tagged `op` on the wire (§6), matching the examples
/// there (`{"op":"eq",...}`, `{"op":"range",...}`) field-for-field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    Lt { field: String, value: Value },
    Lte { field: String, value: Value },
    Gt { field: String, value: Value },
    Gte { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    NotIn { field: String, values: Vec<Value> },
    Contains { field: String, value: String },
    StartsWith { field: String, value: String },
    EndsWith { field: String, value: String },
    Matches { field: String, pattern: String },
    Exists { field: String },
    NotExists { field: String },
    And { preds: Vec<Predicate> },
    Or { preds: Vec<Predicate> },
    Not { pred: Box<Predicate> },
    #[serde(rename = "vec")]
    VectorSimilar { field: String, query: Vec<f32>, top_k: usize, min_score: Option<f32> },
    /// Moments only (§4.7): callers only get the `moments_time` index speed-up
    /// when `field` is the schema's `occurred_at` field on records written as
    /// a `Moment`; against any other schema it still works, just as a
    /// residual filter after a full scan.
    #[serde(rename = "range")]
    TimeRange { field: String, start: DateTime<Utc>, end: DateTime<Utc> },
    AlwaysTrue,
    AlwaysFalse,
}

impl Predicate {
    /// Every field name this predicate (and its descendants) reads, in no
    /// particular order. Used by the planner to find an indexable field and
    /// by the executor to validate field names against the schema up front,
    /// so `UnknownField` is reported before any scan starts.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Eq { field, .. }
            | Predicate::Ne { field, .. }
            | Predicate::Lt { field, .. }
            | Predicate::Lte { field, .. }
            | Predicate::Gt { field, .. }
            | Predicate::Gte { field, .. }
            | Predicate::In { field, .. }
            | Predicate::NotIn { field, .. }
            | Predicate::Contains { field, .. }
            | Predicate::StartsWith { field, .. }
            | Predicate::EndsWith { field, .. }
            | Predicate::Matches { field, .. }
            | Predicate::Exists { field }
            | Predicate::NotExists { field }
            | Predicate::VectorSimilar { field, .. }
            | Predicate::TimeRange { field, .. } => out.push(field),
            Predicate::And { preds } | Predicate::Or { preds } => {
                preds.iter().for_each(|p| p.collect_fields(out))
            }
            Predicate::Not { pred } => pred.collect_fields(out),
            Predicate::AlwaysTrue | Predicate::AlwaysFalse => {}
        }
    }

    /// True if this predicate (anywhere in the tree) has a vector-similarity
    /// clause — the planner's first branch (§4.7 step 1) fires on this.
    pub fn has_vector_similar(&self) -> bool {
        match self {
            Predicate::VectorSimilar { .. } => true,
            Predicate::And { preds } | Predicate::Or { preds } => preds.iter().any(Predicate::has_vector_similar),
            Predicate::Not { pred } => pred.has_vector_similar(),
            _ => false,
        }
    }
}
