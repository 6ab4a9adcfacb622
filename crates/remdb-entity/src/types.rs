//! The entity record (§3 "Entity", "Moment", "Resource") and the
//! `FileResource` parse-job state machine (§6 "Parse job handoff").

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use remdb_core::error::{CResult, Error};
use remdb_core::id::Id;
use remdb_core::tenant::TenantId;
use remdb_core::value::Value;
use serde_derive::{Deserialize, Serialize};

/// Entities, Resources and Moments are one struct distinguished by `kind`
/// rather than a trait hierarchy: all three share identity, indexing and
/// embedding machinery, and differ only in which fields their schema
/// requires (`occurred_at`/`refers_to` for moments, `content`/`uri` for
/// resources).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Entity,
    Resource,
    Moment,
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entity" => Ok(EntityKind::Entity),
            "resource" => Ok(EntityKind::Resource),
            "moment" => Ok(EntityKind::Moment),
            other => Err(Error::corruption(format!("'{other}' is not a valid entity kind"))),
        }
    }
}

/// A record valid against some schema at a specific version (§3 "Entity").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: Id,
    pub tenant_id: TenantId,
    pub schema_fqn: String,
    pub schema_version: u32,
    pub kind: EntityKind,
    pub fields: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when an embedding field's vector failed to insert at write time;
    /// cleared once a background worker reprocesses the row (§4.5 "Failure
    /// semantics"). The query engine treats a pending row as invisible to
    /// vector search but visible to predicate-only queries.
    pub embedding_pending: bool,
}

/// `FileResource.status` (§6): a resource's journey from registration
/// through parsing to ingestion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseStatus {
    Registered,
    Parsing,
    Parsed,
    Ingested,
    Failed,
}

impl ParseStatus {
    pub const FIELD_NAME: &'static str = "status";

    /// The legal forward transitions, plus `Failed -> Registered` for a
    /// retry. Any other pair (including skipping a state) is rejected.
    pub fn can_transition_to(self, next: ParseStatus) -> bool {
        use ParseStatus::*;
        matches!(
            (self, next),
            (Registered, Registered)
                | (Registered, Parsing)
                | (Parsing, Parsing)
                | (Parsing, Parsed)
                | (Parsing, Failed)
                | (Parsed, Parsed)
                | (Parsed, Ingested)
                | (Parsed, Failed)
                | (Ingested, Ingested)
                | (Failed, Failed)
                | (Failed, Registered)
        )
    }
}

impl fmt::Display for ParseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParseStatus::Registered => "registered",
            ParseStatus::Parsing => "parsing",
            ParseStatus::Parsed => "parsed",
            ParseStatus::Ingested => "ingested",
            ParseStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for ParseStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered" => Ok(ParseStatus::Registered),
            "parsing" => Ok(ParseStatus::Parsing),
            "parsed" => Ok(ParseStatus::Parsed),
            "ingested" => Ok(ParseStatus::Ingested),
            "failed" => Ok(ParseStatus::Failed),
            other => Err(Error::schema_mismatch(format!("'{other}' is not a valid parse status"))),
        }
    }
}

/// Validates a `status` field transition during insert/update. A brand-new
/// entity (`current = None`) may start at any status; an existing one must
/// move along a legal edge of the state machine.
pub fn validate_status_transition(current: Option<ParseStatus>, next: ParseStatus) -> CResult<()> {
    match current {
        None => Ok(()),
        Some(current) if current.can_transition_to(next) => Ok(()),
        Some(current) => Err(Error::schema_mismatch(format!(
            "illegal parse status transition {current} -> {next}"
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn entity_kind_from_str_round_trips_with_kind_name() {
        for (kind, name) in [
            (EntityKind::Entity, "entity"),
            (EntityKind::Resource, "resource"),
            (EntityKind::Moment, "moment"),
        ] {
            assert_eq!(name.parse::<EntityKind>().unwrap(), kind);
            assert_eq!(crate::store::kind_name(kind), name);
        }
    }

    #[test]
    fn unknown_entity_kind_is_rejected() {
        assert!("bogus".parse::<EntityKind>().is_err());
    }

    #[test]
    fn display_and_from_str_round_trip() {
        for s in [
            ParseStatus::Registered,
            ParseStatus::Parsing,
            ParseStatus::Parsed,
            ParseStatus::Ingested,
            ParseStatus::Failed,
        ] {
            assert_eq!(s.to_string().parse::<ParseStatus>().unwrap(), s);
        }
    }

    #[test]
    fn forward_transitions_are_legal() {
        assert!(validate_status_transition(Some(ParseStatus::Registered), ParseStatus::Parsing).is_ok());
        assert!(validate_status_transition(Some(ParseStatus::Parsing), ParseStatus::Parsed).is_ok());
        assert!(validate_status_transition(Some(ParseStatus::Parsed), ParseStatus::Ingested).is_ok());
    }

    #[test]
    fn retry_from_failed_to_registered_is_legal() {
        assert!(validate_status_transition(Some(ParseStatus::Failed), ParseStatus::Registered).is_ok());
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let err = validate_status_transition(Some(ParseStatus::Registered), ParseStatus::Ingested).unwrap_err();
        assert_eq!(err.kind(), remdb_core::error::Kind::SchemaMismatch);
    }

    #[test]
    fn ingested_is_terminal() {
        assert!(validate_status_transition(Some(ParseStatus::Ingested), ParseStatus::Registered).is_err());
    }

    #[test]
    fn new_entity_may_start_at_any_status() {
        assert!(validate_status_transition(None, ParseStatus::Parsed).is_ok());
    }
}
