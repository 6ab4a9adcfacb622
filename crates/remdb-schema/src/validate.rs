//! Registration-time validation rules (§4.3).

use regex::Regex;
use remdb_core::error::{CResult, Error};
use std::sync::OnceLock;

use crate::types::{FieldType, KeyField, Schema};

const RESERVED_SHORT_NAMES: &[&str] = &["id", "tenant", "schema", "entity", "resource", "moment"];

fn fqn_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9]+(\.[a-z0-9]+)+$").expect("static regex is valid"))
}

pub fn validate_fqn(fqn: &str) -> CResult<()> {
    if !fqn_pattern().is_match(fqn) {
        return Err(Error::schema_mismatch(format!(
            "fqn '{fqn}' does not match [a-z0-9]+(.[a-z0-9]+)+"
        )));
    }
    Ok(())
}

pub fn validate_short_name(short_name: &str) -> CResult<()> {
    if short_name.is_empty() {
        return Err(Error::schema_mismatch("short name must not be empty"));
    }
    if RESERVED_SHORT_NAMES.contains(&short_name) {
        return Err(Error::schema_mismatch(format!("short name '{short_name}' is reserved")));
    }
    Ok(())
}

/// Validates one schema's internal consistency: field references, indexed
/// fields scalar-only, embedding fields text-only, key field scalar or a
/// composite of scalar fields. Does not check uniqueness of `fqn` or
/// `short_name` against the registry — callers that have registry access
/// do that separately (see `Registry::register`).
pub fn validate_schema(schema: &Schema) -> CResult<()> {
    validate_fqn(&schema.fqn)?;
    validate_short_name(&schema.short_name)?;

    for indexed in &schema.indexed_fields {
        let field = schema.field(indexed).ok_or_else(|| {
            Error::schema_mismatch(format!("indexed field '{indexed}' is not declared on the schema"))
        })?;
        if !field.field_type.is_scalar() {
            return Err(Error::schema_mismatch(format!(
                "indexed field '{indexed}' must be scalar, got {:?}",
                field.field_type
            )));
        }
    }

    for embedded in &schema.embedding_fields {
        let field = schema.field(embedded).ok_or_else(|| {
            Error::schema_mismatch(format!("embedding field '{embedded}' is not declared on the schema"))
        })?;
        if field.field_type != FieldType::Text {
            return Err(Error::schema_mismatch(format!(
                "embedding field '{embedded}' must be text, got {:?}",
                field.field_type
            )));
        }
    }

    match &schema.key_field {
        KeyField::None => {}
        KeyField::Single(name) => validate_key_component(schema, name)?,
        KeyField::Composite(names) => {
            if names.is_empty() {
                return Err(Error::schema_mismatch("composite key field must name at least one field"));
            }
            for name in names {
                validate_key_component(schema, name)?;
            }
        }
    }

    Ok(())
}

fn validate_key_component(schema: &Schema, name: &str) -> CResult<()> {
    let field = schema
        .field(name)
        .ok_or_else(|| Error::schema_mismatch(format!("key field '{name}' is not declared on the schema")))?;
    if !field.field_type.is_scalar() {
        return Err(Error::schema_mismatch(format!(
            "key field '{name}' must be scalar, got {:?}",
            field.field_type
        )));
    }
    Ok(())
}
