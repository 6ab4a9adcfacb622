//! The dynamic, schema-typed value that every entity field is stored as.
//!
//! Keeping this as one tagged type (rather than one Rust type per schema
//! field kind) is what lets canonicalization and hashing live in a single
//! place, per the "Dynamic values" design note: whoever hashes or indexes a
//! record never needs to know which schema produced it.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// A schema-typed, JSON-like value.
///
/// `Object` uses a `BTreeMap` rather than `HashMap`/`IndexMap` so that key
/// order falls out of the type itself: canonical JSON's "object keys sorted
/// lexicographically" requirement needs no separate sort pass.
// `Timestamp` must be tried before `String`: both serialize to a JSON
// string, and an untagged enum's `Deserialize` tries variants in
// declaration order, keeping the first one that doesn't error. `String`'s
// deserialize never errors on a JSON string, so if it came first every
// `Timestamp` would silently decode back as `String` on the very next
// round trip through storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Timestamp(DateTime<Utc>),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_empty_text(&self) -> bool {
        matches!(self, Value::Null) || matches!(self, Value::String(s) if s.trim().is_empty())
    }

    /// True if this value is a bare scalar (the kinds schema key fields and
    /// indexed fields are restricted to per §4.3).
    pub fn is_scalar(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Timestamp(_))
    }

    /// NFC-normalizes every string reachable from this value. Applied before
    /// hashing/canonical-JSON encoding so that two byte-distinct but
    /// Unicode-equivalent inputs hash identically.
    pub fn normalize_nfc(&mut self) {
        match self {
            Value::String(s) => *s = s.nfc().collect(),
            Value::Array(items) => items.iter_mut().for_each(Value::normalize_nfc),
            Value::Object(map) => map.values_mut().for_each(Value::normalize_nfc),
            _ => {}
        }
    }

    /// Writes this value as canonical JSON: sorted object keys, no
    /// insignificant whitespace, NFC-normalized strings, shortest
    /// round-trippable numbers, RFC3339 UTC-second-precision millisecond
    /// timestamps.
    pub fn write_canonical(&self, out: &mut String) {
        match self {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Number(n) => out.push_str(&canonical_number(*n)),
            Value::String(s) => write_json_string(&s.nfc().collect::<String>(), out),
            Value::Timestamp(t) => write_json_string(&canonical_timestamp(*t), out),
            Value::Binary(bytes) => write_json_string(&hex::encode(bytes), out),
            Value::Array(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    item.write_canonical(out);
                }
                out.push(']');
            }
            Value::Object(map) => {
                // `BTreeMap` orders by raw key bytes, which need not match the
                // sort order of the NFC-normalized form, so re-sort after
                // normalizing rather than trusting the map's own iteration.
                let mut entries: Vec<(String, &Value)> =
                    map.iter().map(|(k, v)| (k.nfc().collect::<String>(), v)).collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                out.push('{');
                for (i, (key, val)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_json_string(key, out);
                    out.push(':');
                    val.write_canonical(out);
                }
                out.push('}');
            }
        }
    }

    pub fn to_canonical_string(&self) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out);
        out
    }

    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        self.to_canonical_string().into_bytes()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

/// Shortest round-trippable decimal for a number, per §6 "Canonical JSON".
/// Integral floats render without a fractional part so `1.0` and `1` hash
/// identically, matching how most source JSON encodes whole numbers.
fn canonical_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        let mut s = format!("{n}");
        if !s.contains('.') && !s.contains('e') && !s.contains('E') {
            s.push_str(".0");
        }
        s
    }
}

/// RFC3339, UTC, millisecond precision: `YYYY-MM-DDTHH:MM:SS.sssZ`.
pub fn canonical_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Case-folds to NFKC then lowercases — the canonicalization §4.4 requires
/// for string-typed secondary index keys.
pub fn fold_case_nfkc_lower(s: &str) -> String {
    s.nfkc().collect::<String>().to_lowercase()
}

/// Big-endian, sign-extended two's-complement fixed-width encoding used for
/// numeric secondary index keys, so lexicographic byte order matches
/// numeric order.
pub fn canonical_number_key(n: f64) -> [u8; 8] {
    // Map f64 total order onto a sign-and-magnitude bit pattern that sorts
    // correctly as unsigned bytes: flip the sign bit for positives, flip
    // every bit for negatives.
    let bits = n.to_bits();
    let mapped = if n.is_sign_negative() { !bits } else { bits | (1u64 << 63) };
    mapped.to_be_bytes()
}

fn write_json_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn object_keys_are_sorted_in_canonical_form() {
        let mut a = BTreeMap::new();
        a.insert("b".to_string(), Value::Number(2.0));
        a.insert("a".to_string(), Value::Number(1.0));
        let v = Value::Object(a);
        assert_eq!(v.to_canonical_string(), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn differently_ordered_json_canonicalizes_identically() {
        let v1: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let v2: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        assert_eq!(v1.to_canonical_string(), v2.to_canonical_string());
    }

    #[test]
    fn integral_floats_render_without_fraction() {
        assert_eq!(canonical_number(4.0), "4");
        assert_eq!(canonical_number(4.5), "4.5");
    }

    #[test]
    fn number_key_preserves_ordering() {
        let neg = canonical_number_key(-5.0);
        let zero = canonical_number_key(0.0);
        let pos = canonical_number_key(5.0);
        assert!(neg < zero);
        assert!(zero < pos);
    }

    #[test]
    fn nfkc_lower_folds_case_and_width() {
        assert_eq!(fold_case_nfkc_lower("ACTIVE"), "active");
    }

    #[test]
    fn object_keys_with_equivalent_unicode_forms_canonicalize_identically() {
        // "e\u{0301}" (decomposed) vs "\u{00e9}" (composed) are the same
        // string under NFC but different byte sequences, and fall on
        // opposite sides of "f" in raw-byte order despite normalizing equal.
        let mut composed = BTreeMap::new();
        composed.insert("\u{00e9}".to_string(), Value::Number(1.0));
        composed.insert("f".to_string(), Value::Number(2.0));

        let mut decomposed = BTreeMap::new();
        decomposed.insert("e\u{0301}".to_string(), Value::Number(1.0));
        decomposed.insert("f".to_string(), Value::Number(2.0));

        assert_eq!(Value::Object(composed).to_canonical_string(), Value::Object(decomposed).to_canonical_string());
    }
}
