//! Tenant identity: the unit of isolation everything else is keyed by.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CResult, Error};

/// The byte guaranteed never to occur inside a [`TenantId`], used as the
/// separator between the tenant prefix and the column-family-specific key
/// suffix (§4.1).
pub const TENANT_SEPARATOR: u8 = 0x1F;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(raw: impl Into<String>) -> CResult<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(Error::query_invalid("tenant id must not be empty"));
        }
        if raw.as_bytes().contains(&TENANT_SEPARATOR) {
            return Err(Error::query_invalid(
                "tenant id must not contain the 0x1F separator byte",
            ));
        }
        Ok(TenantId(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_empty() {
        assert!(TenantId::new("").is_err());
    }

    #[test]
    fn rejects_separator_byte() {
        let bad = String::from_utf8(vec![b'a', TENANT_SEPARATOR, b'b']).unwrap();
        assert!(TenantId::new(bad).is_err());
    }

    #[test]
    fn accepts_normal_id() {
        assert!(TenantId::new("acme-corp").is_ok());
    }
}
