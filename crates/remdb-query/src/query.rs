//! The `Query` request shape (§4.7).

use remdb_core::tenant::TenantId;
use serde_derive::{Deserialize, Serialize};

use crate::predicate::Predicate;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub tenant: TenantId,
    pub schema: String,
    pub predicate: Predicate,
    pub order_by: Option<(String, SortDirection)>,
    pub limit: usize,
    pub offset: usize,
}

impl Query {
    pub fn new(tenant: TenantId, schema: impl Into<String>, predicate: Predicate) -> Self {
        Query { tenant, schema: schema.into(), predicate, order_by: None, limit: usize::MAX, offset: 0 }
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}
