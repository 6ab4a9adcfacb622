//! A batch of writes to be applied atomically across one or more column
//! families by [`crate::store::TenantStore::commit`].

use crate::cf::ColumnFamily;

enum Op {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// A set of writes collected by a caller, then committed together. All
/// writes in a batch either all land or none do, and readers never observe
/// a partially-applied batch (see [`crate::store::TenantStore::commit`]).
#[derive(Default)]
pub struct WriteBatch {
    ops: Vec<(ColumnFamily, Op)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, cf: ColumnFamily, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push((cf, Op::Put(key.into(), value.into())));
        self
    }

    pub fn delete(&mut self, cf: ColumnFamily, key: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push((cf, Op::Delete(key.into())));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// The distinct column families touched by this batch, in a fixed
    /// (enum declaration) order, so callers lock them consistently.
    pub(crate) fn touched_cfs(&self) -> Vec<ColumnFamily> {
        let mut cfs: Vec<ColumnFamily> = self.ops.iter().map(|(cf, _)| *cf).collect();
        cfs.sort();
        cfs.dedup();
        cfs
    }

    pub(crate) fn into_ops(self) -> Vec<(ColumnFamily, Vec<u8>, Option<Vec<u8>>)> {
        self.ops
            .into_iter()
            .map(|(cf, op)| match op {
                Op::Put(k, v) => (cf, k, Some(v)),
                Op::Delete(k) => (cf, k, None),
            })
            .collect()
    }
}
