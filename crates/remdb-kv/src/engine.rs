//! A single column family's key/value storage engine, where both keys and
//! values are arbitrary byte strings stored in lexicographical key order.
//!
//! Adapted from `kv_rs::storage::engine::Engine`: trimmed to the operations
//! column-family stores actually need ([`TenantStore`](crate::store::TenantStore)
//! owns one engine per CF) and made object-safe so a [`crate::store::TenantStore`]
//! can hold a `Box<dyn Engine>` per CF regardless of whether it is backed by
//! disk or memory.

use std::ops::Bound;

use remdb_core::error::CResult;

pub trait Engine: Send {
    /// Gets a value for a key, if it exists.
    fn get(&mut self, key: &[u8]) -> CResult<Option<Vec<u8>>>;

    /// Sets a value for a key, replacing the existing value if any.
    fn set(&mut self, key: &[u8], value: Vec<u8>) -> CResult<()>;

    /// Deletes a key, or does nothing if it does not exist.
    fn delete(&mut self, key: &[u8]) -> CResult<()>;

    /// Iterates over an ordered range of key/value pairs.
    fn scan_range(
        &mut self,
        start: Bound<Vec<u8>>,
        end: Bound<Vec<u8>>,
    ) -> CResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Flushes any buffered data to the underlying storage medium.
    fn flush(&mut self) -> CResult<()>;

    /// The number of live keys in the engine.
    fn len(&mut self) -> CResult<u64>;

    /// Iterates over all key/value pairs starting with `prefix`.
    fn scan_prefix(&mut self, prefix: &[u8]) -> CResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let start = Bound::Included(prefix.to_vec());
        let end = match prefix.iter().rposition(|b| *b != 0xff) {
            Some(i) => Bound::Excluded(
                prefix.iter().take(i).copied().chain(std::iter::once(prefix[i] + 1)).collect(),
            ),
            None => Bound::Unbounded,
        };
        self.scan_range(start, end)
    }
}
