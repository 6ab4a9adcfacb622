//! A purely in-memory column family engine, adapted from `kv_rs::storage::memory::Memory`.
//! Used by [`crate::store::TenantStore::open_in_memory`] for tests that don't need
//! a data directory on disk.

use std::collections::BTreeMap;
use std::ops::Bound;

use remdb_core::error::CResult;

use crate::engine::Engine;

#[derive(Default)]
pub struct Memory {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for Memory {
    fn get(&mut self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> CResult<()> {
        self.data.insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> CResult<()> {
        self.data.remove(key);
        Ok(())
    }

    fn scan_range(
        &mut self,
        start: Bound<Vec<u8>>,
        end: Bound<Vec<u8>>,
    ) -> CResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self.data.range((start, end)).map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn flush(&mut self) -> CResult<()> {
        Ok(())
    }

    fn len(&mut self) -> CResult<u64> {
        Ok(self.data.len() as u64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn point_ops() -> CResult<()> {
        let mut m = Memory::new();
        assert_eq!(m.get(b"a")?, None);
        m.set(b"a", vec![1])?;
        assert_eq!(m.get(b"a")?, Some(vec![1]));
        m.delete(b"a")?;
        assert_eq!(m.get(b"a")?, None);
        Ok(())
    }
}
