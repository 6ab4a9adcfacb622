//! Disk-backed column family storage, adapted from `kv_rs::storage::log_cask::LogCask`.
//!
//! A `Cask` writes key/value pairs to an append-only [`Log`], and keeps a
//! mapping of keys to file positions in memory (the keydir). All live keys
//! must fit in memory. Deletes write a tombstone. Unlike the original
//! LogCask, entries here carry a CRC32 checksum, so a corrupted entry is
//! surfaced as [`remdb_core::error::Kind::Corruption`] on `get` for that key
//! rather than silently returning wrong bytes, while unrelated keys stay
//! readable.

use std::collections::HashSet;
use std::ops::Bound;
use std::path::PathBuf;

use remdb_core::error::{CResult, Error};

use crate::engine::Engine;
use crate::log::{KeyDir, Log};

pub struct Cask {
    log: Log,
    keydir: KeyDir,
    corrupt: HashSet<Vec<u8>>,
}

impl Cask {
    /// Opens or creates a cask at the given file, taking out an exclusive lock.
    pub fn open(path: PathBuf) -> CResult<Self> {
        Self::open_with_lock(path, true)
    }

    pub fn open_with_lock(path: PathBuf, try_lock: bool) -> CResult<Self> {
        let mut log = Log::open_with_lock(path, try_lock)?;
        let recovered = log.build_keydir()?;
        Ok(Self { log, keydir: recovered.keydir, corrupt: recovered.corrupt })
    }

    /// Keys whose on-disk entry failed its checksum. They are absent from
    /// the keydir: `get` on one of these returns `Corruption`, not `None`.
    pub fn corrupt_keys(&self) -> impl Iterator<Item = &[u8]> {
        self.corrupt.iter().map(|k| k.as_slice())
    }

    pub fn disk_size(&self) -> CResult<u64> {
        self.log.disk_size()
    }
}

impl Engine for Cask {
    fn get(&mut self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        if self.corrupt.contains(key) {
            return Err(Error::corruption(format!(
                "checksum mismatch reading key {}",
                hex::encode(key)
            )));
        }
        match self.keydir.get(key) {
            Some((value_pos, value_len)) => Ok(Some(self.log.read_value(*value_pos, *value_len)?)),
            None => Ok(None),
        }
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> CResult<()> {
        let (pos, len) = self.log.append(key, Some(&value))?;
        let value_len = value.len() as u32;
        self.keydir.insert(key.to_vec(), (pos + len as u64 - value_len as u64 - 4, value_len));
        self.corrupt.remove(key);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> CResult<()> {
        self.log.append(key, None)?;
        self.keydir.remove(key);
        self.corrupt.remove(key);
        Ok(())
    }

    fn scan_range(
        &mut self,
        start: Bound<Vec<u8>>,
        end: Bound<Vec<u8>>,
    ) -> CResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let keys: Vec<Vec<u8>> = self.keydir.range((start, end)).map(|(k, _)| k.clone()).collect();
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if self.corrupt.contains(&key) {
                return Err(Error::corruption(format!(
                    "checksum mismatch reading key {}",
                    hex::encode(&key)
                )));
            }
            let (value_pos, value_len) = *self.keydir.get(&key).expect("key just collected from keydir");
            out.push((key, self.log.read_value(value_pos, value_len)?));
        }
        Ok(out)
    }

    fn flush(&mut self) -> CResult<()> {
        self.log.sync()
    }

    fn len(&mut self) -> CResult<u64> {
        Ok(self.keydir.len() as u64)
    }
}
