//! A directory-level `LOCK` file, one per `(tenant_id, data_dir)` (§4.9).
//!
//! `remdb_kv::log::Log` already takes an exclusive `fs4` lock on every
//! column family's own log file, so two processes can never interleave
//! writes to the same CF. This lock exists one level up: it fails fast,
//! before any CF is even opened, with a single clear error naming the
//! tenant rather than whichever CF happened to open first.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::FileExt;
use remdb_core::error::{CResult, Error};

pub struct DirLock {
    path: PathBuf,
    file: File,
}

impl DirLock {
    /// Takes an exclusive lock on `<tenant_dir>/LOCK`, creating the
    /// directory and file if needed. `Error::transient` (retryable) if
    /// another process already holds it — unlike a corrupt CF log, this is
    /// "try again once the other process exits," not a data problem.
    pub fn acquire(tenant_dir: &Path) -> CResult<Self> {
        std::fs::create_dir_all(tenant_dir)?;
        let path = tenant_dir.join("LOCK");
        let file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        file.try_lock_exclusive().map_err(|_| {
            Error::transient(format!("database at {} is already open by another process", tenant_dir.display()))
        })?;
        Ok(DirLock { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = fs4::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn acquiring_twice_from_the_same_process_fails() {
        let dir = tempfile::tempdir().unwrap();
        let _first = DirLock::acquire(dir.path()).unwrap();
        let err = DirLock::acquire(dir.path()).unwrap_err();
        assert_eq!(err.kind(), remdb_core::error::Kind::Transient);
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _lock = DirLock::acquire(dir.path()).unwrap();
        }
        let _again = DirLock::acquire(dir.path()).unwrap();
    }

    #[test]
    fn lock_file_is_created_inside_the_tenant_dir() {
        let dir = tempfile::tempdir().unwrap();
        let lock = DirLock::acquire(dir.path()).unwrap();
        assert!(lock.path().exists());
    }
}
