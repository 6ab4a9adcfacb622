//! The schema registry (§4.3): `register`, `get`, `list`, `resolve_short`.
//!
//! Stored under the `schemas` column family keyed by `fqn|version`, with an
//! in-memory LRU of resolved schemas — registrations are rare and lookups
//! frequent, so the cache is sized for read-heavy workloads rather than
//! evicting on every write.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use remdb_core::error::{CResult, Error};
use remdb_core::tenant::TenantId;
use remdb_kv::cf::ColumnFamily;
use remdb_kv::store::TenantStore;

use crate::types::{storage_key, Schema};
use crate::validate::{validate_schema, validate_short_name};

const DEFAULT_CACHE_CAPACITY: usize = 256;

pub struct Registry {
    store: std::sync::Arc<TenantStore>,
    cache: Mutex<LruCache<(String, u32), Schema>>,
}

impl Registry {
    pub fn new(store: std::sync::Arc<TenantStore>) -> Self {
        Self::with_capacity(store, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(store: std::sync::Arc<TenantStore>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Registry { store, cache: Mutex::new(LruCache::new(capacity)) }
    }

    /// Registers a new schema version. Errors with `AlreadyExists` if the
    /// exact `(fqn, version)` is already stored (schemas are immutable once
    /// published), `SchemaMismatch` if the schema fails §4.3 validation or
    /// its short name is already claimed by a different fqn.
    pub fn register(&self, schema: Schema) -> CResult<()> {
        validate_schema(&schema)?;

        if self.get(&schema.fqn, schema.version)?.is_some() {
            return Err(Error::already_exists(format!(
                "schema {} version {} already registered",
                schema.fqn, schema.version
            )));
        }

        if let Some(existing_fqn) = self.resolve_short(&schema.short_name)? {
            if existing_fqn != schema.fqn {
                return Err(Error::schema_mismatch(format!(
                    "short name '{}' is already claimed by schema '{}'",
                    schema.short_name, existing_fqn
                )));
            }
        }

        let key = schema.storage_key();
        let value = serde_json::to_vec(&schema)?;

        self.store.put(ColumnFamily::Schemas, &key, value)?;
        self.store.put(
            ColumnFamily::Schemas,
            format!("short|{}", schema.short_name).as_bytes(),
            schema.fqn.clone().into_bytes(),
        )?;
        self.cache.lock().put((schema.fqn.clone(), schema.version), schema);
        Ok(())
    }

    pub fn get(&self, fqn: &str, version: u32) -> CResult<Option<Schema>> {
        if let Some(schema) = self.cache.lock().get(&(fqn.to_string(), version)) {
            return Ok(Some(schema.clone()));
        }
        let key = storage_key(fqn, version);
        match self.store.get(ColumnFamily::Schemas, &key)? {
            Some(bytes) => {
                let schema: Schema = serde_json::from_slice(&bytes)?;
                self.cache.lock().put((fqn.to_string(), version), schema.clone());
                Ok(Some(schema))
            }
            None => Ok(None),
        }
    }

    /// The latest (highest) registered version of `fqn`, if any.
    pub fn get_latest(&self, fqn: &str) -> CResult<Option<Schema>> {
        let prefix = format!("{fqn}|");
        let rows = self.store.scan_prefix(ColumnFamily::Schemas, prefix.as_bytes())?;
        let mut latest: Option<Schema> = None;
        for (_, value) in rows {
            let schema: Schema = serde_json::from_slice(&value)?;
            if latest.as_ref().map_or(true, |l| schema.version > l.version) {
                latest = Some(schema);
            }
        }
        Ok(latest)
    }

    pub fn list(&self) -> CResult<Vec<Schema>> {
        let rows = self.store.scan_prefix(ColumnFamily::Schemas, b"")?;
        let mut schemas = Vec::new();
        for (key, value) in rows {
            if key.starts_with(b"short|") {
                continue;
            }
            schemas.push(serde_json::from_slice(&value)?);
        }
        Ok(schemas)
    }

    pub fn resolve_short(&self, short_name: &str) -> CResult<Option<String>> {
        validate_short_name(short_name)?;
        let key = format!("short|{short_name}");
        match self.store.get(ColumnFamily::Schemas, key.as_bytes())? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            None => Ok(None),
        }
    }
}
