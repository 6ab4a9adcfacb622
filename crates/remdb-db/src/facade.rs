//! The database facade (§4.9): one `Database` handle per open tenant,
//! composing every store crate behind role enforcement, striped entity
//! locks, and WAL-driven replication publish.
//!
//! `remdb-entity`/`remdb-graph` each carry their own [`WalSequencer`] and
//! append their WAL entry atomically with the row they write, so neither
//! exposes the assigned `log_seq_no` back to a caller. [`Database::commit`]
//! resolves that: it brackets a write under `write_lock` (serializing every
//! writer against this tenant's single sequencer, matching the mutex
//! `WalSequencer` itself already holds only for the instant of assignment),
//! records `wal.peek_next()` before and after, and — since the range
//! `[before, after)` is exactly the set of entries the bracketed call just
//! produced — pulls and republishes them through [`ReplicationHub`] without
//! either store needing to hand back a sequence number at all.
//!
//! Schema registration doesn't go through a per-call `WalSequencer` at all
//! (`Registry::register` predates replication and just puts two rows
//! directly), so [`Database::register_schema`] drives the WAL append itself
//! rather than relying on the peek-before/peek-after trick.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use remdb_core::error::{CResult, Error};
use remdb_core::id::Id;
use remdb_core::tenant::TenantId;
use remdb_core::value::Value;
use remdb_crypto::{EncryptingEngine, KeyRing, MasterKey};
use remdb_entity::{Entity, EntityKind, EntityStore};
use remdb_graph::{Direction, Edge, GraphStore, TraversalStep};
use remdb_kv::cf::ColumnFamily;
use remdb_kv::engine::Engine;
use remdb_kv::store::TenantStore;
use remdb_query::{execute, plan, Query};
use remdb_schema::{Registry, Schema};
use remdb_vector::VectorRegistry;
use remdb_wal::{ReplicaCursor, ReplicationHub, WalEntry, WalOp, WalSequencer};

use crate::config::{DbConfig, Role};
use crate::lock::DirLock;

/// How many stripes the per-id write lock (§5) is split across. Indexed by
/// the id's first byte, which is uniform since every [`Id`] is a BLAKE3
/// digest truncated to 128 bits.
const ENTITY_LOCK_STRIPES: usize = 256;

pub struct Database {
    tenant: TenantId,
    config: DbConfig,
    store: Arc<TenantStore>,
    schemas: Arc<Registry>,
    entities: Arc<EntityStore>,
    graph: Arc<GraphStore>,
    vectors: Arc<VectorRegistry>,
    wal: Arc<WalSequencer>,
    cursor: ReplicaCursor,
    replication: Option<Arc<ReplicationHub>>,
    entity_locks: Vec<Mutex<()>>,
    write_lock: Mutex<()>,
    _dir_lock: Option<DirLock>,
    _keyrings: Vec<Arc<Mutex<KeyRing>>>,
}

impl Database {
    /// Opens (or creates) the on-disk database for `tenant` under
    /// `config.data_dir`, taking the directory-level [`DirLock`] before any
    /// column family is opened, and wrapping every column family's engine in
    /// [`EncryptingEngine`] when `config.encryption_key_path` is set.
    pub fn open(tenant: TenantId, config: DbConfig) -> CResult<Arc<Self>> {
        let tenant_dir = TenantStore::data_dir(&config.data_dir, &tenant);
        let dir_lock = DirLock::acquire(&tenant_dir)?;

        let (store, keyrings) = match &config.encryption_key_path {
            Some(key_path) => {
                let master = load_master_key(key_path)?;
                let mut rings: HashMap<ColumnFamily, Arc<Mutex<KeyRing>>> = HashMap::new();
                for cf in ColumnFamily::ALL {
                    rings.insert(cf, Arc::new(Mutex::new(KeyRing::new(&master, tenant.clone(), cf.file_stem()))));
                }
                let wrap_rings = rings.clone();
                let wrap_tenant = tenant.clone();
                let store = TenantStore::open_with(&config.data_dir, tenant.clone(), &move |cf, engine| {
                    let ring = wrap_rings.get(&cf).expect("every column family has a keyring").clone();
                    Box::new(EncryptingEngine::new(engine, ring, wrap_tenant.clone(), cf.file_stem())) as Box<dyn Engine>
                })?;
                (Arc::new(store), rings.into_values().collect())
            }
            None => (Arc::new(TenantStore::open(&config.data_dir, tenant.clone())?), Vec::new()),
        };

        Self::build(tenant, config, store, Some(dir_lock), keyrings)
    }

    /// An in-memory database for tests: no `LOCK` file, no encryption.
    pub fn open_in_memory(tenant: TenantId, config: DbConfig) -> CResult<Arc<Self>> {
        let store = Arc::new(TenantStore::open_in_memory(tenant.clone()));
        Self::build(tenant, config, store, None, Vec::new())
    }

    fn build(
        tenant: TenantId,
        config: DbConfig,
        store: Arc<TenantStore>,
        dir_lock: Option<DirLock>,
        keyrings: Vec<Arc<Mutex<KeyRing>>>,
    ) -> CResult<Arc<Self>> {
        let cursor = ReplicaCursor::load(&store)?;
        // The facade's own `WalSequencer` must resume past whatever this
        // tenant's `wal` CF already holds, not past `last_applied_seq` (a
        // replica-only bookkeeping value that a primary never advances) —
        // otherwise reopening a primary would reassign and overwrite
        // already-committed sequence numbers.
        let head_seq = ReplicationHub::new(store.clone()).status()?.head_seq;
        let wal = Arc::new(WalSequencer::new(tenant.clone(), head_seq + 1));

        let schemas = Arc::new(Registry::new(store.clone()));
        let entities = Arc::new(EntityStore::new(store.clone(), wal.clone()));
        let graph = Arc::new(GraphStore::new(store.clone(), wal.clone()));
        let vectors = Arc::new(VectorRegistry::new(store.clone(), config.vector_index_config()));
        let replication = matches!(config.role, Role::Primary).then(|| Arc::new(ReplicationHub::new(store.clone())));
        let entity_locks = (0..ENTITY_LOCK_STRIPES).map(|_| Mutex::new(())).collect();

        Ok(Arc::new(Database {
            tenant,
            config,
            store,
            schemas,
            entities,
            graph,
            vectors,
            wal,
            cursor,
            replication,
            entity_locks,
            write_lock: Mutex::new(()),
            _dir_lock: dir_lock,
            _keyrings: keyrings,
        }))
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &Arc<TenantStore> {
        &self.store
    }

    pub(crate) fn schemas(&self) -> &Arc<Registry> {
        &self.schemas
    }

    pub(crate) fn vectors(&self) -> &Arc<VectorRegistry> {
        &self.vectors
    }

    pub(crate) fn entities(&self) -> &Arc<EntityStore> {
        &self.entities
    }

    pub(crate) fn cursor(&self) -> &ReplicaCursor {
        &self.cursor
    }

    /// A live feed of this tenant's committed writes, for a replica to
    /// subscribe to (§4.8). `None` on a replica-role database — a replica
    /// doesn't fan its applied writes back out to further replicas.
    pub fn replication(&self) -> Option<&Arc<ReplicationHub>> {
        self.replication.as_ref()
    }

    fn require_primary(&self) -> CResult<()> {
        if self.config.role != Role::Primary {
            return Err(Error::read_only(format!(
                "database for tenant {} is open in replica role",
                self.tenant
            )));
        }
        Ok(())
    }

    fn entity_stripe(&self, id: Id) -> &Mutex<()> {
        let idx = id.as_bytes()[0] as usize % self.entity_locks.len();
        &self.entity_locks[idx]
    }

    /// Runs `f` under the tenant-wide write lock, then republishes every WAL
    /// entry `f` produced (there may be more than one — a cascading delete
    /// appends one entry per removed edge in addition to the entity's own).
    fn commit<T>(&self, f: impl FnOnce() -> CResult<T>) -> CResult<T> {
        let _guard = self.write_lock.lock();
        let before = self.wal.peek_next();
        let result = f()?;
        if let Some(hub) = &self.replication {
            let after = self.wal.peek_next();
            if after > before {
                let page = hub.pull(before, (after - before) as usize)?;
                for entry in page.entries {
                    hub.publish(entry);
                }
            }
        }
        Ok(result)
    }

    // ---- Schema ----------------------------------------------------------

    pub fn register_schema(&self, schema: Schema) -> CResult<()> {
        self.require_primary()?;
        let _guard = self.write_lock.lock();
        self.schemas.register(schema.clone())?;

        let mut batch = remdb_kv::batch::WriteBatch::new();
        let payload = serde_json::to_vec(&schema)?;
        let seq = self.wal.append_to_batch(&mut batch, WalOp::PutSchema, payload.clone())?;
        self.store.commit(batch)?;
        if let Some(hub) = &self.replication {
            hub.publish(WalEntry::new(seq, self.tenant.clone(), WalOp::PutSchema, payload));
        }
        Ok(())
    }

    pub fn get_schema(&self, fqn: &str, version: u32) -> CResult<Option<Schema>> {
        self.schemas.get(fqn, version)
    }

    pub fn get_latest_schema(&self, fqn: &str) -> CResult<Option<Schema>> {
        self.schemas.get_latest(fqn)
    }

    pub fn list_schemas(&self) -> CResult<Vec<Schema>> {
        self.schemas.list()
    }

    // ---- Entities ----------------------------------------------------------

    pub fn insert(&self, schema: &Schema, kind: EntityKind, fields: BTreeMap<String, Value>) -> CResult<Id> {
        self.require_primary()?;
        self.commit(|| self.entities.insert(schema, kind, fields))
    }

    pub fn batch_insert(&self, records: Vec<(Schema, EntityKind, BTreeMap<String, Value>)>) -> CResult<Vec<Id>> {
        self.require_primary()?;
        self.commit(|| self.entities.batch_insert(records))
    }

    pub fn update(&self, schema: &Schema, id: Id, patch: BTreeMap<String, Value>) -> CResult<Id> {
        self.require_primary()?;
        let _stripe = self.entity_stripe(id).lock();
        self.commit(|| self.entities.update(schema, id, patch))
    }

    /// Deletes the entity and cascades to its incident edges and embedding
    /// rows (§3 "Deletion is explicit; cascades to edges adjacent to the
    /// entity"). The cascade runs inside the same `commit` bracket as the
    /// entity delete so every WAL entry it produces — the delete plus one
    /// per removed edge — is published together, in order.
    pub fn delete(&self, schema: &Schema, id: Id) -> CResult<Option<Entity>> {
        self.require_primary()?;
        let _stripe = self.entity_stripe(id).lock();
        self.commit(|| {
            let removed = self.entities.delete(schema, id)?;
            if let Some(entity) = &removed {
                self.graph.remove_all_incident(entity.id)?;
                for field in &schema.embedding_fields {
                    self.vectors.remove(&schema.fqn, field, entity.id)?;
                }
            }
            Ok(removed)
        })
    }

    pub fn get(&self, schema_fqn: &str, id: Id) -> CResult<Option<Entity>> {
        self.entities.get(schema_fqn, id)
    }

    pub fn get_by_key(&self, schema: &Schema, key_fields: &BTreeMap<String, Value>) -> CResult<Option<Entity>> {
        self.entities.get_by_key(schema, key_fields)
    }

    // ---- Graph ----------------------------------------------------------

    pub fn add_edge(&self, src: Id, label: &str, dst: Id, props: BTreeMap<String, Value>) -> CResult<()> {
        self.require_primary()?;
        self.commit(|| self.graph.add_edge(src, label, dst, props))
    }

    pub fn remove_edge(&self, src: Id, label: &str, dst: Id) -> CResult<bool> {
        self.require_primary()?;
        self.commit(|| self.graph.remove_edge(src, label, dst))
    }

    pub fn neighbors(&self, id: Id, direction: Direction, labels: Option<&[String]>) -> CResult<Vec<Edge>> {
        self.graph.neighbors(id, direction, labels)
    }

    pub fn traverse(
        &self,
        start: Id,
        max_depth: u32,
        labels: Option<&[String]>,
        direction: Direction,
        max_nodes: usize,
    ) -> CResult<Vec<TraversalStep>> {
        self.graph.traverse(start, max_depth, labels, direction, max_nodes)
    }

    /// Rebuilds one edge direction's column family from its mirror (§4.6),
    /// as an out-of-band repair for a store whose two directions have
    /// drifted apart. Not WAL-logged: each replica derives the same result
    /// independently from its own (already replicated) edge rows.
    pub fn repair_graph_index(&self, source: ColumnFamily) -> CResult<u64> {
        self.graph.reindex(source)
    }

    // ---- Vectors & query ----------------------------------------------------------

    /// Attaches a freshly computed embedding to an already-inserted entity.
    /// Not WAL-logged (§4.5's "Design Notes": embeddings are recomputed
    /// locally by each node's own embedding worker from replicated entity
    /// fields, rather than shipping raw float vectors through the WAL).
    pub fn upsert_embedding(&self, schema_fqn: &str, field: &str, id: Id, vector: Vec<f32>) -> CResult<()> {
        self.vectors.upsert(schema_fqn, field, id, vector)
    }

    /// Runs `query` against its schema's planned source, enforcing
    /// `query_cell_budget` (§4.7 `QueryTooBroad`).
    pub fn query(&self, query: &Query) -> CResult<Vec<Entity>> {
        self.store.check_tenant(&query.tenant)?;
        let schema = self
            .schemas
            .get_latest(&query.schema)?
            .ok_or_else(|| Error::query_invalid(format!("schema '{}' is not registered", query.schema)))?;
        let total_rows_hint = self.store.len(ColumnFamily::Entities)?;
        let planned = plan(&schema, query, total_rows_hint, self.config.query_cell_budget)?;
        execute(&self.entities, &self.store, &self.vectors, &schema, &planned)
    }

    /// Rebuilds every schema's embedding-field indexes from their persisted
    /// rows (§4.5 `build`) — the facade's HNSW checkpoint/tiered-index
    /// swapper background task calls this periodically; a caller can also
    /// invoke it directly before a clean shutdown.
    pub fn checkpoint_vector_indexes(&self) -> CResult<()> {
        for schema in self.schemas.list()? {
            for field in &schema.embedding_fields {
                self.vectors.build(&schema.fqn, field)?;
            }
        }
        Ok(())
    }
}

fn load_master_key(path: &Path) -> CResult<MasterKey> {
    let bytes = std::fs::read(path)?;
    let len = bytes.len();
    let arr: [u8; 32] =
        bytes.try_into().map_err(|_| Error::internal(format!("encryption key file must be exactly 32 bytes, got {len}")))?;
    Ok(MasterKey::new(arr))
}
