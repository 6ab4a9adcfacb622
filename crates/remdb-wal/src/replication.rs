//! Primary-side replication (§4.8): `pull`/`status`/`subscribe`/snapshotting
//! read straight out of the `wal` column family a tenant's writes already
//! land in, so there is no second copy of the log to keep in sync.
//!
//! This workspace ships the logical replication protocol as a plain async
//! Rust API rather than a generated gRPC service. The pack's only evidence
//! for a `tonic`/`prost` stack is bare `Cargo.toml` references under
//! `other_examples/manifests/` — no `.proto` file or call site anywhere in
//! the retrieved examples — so hand-authoring tonic's generated
//! service/client scaffolding here would be guessing at a shape with no
//! grounding. `ReplicationHub` below is the transport-agnostic core
//! (`Subscribe`/`Pull`/`Snapshot`/`Status`); a caller wanting this over the
//! wire puts any `tokio`-based framing (length-prefixed `serde_json`, the
//! same encoding `remdb-entity`/`remdb-graph` already use for WAL payloads)
//! in front of it — that framing choice lives in `remdb-db`, which is where
//! the spec places "network and back-pressured streaming" (§9).

use std::ops::Bound;
use std::sync::Arc;

use remdb_core::error::CResult;
use remdb_core::tenant::TenantId;
use remdb_kv::cf::ColumnFamily;
use remdb_kv::store::TenantStore;
use tokio::sync::broadcast;

use crate::entry::WalEntry;

/// How many not-yet-pulled entries a live [`Subscription`] may queue before
/// the publisher starts overwriting the oldest ones (§4.8 "a replica
/// falling far enough behind that its requested range has been pruned").
/// Mirrors `wal_retention`'s role for the live push path; `Pull`'s own
/// retention check is against the actual `wal` CF contents, not this.
const SUBSCRIPTION_BUFFER: usize = 4096;

/// One page of a `Pull` response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PullResponse {
    pub entries: Vec<WalEntry>,
    /// Set when `from_seq` predates the oldest entry the `wal` CF still
    /// retains — the caller must fall back to `Snapshot` rather than retry
    /// `Pull` (§4.8 "ResumeFromSnapshot").
    pub resume_from_snapshot: bool,
}

/// A primary's current replication-relevant state for one tenant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusResponse {
    pub head_seq: u64,
    pub oldest_retained_seq: u64,
}

/// One row of a full-state snapshot bootstrap (§4.8 "Snapshot"): every
/// persisted row outside the `wal`/`meta` column families, which a replica
/// applies directly rather than replaying as logical mutations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotRow {
    pub cf: ColumnFamily,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Column families a snapshot carries. `Wal` is excluded (the replica
/// starts its own pull/subscribe cursor at the snapshot's `log_seq_no`
/// instead of inheriting the primary's log), and `Meta` is excluded since
/// it holds facade-local operational state (role, cursors) rather than
/// tenant data.
fn snapshot_cfs() -> impl Iterator<Item = ColumnFamily> {
    ColumnFamily::ALL.into_iter().filter(|cf| !matches!(cf, ColumnFamily::Wal | ColumnFamily::Meta))
}

/// Coordinates primary-side replication reads for one tenant's
/// [`TenantStore`]: `pull`/`status`/`snapshot` are plain reads against
/// already-committed data, so they need no additional locking beyond what
/// `TenantStore` already provides; `subscribe`/`publish` add a live fan-out
/// on top for push-based replicas.
pub struct ReplicationHub {
    tenant: TenantId,
    store: Arc<TenantStore>,
    live: broadcast::Sender<WalEntry>,
}

impl ReplicationHub {
    pub fn new(store: Arc<TenantStore>) -> Self {
        let (live, _) = broadcast::channel(SUBSCRIPTION_BUFFER);
        ReplicationHub { tenant: store.tenant().clone(), store, live }
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Publishes one just-committed WAL entry to every live subscriber.
    /// Called by the facade immediately after `TenantStore::commit` for a
    /// primary-role database; a no-op (silently dropped) if nobody is
    /// subscribed.
    pub fn publish(&self, entry: WalEntry) {
        let _ = self.live.send(entry);
    }

    /// Registers a live feed of every entry published from now on. Entries
    /// committed before this call are retrieved with `pull` first; the
    /// typical bootstrap is `status` -> `pull` up to `head_seq` -> `subscribe`.
    pub fn subscribe(&self) -> Subscription {
        Subscription { inner: self.live.subscribe() }
    }

    /// Returns up to `max` entries starting at `from_seq`, in order.
    pub fn pull(&self, from_seq: u64, max: usize) -> CResult<PullResponse> {
        let status = self.status()?;
        if from_seq < status.oldest_retained_seq && status.head_seq >= status.oldest_retained_seq {
            return Ok(PullResponse { entries: Vec::new(), resume_from_snapshot: true });
        }
        let rows = self.store.scan_range(
            ColumnFamily::Wal,
            Bound::Included(WalEntry::storage_key(from_seq).to_vec()),
            Bound::Unbounded,
        )?;
        let entries = rows
            .into_iter()
            .take(max)
            .map(|(_, value)| WalEntry::decode(&value))
            .collect::<CResult<Vec<_>>>()?;
        Ok(PullResponse { entries, resume_from_snapshot: false })
    }

    /// The primary's current head and retention floor for this tenant's WAL.
    pub fn status(&self) -> CResult<StatusResponse> {
        let rows = self.store.scan_range(ColumnFamily::Wal, Bound::Unbounded, Bound::Unbounded)?;
        let mut head_seq = 0;
        let mut oldest_retained_seq = 0;
        if let Some((key, _)) = rows.first() {
            oldest_retained_seq = seq_from_key(key);
        }
        if let Some((key, _)) = rows.last() {
            head_seq = seq_from_key(key);
        }
        Ok(StatusResponse { head_seq, oldest_retained_seq })
    }

    /// Every row a replica needs to bootstrap from scratch, plus the
    /// `log_seq_no` the replica should start pulling/subscribing from
    /// afterwards (§4.8 "Snapshot ... up to a named `log_seq_no`").
    pub fn snapshot(&self) -> CResult<(Vec<SnapshotRow>, u64)> {
        let mut rows = Vec::new();
        for cf in snapshot_cfs() {
            for (key, value) in self.store.scan_range(cf, Bound::Unbounded, Bound::Unbounded)? {
                rows.push(SnapshotRow { cf, key, value });
            }
        }
        let up_to_seq = self.status()?.head_seq;
        Ok((rows, up_to_seq))
    }
}

fn seq_from_key(key: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&key[..8]);
    u64::from_be_bytes(buf)
}

/// A live handle to a [`ReplicationHub`]'s push feed. `recv` surfaces a
/// dropped replica's need to resume from a snapshot as `Lagged`, rather than
/// silently skipping ahead — the same non-retryable-without-intervention
/// shape `Kind::DivergentHistory` uses on the apply side.
pub struct Subscription {
    inner: broadcast::Receiver<WalEntry>,
}

#[derive(Debug)]
pub enum RecvError {
    /// The channel fell behind by `skipped` entries before the subscriber
    /// could catch up; the caller must fetch a fresh snapshot.
    Lagged { skipped: u64 },
    /// The publishing `ReplicationHub` was dropped.
    Closed,
}

impl Subscription {
    pub async fn recv(&mut self) -> Result<WalEntry, RecvError> {
        match self.inner.recv().await {
            Ok(entry) => Ok(entry),
            Err(broadcast::error::RecvError::Lagged(skipped)) => Err(RecvError::Lagged { skipped }),
            Err(broadcast::error::RecvError::Closed) => Err(RecvError::Closed),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entry::WalOp;
    use crate::sequencer::WalSequencer;
    use remdb_kv::batch::WriteBatch;

    fn hub() -> (ReplicationHub, Arc<WalSequencer>) {
        let tenant = TenantId::new("acme").unwrap();
        let store = Arc::new(TenantStore::open_in_memory(tenant.clone()));
        let wal = Arc::new(WalSequencer::new(tenant, 1));
        (ReplicationHub::new(store), wal)
    }

    fn append(hub: &ReplicationHub, wal: &WalSequencer, payload: &[u8]) {
        let mut batch = WriteBatch::new();
        wal.append_to_batch(&mut batch, WalOp::PutEntity, payload.to_vec()).unwrap();
        hub.store.commit(batch).unwrap();
    }

    #[test]
    fn pull_returns_entries_from_the_requested_sequence() {
        let (hub, wal) = hub();
        append(&hub, &wal, b"one");
        append(&hub, &wal, b"two");

        let page = hub.pull(1, 10).unwrap();
        assert_eq!(page.entries.len(), 2);
        assert!(!page.resume_from_snapshot);
        assert_eq!(page.entries[0].log_seq_no, 1);
        assert_eq!(page.entries[1].log_seq_no, 2);
    }

    #[test]
    fn pull_respects_the_max_page_size() {
        let (hub, wal) = hub();
        for i in 0..5 {
            append(&hub, &wal, format!("payload-{i}").as_bytes());
        }
        let page = hub.pull(1, 2).unwrap();
        assert_eq!(page.entries.len(), 2);
    }

    #[test]
    fn status_reports_head_and_retention_floor() {
        let (hub, wal) = hub();
        append(&hub, &wal, b"one");
        append(&hub, &wal, b"two");
        let status = hub.status().unwrap();
        assert_eq!(status.head_seq, 2);
        assert_eq!(status.oldest_retained_seq, 1);
    }

    #[test]
    fn snapshot_carries_entity_rows_but_not_wal_or_meta() {
        let (hub, wal) = hub();
        append(&hub, &wal, b"one");
        hub.store.put(ColumnFamily::Entities, b"e1", b"v1".to_vec()).unwrap();
        hub.store.put(ColumnFamily::Meta, b"role", b"primary".to_vec()).unwrap();

        let (rows, up_to_seq) = hub.snapshot().unwrap();
        assert_eq!(up_to_seq, 1);
        assert!(rows.iter().any(|r| r.cf == ColumnFamily::Entities));
        assert!(rows.iter().all(|r| r.cf != ColumnFamily::Wal && r.cf != ColumnFamily::Meta));
    }

    #[tokio::test]
    async fn subscribers_receive_entries_published_after_subscribing() {
        let (hub, wal) = hub();
        let mut sub = hub.subscribe();
        append(&hub, &wal, b"one");
        hub.publish(WalEntry::new(1, hub.tenant().clone(), WalOp::PutEntity, b"one".to_vec()));

        let entry = sub.recv().await.unwrap();
        assert_eq!(entry.log_seq_no, 1);
    }
}
