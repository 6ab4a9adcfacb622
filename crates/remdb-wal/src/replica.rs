//! Replica-side apply (§4.8): tracks `last_applied_seq` durably, replays
//! entries exactly once each, and refuses to silently diverge from the
//! primary's history.
//!
//! This crate has no dependency on `remdb-entity`/`remdb-graph`/`remdb-schema`
//! (those crates depend on *this* one, for `WalSequencer`), so it can't
//! decode a [`crate::entry::WalEntry`]'s payload into a concrete mutation
//! itself. [`WalApplier`] is the seam: `remdb-db`, which does own all of
//! those stores, implements it to replay each op against the right one.

use remdb_core::error::{CResult, Error};
use remdb_core::tenant::TenantId;
use remdb_kv::cf::ColumnFamily;
use remdb_kv::store::TenantStore;

use crate::entry::WalEntry;

const LAST_APPLIED_SEQ_KEY: &[u8] = b"last_applied_seq";
const LAST_APPLIED_HASH_KEY: &[u8] = b"last_applied_hash";

/// Replays one WAL entry's logical mutation against whatever stores the
/// caller owns. Implementations should be idempotent on their own terms
/// (e.g. `remdb-entity::insert`'s diff-before-write no-op) since
/// [`ReplicaCursor::apply`] only guards against *re-applying the same
/// `log_seq_no` twice*, not against every possible non-idempotent op.
pub trait WalApplier {
    fn apply(&self, entry: &WalEntry) -> CResult<()>;
}

/// Tracks one tenant's replication progress against its own [`TenantStore`],
/// persisting `last_applied_seq` to the `meta` column family so a restarted
/// replica resumes exactly where it left off rather than replaying (or
/// skipping) anything.
pub struct ReplicaCursor {
    tenant: TenantId,
}

impl ReplicaCursor {
    /// A cursor for `store`'s tenant; `last_applied_seq`/its hash are read
    /// straight from the `meta` CF on every call rather than cached, so a
    /// restarted replica's divergence check is exactly as strong as a
    /// long-running one's.
    pub fn load(store: &TenantStore) -> CResult<Self> {
        Ok(ReplicaCursor { tenant: store.tenant().clone() })
    }

    pub fn last_applied_seq(&self, store: &TenantStore) -> CResult<u64> {
        match store.get(ColumnFamily::Meta, LAST_APPLIED_SEQ_KEY)? {
            Some(bytes) => Ok(u64::from_be_bytes(bytes.try_into().map_err(|_| {
                Error::corruption("last_applied_seq meta row is not 8 bytes")
            })?)),
            None => Ok(0),
        }
    }

    fn last_applied_hash(&self, store: &TenantStore) -> CResult<Option<[u8; 32]>> {
        match store.get(ColumnFamily::Meta, LAST_APPLIED_HASH_KEY)? {
            Some(bytes) => Ok(Some(bytes.try_into().map_err(|_| {
                Error::corruption("last_applied_hash meta row is not 32 bytes")
            })?)),
            None => Ok(None),
        }
    }

    /// Applies `entry` via `applier` and advances the persisted cursor, or
    /// rejects it:
    /// - a `log_seq_no` at or before the cursor whose `payload_hash` matches
    ///   what was already applied is a harmless replay (§4.8 "idempotent");
    /// - a `log_seq_no` at or before the cursor whose `payload_hash` differs
    ///   means the primary's history and this replica's disagree at the same
    ///   position — `DivergentHistory`, not silently overwritten;
    /// - a `log_seq_no` more than one past the cursor means entries were
    ///   skipped (the caller should have pulled the gap first) —
    ///   `QueryInvalid`-class caller error, surfaced as `Corruption` since
    ///   it indicates the replication stream itself is malformed.
    pub fn apply(&self, store: &TenantStore, entry: &WalEntry, applier: &dyn WalApplier) -> CResult<()> {
        if entry.tenant != self.tenant {
            return Err(Error::tenant_mismatch(format!(
                "replica for tenant {} received an entry for tenant {}",
                self.tenant, entry.tenant
            )));
        }

        let last_applied = self.last_applied_seq(store)?;
        if entry.log_seq_no <= last_applied {
            return self.check_no_divergence(store, entry);
        }
        if entry.log_seq_no > last_applied + 1 {
            return Err(Error::corruption(format!(
                "replication gap: last applied {last_applied}, received {}",
                entry.log_seq_no
            )));
        }

        applier.apply(entry)?;
        store.put(ColumnFamily::Meta, LAST_APPLIED_SEQ_KEY, entry.log_seq_no.to_be_bytes().to_vec())?;
        store.put(ColumnFamily::Meta, LAST_APPLIED_HASH_KEY, entry.payload_hash.to_vec())?;
        Ok(())
    }

    /// Re-applying an already-applied `log_seq_no` is only safe if its
    /// payload is bit-for-bit what was applied before; otherwise the
    /// primary's log and this replica's disagree about the past, which no
    /// amount of retrying can resolve automatically. Only checkable against
    /// the single most recently applied sequence number, since that's the
    /// only hash this cursor retains — a replay several entries further back
    /// than that is accepted unchecked.
    fn check_no_divergence(&self, store: &TenantStore, entry: &WalEntry) -> CResult<()> {
        let last_applied = self.last_applied_seq(store)?;
        if entry.log_seq_no == last_applied {
            if let Some(last_hash) = self.last_applied_hash(store)? {
                if last_hash != entry.payload_hash {
                    return Err(Error::divergent_history(format!(
                        "entry {} re-applied with a different payload hash than before",
                        entry.log_seq_no
                    )));
                }
            }
        }
        Ok(())
    }
}
