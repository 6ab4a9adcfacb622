//! Write-ahead log entries, their per-tenant sequencing, and primary/replica
//! replication (§4.8, §6 "WAL binary frame"). Entity, graph and schema
//! writes depend only on [`WalEntry`] and [`WalSequencer`] to append their
//! mutation atomically with the data write; [`replication`] and [`replica`]
//! are consumed by `remdb-db`, which owns the stores a replica applies
//! entries against. [Author fengyang]

pub mod entry;
pub mod replica;
pub mod replication;
pub mod sequencer;

pub use entry::{WalEntry, WalOp};
pub use replica::{ReplicaCursor, WalApplier};
pub use replication::{PullResponse, RecvError, ReplicationHub, SnapshotRow, StatusResponse, Subscription};
pub use sequencer::WalSequencer;
