//! StateMachine
//!
//! Contract between an on-disk state machine and the consensus layer driving it:
//! - Applying committed log entries durably, in index order
//! - Serving local reads
//! - Producing snapshots from a frozen view and installing received ones
//! - Reporting the applied index it can resume from after a restart
//!
//! The consensus layer serializes `update`, `recover_from_snapshot` and
//! `close`; `lookup` may be called from any number of threads at any time.

use std::io::Read;
use std::io::Write;

use tokio_util::sync::CancellationToken;

use crate::Entry;
use crate::EntryResult;
use crate::Query;
use crate::QueryResult;
use crate::Result;

pub trait StateMachine: Send + Sync + 'static {
    /// Frozen view produced by `prepare_snapshot`
    type SnapshotContext: Send;

    /// Opens the underlying storage and returns the index of the last entry
    /// already reflected in it.
    fn open(&self) -> Result<u64>;

    /// Applies a batch of committed entries atomically.
    fn update(
        &self,
        entries: Vec<Entry>,
    ) -> Result<Vec<EntryResult>>;

    fn lookup(
        &self,
        query: Query,
    ) -> Result<QueryResult>;

    /// Flushes in-core state. Implementations whose updates are already durable
    /// may treat this as a no-op.
    fn sync(&self) -> Result<()>;

    fn prepare_snapshot(&self) -> Result<Self::SnapshotContext>;

    /// Serializes the view captured in `ctx`, not the latest state.
    fn save_snapshot(
        &self,
        ctx: Self::SnapshotContext,
        writer: &mut dyn Write,
        stop: &CancellationToken,
    ) -> Result<()>;

    /// Replaces the whole state with the snapshot read from `reader`.
    fn recover_from_snapshot(
        &self,
        reader: &mut dyn Read,
        stop: &CancellationToken,
    ) -> Result<()>;

    fn close(&self) -> Result<()>;

    /// Digest of the full state, for cross-replica consistency checks.
    fn get_hash(&self) -> Result<u64>;

    fn last_applied(&self) -> u64;
}
