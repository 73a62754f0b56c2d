//! Snapshot stream codec and point-in-time snapshot context.
//!
//! Stream layout, all integers little-endian:
//!
//! ```text
//! count: u64
//! count x { len: u64, bincode(SnapshotEntry) of len bytes }
//! ```

use std::fs;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use rocksdb::Options;
use rocksdb::DB;
use serde::Deserialize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::constants::MAX_SNAPSHOT_ENTRY_SIZE;
use crate::constants::SNAPSHOT_DIR_PREFIX;
use crate::file_io::random_dir_name;
use crate::EngineHandle;
use crate::Result;
use crate::StorageError;

/// One engine record as transferred in a snapshot stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

pub(crate) type EngineRecord = std::result::Result<(Box<[u8]>, Box<[u8]>), rocksdb::Error>;

pub(crate) fn check_stop(stop: Option<&CancellationToken>) -> Result<()> {
    match stop {
        Some(token) if token.is_cancelled() => Err(StorageError::SnapshotStopped.into()),
        _ => Ok(()),
    }
}

/// Streams `count` engine records to `w`. Returns the number written.
///
/// `records` must yield exactly `count` items; the caller counts them on the
/// same frozen view.
pub(crate) fn write_snapshot<W, I>(
    w: &mut W,
    count: u64,
    records: I,
    stop: Option<&CancellationToken>,
) -> Result<u64>
where
    W: Write + ?Sized,
    I: IntoIterator<Item = EngineRecord>,
{
    w.write_all(&count.to_le_bytes())?;
    let mut written = 0u64;
    for record in records {
        check_stop(stop)?;
        let (key, value) = record.map_err(StorageError::DbError)?;
        let entry = SnapshotEntry {
            key: key.into_vec(),
            value: value.into_vec(),
        };
        let data = bincode::serialize(&entry).map_err(StorageError::BincodeError)?;
        w.write_all(&(data.len() as u64).to_le_bytes())?;
        w.write_all(&data)?;
        written += 1;
    }
    if written != count {
        return Err(StorageError::Snapshot(format!(
            "snapshot view changed while streaming: expected {count} records, wrote {written}"
        ))
        .into());
    }
    Ok(written)
}

pub(crate) fn read_snapshot_header<R: Read + ?Sized>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn read_snapshot_entry<R: Read + ?Sized>(r: &mut R) -> Result<SnapshotEntry> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    let len = u64::from_le_bytes(buf);
    if len > MAX_SNAPSHOT_ENTRY_SIZE {
        return Err(StorageError::Snapshot(format!(
            "snapshot entry of {len} bytes exceeds limit {MAX_SNAPSHOT_ENTRY_SIZE}"
        ))
        .into());
    }
    let mut data = vec![0u8; len as usize];
    r.read_exact(&mut data)?;
    Ok(bincode::deserialize(&data).map_err(StorageError::BincodeError)?)
}

/// Counts the records of a frozen view, surfacing engine read errors.
pub(crate) fn count_records<I>(records: I) -> Result<u64>
where
    I: IntoIterator<Item = EngineRecord>,
{
    let mut count = 0u64;
    for record in records {
        record.map_err(StorageError::DbError)?;
        count += 1;
    }
    Ok(count)
}

/// Point-in-time view captured by `prepare_snapshot`.
///
/// Backed by an engine checkpoint under the node root. Consumed by exactly one
/// `save_snapshot`; the checkpoint directory is removed on drop.
pub struct SnapshotContext {
    handle: Arc<EngineHandle>,
    checkpoint_dir: PathBuf,
}

impl std::fmt::Debug for SnapshotContext {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SnapshotContext")
            .field("engine", &self.handle.dir())
            .field("checkpoint_dir", &self.checkpoint_dir)
            .finish()
    }
}

impl SnapshotContext {
    pub(crate) fn capture(
        handle: Arc<EngineHandle>,
        root: &Path,
    ) -> Result<Self> {
        let checkpoint_dir = root.join(format!("{}{}", SNAPSHOT_DIR_PREFIX, random_dir_name()));
        handle.checkpoint(&checkpoint_dir)?;
        debug!(?checkpoint_dir, "snapshot context captured");
        Ok(Self {
            handle,
            checkpoint_dir,
        })
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    /// Streams the frozen view to `w`.
    ///
    /// Holds the source handle's shared lock for the whole call, so the handle
    /// cannot be closed underneath; concurrent writes are not blocked.
    pub(crate) fn save_to_writer(
        &self,
        w: &mut dyn Write,
        stop: &CancellationToken,
    ) -> Result<u64> {
        let _live = self.handle.read_guard()?;
        let frozen = DB::open_for_read_only(&Options::default(), &self.checkpoint_dir, false)
            .map_err(StorageError::DbError)?;

        let count = count_records(frozen.iterator(rocksdb::IteratorMode::Start))?;
        let written = write_snapshot(
            w,
            count,
            frozen.iterator(rocksdb::IteratorMode::Start),
            Some(stop),
        )?;
        w.flush()?;
        info!(records = written, checkpoint = ?self.checkpoint_dir, "snapshot saved");
        Ok(written)
    }
}

impl Drop for SnapshotContext {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.checkpoint_dir) {
            warn!(
                "failed to remove snapshot checkpoint {:?}: {:?}",
                self.checkpoint_dir, e
            );
        }
    }
}
