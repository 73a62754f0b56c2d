//! RocksDB-backed on-disk state machine.
//!
//! All data lives in one engine directory under the node root; the pointer
//! file names which one. Snapshot installs build a complete new engine
//! directory next to the current one and adopt it by rewriting the pointer.

use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use rocksdb::IteratorMode;
use rocksdb::WriteBatch;
use sha2::Digest;
use sha2::Sha256;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::cleanup_stale_directories;
use crate::constants::APPLIED_INDEX_KEY;
use crate::convert::bytes_to_string;
use crate::convert::decode_u64;
use crate::file_io::create_dir_durable;
use crate::file_io::random_dir_name;
use crate::file_io::remove_dir_durable;
use crate::is_first_run;
use crate::load_applied_index;
use crate::read_pointer;
use crate::stage_applied_index;
use crate::write_pointer;
use crate::EngineConfig;
use crate::EngineHandle;
use crate::Entry;
use crate::EntryResult;
use crate::Error;
use crate::FatalError;
use crate::KvRecord;
use crate::Query;
use crate::QueryResult;
use crate::Result;
use crate::SnapshotContext;
use crate::StateMachine;
use crate::StorageConfig;
use crate::StorageError;

use super::snapshot::check_stop;
use super::snapshot::count_records;
use super::snapshot::read_snapshot_entry;
use super::snapshot::read_snapshot_header;
use super::snapshot::write_snapshot;

fn fatal(e: FatalError) -> Error {
    error!("state machine invariant violated: {}", e);
    e.into()
}

pub struct RocksDBStateMachine {
    shard_id: u64,
    replica_id: u64,
    root: PathBuf,
    engine_config: EngineConfig,

    /// Currently adopted engine, `None` before open and after close
    active: ArcSwapOption<EngineHandle>,

    /// Index of the last entry reflected in the active engine. Increases
    /// monotonically; equal to the persisted tracker after every update.
    last_applied_index: AtomicU64,

    /// Serializes open, update, snapshot capture/install and close
    mutation_lock: Mutex<()>,

    closed: AtomicBool,
    aborted: AtomicBool,
}

impl std::fmt::Debug for RocksDBStateMachine {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RocksDBStateMachine")
            .field("shard_id", &self.shard_id)
            .field("replica_id", &self.replica_id)
            .field("root", &self.root)
            .field("last_applied", &self.last_applied())
            .finish()
    }
}

impl RocksDBStateMachine {
    pub fn new(
        shard_id: u64,
        replica_id: u64,
        storage: &StorageConfig,
    ) -> Self {
        Self {
            shard_id,
            replica_id,
            root: storage.node_root(shard_id, replica_id),
            engine_config: storage.engine.clone(),
            active: ArcSwapOption::empty(),
            last_applied_index: AtomicU64::new(0),
            mutation_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
        }
    }

    /// Node root holding the pointer file and engine directories.
    pub fn node_root(&self) -> &Path {
        &self.root
    }

    /// Directory of the active engine, if open.
    pub fn current_dir(&self) -> Option<PathBuf> {
        self.active.load().as_ref().map(|h| h.dir().to_path_buf())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Marks the state machine as abandoned by the consensus layer. Later
    /// updates and snapshot saves are lifecycle violations.
    pub fn abort(&self) {
        warn!(shard_id = self.shard_id, replica_id = self.replica_id, "state machine aborted");
        self.aborted.store(true, Ordering::SeqCst);
    }

    fn ensure_usable(
        &self,
        operation: &'static str,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(fatal(FatalError::UseAfterClose { operation }));
        }
        if self.aborted.load(Ordering::SeqCst) {
            return Err(fatal(FatalError::UseAfterAbort { operation }));
        }
        Ok(())
    }

    fn active_handle(
        &self,
        operation: &'static str,
    ) -> Result<Arc<EngineHandle>> {
        match self.active.load_full() {
            Some(handle) => Ok(handle),
            None if self.is_closed() => Err(fatal(FatalError::UseAfterClose { operation })),
            None => Err(fatal(FatalError::NotOpened { operation })),
        }
    }

    /// Replays a snapshot stream into `handle` as one durable batch and returns
    /// the applied index it carried.
    fn replay_snapshot(
        handle: &EngineHandle,
        reader: &mut dyn Read,
        stop: &CancellationToken,
    ) -> Result<u64> {
        let count = read_snapshot_header(reader)?;
        let mut batch = WriteBatch::default();
        for _ in 0..count {
            check_stop(Some(stop))?;
            let entry = read_snapshot_entry(reader)?;
            batch.put(entry.key, entry.value);
        }
        check_stop(Some(stop))?;
        handle.write(batch, true)?;
        debug!(records = count, dir = ?handle.dir(), "snapshot replayed");
        load_applied_index(handle)
    }

    /// Drops an engine directory that never became current.
    fn discard(handle: EngineHandle) {
        let dir = handle.dir().to_path_buf();
        if let Err(e) = handle.close() {
            warn!("failed to close discarded engine {:?}: {:?}", dir, e);
        }
        drop(handle);
        if let Err(e) = remove_dir_durable(&dir) {
            warn!("failed to remove discarded engine dir {:?}: {:?}", dir, e);
        }
    }

    /// Writes the pointer to `new_name`. On failure, reports whether the
    /// rename nonetheless took effect.
    fn commit_pointer(
        &self,
        new_name: &str,
    ) -> Result<()> {
        match write_pointer(&self.root, new_name) {
            Ok(()) => Ok(()),
            Err(e) => match read_pointer(&self.root) {
                Ok(current) if current == new_name => {
                    warn!("pointer update reported {:?} after rename; adopting {}", e, new_name);
                    Ok(())
                }
                _ => Err(e),
            },
        }
    }
}

impl StateMachine for RocksDBStateMachine {
    type SnapshotContext = SnapshotContext;

    fn open(&self) -> Result<u64> {
        let _guard = self.mutation_lock.lock();
        if self.is_closed() {
            return Err(fatal(FatalError::UseAfterClose { operation: "open" }));
        }
        if self.active.load().is_some() {
            return Err(fatal(FatalError::AlreadyOpened));
        }

        create_dir_durable(&self.root)?;
        let dir_name = if is_first_run(&self.root)? {
            let name = random_dir_name();
            create_dir_durable(&self.root.join(&name))?;
            write_pointer(&self.root, &name)?;
            name
        } else {
            read_pointer(&self.root)?
        };
        cleanup_stale_directories(&self.root)?;

        let dir = self.root.join(&dir_name);
        if !dir.is_dir() {
            return Err(fatal(FatalError::EngineDirectoryMissing { path: dir }));
        }

        let handle = EngineHandle::open(&dir, &self.engine_config)?;
        let applied_index = load_applied_index(&handle)?;
        self.last_applied_index.store(applied_index, Ordering::SeqCst);
        self.active.store(Some(Arc::new(handle)));

        info!(
            shard_id = self.shard_id,
            replica_id = self.replica_id,
            applied_index,
            ?dir,
            "state machine opened"
        );
        Ok(applied_index)
    }

    fn update(
        &self,
        entries: Vec<Entry>,
    ) -> Result<Vec<EntryResult>> {
        let _guard = self.mutation_lock.lock();
        self.ensure_usable("update")?;
        let handle = self.active_handle("update")?;

        let Some(last_index) = entries.last().map(|e| e.index) else {
            debug!("update called with empty batch");
            return Ok(Vec::new());
        };
        let last_applied = self.last_applied_index.load(Ordering::SeqCst);
        if last_index <= last_applied {
            return Err(fatal(FatalError::AppliedIndexNotIncreasing {
                last_applied,
                index: last_index,
            }));
        }

        let mut batch = WriteBatch::default();
        let mut results = Vec::with_capacity(entries.len());
        let mut prev: Option<u64> = None;
        for entry in entries {
            if let Some(prev) = prev {
                if entry.index <= prev {
                    return Err(fatal(FatalError::UnorderedEntry {
                        prev,
                        index: entry.index,
                    }));
                }
            }
            prev = Some(entry.index);

            let record = KvRecord::decode(&entry.cmd).map_err(|source| {
                fatal(FatalError::MalformedEntry {
                    index: entry.index,
                    source,
                })
            })?;
            if record.key == APPLIED_INDEX_KEY {
                warn!(index = entry.index, "entry writes the reserved applied index key, skipped");
            } else {
                batch.put(record.key.as_bytes(), record.value.as_bytes());
            }
            results.push(EntryResult {
                index: entry.index,
                value: entry.cmd.len() as u64,
            });
        }
        stage_applied_index(&mut batch, last_index);

        handle.write(batch, true)?;
        self.last_applied_index.store(last_index, Ordering::SeqCst);
        debug!(last_index, entries = results.len(), "batch applied");
        Ok(results)
    }

    fn lookup(
        &self,
        query: Query,
    ) -> Result<QueryResult> {
        let Some(handle) = self.active.load_full() else {
            return Err(StorageError::EngineClosed.into());
        };
        match query {
            Query::Get { key } if key == APPLIED_INDEX_KEY => Ok(QueryResult::NotFound),
            Query::Get { key } => match handle.lookup(key.as_bytes())? {
                Some(value) => Ok(QueryResult::Value(bytes_to_string(value)?)),
                None => Ok(QueryResult::NotFound),
            },
            Query::AppliedIndex => Ok(QueryResult::AppliedIndex(load_applied_index(&handle)?)),
        }
    }

    fn sync(&self) -> Result<()> {
        if self.is_closed() {
            return Err(fatal(FatalError::UseAfterClose { operation: "sync" }));
        }
        // every update is committed with a synced write
        Ok(())
    }

    fn prepare_snapshot(&self) -> Result<SnapshotContext> {
        let _guard = self.mutation_lock.lock();
        self.ensure_usable("prepare_snapshot")?;
        let handle = self.active_handle("prepare_snapshot")?;
        SnapshotContext::capture(handle, &self.root)
    }

    fn save_snapshot(
        &self,
        ctx: SnapshotContext,
        writer: &mut dyn Write,
        stop: &CancellationToken,
    ) -> Result<()> {
        self.ensure_usable("save_snapshot")?;
        ctx.save_to_writer(writer, stop)?;
        Ok(())
    }

    fn recover_from_snapshot(
        &self,
        reader: &mut dyn Read,
        stop: &CancellationToken,
    ) -> Result<()> {
        let _guard = self.mutation_lock.lock();
        if self.is_closed() {
            return Err(fatal(FatalError::UseAfterClose {
                operation: "recover_from_snapshot",
            }));
        }
        if self.active.load().is_none() {
            return Err(fatal(FatalError::NotOpened {
                operation: "recover_from_snapshot",
            }));
        }

        let old_name = read_pointer(&self.root)?;
        let new_name = random_dir_name();
        let new_dir = self.root.join(&new_name);
        info!(?new_dir, "recovering from snapshot");

        let new_handle = EngineHandle::open(&new_dir, &self.engine_config)?;
        let recovered = match Self::replay_snapshot(&new_handle, reader, stop) {
            Ok(index) => index,
            Err(e) => {
                Self::discard(new_handle);
                return Err(e);
            }
        };

        let last_applied = self.last_applied_index.load(Ordering::SeqCst);
        if recovered < last_applied {
            Self::discard(new_handle);
            return Err(fatal(FatalError::AppliedIndexRegressed {
                last_applied,
                recovered,
            }));
        }
        if let Err(e) = check_stop(Some(stop)) {
            Self::discard(new_handle);
            return Err(e);
        }

        if let Err(e) = self.commit_pointer(&new_name) {
            Self::discard(new_handle);
            return Err(e);
        }

        // committed: the new directory is current from here on
        self.last_applied_index.store(recovered, Ordering::SeqCst);
        if let Some(old) = self.active.swap(Some(Arc::new(new_handle))) {
            old.close()?;
        }
        remove_dir_durable(&self.root.join(&old_name))?;

        info!(
            applied_index = recovered,
            previous = last_applied,
            ?new_dir,
            "snapshot recovered"
        );
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let _guard = self.mutation_lock.lock();
        match self.active.swap(None) {
            Some(handle) => {
                self.closed.store(true, Ordering::SeqCst);
                handle.close()?;
                info!(shard_id = self.shard_id, replica_id = self.replica_id, "state machine closed");
                Ok(())
            }
            None => {
                if self.closed.swap(true, Ordering::SeqCst) {
                    Err(fatal(FatalError::DoubleClose))
                } else {
                    Ok(())
                }
            }
        }
    }

    fn get_hash(&self) -> Result<u64> {
        let handle = self.active_handle("get_hash")?;
        let db = handle.read_guard()?;
        let snapshot = db.snapshot();

        let count = count_records(snapshot.iterator(IteratorMode::Start))?;
        let mut hasher = Sha256::new();
        write_snapshot(&mut hasher, count, snapshot.iterator(IteratorMode::Start), None)?;
        let digest = hasher.finalize();
        decode_u64(&digest[..8])
    }

    fn last_applied(&self) -> u64 {
        self.last_applied_index.load(Ordering::SeqCst)
    }
}
