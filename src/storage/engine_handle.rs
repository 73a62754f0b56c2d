//! Concurrency-safe wrapper around one opened RocksDB instance.
//!
//! `lookup`, `write` and `checkpoint` take the shared lock, `close` takes the
//! exclusive one. Lookups therefore run in parallel with each other and never
//! observe an engine that is being torn down.

use std::path::Path;
use std::path::PathBuf;

use parking_lot::MappedRwLockReadGuard;
use parking_lot::RwLock;
use parking_lot::RwLockReadGuard;
use rocksdb::checkpoint::Checkpoint;
use rocksdb::Cache;
use rocksdb::DBCompressionType;
use rocksdb::Options;
use rocksdb::ReadOptions;
use rocksdb::WriteBatch;
use rocksdb::WriteOptions;
use rocksdb::DB;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::file_io::create_dir_durable;
use crate::EngineConfig;
use crate::FatalError;
use crate::Result;
use crate::StorageError;

pub struct EngineHandle {
    dir: PathBuf,
    /// `None` once closed
    db: RwLock<Option<DB>>,
    read_opts: ReadOptions,
    write_opts: WriteOptions,
    sync_write_opts: WriteOptions,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("dir", &self.dir)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl EngineHandle {
    /// Creates or opens the engine rooted at `dir`.
    pub fn open(
        dir: &Path,
        config: &EngineConfig,
    ) -> Result<Self> {
        create_dir_durable(dir)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_manifest_file_size(config.max_manifest_file_size);
        opts.set_max_open_files(config.max_open_files);
        opts.set_compression_type(DBCompressionType::Lz4);
        let cache = Cache::new_lru_cache(config.row_cache_size);
        opts.set_row_cache(&cache);

        let db = DB::open(&opts, dir).map_err(|e| {
            warn!("Try to open DB at this location: {:?} and failed: {:?}", dir, e);
            StorageError::DbError(e)
        })?;

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(false);
        let mut sync_write_opts = WriteOptions::default();
        sync_write_opts.set_sync(true);

        info!(?dir, "engine opened");
        Ok(Self {
            dir: dir.to_path_buf(),
            db: RwLock::new(Some(db)),
            read_opts: ReadOptions::default(),
            write_opts,
            sync_write_opts,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_closed(&self) -> bool {
        self.db.read().is_none()
    }

    /// Shared access to the live engine, held until the guard drops.
    pub(crate) fn read_guard(&self) -> Result<MappedRwLockReadGuard<'_, DB>> {
        RwLockReadGuard::try_map(self.db.read(), |db| db.as_ref())
            .map_err(|_| StorageError::EngineClosed.into())
    }

    /// Point lookup. The value is copied out of the engine's pinned buffer.
    pub fn lookup(
        &self,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>> {
        let db = self.read_guard()?;
        match db.get_pinned_opt(key, &self.read_opts) {
            Ok(Some(v)) => Ok(Some(v.to_vec())),
            Ok(None) => Ok(None),
            Err(e) => {
                error!("engine lookup error: {}", e);
                Err(StorageError::DbError(e).into())
            }
        }
    }

    /// Commits `batch` atomically. `durable` forces an fsync of the engine WAL
    /// before returning.
    pub fn write(
        &self,
        batch: WriteBatch,
        durable: bool,
    ) -> Result<()> {
        let db = self.read_guard()?;
        let opts = if durable {
            &self.sync_write_opts
        } else {
            &self.write_opts
        };
        let records = batch.len();
        db.write_opt(batch, opts).map_err(|e| {
            error!("engine batch commit failed: {:?}", e);
            StorageError::DbError(e)
        })?;
        debug!(records, durable, "batch committed");
        Ok(())
    }

    /// Materializes a point-in-time copy of the engine at `target`.
    ///
    /// `target` must not exist. SST files are hard-linked, so the cost does
    /// not grow with the data size.
    pub fn checkpoint(
        &self,
        target: &Path,
    ) -> Result<()> {
        let db = self.read_guard()?;
        let checkpoint = Checkpoint::new(&*db).map_err(StorageError::DbError)?;
        checkpoint
            .create_checkpoint(target)
            .map_err(StorageError::DbError)?;
        debug!(?target, "checkpoint created");
        Ok(())
    }

    /// Marks the handle closed and releases the engine.
    ///
    /// Waits for in-flight lookups to drain. A second call is a lifecycle
    /// violation.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.db.write();
        match guard.take() {
            Some(db) => {
                drop(db);
                info!(dir = ?self.dir, "engine closed");
                Ok(())
            }
            None => {
                error!(dir = ?self.dir, "engine closed twice");
                Err(FatalError::EngineAlreadyClosed {
                    dir: self.dir.clone(),
                }
                .into())
            }
        }
    }
}
