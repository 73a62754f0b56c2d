//! On-disk State Machine Error Hierarchy
//!
//! Errors are split by how the caller is expected to react:
//! - [`StorageError`]: I/O and engine failures, safe to report and retry
//! - [`FatalError`]: broken on-disk invariants or lifecycle violations that must
//!   terminate the process instead of being retried

use std::path::PathBuf;
use std::string::FromUtf8Error;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (disk, engine, serialization)
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(#[from] FatalError),
}

impl Error {
    /// Identifies errors the caller must not retry or swallow.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        StorageError::IoError(e).into()
    }
}

impl From<ConvertError> for Error {
    fn from(e: ConvertError) -> Self {
        StorageError::Convert(e).into()
    }
}

impl From<rocksdb::Error> for Error {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::DbError(e).into()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures during pointer or directory operations
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// I/O failure bound to the path it happened on
    #[error("Error occurred at path: {path}")]
    PathError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    DbError(#[from] rocksdb::Error),

    /// Serialization failures for snapshot entries
    #[error(transparent)]
    BincodeError(#[from] bincode::Error),

    /// Malformed or inconsistent snapshot stream
    #[error("Snapshot operation failed: {0}")]
    Snapshot(String),

    /// Snapshot save or recovery was cancelled through its stop token
    #[error("Snapshot operation stopped")]
    SnapshotStopped,

    /// The engine handle was closed before or while the operation ran
    #[error("Engine already closed")]
    EngineClosed,

    /// Error type for value conversion operations
    #[error("Value convert failed")]
    Convert(#[from] ConvertError),
}

/// Error type for value conversion operations
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// Invalid input length error
    ///
    /// This occurs when the input byte slice length doesn't match the required 8 bytes.
    #[error("invalid byte length: expected 8 bytes, received {0} bytes")]
    InvalidLength(usize),

    /// Stored value is not valid UTF-8
    #[error("conversion failure: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),
}

/// Invariant violations. None of these are transient.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("pointer file {path:?} is corrupted: {reason}")]
    PointerCorrupted { path: PathBuf, reason: &'static str },

    #[error("engine directory {path:?} named by the pointer file does not exist")]
    EngineDirectoryMissing { path: PathBuf },

    #[error("applied index not moving forward: last applied {last_applied}, batch ends at {index}")]
    AppliedIndexNotIncreasing { last_applied: u64, index: u64 },

    #[error("recovered applied index {recovered} is behind last applied {last_applied}")]
    AppliedIndexRegressed { last_applied: u64, recovered: u64 },

    #[error("received entry {index} out of order (previous {prev})")]
    UnorderedEntry { prev: u64, index: u64 },

    #[error("committed entry {index} is not a valid KV record")]
    MalformedEntry {
        index: u64,
        #[source]
        source: bincode::Error,
    },

    #[error("{operation} called after close")]
    UseAfterClose { operation: &'static str },

    #[error("{operation} called after abort")]
    UseAfterAbort { operation: &'static str },

    #[error("{operation} called before open")]
    NotOpened { operation: &'static str },

    #[error("state machine opened twice")]
    AlreadyOpened,

    #[error("close called twice")]
    DoubleClose,

    #[error("engine at {dir:?} closed twice")]
    EngineAlreadyClosed { dir: PathBuf },
}
