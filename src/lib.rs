//! Crash-safe on-disk key-value state machine for a replicated log.
//!
//! Committed entries are applied to a RocksDB engine together with the index
//! of the last applied entry, in one synced batch. Snapshots are streamed from
//! a point-in-time checkpoint and installed into a fresh engine directory that
//! is adopted atomically through a checksummed pointer file.

mod command;
mod config;
pub mod constants;
mod errors;
mod storage;
pub mod utils;

pub use command::*;
pub use config::*;
pub use errors::*;
pub use storage::*;
pub use utils::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
