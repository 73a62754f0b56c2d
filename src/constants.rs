// -
// Engine namespaces

/// Reserved engine key holding the last applied log index (8-byte LE)
pub const APPLIED_INDEX_KEY: &str = "disk_kv_applied_index";

// -
// Node data root layout

/// Pointer file naming the current engine directory
pub const CURRENT_POINTER_FILENAME: &str = "current";
/// Staging name the pointer file is written under before the rename
pub const UPDATING_POINTER_FILENAME: &str = "current.updating";

/// Truncated SHA-256 width stored at the head of the pointer file
pub(crate) const POINTER_CHECKSUM_LEN: usize = 8;

/// Checkpoint dir
pub(crate) const SNAPSHOT_DIR_PREFIX: &str = "snapshot-";

/// Upper bound for one encoded snapshot entry
pub(crate) const MAX_SNAPSHOT_ENTRY_SIZE: u64 = 256 * 1024 * 1024;
