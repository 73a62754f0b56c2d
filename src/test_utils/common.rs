use std::path::Path;

use tempfile::TempDir;

use crate::Entry;
use crate::KvRecord;
use crate::RocksDBStateMachine;
use crate::StateMachine;
use crate::StorageConfig;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    env_logger::init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for unit test.");
}

pub(crate) fn storage_config(data_dir: &Path) -> StorageConfig {
    StorageConfig {
        data_dir: data_dir.to_path_buf(),
        ..Default::default()
    }
}

/// Fresh state machine rooted in its own temp dir. Keep the `TempDir` alive
/// for as long as the state machine is used.
pub(crate) fn new_state_machine() -> (TempDir, RocksDBStateMachine) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let sm = RocksDBStateMachine::new(1, 1, &storage_config(dir.path()));
    (dir, sm)
}

pub(crate) fn open_state_machine() -> (TempDir, RocksDBStateMachine) {
    let (dir, sm) = new_state_machine();
    assert_eq!(sm.open().expect("open state machine"), 0);
    (dir, sm)
}

pub(crate) fn insert_entry(
    index: u64,
    key: &str,
    value: &str,
) -> Entry {
    Entry::new(index, KvRecord::new(key, value).encode().expect("encode record"))
}

/// Builds entries `start..=end` writing `key-{i}` = `value-{i}`.
pub(crate) fn insert_entries(
    start: u64,
    end: u64,
) -> Vec<Entry> {
    (start..=end)
        .map(|i| insert_entry(i, &format!("key-{i}"), &format!("value-{i}")))
        .collect()
}
