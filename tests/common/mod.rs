use std::fs;
use std::path::Path;

use diskkv::stage_applied_index;
use diskkv::EngineConfig;
use diskkv::EngineHandle;
use diskkv::Entry;
use diskkv::KvRecord;
use diskkv::Query;
use diskkv::QueryResult;
use diskkv::RocksDBStateMachine;
use diskkv::StateMachine;
use diskkv::StorageConfig;
use rocksdb::WriteBatch;
use tempfile::TempDir;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    env_logger::init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
    println!("setup logger for integration test.");
}

pub struct Node {
    pub dir: TempDir,
    pub config: StorageConfig,
}

impl Node {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        Self { dir, config }
    }

    pub fn state_machine(&self) -> RocksDBStateMachine {
        RocksDBStateMachine::new(1, 1, &self.config)
    }

    pub fn root(&self) -> std::path::PathBuf {
        self.config.node_root(1, 1)
    }
}

pub fn insert_entries(
    start: u64,
    end: u64,
    tag: &str,
) -> Vec<Entry> {
    (start..=end)
        .map(|i| {
            let record = KvRecord::new(format!("key-{i}"), format!("{tag}-{i}"));
            Entry::new(i, record.encode().expect("encode record"))
        })
        .collect()
}

pub fn get(
    sm: &RocksDBStateMachine,
    key: &str,
) -> Option<String> {
    match sm.lookup(Query::get(key)).expect("lookup") {
        QueryResult::Value(v) => Some(v),
        QueryResult::NotFound => None,
        other => panic!("unexpected query result: {:?}", other),
    }
}

/// Writes an engine directory directly, as a snapshot install would before
/// reaching the pointer swap.
pub fn populate_engine_dir(
    dir: &Path,
    entries: &[(&str, &str)],
    applied_index: u64,
) {
    let handle = EngineHandle::open(dir, &EngineConfig::default()).expect("open engine");
    let mut batch = WriteBatch::default();
    for (k, v) in entries {
        batch.put(k.as_bytes(), v.as_bytes());
    }
    stage_applied_index(&mut batch, applied_index);
    handle.write(batch, true).expect("write batch");
    handle.close().expect("close engine");
}

pub fn subdirs(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(root)
        .expect("read root")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
