use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use super::validate_directory;
use crate::Error;
use crate::Result;

/// Storage layout and engine tuning.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory holding one node root per `<shard>_<replica>`
    ///
    /// Default: `default_data_dir()` (/tmp/diskkv)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// RocksDB options applied to every engine directory
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            engine: EngineConfig::default(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        validate_directory(&self.data_dir, "data_dir")?;
        self.engine.validate()
    }

    /// Node root for one replica: `<data_dir>/<shard_id>_<replica_id>`.
    pub fn node_root(
        &self,
        shard_id: u64,
        replica_id: u64,
    ) -> PathBuf {
        self.data_dir.join(format!("{shard_id}_{replica_id}"))
    }
}

/// Engine (RocksDB) tuning parameters.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    /// Memtable size in bytes before it is flushed
    #[serde(default = "default_write_buffer_size")]
    pub write_buffer_size: usize,

    /// Manifest file size in bytes before it is rolled
    #[serde(default = "default_max_manifest_file_size")]
    pub max_manifest_file_size: usize,

    /// Maximum number of open files, -1 for unlimited
    #[serde(default = "default_max_open_files")]
    pub max_open_files: i32,

    /// Row cache capacity in bytes, shared by all reads of one engine
    #[serde(default = "default_row_cache_size")]
    pub row_cache_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            write_buffer_size: default_write_buffer_size(),
            max_manifest_file_size: default_max_manifest_file_size(),
            max_open_files: default_max_open_files(),
            row_cache_size: default_row_cache_size(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.write_buffer_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "write_buffer_size must be greater than 0".into(),
            )));
        }
        if self.max_manifest_file_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "max_manifest_file_size must be greater than 0".into(),
            )));
        }
        if self.max_open_files == 0 || self.max_open_files < -1 {
            return Err(Error::Config(ConfigError::Message(format!(
                "max_open_files must be -1 or positive, got {}",
                self.max_open_files
            ))));
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/tmp/diskkv")
}
fn default_write_buffer_size() -> usize {
    // 64MB
    64 * 1024 * 1024
}
fn default_max_manifest_file_size() -> usize {
    // 32MB
    32 * 1024 * 1024
}
fn default_max_open_files() -> i32 {
    5000
}
fn default_row_cache_size() -> usize {
    // 8MB
    8 * 1024 * 1024
}
