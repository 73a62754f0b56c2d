use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Identity of the replica whose state machine lives on this node.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NodeConfig {
    /// Shard (raft group) identifier
    ///
    /// Default: `default_shard_id()` (1)
    #[serde(default = "default_shard_id")]
    pub shard_id: u64,

    /// Replica identifier inside the shard
    ///
    /// Default: `default_replica_id()` (1)
    #[serde(default = "default_replica_id")]
    pub replica_id: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            shard_id: default_shard_id(),
            replica_id: default_replica_id(),
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.shard_id == 0 {
            return Err(Error::Config(ConfigError::Message(
                "shard_id cannot be 0".into(),
            )));
        }
        if self.replica_id == 0 {
            return Err(Error::Config(ConfigError::Message(
                "replica_id cannot be 0 (reserved for invalid replicas)".into(),
            )));
        }
        Ok(())
    }
}

fn default_shard_id() -> u64 {
    1
}
fn default_replica_id() -> u64 {
    1
}
