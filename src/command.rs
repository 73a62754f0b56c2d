//! Values exchanged with the consensus layer.

use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Client update carried in a committed entry's payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvRecord {
    pub key: String,
    pub value: String,
}

impl KvRecord {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self).map_err(crate::StorageError::BincodeError)?)
    }

    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

/// A committed log entry handed over by the consensus layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub index: u64,
    pub cmd: Vec<u8>,
}

impl Entry {
    pub fn new(
        index: u64,
        cmd: Vec<u8>,
    ) -> Self {
        Self { index, cmd }
    }
}

/// Acknowledgement for one applied entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryResult {
    pub index: u64,
    /// Byte length of the entry payload
    pub value: u64,
}

/// Local read issued against the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Get { key: String },
    /// Applied index as persisted in the active engine
    AppliedIndex,
}

impl Query {
    pub fn get(key: impl Into<String>) -> Self {
        Query::Get { key: key.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    Value(String),
    NotFound,
    AppliedIndex(u64),
}
