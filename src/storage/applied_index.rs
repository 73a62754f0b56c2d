//! Applied index persisted inside the engine it describes.
//!
//! The index lives under [`APPLIED_INDEX_KEY`] and is staged into the same
//! write batch as the data mutations it accompanies, so after any crash the
//! engine holds exactly the data up to the recorded index.

use rocksdb::WriteBatch;

use crate::constants::APPLIED_INDEX_KEY;
use crate::convert::decode_u64;
use crate::convert::encode_u64;
use crate::EngineHandle;
use crate::Result;

/// Stages `index` into `batch` under the reserved key.
pub fn stage_applied_index(
    batch: &mut WriteBatch,
    index: u64,
) {
    batch.put(APPLIED_INDEX_KEY, encode_u64(index));
}

/// Reads the persisted applied index, 0 for an engine nothing was applied to.
pub fn load_applied_index(handle: &EngineHandle) -> Result<u64> {
    match handle.lookup(APPLIED_INDEX_KEY.as_bytes())? {
        Some(bytes) if !bytes.is_empty() => decode_u64(bytes),
        _ => Ok(0),
    }
}
