use std::fs;
use std::fs::File;
use std::path::Path;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use tracing::debug;
use tracing::error;

use crate::Result;
use crate::StorageError;

fn path_error(
    path: &Path,
    source: std::io::Error,
) -> StorageError {
    StorageError::PathError {
        path: path.to_path_buf(),
        source,
    }
}

/// Flushes directory metadata (entry creation, rename, removal) to disk.
#[cfg(unix)]
pub fn sync_dir(dir: &Path) -> Result<()> {
    let df = File::open(dir).map_err(|e| path_error(dir, e))?;
    df.sync_all().map_err(|e| path_error(dir, e))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Creates `dir` (and missing ancestors), then syncs its parent so the new
/// entry survives a crash.
pub fn create_dir_durable(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| {
        error!("Failed to create directory {:?}: {:?}", dir, e);
        path_error(dir, e)
    })?;
    if let Some(parent) = dir.parent() {
        if !parent.as_os_str().is_empty() {
            sync_dir(parent)?;
        }
    }
    debug!("created directory: {:?}", dir);
    Ok(())
}

/// Removes `dir` recursively, then syncs its parent.
pub fn remove_dir_durable(dir: &Path) -> Result<()> {
    fs::remove_dir_all(dir).map_err(|e| path_error(dir, e))?;
    if let Some(parent) = dir.parent() {
        if !parent.as_os_str().is_empty() {
            sync_dir(parent)?;
        }
    }
    debug!("removed directory: {:?}", dir);
    Ok(())
}

/// Collision-resistant directory name: `<random u64>_<unix nanos>`.
pub fn random_dir_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{}_{}", rand::random::<u64>(), nanos)
}
