//! Pointer file protocol.
//!
//! A node root holds any number of engine directories but only one of them is
//! current. The pointer file `<root>/current` names it:
//!
//! ```text
//! +----------------------+------------------------------+
//! | sha256(target)[..8]  | target directory name (utf8) |
//! +----------------------+------------------------------+
//! ```
//!
//! The file is never modified in place. A new version is staged in
//! `<root>/current.updating`, fsynced, renamed over `current`, and the root is
//! fsynced. Adopting a new engine directory therefore reduces to one atomic
//! rename, whatever the size of the directory itself.

use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use sha2::Digest;
use sha2::Sha256;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::constants::CURRENT_POINTER_FILENAME;
use crate::constants::POINTER_CHECKSUM_LEN;
use crate::constants::UPDATING_POINTER_FILENAME;
use crate::file_io::remove_dir_durable;
use crate::file_io::sync_dir;
use crate::FatalError;
use crate::Result;
use crate::StorageError;

fn checksum(target: &[u8]) -> [u8; POINTER_CHECKSUM_LEN] {
    let digest = Sha256::digest(target);
    let mut out = [0u8; POINTER_CHECKSUM_LEN];
    out.copy_from_slice(&digest[..POINTER_CHECKSUM_LEN]);
    out
}

fn pointer_path(root: &Path) -> PathBuf {
    root.join(CURRENT_POINTER_FILENAME)
}

fn io_at(
    path: &Path,
    source: std::io::Error,
) -> StorageError {
    StorageError::PathError {
        path: path.to_path_buf(),
        source,
    }
}

/// True iff no pointer file has been written under `root` yet.
///
/// A pointer that exists but cannot be inspected is an error, never a first
/// run: treating it as absent would overwrite it.
pub fn is_first_run(root: &Path) -> Result<bool> {
    let path = pointer_path(root);
    let exists = path.try_exists().map_err(|e| io_at(&path, e))?;
    Ok(!exists)
}

/// Atomically points `root` at `target`.
///
/// When this returns `Ok`, the new pointer is durable. A crash at any point
/// leaves either the previous pointer or the new one, never a partial file.
pub fn write_pointer(
    root: &Path,
    target: &str,
) -> Result<()> {
    let staged = root.join(UPDATING_POINTER_FILENAME);
    {
        let mut f = File::create(&staged).map_err(|e| io_at(&staged, e))?;
        f.write_all(&checksum(target.as_bytes()))
            .map_err(|e| io_at(&staged, e))?;
        f.write_all(target.as_bytes()).map_err(|e| io_at(&staged, e))?;
        f.sync_all().map_err(|e| io_at(&staged, e))?;
    }

    let current = pointer_path(root);
    fs::rename(&staged, &current).map_err(|e| io_at(&current, e))?;
    sync_dir(root)?;

    info!(?root, dir = target, "pointer file updated");
    Ok(())
}

/// Reads and verifies the pointer file under `root`.
///
/// Any mismatch means a write escaped the staged-rename protocol, so it is
/// reported as [`FatalError::PointerCorrupted`].
pub fn read_pointer(root: &Path) -> Result<String> {
    let path = pointer_path(root);
    let data = fs::read(&path).map_err(|e| io_at(&path, e))?;

    let corrupted = |reason: &'static str| {
        error!(?path, reason, "pointer file corrupted");
        FatalError::PointerCorrupted {
            path: path.clone(),
            reason,
        }
    };

    if data.len() <= POINTER_CHECKSUM_LEN {
        return Err(corrupted("truncated content").into());
    }
    let (stored, content) = data.split_at(POINTER_CHECKSUM_LEN);
    if stored != checksum(content).as_slice() {
        return Err(corrupted("checksum mismatch").into());
    }
    let target = std::str::from_utf8(content).map_err(|_| corrupted("target is not utf8"))?;

    debug!(?root, dir = target, "pointer file loaded");
    Ok(target.to_string())
}

/// Removes everything under `root` the pointer does not reference.
///
/// Directories left behind are engine directories from snapshot installs that
/// never reached the pointer swap, old directories whose deletion was
/// interrupted, and abandoned snapshot checkpoints.
pub fn cleanup_stale_directories(root: &Path) -> Result<()> {
    let staged = root.join(UPDATING_POINTER_FILENAME);
    match fs::remove_file(&staged) {
        Ok(()) => debug!(?staged, "removed staged pointer file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_at(&staged, e).into()),
    }

    let current = read_pointer(root)?;
    for entry in fs::read_dir(root).map_err(|e| io_at(root, e))? {
        let entry = entry.map_err(|e| io_at(root, e))?;
        let file_type = entry.file_type().map_err(|e| io_at(&entry.path(), e))?;
        if !file_type.is_dir() {
            continue;
        }
        if entry.file_name().to_str() == Some(current.as_str()) {
            continue;
        }
        info!(path = ?entry.path(), %current, "removing stale engine directory");
        remove_dir_durable(&entry.path())?;
    }
    Ok(())
}
