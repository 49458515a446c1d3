//! Atomic JSON persistence shared by the durable store and the usage ledger.
//!
//! Writes go to a uniquely named temp file in the target directory, are
//! fsynced, then renamed over the target. A crash mid-write leaves the
//! previous file intact; readers never see a partial file.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{error, warn};

use crate::{HuginnError, Result};

/// Directory a path's temp file must live in (same filesystem as the target).
fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Create the parent directory of `path` if needed.
pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(dir).map_err(|e| {
        error!(dir = %dir.display(), error = %e, "failed to create directory");
        HuginnError::persistence(dir, e)
    })
}

/// Serialise `value` and atomically replace `path` with it.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    ensure_parent_dir(path)?;
    let json = serde_json::to_vec_pretty(value)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent_dir(path))
        .map_err(|e| HuginnError::persistence(path, e))?;
    tmp.as_file_mut()
        .write_all(&json)
        .map_err(|e| HuginnError::persistence(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| HuginnError::persistence(tmp.path(), e))?;

    tmp.persist(path).map_err(|e| {
        error!(path = %path.display(), error = %e.error, "atomic rename failed");
        HuginnError::persistence(path, e.error)
    })?;
    Ok(())
}

/// Load a JSON document from disk.
///
/// Returns `None` on a missing file. Unreadable or corrupt files also return
/// `None` after logging, so callers can start from an empty state.
pub(crate) fn load_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read file");
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            error!(path = %path.display(), error = %e, "corrupt JSON file, starting empty");
            None
        }
    }
}
