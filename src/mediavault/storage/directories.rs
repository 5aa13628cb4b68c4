//! Blocking filesystem primitives for the local media directories.
//!
//! Callers run these on the blocking pool; see [`super::Storage`].

use std::collections::HashSet;
use std::fs::Metadata;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::mediavault::error::{MediavaultError, Result};

/// Creates `path` (with intermediate directories) unless a directory is
/// already there.
///
/// A regular file occupying `path` is never replaced; directory creation
/// fails and the error is surfaced as [`MediavaultError::DirectoryUnavailable`].
pub fn ensure_exists(path: &Path) -> Result<PathBuf> {
    if !path.is_dir() {
        tracing::debug!(
            target: "mediavault::storage::directories",
            "Creating media directory {:?}",
            path
        );
        std::fs::create_dir_all(path).map_err(|source| MediavaultError::DirectoryUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(path.to_path_buf())
}

/// Best-effort allocated size of every regular file below `directory`.
///
/// Symbolic links are not followed and directory entries themselves are not
/// counted; hard links are counted once per link. The first I/O error aborts
/// the walk, since a partial total would be misleading.
pub fn allocated_size(directory: &Path) -> Result<u64> {
    let mut total: u64 = 0;
    for entry in WalkDir::new(directory).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = entry.metadata()?;
        total = total.saturating_add(total_allocated_size(&metadata).unwrap_or(metadata.len()));
    }
    Ok(total)
}

/// On-disk blocks reserved for the file, including sparse and compressed
/// layouts, when the platform reports them.
#[cfg(unix)]
fn total_allocated_size(metadata: &Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.blocks().saturating_mul(512))
}

#[cfg(not(unix))]
fn total_allocated_size(_metadata: &Metadata) -> Option<u64> {
    None
}

/// Removes every top-level entry of `directory` whose name is not in `keep`.
///
/// `keep` must be the complete allow-list: anything absent from it is
/// deleted. Hidden entries are left alone. A failure to remove one entry is
/// logged and skipped; a failure to list the directory is returned.
pub fn purge(directory: &Path, keep: &HashSet<String>) -> Result<usize> {
    let mut removed_count = 0;
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        if name.starts_with('.') || keep.contains(name.as_ref()) {
            continue;
        }

        let path = entry.path();
        let removal = match entry.file_type() {
            Ok(file_type) if file_type.is_dir() => std::fs::remove_dir_all(&path),
            Ok(_) => std::fs::remove_file(&path),
            Err(e) => Err(e),
        };
        match removal {
            Ok(()) => removed_count += 1,
            Err(e) => {
                tracing::error!(
                    target: "mediavault::storage::directories",
                    "Error while removing unused media at {:?}: {}",
                    path,
                    e
                );
            }
        }
    }

    if removed_count > 0 {
        tracing::info!(
            target: "mediavault::storage::directories",
            "Removed {} file(s) from {:?} during cleanup",
            removed_count,
            directory
        );
    }
    Ok(removed_count)
}
