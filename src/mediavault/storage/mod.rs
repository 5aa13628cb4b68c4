pub mod allocator;
pub mod directories;
pub mod filenames;

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};

use crate::mediavault::error::{MediavaultError, Result};
use allocator::AllocationQueue;

/// Name of the media subdirectory created under each parent location.
pub const MEDIA_DIRECTORY_NAME: &str = "Media";

/// The well-known local media directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaDirectory {
    /// Persistent user documents; files waiting for upload live here.
    Uploads,
    /// Purgeable cache area for discardable files such as thumbnails.
    Cache,
    /// Process-scoped scratch space.
    Temporary,
}

/// Which records keep their local files alive during a purge of the
/// uploads directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgePolicy {
    /// Keep files of records still attached to a blog; reclaims files
    /// orphaned by record deletion or a failed migration.
    UnusedFiles,
    /// Keep files of records without a remote copy; reclaims local copies
    /// made redundant by a completed upload.
    CachedRemoteFiles,
}

/// Parent locations the media directories are created under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRoots {
    pub uploads: PathBuf,
    pub cache: PathBuf,
    pub temporary: PathBuf,
}

impl DirectoryRoots {
    /// Platform-standard locations: documents, caches and the temp dir.
    ///
    /// Falls back to `fallback` when the platform has no documents or cache
    /// directory (headless Linux without XDG dirs, for instance).
    pub fn platform_default(fallback: &Path) -> Self {
        Self {
            uploads: dirs::document_dir()
                .or_else(dirs::data_dir)
                .unwrap_or_else(|| fallback.join("documents")),
            cache: dirs::cache_dir().unwrap_or_else(|| fallback.join("caches")),
            temporary: std::env::temp_dir(),
        }
    }

    /// All three parents as siblings under `base`.
    pub fn under(base: &Path) -> Self {
        Self {
            uploads: base.join("documents"),
            cache: base.join("caches"),
            temporary: base.join("tmp"),
        }
    }

    fn parent(&self, kind: MediaDirectory) -> &Path {
        match kind {
            MediaDirectory::Uploads => &self.uploads,
            MediaDirectory::Cache => &self.cache,
            MediaDirectory::Temporary => &self.temporary,
        }
    }
}

/// Storage layer for the local media directories.
///
/// Every method that touches the filesystem runs on the blocking pool.
#[derive(Debug)]
pub struct Storage {
    roots: DirectoryRoots,
    allocator: AllocationQueue,
}

impl Storage {
    pub(crate) fn new(roots: DirectoryRoots) -> Self {
        Self {
            roots,
            allocator: AllocationQueue::spawn(),
        }
    }

    /// Path of a media directory. Pure; see [`Storage::directory`] for the
    /// variant that creates it.
    pub fn resolve(&self, kind: MediaDirectory) -> PathBuf {
        self.roots.parent(kind).join(MEDIA_DIRECTORY_NAME)
    }

    /// Resolves a media directory and creates it if missing.
    pub async fn directory(&self, kind: MediaDirectory) -> Result<PathBuf> {
        let path = self.resolve(kind);
        tokio::task::spawn_blocking(move || directories::ensure_exists(&path)).await?
    }

    pub async fn allocated_size(&self, kind: MediaDirectory) -> Result<u64> {
        let directory = self.directory(kind).await?;
        tokio::task::spawn_blocking(move || directories::allocated_size(&directory)).await?
    }

    /// Removes every entry of a media directory not named in `keep`.
    ///
    /// Names currently reserved by the allocation queue are kept as well.
    pub async fn purge(&self, kind: MediaDirectory, keep: HashSet<String>) -> Result<usize> {
        self.purge_with(kind, async move { Ok::<_, MediavaultError>(keep) }).await
    }

    /// Like [`Storage::purge`], with the keep list computed only once the
    /// purge holds the allocation queue. Use this when `keep` is read from
    /// records that may be created concurrently.
    pub async fn purge_with<F>(&self, kind: MediaDirectory, keep: F) -> Result<usize>
    where
        F: Future<Output = Result<HashSet<String>>>,
    {
        let directory = self.directory(kind).await?;
        self.allocator.purge(&directory, keep).await
    }

    /// Collision-free path for a new file in a media directory, reserved
    /// until [`Storage::release`] is called for it.
    pub async fn allocate(
        &self,
        kind: MediaDirectory,
        filename: &str,
        extension: Option<&str>,
    ) -> Result<PathBuf> {
        let directory = self.directory(kind).await?;
        self.allocator.allocate(&directory, filename, extension).await
    }

    /// Drops the reservation for `path`. Unknown paths are ignored.
    pub async fn release(&self, path: &Path) -> Result<()> {
        self.allocator.release(path).await
    }
}
