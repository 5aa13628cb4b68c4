use url::Url;

use crate::mediavault::Mediavault;
use crate::mediavault::error::{MediavaultError, Result};
use crate::mediavault::media_assets::MediaAsset;
use crate::mediavault::storage::{
    MediaDirectory, PurgePolicy,
    filenames::{file_url, thumbnail_url},
};

/// Pixel dimensions of the image at a local file URL, read from its header.
///
/// `None` when there is no URL, it is not a local regular file, or the file
/// is not an image format we can decode.
pub fn image_size_for_media_at(url: Option<&Url>) -> Option<(u32, u32)> {
    let path = url?.to_file_path().ok()?;
    if !path.is_file() {
        return None;
    }
    match image::image_dimensions(&path) {
        Ok(dimensions) => Some(dimensions),
        Err(e) => {
            tracing::debug!(
                target: "mediavault::local_store",
                "Could not read image dimensions of {:?}: {}",
                path,
                e
            );
            None
        }
    }
}

impl Mediavault {
    /// Combined allocated size of the uploads and cache directories in bytes.
    ///
    /// A directory whose walk fails counts as empty; `None` means no
    /// directory could be measured at all.
    pub async fn calculate_local_store_size(&self) -> Option<u64> {
        let mut total: Option<u64> = None;
        for kind in [MediaDirectory::Uploads, MediaDirectory::Cache] {
            match self.storage.allocated_size(kind).await {
                Ok(size) => total = Some(total.unwrap_or(0).saturating_add(size)),
                Err(e) => {
                    tracing::warn!(
                        target: "mediavault::local_store",
                        "Failed to calculate size of {:?} media directory: {}",
                        kind,
                        e
                    );
                }
            }
        }
        total
    }

    /// Removes upload files no longer referenced by a record attached to a
    /// blog. Returns the number of entries removed.
    pub async fn clear_unused_files(&self) -> Result<usize> {
        self.purge_uploads(PurgePolicy::UnusedFiles).await
    }

    /// Removes local copies of media that already have a remote copy.
    pub async fn clear_cached_files_available_remotely(&self) -> Result<usize> {
        self.purge_uploads(PurgePolicy::CachedRemoteFiles).await
    }

    /// Empties the cache directory, then clears unused upload files.
    pub async fn clear_all_cache_files(&self) -> Result<usize> {
        let cache_removed = self
            .storage
            .purge(MediaDirectory::Cache, Default::default())
            .await?;
        let uploads_removed = self.clear_unused_files().await?;
        Ok(cache_removed + uploads_removed)
    }

    async fn purge_uploads(&self, policy: PurgePolicy) -> Result<usize> {
        let pool = &self.database.pool;
        self.storage
            .purge_with(MediaDirectory::Uploads, async move {
                let keep = MediaAsset::referenced_filenames(pool, policy).await?;
                tracing::debug!(
                    target: "mediavault::local_store",
                    "Purging uploads with {:?}, keeping {} referenced file(s)",
                    policy,
                    keep.len()
                );
                Ok::<_, MediavaultError>(keep)
            })
            .await
    }

    /// Collision-free `file://` URL in the uploads directory for a new file.
    ///
    /// The name stays reserved until a record is created for it or
    /// [`Mediavault::release_local_url`] is called, so concurrent callers
    /// never receive the same URL and a purge running in between leaves the
    /// file alone.
    pub async fn allocate_local_url(&self, filename: &str, extension: Option<&str>) -> Result<Url> {
        let path = self
            .storage
            .allocate(MediaDirectory::Uploads, filename, extension)
            .await?;
        file_url(&path)
    }

    /// Drops the reservation made by [`Mediavault::allocate_local_url`].
    pub async fn release_local_url(&self, url: &Url) -> Result<()> {
        let path = url
            .to_file_path()
            .map_err(|_| MediavaultError::InvalidMediaUrl(url.to_string()))?;
        self.storage.release(&path).await
    }

    /// URL of the thumbnail paired with a local media file.
    pub fn local_thumbnail_url(&self, url: &Url) -> Result<Url> {
        thumbnail_url(url)
    }

    pub fn image_size_for_media_at(&self, url: Option<&Url>) -> Option<(u32, u32)> {
        image_size_for_media_at(url)
    }

    /// Whether the local file behind `url` still exists.
    pub fn local_file_exists(&self, url: &Url) -> bool {
        url.to_file_path()
            .map(|path| path.is_file())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mediavault::media_assets::{NewMediaAsset, RemoteStatus, UploadError};
    use crate::mediavault::test_utils::create_mock_mediavault;

    async fn write_upload(mediavault: &Mediavault, name: &str) -> Url {
        let uploads = mediavault
            .media_directory(MediaDirectory::Uploads)
            .await
            .unwrap();
        let path = uploads.join(name);
        std::fs::write(&path, vec![7u8; 2048]).unwrap();
        Url::from_file_path(path).unwrap()
    }

    #[tokio::test]
    async fn test_clear_unused_files_keeps_attached_media() {
        let (mediavault, _data, _logs, _roots) = create_mock_mediavault().await;

        let attached = write_upload(&mediavault, "attached.jpg").await;
        let detached = write_upload(&mediavault, "detached.jpg").await;
        let orphan = write_upload(&mediavault, "orphan.jpg").await;

        mediavault
            .create_media_asset(NewMediaAsset {
                blog_id: Some(1),
                local_url: Some(attached.clone()),
                local_thumbnail_url: None,
            })
            .await
            .unwrap();
        mediavault
            .create_media_asset(NewMediaAsset {
                blog_id: None,
                local_url: Some(detached.clone()),
                local_thumbnail_url: None,
            })
            .await
            .unwrap();

        let removed = mediavault.clear_unused_files().await.unwrap();

        assert_eq!(removed, 2);
        assert!(mediavault.local_file_exists(&attached));
        assert!(!mediavault.local_file_exists(&detached));
        assert!(!mediavault.local_file_exists(&orphan));
    }

    #[tokio::test]
    async fn test_clear_cached_files_available_remotely() {
        let (mediavault, _data, _logs, _roots) = create_mock_mediavault().await;

        let pending = write_upload(&mediavault, "pending.jpg").await;
        let uploaded = write_upload(&mediavault, "uploaded.jpg").await;

        mediavault
            .create_media_asset(NewMediaAsset {
                blog_id: Some(1),
                local_url: Some(pending.clone()),
                local_thumbnail_url: None,
            })
            .await
            .unwrap();
        let asset = mediavault
            .create_media_asset(NewMediaAsset {
                blog_id: Some(1),
                local_url: Some(uploaded.clone()),
                local_thumbnail_url: None,
            })
            .await
            .unwrap();
        mediavault.mark_pushing(asset.id).await.unwrap();
        mediavault
            .mark_synced(asset.id, Url::parse("https://example.com/uploaded.jpg").unwrap())
            .await
            .unwrap();

        let removed = mediavault
            .clear_cached_files_available_remotely()
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(mediavault.local_file_exists(&pending));
        assert!(!mediavault.local_file_exists(&uploaded));
    }

    #[tokio::test]
    async fn test_live_reference_wins_over_policy() {
        let (mediavault, _data, _logs, _roots) = create_mock_mediavault().await;
        let shared = write_upload(&mediavault, "shared.jpg").await;

        // One uploaded record and one pending record point at the same file
        let uploaded = mediavault
            .create_media_asset(NewMediaAsset {
                blog_id: Some(1),
                local_url: Some(shared.clone()),
                local_thumbnail_url: None,
            })
            .await
            .unwrap();
        mediavault.mark_pushing(uploaded.id).await.unwrap();
        mediavault
            .mark_synced(uploaded.id, Url::parse("https://example.com/shared.jpg").unwrap())
            .await
            .unwrap();
        mediavault
            .create_media_asset(NewMediaAsset {
                blog_id: Some(2),
                local_url: Some(shared.clone()),
                local_thumbnail_url: None,
            })
            .await
            .unwrap();

        let removed = mediavault
            .clear_cached_files_available_remotely()
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert!(mediavault.local_file_exists(&shared));
    }

    #[tokio::test]
    async fn test_clear_all_cache_files() {
        let (mediavault, _data, _logs, _roots) = create_mock_mediavault().await;
        let cache = mediavault
            .media_directory(MediaDirectory::Cache)
            .await
            .unwrap();
        std::fs::write(cache.join("thumb-a.jpg"), b"a").unwrap();
        std::fs::write(cache.join("thumb-b.jpg"), b"b").unwrap();
        write_upload(&mediavault, "orphan.jpg").await;

        let removed = mediavault.clear_all_cache_files().await.unwrap();

        assert_eq!(removed, 3);
        assert_eq!(std::fs::read_dir(&cache).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_calculate_local_store_size() {
        let (mediavault, _data, _logs, _roots) = create_mock_mediavault().await;
        assert_eq!(mediavault.calculate_local_store_size().await, Some(0));

        write_upload(&mediavault, "a.jpg").await;
        let uploads_only = mediavault.calculate_local_store_size().await.unwrap();
        assert!(uploads_only > 0);

        let cache = mediavault
            .media_directory(MediaDirectory::Cache)
            .await
            .unwrap();
        std::fs::write(cache.join("b.jpg"), vec![1u8; 2048]).unwrap();
        let both = mediavault.calculate_local_store_size().await.unwrap();
        assert!(both > uploads_only);
    }

    #[tokio::test]
    async fn test_calculate_local_store_size_when_directories_unavailable() {
        let (mediavault, _data, _logs, roots) = create_mock_mediavault().await;
        // Files where the parents should be make both directories uncreatable
        std::fs::write(roots.path().join("documents"), b"").unwrap();
        std::fs::write(roots.path().join("caches"), b"").unwrap();

        assert_eq!(mediavault.calculate_local_store_size().await, None);
    }

    #[tokio::test]
    async fn test_allocate_local_url_is_unique_until_released() {
        let (mediavault, _data, _logs, _roots) = create_mock_mediavault().await;

        let first = mediavault.allocate_local_url("IMG_01", Some("jpg")).await.unwrap();
        let second = mediavault.allocate_local_url("IMG_01", Some("jpg")).await.unwrap();
        assert!(first.path().ends_with("/Media/img_01.jpg"));
        assert!(second.path().ends_with("/Media/img_01-1.jpg"));

        mediavault.release_local_url(&first).await.unwrap();
        let third = mediavault.allocate_local_url("IMG_01", Some("jpg")).await.unwrap();
        assert_eq!(third, first);

        let thumb = mediavault.local_thumbnail_url(&third).unwrap();
        assert!(thumb.path().ends_with("/Media/img_01-thumbnail.jpg"));
    }

    #[tokio::test]
    async fn test_allocated_file_is_collected_after_its_record_is_deleted() {
        let (mediavault, _data, _logs, _roots) = create_mock_mediavault().await;

        let url = mediavault.allocate_local_url("photo", Some("jpg")).await.unwrap();
        let thumbnail = mediavault.local_thumbnail_url(&url).unwrap();
        std::fs::write(url.to_file_path().unwrap(), b"jpg").unwrap();
        std::fs::write(thumbnail.to_file_path().unwrap(), b"thumb").unwrap();

        let asset = mediavault
            .create_media_asset(NewMediaAsset {
                blog_id: Some(1),
                local_url: Some(url.clone()),
                local_thumbnail_url: Some(thumbnail.clone()),
            })
            .await
            .unwrap();

        assert_eq!(mediavault.clear_unused_files().await.unwrap(), 0);
        assert!(mediavault.local_file_exists(&url));

        mediavault.delete_media_asset(asset.id).await.unwrap();
        assert_eq!(mediavault.clear_unused_files().await.unwrap(), 2);
        assert!(!mediavault.local_file_exists(&url));
        assert!(!mediavault.local_file_exists(&thumbnail));
    }

    #[tokio::test]
    async fn test_allocated_file_without_record_survives_purge() {
        let (mediavault, _data, _logs, _roots) = create_mock_mediavault().await;

        let url = mediavault.allocate_local_url("draft", Some("png")).await.unwrap();
        std::fs::write(url.to_file_path().unwrap(), b"png").unwrap();

        assert_eq!(mediavault.clear_unused_files().await.unwrap(), 0);
        assert!(mediavault.local_file_exists(&url));

        mediavault.release_local_url(&url).await.unwrap();
        assert_eq!(mediavault.clear_unused_files().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_relaunch_reconcile_then_clean() {
        let (mediavault, _data, _logs, _roots) = create_mock_mediavault().await;

        // Upload interrupted mid-flight, source still on disk
        let interrupted_url = write_upload(&mediavault, "interrupted.jpg").await;
        let interrupted = mediavault
            .create_media_asset(NewMediaAsset {
                blog_id: Some(1),
                local_url: Some(interrupted_url.clone()),
                local_thumbnail_url: None,
            })
            .await
            .unwrap();
        mediavault.mark_pushing(interrupted.id).await.unwrap();

        // Import whose source file never made it to disk
        let uploads = mediavault
            .media_directory(MediaDirectory::Uploads)
            .await
            .unwrap();
        let missing = mediavault
            .create_media_asset(NewMediaAsset {
                blog_id: Some(1),
                local_url: Some(Url::from_file_path(uploads.join("missing.jpg")).unwrap()),
                local_thumbnail_url: None,
            })
            .await
            .unwrap();
        mediavault
            .mark_failed(missing.id, UploadError::SourceFileMissing, true)
            .await
            .unwrap();

        // Finished upload that still has its local copy
        let synced_url = write_upload(&mediavault, "synced.jpg").await;
        let synced = mediavault
            .create_media_asset(NewMediaAsset {
                blog_id: Some(1),
                local_url: Some(synced_url.clone()),
                local_thumbnail_url: None,
            })
            .await
            .unwrap();
        mediavault.mark_pushing(synced.id).await.unwrap();
        let synced = mediavault
            .mark_synced(synced.id, Url::parse("https://example.com/synced.jpg").unwrap())
            .await
            .unwrap();

        let stray = write_upload(&mediavault, "stray.jpg").await;

        let summary = mediavault.reconcile().await.unwrap();
        assert_eq!((summary.demoted, summary.deleted), (1, 1));

        let removed = mediavault.clear_unused_files().await.unwrap();
        assert_eq!(removed, 1);

        let interrupted = mediavault.media_asset(interrupted.id).await.unwrap();
        assert_eq!(interrupted.remote_status, RemoteStatus::Failed);
        assert_eq!(interrupted.upload_error, None);
        assert!(mediavault.media_asset(missing.id).await.is_err());
        assert_eq!(mediavault.media_asset(synced.id).await.unwrap(), synced);

        assert!(mediavault.local_file_exists(&interrupted_url));
        assert!(mediavault.local_file_exists(&synced_url));
        assert!(!mediavault.local_file_exists(&stray));
    }

    #[tokio::test]
    async fn test_image_size_for_media_at() {
        let (mediavault, _data, _logs, _roots) = create_mock_mediavault().await;
        let uploads = mediavault
            .media_directory(MediaDirectory::Uploads)
            .await
            .unwrap();

        let image_path = uploads.join("pixel.png");
        let img = ::image::RgbaImage::from_pixel(12, 7, ::image::Rgba([0u8, 0, 255, 255]));
        img.save_with_format(&image_path, ::image::ImageFormat::Png)
            .unwrap();
        let image_url = Url::from_file_path(&image_path).unwrap();

        assert_eq!(mediavault.image_size_for_media_at(Some(&image_url)), Some((12, 7)));
        assert_eq!(mediavault.image_size_for_media_at(None), None);

        let not_image = write_upload(&mediavault, "notes.txt").await;
        assert_eq!(mediavault.image_size_for_media_at(Some(&not_image)), None);

        let directory_url = Url::from_file_path(&uploads).unwrap();
        assert_eq!(mediavault.image_size_for_media_at(Some(&directory_url)), None);
    }
}
