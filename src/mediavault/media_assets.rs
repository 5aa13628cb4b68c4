use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::mediavault::Mediavault;
use crate::mediavault::error::{MediavaultError, Result};
use crate::mediavault::storage::filenames::file_name_of;

/// Position of a media asset in the upload pipeline.
///
/// ```text
/// local -> pushing -> processing -> synced
/// pushing/processing -> failed      (interrupted, detected at next launch)
/// failed -> pushing                 (retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteStatus {
    Local,
    Pushing,
    Processing,
    Synced,
    Failed,
}

impl RemoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteStatus::Local => "local",
            RemoteStatus::Pushing => "pushing",
            RemoteStatus::Processing => "processing",
            RemoteStatus::Synced => "synced",
            RemoteStatus::Failed => "failed",
        }
    }

    /// Statuses that are only valid while an in-memory upload task is alive.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, RemoteStatus::Pushing | RemoteStatus::Processing)
    }

    pub fn can_transition_to(&self, next: RemoteStatus) -> bool {
        use RemoteStatus::*;
        matches!(
            (self, next),
            (Local, Pushing)
                | (Local, Failed)
                | (Pushing, Processing)
                | (Pushing, Synced)
                | (Pushing, Failed)
                | (Processing, Synced)
                | (Processing, Failed)
                | (Failed, Pushing)
                | (Failed, Failed)
        )
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemoteStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "local" => Ok(RemoteStatus::Local),
            "pushing" => Ok(RemoteStatus::Pushing),
            "processing" => Ok(RemoteStatus::Processing),
            "synced" => Ok(RemoteStatus::Synced),
            "failed" => Ok(RemoteStatus::Failed),
            _ => Err(format!("Invalid remote status: {}", s)),
        }
    }
}

/// Why an upload attempt failed.
///
/// `SourceFileMissing` is the only unrecoverable kind: the local file the
/// upload would read from no longer exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadError {
    SourceFileMissing,
    NetworkFailure,
    ServerRejected,
    Cancelled,
    Unknown,
}

impl UploadError {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadError::SourceFileMissing => "source_file_missing",
            UploadError::NetworkFailure => "network_failure",
            UploadError::ServerRejected => "server_rejected",
            UploadError::Cancelled => "cancelled",
            UploadError::Unknown => "unknown",
        }
    }

    pub fn is_unrecoverable(&self) -> bool {
        match self {
            UploadError::SourceFileMissing => true,
            UploadError::NetworkFailure
            | UploadError::ServerRejected
            | UploadError::Cancelled
            | UploadError::Unknown => false,
        }
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadError {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "source_file_missing" => Ok(UploadError::SourceFileMissing),
            "network_failure" => Ok(UploadError::NetworkFailure),
            "server_rejected" => Ok(UploadError::ServerRejected),
            "cancelled" => Ok(UploadError::Cancelled),
            "unknown" => Ok(UploadError::Unknown),
            _ => Err(format!("Invalid upload error: {}", s)),
        }
    }
}

/// Persisted record describing one media item and its local/remote state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: i64,
    /// Owning site; `None` once the asset is detached from any content.
    pub blog_id: Option<i64>,
    pub remote_status: RemoteStatus,
    pub upload_error: Option<UploadError>,
    pub auto_upload_failure_count: u32,
    pub local_url: Option<Url>,
    pub local_thumbnail_url: Option<Url>,
    pub remote_url: Option<Url>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaAsset {
    pub fn has_remote(&self) -> bool {
        self.remote_url.is_some()
    }

    /// Whether an upload could ever succeed for this record.
    pub fn is_recoverable(&self) -> bool {
        self.remote_status == RemoteStatus::Synced || self.local_url.is_some()
    }
}

/// Fields supplied by the capture/import flow when a new asset is recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewMediaAsset {
    pub blog_id: Option<i64>,
    pub local_url: Option<Url>,
    pub local_thumbnail_url: Option<Url>,
}

impl Mediavault {
    /// Records a new asset in the `local` state.
    ///
    /// Local URLs handed out by [`Mediavault::allocate_local_url`] are
    /// released once the record exists; from then on the record keeps the
    /// files alive.
    pub async fn create_media_asset(&self, new_asset: NewMediaAsset) -> Result<MediaAsset> {
        for url in [&new_asset.local_url, &new_asset.local_thumbnail_url]
            .into_iter()
            .flatten()
        {
            if file_name_of(url).is_none() {
                return Err(MediavaultError::InvalidMediaUrl(url.to_string()));
            }
        }
        let asset = MediaAsset::insert(&self.database.pool, &new_asset).await?;
        tracing::debug!(
            target: "mediavault::media_assets",
            "Created media asset {} (blog: {:?})",
            asset.id,
            asset.blog_id
        );

        for url in [&asset.local_url, &asset.local_thumbnail_url]
            .into_iter()
            .flatten()
        {
            if let Err(e) = self.release_local_url(url).await {
                tracing::warn!(
                    target: "mediavault::media_assets",
                    "Failed to release reservation for {}: {}",
                    url,
                    e
                );
            }
        }
        Ok(asset)
    }

    pub async fn media_asset(&self, id: i64) -> Result<MediaAsset> {
        MediaAsset::find_by_id(&self.database.pool, id)
            .await?
            .ok_or(MediavaultError::MediaAssetNotFound(id))
    }

    pub async fn all_media_assets(&self) -> Result<Vec<MediaAsset>> {
        Ok(MediaAsset::find_all(&self.database.pool).await?)
    }

    /// Upload started (first attempt or retry). Clears the previous
    /// attempt's error.
    pub async fn mark_pushing(&self, id: i64) -> Result<MediaAsset> {
        self.transition(id, RemoteStatus::Pushing, |asset| {
            asset.upload_error = None;
            Ok(())
        })
        .await
    }

    /// Server acknowledged the upload and is post-processing it.
    pub async fn mark_processing(&self, id: i64) -> Result<MediaAsset> {
        self.transition(id, RemoteStatus::Processing, |_| Ok(())).await
    }

    /// Server confirmed the remote copy.
    pub async fn mark_synced(&self, id: i64, remote_url: Url) -> Result<MediaAsset> {
        self.transition(id, RemoteStatus::Synced, move |asset| {
            asset.remote_url = Some(remote_url);
            asset.upload_error = None;
            Ok(())
        })
        .await
    }

    /// Records a failed attempt. Automated attempts count towards the
    /// auto-retry cap; user-initiated ones do not.
    pub async fn mark_failed(
        &self,
        id: i64,
        error: UploadError,
        automated: bool,
    ) -> Result<MediaAsset> {
        self.transition(id, RemoteStatus::Failed, move |asset| {
            asset.upload_error = Some(error);
            if automated {
                asset.auto_upload_failure_count = asset.auto_upload_failure_count.saturating_add(1);
            }
            Ok(())
        })
        .await
    }

    pub async fn reset_auto_upload_failures(&self, id: i64) -> Result<MediaAsset> {
        let mut asset = self.media_asset(id).await?;
        asset.auto_upload_failure_count = 0;
        MediaAsset::update(&self.database.pool, &asset)
            .await?
            .ok_or(MediavaultError::MediaAssetNotFound(id))
    }

    /// Deletes the record only; its files are reclaimed by the next purge.
    pub async fn delete_media_asset(&self, id: i64) -> Result<()> {
        if !MediaAsset::delete(&self.database.pool, id).await? {
            return Err(MediavaultError::MediaAssetNotFound(id));
        }
        Ok(())
    }

    async fn transition<F>(&self, id: i64, to: RemoteStatus, mutate: F) -> Result<MediaAsset>
    where
        F: FnOnce(&mut MediaAsset) -> Result<()>,
    {
        let mut txn = self.database.pool.begin().await?;

        let mut asset = MediaAsset::find_by_id(&mut *txn, id)
            .await?
            .ok_or(MediavaultError::MediaAssetNotFound(id))?;

        if !asset.remote_status.can_transition_to(to) {
            return Err(MediavaultError::InvalidStatusTransition {
                from: asset.remote_status,
                to,
            });
        }

        if to == RemoteStatus::Pushing && !asset.is_recoverable() {
            return Err(MediavaultError::UnrecoverableMediaAsset(id));
        }

        let from = asset.remote_status;
        asset.remote_status = to;
        mutate(&mut asset)?;

        if asset.remote_status == RemoteStatus::Synced && asset.remote_url.is_none() {
            return Err(MediavaultError::MissingRemoteUrl);
        }

        let updated = MediaAsset::update(&mut *txn, &asset)
            .await?
            .ok_or(MediavaultError::MediaAssetNotFound(id))?;
        txn.commit().await?;

        tracing::debug!(
            target: "mediavault::media_assets",
            "Media asset {} moved from {} to {}",
            id,
            from,
            to
        );
        Ok(updated)
    }
}
