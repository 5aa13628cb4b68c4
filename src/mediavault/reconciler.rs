use serde::Serialize;

use crate::mediavault::Mediavault;
use crate::mediavault::error::Result;
use crate::mediavault::media_assets::{MediaAsset, RemoteStatus};

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    /// Interrupted `pushing`/`processing` records moved to `failed`.
    pub demoted: usize,
    /// Records removed because their local source file is gone.
    pub deleted: usize,
}

impl ReconcileSummary {
    pub fn is_empty(&self) -> bool {
        self.demoted == 0 && self.deleted == 0
    }
}

impl Mediavault {
    /// Brings asset records back in line with reality after a relaunch.
    ///
    /// No upload task survives a restart, so any record still `pushing` or
    /// `processing` was interrupted and becomes `failed` with its error
    /// cleared. Records whose failure is unrecoverable are deleted. Both
    /// steps commit together or not at all; on error nothing changes and the
    /// next pass retries.
    pub async fn reconcile(&self) -> Result<ReconcileSummary> {
        let mut txn = self.database.pool.begin().await?;

        let candidates = MediaAsset::find_with_statuses(
            &mut *txn,
            &[
                RemoteStatus::Pushing,
                RemoteStatus::Processing,
                RemoteStatus::Failed,
            ],
        )
        .await?;

        let mut summary = ReconcileSummary::default();
        for mut asset in candidates {
            if asset.upload_error.is_some_and(|error| error.is_unrecoverable()) {
                tracing::debug!(
                    target: "mediavault::reconciler",
                    "Deleting unrecoverable media asset {} ({:?})",
                    asset.id,
                    asset.upload_error
                );
                MediaAsset::delete(&mut *txn, asset.id).await?;
                summary.deleted += 1;
                continue;
            }

            if asset.remote_status.is_in_flight() {
                tracing::debug!(
                    target: "mediavault::reconciler",
                    "Media asset {} was interrupted while {}",
                    asset.id,
                    asset.remote_status
                );
                asset.remote_status = RemoteStatus::Failed;
                asset.upload_error = None;
                MediaAsset::update(&mut *txn, &asset).await?;
                summary.demoted += 1;
            }
        }

        txn.commit().await?;

        if !summary.is_empty() {
            tracing::info!(
                target: "mediavault::reconciler",
                "Reconciled media assets: {} demoted to failed, {} deleted",
                summary.demoted,
                summary.deleted
            );
        }
        Ok(summary)
    }

    /// Failed assets eligible for another upload attempt.
    ///
    /// Assets without a local source are never candidates. Automated retries
    /// also skip assets that already used up `max_auto_upload_retries`; a
    /// user-initiated retry sees every other failed asset.
    pub async fn media_for_retry(&self, automated: bool) -> Result<Vec<MediaAsset>> {
        let failed =
            MediaAsset::find_with_statuses(&self.database.pool, &[RemoteStatus::Failed]).await?;
        let cap = self.config.max_auto_upload_retries;
        Ok(failed
            .into_iter()
            .filter(MediaAsset::is_recoverable)
            .filter(|asset| !automated || asset.auto_upload_failure_count < cap)
            .collect())
    }
}
