use chrono::{DateTime, Utc};
use sqlx::SqliteExecutor;
use std::collections::HashSet;
use std::str::FromStr;
use url::Url;

use super::{
    DatabaseError,
    utils::{create_column_decode_error, parse_optional_url, parse_timestamp},
};
use crate::mediavault::media_assets::{MediaAsset, NewMediaAsset, RemoteStatus, UploadError};
use crate::mediavault::storage::{PurgePolicy, filenames::file_name_of};

const MEDIA_ASSET_COLUMNS: &str = "id, blog_id, remote_status, upload_error, auto_upload_failure_count,
     local_url, local_thumbnail_url, remote_url, created_at, updated_at";

/// Internal database row representation for the media_assets table
#[derive(Debug)]
pub(crate) struct MediaAssetRow {
    id: i64,
    blog_id: Option<i64>,
    remote_status: RemoteStatus,
    upload_error: Option<UploadError>,
    auto_upload_failure_count: u32,
    local_url: Option<Url>,
    local_thumbnail_url: Option<Url>,
    remote_url: Option<Url>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r, R> sqlx::FromRow<'r, R> for MediaAssetRow
where
    R: sqlx::Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    Option<String>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    Option<i64>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> std::result::Result<Self, sqlx::Error> {
        let id: i64 = row.try_get("id")?;
        let blog_id: Option<i64> = row.try_get("blog_id")?;

        let remote_status_str: String = row.try_get("remote_status")?;
        let remote_status = RemoteStatus::from_str(&remote_status_str)
            .map_err(|e| create_column_decode_error("remote_status", &e))?;

        let upload_error = row
            .try_get::<Option<String>, _>("upload_error")?
            .map(|raw| {
                UploadError::from_str(&raw)
                    .map_err(|e| create_column_decode_error("upload_error", &e))
            })
            .transpose()?;

        let failure_count: i64 = row.try_get("auto_upload_failure_count")?;
        let auto_upload_failure_count = u32::try_from(failure_count).map_err(|_| {
            create_column_decode_error("auto_upload_failure_count", "Out of range failure count")
        })?;

        let local_url = parse_optional_url(row, "local_url")?;
        let local_thumbnail_url = parse_optional_url(row, "local_thumbnail_url")?;
        let remote_url = parse_optional_url(row, "remote_url")?;

        let created_at = parse_timestamp(row, "created_at")?;
        let updated_at = parse_timestamp(row, "updated_at")?;

        Ok(Self {
            id,
            blog_id,
            remote_status,
            upload_error,
            auto_upload_failure_count,
            local_url,
            local_thumbnail_url,
            remote_url,
            created_at,
            updated_at,
        })
    }
}

impl From<MediaAssetRow> for MediaAsset {
    fn from(val: MediaAssetRow) -> Self {
        Self {
            id: val.id,
            blog_id: val.blog_id,
            remote_status: val.remote_status,
            upload_error: val.upload_error,
            auto_upload_failure_count: val.auto_upload_failure_count,
            local_url: val.local_url,
            local_thumbnail_url: val.local_thumbnail_url,
            remote_url: val.remote_url,
            created_at: val.created_at,
            updated_at: val.updated_at,
        }
    }
}

/// Filter over records whose local files must survive a purge.
fn keep_predicate(policy: PurgePolicy) -> &'static str {
    match policy {
        PurgePolicy::UnusedFiles => "blog_id IS NOT NULL",
        PurgePolicy::CachedRemoteFiles => "remote_url IS NULL",
    }
}

impl MediaAsset {
    pub(crate) async fn find_by_id<'e, E>(
        executor: E,
        id: i64,
    ) -> Result<Option<MediaAsset>, DatabaseError>
    where
        E: SqliteExecutor<'e>,
    {
        let query = format!("SELECT {MEDIA_ASSET_COLUMNS} FROM media_assets WHERE id = ?");
        let row = sqlx::query_as::<_, MediaAssetRow>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(row.map(Into::into))
    }

    pub(crate) async fn find_all<'e, E>(executor: E) -> Result<Vec<MediaAsset>, DatabaseError>
    where
        E: SqliteExecutor<'e>,
    {
        let query = format!("SELECT {MEDIA_ASSET_COLUMNS} FROM media_assets ORDER BY id");
        let rows = sqlx::query_as::<_, MediaAssetRow>(&query)
            .fetch_all(executor)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Fetches every record whose status is one of `statuses`.
    pub(crate) async fn find_with_statuses<'e, E>(
        executor: E,
        statuses: &[RemoteStatus],
    ) -> Result<Vec<MediaAsset>, DatabaseError>
    where
        E: SqliteExecutor<'e>,
    {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let query = format!(
            "SELECT {MEDIA_ASSET_COLUMNS} FROM media_assets
             WHERE remote_status IN ({placeholders})
             ORDER BY id"
        );
        let mut statement = sqlx::query_as::<_, MediaAssetRow>(&query);
        for status in statuses {
            statement = statement.bind(status.as_str());
        }
        let rows = statement.fetch_all(executor).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub(crate) async fn insert<'e, E>(
        executor: E,
        new_asset: &NewMediaAsset,
    ) -> Result<MediaAsset, DatabaseError>
    where
        E: SqliteExecutor<'e>,
    {
        let now_ms = Utc::now().timestamp_millis();
        let query = format!(
            "INSERT INTO media_assets (
                blog_id, remote_status, auto_upload_failure_count,
                local_url, local_thumbnail_url, created_at, updated_at
            )
            VALUES (?, 'local', 0, ?, ?, ?, ?)
            RETURNING {MEDIA_ASSET_COLUMNS}"
        );
        let row = sqlx::query_as::<_, MediaAssetRow>(&query)
            .bind(new_asset.blog_id)
            .bind(new_asset.local_url.as_ref().map(Url::as_str))
            .bind(new_asset.local_thumbnail_url.as_ref().map(Url::as_str))
            .bind(now_ms)
            .bind(now_ms)
            .fetch_one(executor)
            .await?;
        Ok(row.into())
    }

    /// Writes every mutable field of `asset`; returns `None` if the row is gone.
    pub(crate) async fn update<'e, E>(
        executor: E,
        asset: &MediaAsset,
    ) -> Result<Option<MediaAsset>, DatabaseError>
    where
        E: SqliteExecutor<'e>,
    {
        let now_ms = Utc::now().timestamp_millis();
        let query = format!(
            "UPDATE media_assets
             SET blog_id = ?, remote_status = ?, upload_error = ?,
                 auto_upload_failure_count = ?, local_url = ?, local_thumbnail_url = ?,
                 remote_url = ?, updated_at = ?
             WHERE id = ?
             RETURNING {MEDIA_ASSET_COLUMNS}"
        );
        let row = sqlx::query_as::<_, MediaAssetRow>(&query)
            .bind(asset.blog_id)
            .bind(asset.remote_status.as_str())
            .bind(asset.upload_error.map(|e| e.as_str()))
            .bind(i64::from(asset.auto_upload_failure_count))
            .bind(asset.local_url.as_ref().map(Url::as_str))
            .bind(asset.local_thumbnail_url.as_ref().map(Url::as_str))
            .bind(asset.remote_url.as_ref().map(Url::as_str))
            .bind(now_ms)
            .bind(asset.id)
            .fetch_optional(executor)
            .await?;
        Ok(row.map(Into::into))
    }

    pub(crate) async fn delete<'e, E>(executor: E, id: i64) -> Result<bool, DatabaseError>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM media_assets WHERE id = ?")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Filenames of every local copy referenced by a record the policy keeps.
    ///
    /// This is the allow-list handed to a directory purge, so it must cover
    /// all matching records, not a page of them.
    pub(crate) async fn referenced_filenames<'e, E>(
        executor: E,
        policy: PurgePolicy,
    ) -> Result<HashSet<String>, DatabaseError>
    where
        E: SqliteExecutor<'e>,
    {
        let query = format!(
            "SELECT local_url, local_thumbnail_url FROM media_assets WHERE {}",
            keep_predicate(policy)
        );
        let rows: Vec<(Option<String>, Option<String>)> =
            sqlx::query_as(&query).fetch_all(executor).await?;

        let mut filenames = HashSet::new();
        for raw in rows.into_iter().flat_map(|(local, thumb)| [local, thumb]).flatten() {
            match Url::parse(&raw).ok().as_ref().and_then(file_name_of) {
                Some(name) => {
                    filenames.insert(name);
                }
                None => {
                    tracing::warn!(
                        target: "mediavault::database::media_assets",
                        "Ignoring unparseable local media URL: {}",
                        raw
                    );
                }
            }
        }
        Ok(filenames)
    }
}
