use std::path::PathBuf;

use thiserror::Error;

use crate::mediavault::database::DatabaseError;
use crate::mediavault::media_assets::RemoteStatus;

pub type Result<T> = core::result::Result<T, MediavaultError>;

#[derive(Error, Debug)]
pub enum MediavaultError {
    #[error("Media directory unavailable at {path:?}: {source}")]
    DirectoryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Filesystem error: {0}")]
    FileIo(#[from] std::io::Error),

    #[error("Directory traversal error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Media asset not found: {0}")]
    MediaAssetNotFound(i64),

    #[error("Invalid remote status transition from {from} to {to}")]
    InvalidStatusTransition { from: RemoteStatus, to: RemoteStatus },

    #[error("Media asset {0} has no local source to upload")]
    UnrecoverableMediaAsset(i64),

    #[error("A synced media asset requires a remote URL")]
    MissingRemoteUrl,

    #[error("Invalid media URL: {0}")]
    InvalidMediaUrl(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Allocation queue closed")]
    AllocationQueueClosed,

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for MediavaultError {
    fn from(err: sqlx::Error) -> Self {
        MediavaultError::Database(DatabaseError::Sqlx(err))
    }
}
