use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::Mutex;

pub mod content_repair;
pub mod database;
pub mod error;
pub mod local_store;
pub mod media_assets;
pub mod reconciler;
pub mod scheduled_tasks;
pub mod storage;

use crate::init_tracing;

use database::Database;
use error::{MediavaultError, Result};
use scheduled_tasks::{SchedulerConfig, SchedulerHandle};
use storage::{DirectoryRoots, MediaDirectory, Storage};

/// Automated upload attempts allowed before a failed asset is left for the
/// user to retry by hand.
pub const MAX_AUTO_UPLOAD_RETRIES: u32 = 3;

#[derive(Clone, Debug)]
pub struct MediavaultConfig {
    /// Directory for application data
    pub data_dir: PathBuf,

    /// Directory for application logs
    pub logs_dir: PathBuf,

    /// Parents of the uploads, cache and temporary media directories
    pub directory_roots: DirectoryRoots,

    pub max_auto_upload_retries: u32,

    pub scheduler: SchedulerConfig,
}

impl MediavaultConfig {
    pub fn new(data_dir: &Path, logs_dir: &Path) -> Self {
        let env_suffix = if cfg!(debug_assertions) {
            "dev"
        } else {
            "release"
        };
        let formatted_data_dir = data_dir.join(env_suffix);
        let formatted_logs_dir = logs_dir.join(env_suffix);
        let directory_roots = DirectoryRoots::platform_default(&formatted_data_dir);

        Self {
            data_dir: formatted_data_dir,
            logs_dir: formatted_logs_dir,
            directory_roots,
            max_auto_upload_retries: MAX_AUTO_UPLOAD_RETRIES,
            scheduler: SchedulerConfig::default(),
        }
    }

    /// Places the media directories under `roots` instead of the platform
    /// locations.
    pub fn with_directory_roots(mut self, roots: DirectoryRoots) -> Self {
        self.directory_roots = roots;
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.scheduler.enabled && self.scheduler.cleanup_interval.is_zero() {
            return Err(MediavaultError::Configuration(
                "scheduler cleanup interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Local media store: asset records plus the directories holding their files.
pub struct Mediavault {
    pub config: MediavaultConfig,
    database: Arc<Database>,
    storage: Storage,
    scheduler: Mutex<Option<SchedulerHandle>>,
}

impl std::fmt::Debug for Mediavault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mediavault")
            .field("config", &self.config)
            .field("database", &"<REDACTED>")
            .field("storage", &self.storage)
            .finish()
    }
}

impl Mediavault {
    /// Opens the media store described by `config`.
    ///
    /// Creates the data and log directories, installs tracing and opens (or
    /// migrates) the asset database. Media directories are created lazily on
    /// first use.
    pub async fn new(config: MediavaultConfig) -> Result<Self> {
        config.validate()?;

        let data_dir = &config.data_dir;
        let logs_dir = &config.logs_dir;

        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))
            .map_err(MediavaultError::from)?;
        std::fs::create_dir_all(logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))
            .map_err(MediavaultError::from)?;

        init_tracing(logs_dir);

        tracing::debug!(
            target: "mediavault::new",
            "Logging initialized in directory: {:?}",
            logs_dir
        );

        let database = Arc::new(Database::new(data_dir.join("mediavault.sqlite")).await?);
        let storage = Storage::new(config.directory_roots.clone());

        Ok(Self {
            config,
            database,
            storage,
            scheduler: Mutex::new(None),
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Path of a media directory, without touching the filesystem.
    pub fn media_directory_path(&self, kind: MediaDirectory) -> PathBuf {
        self.storage.resolve(kind)
    }

    /// Path of a media directory, created if missing.
    pub async fn media_directory(&self, kind: MediaDirectory) -> Result<PathBuf> {
        self.storage.directory(kind).await
    }

    /// Deletes every asset record and every file in the media directories,
    /// then the log files.
    pub async fn delete_all_data(&self) -> Result<()> {
        tracing::debug!(target: "mediavault::delete_all_data", "Deleting all data");

        self.shutdown_scheduler().await?;

        self.database.delete_all_data().await?;

        for kind in [
            MediaDirectory::Uploads,
            MediaDirectory::Cache,
            MediaDirectory::Temporary,
        ] {
            let path = self.storage.resolve(kind);
            if path.is_dir() {
                tracing::debug!(
                    target: "mediavault::delete_all_data",
                    "Removing media directory: {:?}",
                    path
                );
                tokio::fs::remove_dir_all(&path).await?;
            }
        }

        if self.config.logs_dir.exists() {
            for entry in std::fs::read_dir(&self.config.logs_dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.is_file() {
                    std::fs::remove_file(path)?;
                } else if path.is_dir() {
                    std::fs::remove_dir_all(path)?;
                }
            }
        }

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use crate::mediavault::media_assets::NewMediaAsset;
    use std::time::Duration;

    #[test]
    fn test_config_new_adds_profile_suffix() {
        let config = MediavaultConfig::new(Path::new("/data"), Path::new("/logs"));
        let suffix = if cfg!(debug_assertions) {
            "dev"
        } else {
            "release"
        };
        assert_eq!(config.data_dir, Path::new("/data").join(suffix));
        assert_eq!(config.logs_dir, Path::new("/logs").join(suffix));
        assert_eq!(config.max_auto_upload_retries, MAX_AUTO_UPLOAD_RETRIES);
        assert!(config.scheduler.enabled);
    }

    #[test]
    fn test_with_directory_roots_overrides_platform() {
        let roots = DirectoryRoots::under(Path::new("/sandbox"));
        let config = MediavaultConfig::new(Path::new("/data"), Path::new("/logs"))
            .with_directory_roots(roots.clone());
        assert_eq!(config.directory_roots, roots);
    }

    #[tokio::test]
    async fn test_new_creates_data_and_database() {
        let (mediavault, data_temp, _logs, _roots) = create_mock_mediavault().await;
        assert!(data_temp.path().join("mediavault.sqlite").exists());
        assert!(mediavault.all_media_assets().await.unwrap().is_empty());
        assert!(format!("{:?}", mediavault).contains("<REDACTED>"));
    }

    #[tokio::test]
    async fn test_new_rejects_zero_cleanup_interval() {
        let (config, _data, _logs, _roots) = create_test_config();
        let config = config.with_scheduler(SchedulerConfig {
            enabled: true,
            cleanup_interval: Duration::ZERO,
        });
        let result = Mediavault::new(config).await;
        assert!(matches!(result, Err(MediavaultError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_media_directory_is_lazy() {
        let (mediavault, _data, _logs, roots) = create_mock_mediavault().await;
        let expected = roots.path().join("documents").join(storage::MEDIA_DIRECTORY_NAME);

        assert_eq!(mediavault.media_directory_path(MediaDirectory::Uploads), expected);
        assert!(!expected.exists());

        let created = mediavault.media_directory(MediaDirectory::Uploads).await.unwrap();
        assert_eq!(created, expected);
        assert!(expected.is_dir());
    }

    #[tokio::test]
    async fn test_delete_all_data() {
        let (mediavault, _data, _logs, _roots) = create_mock_mediavault().await;
        let uploads = mediavault.media_directory(MediaDirectory::Uploads).await.unwrap();
        std::fs::write(uploads.join("a.jpg"), b"data").unwrap();
        mediavault
            .create_media_asset(NewMediaAsset::default())
            .await
            .unwrap();

        mediavault.delete_all_data().await.unwrap();

        assert!(mediavault.all_media_assets().await.unwrap().is_empty());
        assert!(!uploads.exists());
    }
}
