use std::path::Path;
use std::sync::{Mutex, OnceLock};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt::Layer, prelude::*, registry::Registry};

mod mediavault;

pub use mediavault::{
    MAX_AUTO_UPLOAD_RETRIES, Mediavault, MediavaultConfig,
    content_repair::repair_content,
    database::DatabaseError,
    error::{MediavaultError, Result},
    local_store::image_size_for_media_at,
    media_assets::{MediaAsset, NewMediaAsset, RemoteStatus, UploadError},
    reconciler::ReconcileSummary,
    scheduled_tasks::{DEFAULT_CLEANUP_INTERVAL, SchedulerConfig, Task},
    storage::{
        DirectoryRoots, MEDIA_DIRECTORY_NAME, MediaDirectory, PurgePolicy, Storage,
        allocator::AllocationQueue,
        filenames::{allocate_url, thumbnail_filename},
    },
};

static TRACING_GUARDS: OnceLock<Mutex<Option<(WorkerGuard, WorkerGuard)>>> = OnceLock::new();
static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs the process-wide tracing subscriber.
///
/// Logs go to stdout and to a daily rolling file in `logs_dir`. Subsequent
/// calls are no-ops.
pub fn init_tracing(logs_dir: &Path) {
    TRACING_INIT.get_or_init(|| {
        let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix("mediavault")
            .filename_suffix("log")
            .build(logs_dir)
            .expect("Failed to create file appender");

        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
        let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

        TRACING_GUARDS
            .set(Mutex::new(Some((file_guard, stdout_guard))))
            .ok();

        let stdout_layer = Layer::new()
            .with_writer(non_blocking_stdout)
            .with_ansi(true)
            .with_target(true);

        let file_layer = Layer::new()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_target(true);

        // A test harness or host application may already own the global subscriber
        let _ = Registry::default()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(stdout_layer)
            .with(file_layer)
            .try_init();
    });
}
