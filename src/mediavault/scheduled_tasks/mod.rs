use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::Mediavault;
use crate::mediavault::error::Result;

pub mod tasks;

use tasks::LocalStoreCleanup;

/// Default time between two local store cleanups.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Trait for implementing scheduled background tasks.
///
/// Tasks run once when the scheduler starts and then every
/// [`Task::interval`]. Implementations must be idempotent.
#[async_trait]
pub trait Task: Send + Sync {
    /// Returns the unique name of this task for logging and identification.
    fn name(&self) -> &'static str;

    /// Returns the interval between task executions.
    fn interval(&self) -> Duration;

    async fn execute(&self, mediavault: &Mediavault) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub cleanup_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

/// Running scheduler: one loop per task, all stopped by the same signal.
pub(crate) struct SchedulerHandle {
    shutdown_sender: watch::Sender<bool>,
    join_handles: Vec<JoinHandle<()>>,
}

impl Mediavault {
    /// Starts the periodic background tasks.
    ///
    /// Returns `false` when the scheduler is disabled in the configuration or
    /// already running. The loops hold only a weak reference, so dropping the
    /// last `Arc<Mediavault>` stops them at their next tick.
    pub async fn start_scheduler(self: &Arc<Self>) -> Result<bool> {
        if !self.config.scheduler.enabled {
            tracing::debug!(
                target: "mediavault::scheduler",
                "Scheduler disabled, not starting"
            );
            return Ok(false);
        }

        let mut scheduler = self.scheduler.lock().await;
        if scheduler.is_some() {
            return Ok(false);
        }

        let tasks: Vec<Arc<dyn Task>> = vec![Arc::new(LocalStoreCleanup::new(
            self.config.scheduler.cleanup_interval,
        ))];

        let (shutdown_sender, shutdown_receiver) = watch::channel(false);
        let join_handles = tasks
            .into_iter()
            .map(|task| {
                tokio::spawn(run_task(
                    Arc::downgrade(self),
                    task,
                    shutdown_receiver.clone(),
                ))
            })
            .collect();

        *scheduler = Some(SchedulerHandle {
            shutdown_sender,
            join_handles,
        });

        tracing::info!(target: "mediavault::scheduler", "Scheduler started");
        Ok(true)
    }

    /// Stops the background tasks and waits for them to finish. A no-op when
    /// the scheduler is not running.
    pub async fn shutdown_scheduler(&self) -> Result<()> {
        let Some(handle) = self.scheduler.lock().await.take() else {
            return Ok(());
        };

        // Receivers may already be gone if every loop has exited
        let _ = handle.shutdown_sender.send(true);
        for join_handle in handle.join_handles {
            join_handle.await?;
        }

        tracing::info!(target: "mediavault::scheduler", "Scheduler stopped");
        Ok(())
    }
}

async fn run_task(
    mediavault: Weak<Mediavault>,
    task: Arc<dyn Task>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(task.interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(mediavault) = mediavault.upgrade() else {
                    break;
                };
                if let Err(e) = task.execute(&mediavault).await {
                    tracing::warn!(
                        target: "mediavault::scheduler",
                        "Task {} failed: {}",
                        task.name(),
                        e
                    );
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::debug!(
        target: "mediavault::scheduler",
        "Task {} loop exited",
        task.name()
    );
}
