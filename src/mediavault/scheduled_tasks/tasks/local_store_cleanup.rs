use std::time::Duration;

use async_trait::async_trait;

use crate::mediavault::Mediavault;
use crate::mediavault::error::Result;
use crate::mediavault::scheduled_tasks::Task;

/// Periodically removes upload files no record still needs.
pub(crate) struct LocalStoreCleanup {
    interval: Duration,
}

impl LocalStoreCleanup {
    pub(crate) fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl Task for LocalStoreCleanup {
    fn name(&self) -> &'static str {
        "local_store_cleanup"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self, mediavault: &Mediavault) -> Result<()> {
        tracing::debug!(
            target: "mediavault::scheduler::local_store_cleanup",
            "Starting local store cleanup"
        );

        let removed = mediavault.clear_unused_files().await?;

        tracing::debug!(
            target: "mediavault::scheduler::local_store_cleanup",
            "Local store cleanup finished, removed {} file(s)",
            removed
        );
        Ok(())
    }
}
