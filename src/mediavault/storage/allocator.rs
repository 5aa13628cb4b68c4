use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, oneshot};

use super::directories;
use super::filenames::{incremental_path, normalized_filename};
use crate::mediavault::error::{MediavaultError, Result};

enum AllocationRequest {
    Allocate {
        directory: PathBuf,
        filename: String,
        extension: Option<String>,
        reply: oneshot::Sender<PathBuf>,
    },
    Release {
        path: PathBuf,
    },
    Purge {
        directory: PathBuf,
        keep: oneshot::Receiver<HashSet<String>>,
        reply: oneshot::Sender<Result<usize>>,
    },
}

/// Single-writer front for the filename allocator.
///
/// One worker task owns every allocation and every purge. It remembers names
/// it handed out until they are released, so concurrent callers sharing a
/// queue never receive the same path even before either has written its
/// file, and a purge never removes a reserved name.
#[derive(Debug, Clone)]
pub struct AllocationQueue {
    sender: mpsc::Sender<AllocationRequest>,
}

impl AllocationQueue {
    /// Spawns the worker on the current tokio runtime.
    pub fn spawn() -> Self {
        let (sender, receiver) = mpsc::channel(64);
        tokio::spawn(Self::run(receiver));
        Self { sender }
    }

    pub async fn allocate(
        &self,
        directory: &Path,
        filename: &str,
        extension: Option<&str>,
    ) -> Result<PathBuf> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(AllocationRequest::Allocate {
                directory: directory.to_path_buf(),
                filename: filename.to_string(),
                extension: extension.map(str::to_string),
                reply,
            })
            .await
            .map_err(|_| MediavaultError::AllocationQueueClosed)?;
        response
            .await
            .map_err(|_| MediavaultError::AllocationQueueClosed)
    }

    /// Drops the reservation for `path`, normally once its file exists.
    pub async fn release(&self, path: &Path) -> Result<()> {
        self.sender
            .send(AllocationRequest::Release {
                path: path.to_path_buf(),
            })
            .await
            .map_err(|_| MediavaultError::AllocationQueueClosed)
    }

    /// Removes every entry of `directory` not named by `keep` and not
    /// currently reserved.
    ///
    /// The worker takes the purge in queue order and serves nothing else
    /// until it finishes. `keep` is awaited after the request is queued, so a
    /// reservation released after that point was either owned by a record
    /// visible to `keep` or is still reserved when the directory is listed.
    /// If `keep` fails nothing is removed.
    pub async fn purge<F>(&self, directory: &Path, keep: F) -> Result<usize>
    where
        F: Future<Output = Result<HashSet<String>>>,
    {
        let (keep_tx, keep_rx) = oneshot::channel();
        let (reply, response) = oneshot::channel();
        self.sender
            .send(AllocationRequest::Purge {
                directory: directory.to_path_buf(),
                keep: keep_rx,
                reply,
            })
            .await
            .map_err(|_| MediavaultError::AllocationQueueClosed)?;

        // Dropping keep_tx on error releases the worker without purging
        let keep = keep.await?;
        keep_tx
            .send(keep)
            .map_err(|_| MediavaultError::AllocationQueueClosed)?;
        response
            .await
            .map_err(|_| MediavaultError::AllocationQueueClosed)?
    }

    async fn run(mut receiver: mpsc::Receiver<AllocationRequest>) {
        tracing::debug!(
            target: "mediavault::storage::allocator",
            "Starting allocation worker"
        );

        let mut reserved: HashSet<PathBuf> = HashSet::new();

        while let Some(request) = receiver.recv().await {
            match request {
                AllocationRequest::Allocate {
                    directory,
                    filename,
                    extension,
                    reply,
                } => {
                    let desired = normalized_filename(&filename, extension.as_deref());
                    let taken = reserved.clone();
                    let search = tokio::task::spawn_blocking(move || {
                        incremental_path(&directory, &desired, |candidate| {
                            taken.contains(candidate) || candidate.exists()
                        })
                    })
                    .await;

                    match search {
                        Ok(path) => {
                            reserved.insert(path.clone());
                            if reply.send(path.clone()).is_err() {
                                // Caller went away; nothing will be written there
                                reserved.remove(&path);
                            }
                        }
                        Err(e) => {
                            tracing::error!(
                                target: "mediavault::storage::allocator",
                                "Filename search failed: {}",
                                e
                            );
                        }
                    }
                }
                AllocationRequest::Release { path } => {
                    reserved.remove(&path);
                }
                AllocationRequest::Purge {
                    directory,
                    keep,
                    reply,
                } => {
                    let Ok(mut keep) = keep.await else {
                        tracing::debug!(
                            target: "mediavault::storage::allocator",
                            "Purge of {:?} abandoned before it started",
                            directory
                        );
                        continue;
                    };
                    keep.extend(
                        reserved
                            .iter()
                            .filter(|path| path.parent() == Some(directory.as_path()))
                            .filter_map(|path| path.file_name())
                            .map(|name| name.to_string_lossy().into_owned()),
                    );
                    let result =
                        tokio::task::spawn_blocking(move || directories::purge(&directory, &keep))
                            .await
                            .unwrap_or_else(|e| Err(MediavaultError::Join(e)));
                    let _ = reply.send(result);
                }
            }
        }

        tracing::debug!(
            target: "mediavault::storage::allocator",
            "Allocation worker stopped ({} reservation(s) outstanding)",
            reserved.len()
        );
    }
}
