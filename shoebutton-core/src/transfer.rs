//! Concurrent bulk download of bucket objects to a local directory.
//!
//! Lists up to a configurable number of objects and fans their transfers
//! out under a semaphore. Every object's outcome is independent: one
//! failed transfer never aborts or rolls back the others, and the result
//! set covers every attempted object in listing order.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::contract::{DownloadResult, ObjectStore, PageRequest, TransferOutcome};
use crate::error::{PipelineError, TransferError};

/// Bounds on one bulk-download invocation.
///
/// The defaults mirror the limits the sync tooling has always run with;
/// both are explicit here so callers can widen or narrow them per run.
#[derive(Debug, Clone, Copy)]
pub struct DownloadLimits {
    /// Upper bound on how many objects one batch lists and transfers.
    pub max_objects: usize,
    /// Upper bound on simultaneously in-flight transfers.
    pub max_concurrency: usize,
}

impl Default for DownloadLimits {
    fn default() -> Self {
        DownloadLimits {
            max_objects: 1000,
            max_concurrency: 8,
        }
    }
}

/// Transfers a bounded listing of bucket objects to local disk.
pub struct BulkDownloader<S> {
    store: Arc<S>,
    limits: DownloadLimits,
}

impl<S: ObjectStore + 'static> BulkDownloader<S> {
    pub fn new(store: Arc<S>, limits: DownloadLimits) -> Self {
        BulkDownloader { store, limits }
    }

    /// Download up to `max_objects` objects under `prefix` into
    /// `destination`.
    ///
    /// The destination must already exist as a directory; that is checked
    /// before any backend call. A listing failure aborts with
    /// [`PipelineError::BackendUnavailable`], since nothing has been
    /// transferred at that point. From there on, failures are per object
    /// and collected into the returned results.
    pub async fn download_all(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        destination: &Path,
    ) -> Result<Vec<DownloadResult>, PipelineError> {
        if !destination.is_dir() {
            return Err(PipelineError::InvalidDestination {
                path: destination.to_path_buf(),
            });
        }

        let keys = self.list_keys(bucket, prefix).await?;
        info!(
            bucket,
            objects = keys.len(),
            max_concurrency = self.limits.max_concurrency,
            "Starting bulk download"
        );

        // A zero cap would deadlock the dispatch loop; one permit is the floor.
        let semaphore = Arc::new(Semaphore::new(self.limits.max_concurrency.max(1)));
        let mut handles = Vec::with_capacity(keys.len());

        for key in keys {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore is never closed");
            let store = Arc::clone(&self.store);
            let bucket = bucket.to_string();
            let destination = destination.to_path_buf();

            handles.push((
                key.clone(),
                tokio::spawn(async move {
                    let outcome = transfer_one(store.as_ref(), &bucket, &key, &destination).await;
                    drop(permit);
                    outcome
                }),
            ));
        }

        let (keys, joins): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let mut results = Vec::with_capacity(keys.len());
        for (key, joined) in keys.into_iter().zip(join_all(joins).await) {
            let outcome = match joined {
                Ok(outcome) => outcome,
                // A panicked task is a failure of that object only.
                Err(join_error) => TransferOutcome::Failed {
                    error: TransferError::Aborted(join_error.to_string()),
                },
            };
            if let TransferOutcome::Failed { error } = &outcome {
                warn!(key = %key, error = %error, "Transfer failed");
            }
            results.push(DownloadResult { key, outcome });
        }

        let failed = results.iter().filter(|r| !r.is_success()).count();
        info!(
            total = results.len(),
            failed, "Bulk download finished"
        );
        Ok(results)
    }

    /// List object keys up to the `max_objects` cap, paginating as needed.
    async fn list_keys(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<String>, PipelineError> {
        let mut keys: Vec<String> = Vec::new();
        let mut page_token: Option<String> = None;

        while keys.len() < self.limits.max_objects {
            let remaining = self.limits.max_objects - keys.len();
            let request = PageRequest {
                prefix: prefix.map(str::to_string),
                page_token: page_token.take(),
                max_results: Some(remaining.min(u32::MAX as usize) as u32),
            };
            let page = self
                .store
                .list_page(bucket, request)
                .await
                .map_err(|source| PipelineError::BackendUnavailable { source })?;

            keys.extend(
                page.objects
                    .into_iter()
                    .take(remaining)
                    .map(|object| object.key),
            );

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(keys)
    }
}

async fn transfer_one<S: ObjectStore>(
    store: &S,
    bucket: &str,
    key: &str,
    destination: &Path,
) -> TransferOutcome {
    let path = match local_path_for(destination, key) {
        Ok(path) => path,
        Err(error) => return TransferOutcome::Failed { error },
    };

    let bytes = match store.fetch_object(bucket, key).await {
        Ok(bytes) => bytes,
        Err(source) => {
            return TransferOutcome::Failed {
                error: TransferError::Store(source),
            }
        }
    };

    if let Some(parent) = path.parent() {
        if let Err(source) = std::fs::create_dir_all(parent) {
            return TransferOutcome::Failed {
                error: TransferError::Write {
                    path: parent.to_path_buf(),
                    source,
                },
            };
        }
    }
    match std::fs::write(&path, &bytes) {
        Ok(()) => TransferOutcome::Downloaded { path },
        Err(source) => TransferOutcome::Failed {
            error: TransferError::Write { path, source },
        },
    }
}

/// Map an object key to its path under the destination directory.
///
/// Keys are bucket-relative paths; anything that would resolve outside the
/// destination (parent components, absolute roots, an empty key) fails
/// that object.
fn local_path_for(destination: &Path, key: &str) -> Result<PathBuf, TransferError> {
    let relative = Path::new(key);
    let mut safe = destination.to_path_buf();
    let mut pushed = false;

    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                safe.push(part);
                pushed = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(TransferError::UnsafeKey(key.to_string()));
            }
        }
    }
    if !pushed {
        return Err(TransferError::UnsafeKey(key.to_string()));
    }
    Ok(safe)
}
