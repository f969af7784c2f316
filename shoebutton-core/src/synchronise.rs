//! Top-level sync pipeline: catalog → CSV export → bulk download.
//!
//! Runs the whole reconciliation once, end to end, against one bucket:
//! enumerate every object key, derive display names, export the
//! original→parsed mapping as CSV, then bulk-download the objects to local
//! disk. Steps are fail-fast between each other, so a broken catalog never
//! reaches the exporter, while the download step keeps its per-object
//! failure isolation and reports everything it attempted.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::catalog::{catalog_to_columns, BucketCatalog};
use crate::contract::{DownloadResult, ObjectStore};
use crate::csv_export::write_csv;
use crate::error::PipelineError;
use crate::names::NameParser;
use crate::transfer::{BulkDownloader, DownloadLimits};

/// One sync run's inputs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub bucket: String,
    /// Only objects under this key prefix take part in the run.
    pub prefix: Option<String>,
    /// Where the catalog CSV is written.
    pub csv_path: PathBuf,
    /// Existing local directory the objects are downloaded into.
    pub destination: PathBuf,
    pub limits: DownloadLimits,
}

/// What one sync run did.
#[derive(Debug)]
pub struct SyncReport {
    /// Objects found in the bucket listing.
    pub entries: usize,
    /// Keys the name parser could not match; kept in the catalog with
    /// their original key as the display name.
    pub unmatched: usize,
    pub csv_path: PathBuf,
    pub downloads: Vec<DownloadResult>,
}

impl SyncReport {
    pub fn failed_downloads(&self) -> usize {
        self.downloads.iter().filter(|r| !r.is_success()).count()
    }
}

/// Run catalog → CSV export → bulk download once.
pub async fn synchronise<S>(
    store: Arc<S>,
    config: &SyncConfig,
) -> Result<SyncReport, PipelineError>
where
    S: ObjectStore + 'static,
{
    info!(bucket = %config.bucket, "[SYNC] Starting bucket synchronisation");

    // Step 1: catalog.
    let catalog = BucketCatalog::new(Arc::clone(&store), NameParser::new());
    let entries = match catalog
        .list_and_parse(&config.bucket, config.prefix.as_deref())
        .await
    {
        Ok(entries) => {
            info!(entries = entries.len(), "[SYNC] Catalog listing succeeded");
            entries
        }
        Err(e) => {
            error!(error = %e, "[SYNC][ERROR] Catalog listing failed");
            return Err(e);
        }
    };

    let unmatched = entries.iter().filter(|e| !e.name.is_matched()).count();
    if unmatched > 0 {
        warn!(
            unmatched,
            "[SYNC] Keys outside the expected shape kept their original name"
        );
    }

    // Step 2: CSV export.
    match write_csv(&catalog_to_columns(&entries), &config.csv_path) {
        Ok(()) => {
            info!(path = %config.csv_path.display(), "[SYNC] Catalog CSV written");
        }
        Err(e) => {
            error!(error = %e, "[SYNC][ERROR] CSV export failed");
            return Err(e);
        }
    }

    // Step 3: bulk download.
    let downloader = BulkDownloader::new(store, config.limits);
    let downloads = match downloader
        .download_all(
            &config.bucket,
            config.prefix.as_deref(),
            &config.destination,
        )
        .await
    {
        Ok(downloads) => downloads,
        Err(e) => {
            error!(error = %e, "[SYNC][ERROR] Bulk download failed");
            return Err(e);
        }
    };

    let report = SyncReport {
        entries: entries.len(),
        unmatched,
        csv_path: config.csv_path.clone(),
        downloads,
    };
    info!(
        entries = report.entries,
        unmatched = report.unmatched,
        failed_downloads = report.failed_downloads(),
        "[SYNC] Synchronisation complete"
    );
    Ok(report)
}
