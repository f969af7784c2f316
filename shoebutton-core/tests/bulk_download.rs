//! Bulk-download behavior against mock and fake object stores: batch
//! isolation of per-object failures, precondition checks, listing bounds
//! and the concurrency cap.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::tempdir;

use shoebutton_core::contract::{
    MockObjectStore, ObjectPage, ObjectStore, ObjectSummary, PageRequest, TransferOutcome,
};
use shoebutton_core::error::{PipelineError, StoreError, TransferError};
use shoebutton_core::transfer::{BulkDownloader, DownloadLimits};

fn page(keys: &[&str], next: Option<&str>) -> ObjectPage {
    ObjectPage {
        objects: keys.iter().map(|k| ObjectSummary::from_key(*k)).collect(),
        next_page_token: next.map(str::to_string),
    }
}

#[tokio::test]
async fn missing_destination_fails_before_any_store_call() {
    let mut store = MockObjectStore::new();
    // The precondition must short-circuit: zero listing or fetch calls.
    store.expect_list_page().times(0);
    store.expect_fetch_object().times(0);

    let downloader = BulkDownloader::new(Arc::new(store), DownloadLimits::default());
    let missing = Path::new("/definitely/not/a/directory");
    let err = downloader
        .download_all("molds", None, missing)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidDestination { .. }));
}

#[tokio::test]
async fn file_destination_is_not_a_directory() {
    let dir = tempdir().unwrap();
    let file_path = dir.path().join("plain-file");
    std::fs::write(&file_path, b"x").unwrap();

    let store = MockObjectStore::new();
    let downloader = BulkDownloader::new(Arc::new(store), DownloadLimits::default());
    let err = downloader
        .download_all("molds", None, &file_path)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidDestination { .. }));
}

#[tokio::test]
async fn one_failing_object_does_not_abort_the_batch() {
    let dir = tempdir().unwrap();

    let mut store = MockObjectStore::new();
    store
        .expect_list_page()
        .returning(|_, _| Ok(page(&["a.3mf", "broken.3mf", "c.3mf"], None)));
    store.expect_fetch_object().returning(|_, key| {
        if key == "broken.3mf" {
            Err(StoreError::Http {
                operation: "download object",
                status: 403,
                body: "permission denied".into(),
            })
        } else {
            Ok(format!("contents of {key}").into_bytes())
        }
    });

    let downloader = BulkDownloader::new(Arc::new(store), DownloadLimits::default());
    let results = downloader
        .download_all("molds", None, dir.path())
        .await
        .expect("batch itself must succeed");

    assert_eq!(results.len(), 3, "every attempted object is reported");
    let keys: Vec<&str> = results.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(keys, vec!["a.3mf", "broken.3mf", "c.3mf"], "listing order kept");

    for result in &results {
        match (&result.key[..], &result.outcome) {
            ("broken.3mf", TransferOutcome::Failed { error }) => {
                assert!(
                    matches!(error, TransferError::Store(StoreError::Http { status: 403, .. })),
                    "failure reason must stay distinguishable, got {error:?}"
                );
            }
            ("broken.3mf", other) => panic!("broken.3mf should fail, got {other:?}"),
            (key, TransferOutcome::Downloaded { path }) => {
                let written = std::fs::read_to_string(path).unwrap();
                assert_eq!(written, format!("contents of {key}"));
            }
            (key, other) => panic!("{key} should download, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn nested_keys_get_parent_directories() {
    let dir = tempdir().unwrap();

    let mut store = MockObjectStore::new();
    store
        .expect_list_page()
        .returning(|_, _| Ok(page(&["cults_files/ocean_wave.3mf"], None)));
    store
        .expect_fetch_object()
        .returning(|_, _| Ok(b"3mf bytes".to_vec()));

    let downloader = BulkDownloader::new(Arc::new(store), DownloadLimits::default());
    let results = downloader
        .download_all("molds", None, dir.path())
        .await
        .unwrap();

    assert!(results[0].is_success());
    let expected = dir.path().join("cults_files").join("ocean_wave.3mf");
    assert!(expected.is_file());
}

#[tokio::test]
async fn unsafe_keys_fail_per_object_without_escaping() {
    let dir = tempdir().unwrap();

    let mut store = MockObjectStore::new();
    store
        .expect_list_page()
        .returning(|_, _| Ok(page(&["fine.3mf", "../escape.3mf"], None)));
    // The unsafe key must never be fetched.
    store
        .expect_fetch_object()
        .withf(|_, key| key == "fine.3mf")
        .returning(|_, _| Ok(b"ok".to_vec()));

    let downloader = BulkDownloader::new(Arc::new(store), DownloadLimits::default());
    let results = downloader
        .download_all("molds", None, dir.path())
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert!(results[0].is_success());
    assert!(matches!(
        results[1].outcome,
        TransferOutcome::Failed {
            error: TransferError::UnsafeKey(_)
        }
    ));
    assert!(!dir.path().parent().unwrap().join("escape.3mf").exists());
}

#[tokio::test]
async fn listing_stops_at_the_object_cap() {
    let dir = tempdir().unwrap();

    let mut store = MockObjectStore::new();
    store.expect_list_page().returning(|_, request| {
        // Backend honors maxResults; two keys available per page.
        assert_eq!(request.max_results, Some(2));
        Ok(page(&["a.3mf", "b.3mf"], Some("more")))
    });
    store
        .expect_fetch_object()
        .times(2)
        .returning(|_, _| Ok(Vec::new()));

    let limits = DownloadLimits {
        max_objects: 2,
        max_concurrency: 8,
    };
    let downloader = BulkDownloader::new(Arc::new(store), limits);
    let results = downloader
        .download_all("molds", None, dir.path())
        .await
        .unwrap();
    assert_eq!(results.len(), 2, "the cap bounds the batch even mid-listing");
}

#[tokio::test]
async fn listing_failure_before_transfers_is_backend_unavailable() {
    let dir = tempdir().unwrap();

    let mut store = MockObjectStore::new();
    store.expect_list_page().returning(|_, _| {
        Err(StoreError::Http {
            operation: "list objects",
            status: 401,
            body: "unauthorized".into(),
        })
    });
    store.expect_fetch_object().times(0);

    let downloader = BulkDownloader::new(Arc::new(store), DownloadLimits::default());
    let err = downloader
        .download_all("molds", None, dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::BackendUnavailable { .. }));
}

/// Fake store that tracks how many fetches are in flight at once.
struct CountingStore {
    keys: Vec<String>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl ObjectStore for CountingStore {
    async fn list_page(
        &self,
        _bucket: &str,
        _request: PageRequest,
    ) -> Result<ObjectPage, StoreError> {
        Ok(ObjectPage {
            objects: self.keys.iter().map(|k| ObjectSummary::from_key(k.as_str())).collect(),
            next_page_token: None,
        })
    }

    async fn fetch_object(&self, _bucket: &str, _key: &str) -> Result<Vec<u8>, StoreError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn concurrency_cap_bounds_in_flight_transfers() {
    let dir = tempdir().unwrap();
    let store = Arc::new(CountingStore {
        keys: (0..12).map(|i| format!("object_{i}.3mf")).collect(),
        in_flight: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });

    let limits = DownloadLimits {
        max_objects: 1000,
        max_concurrency: 3,
    };
    let downloader = BulkDownloader::new(Arc::clone(&store), limits);
    let results = downloader
        .download_all("molds", None, dir.path())
        .await
        .unwrap();

    assert_eq!(results.len(), 12);
    assert!(results.iter().all(|r| r.is_success()));
    let peak = store.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak in-flight transfers was {peak}, cap is 3");
    assert!(peak >= 2, "transfers should actually overlap, peak was {peak}");
}
