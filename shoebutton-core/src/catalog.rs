//! Bucket catalog: the full original→parsed name mapping for a bucket.
//!
//! Enumerates every object key the backend reports, paginating until the
//! cursor is exhausted, and applies the [`NameParser`]
//! to each key in listing order. The whole operation is fail-fast: a
//! listing error on any page aborts with [`PipelineError::BackendUnavailable`],
//! because a partial name catalog is misleading input to the CSV export
//! downstream.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use crate::contract::{ObjectStore, PageRequest};
use crate::error::PipelineError;
use crate::names::{NameParser, ParsedName};

/// One catalog row: the object key and its derived display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub key: String,
    pub name: ParsedName,
}

/// Lists a bucket and derives display names for every key.
pub struct BucketCatalog<S> {
    store: Arc<S>,
    parser: NameParser,
}

impl<S: ObjectStore> BucketCatalog<S> {
    pub fn new(store: Arc<S>, parser: NameParser) -> Self {
        BucketCatalog { store, parser }
    }

    /// Enumerate all object keys under `prefix` and parse each one.
    ///
    /// Returns entries in listing order, one per object. Fails as a whole
    /// on the first page the backend refuses; no partial catalog is
    /// returned.
    pub async fn list_and_parse(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<CatalogEntry>, PipelineError> {
        info!(bucket, ?prefix, "Listing bucket for catalog");

        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let request = PageRequest {
                prefix: prefix.map(str::to_string),
                page_token: page_token.take(),
                max_results: None,
            };
            let page = self
                .store
                .list_page(bucket, request)
                .await
                .map_err(|source| PipelineError::BackendUnavailable { source })?;
            pages += 1;

            for object in page.objects {
                let name = self.parser.parse(&object.key);
                entries.push(CatalogEntry {
                    key: object.key,
                    name,
                });
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        debug!(bucket, pages, entries = entries.len(), "Catalog listing complete");
        Ok(entries)
    }
}

/// Render a catalog as the two-column export shape the CSV consumer
/// expects: `original_file_name` and `parsed_file_name`, parallel arrays.
pub fn catalog_to_columns(entries: &[CatalogEntry]) -> serde_json::Value {
    let originals: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
    let parsed: Vec<&str> = entries.iter().map(|e| e.name.display_name()).collect();
    json!({
        "original_file_name": originals,
        "parsed_file_name": parsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{MockObjectStore, ObjectPage, ObjectSummary};
    use crate::error::StoreError;

    fn page(keys: &[&str], next: Option<&str>) -> ObjectPage {
        ObjectPage {
            objects: keys.iter().map(|k| ObjectSummary::from_key(*k)).collect(),
            next_page_token: next.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn paginates_until_the_cursor_is_exhausted() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_page()
            .times(3)
            .returning(|_, request| {
                Ok(match request.page_token.as_deref() {
                    None => page(&["cults_files/freshie_mold_ocean_wave.3mf"], Some("p2")),
                    Some("p2") => page(&["random_name.3mf.part1"], Some("p3")),
                    Some("p3") => page(&["photo.png"], None),
                    other => panic!("unexpected page token {other:?}"),
                })
            });

        let catalog = BucketCatalog::new(Arc::new(store), NameParser::new());
        let entries = catalog.list_and_parse("molds", None).await.unwrap();

        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "cults_files/freshie_mold_ocean_wave.3mf",
                "random_name.3mf.part1",
                "photo.png",
            ],
            "union of all pages, in listing order, no duplicates"
        );
        let names: Vec<&str> = entries.iter().map(|e| e.name.display_name()).collect();
        assert_eq!(names, vec!["ocean wave", "random name", "photo.png"]);
    }

    #[tokio::test]
    async fn mid_pagination_failure_aborts_the_whole_catalog() {
        let mut store = MockObjectStore::new();
        store.expect_list_page().times(2).returning(|_, request| {
            match request.page_token {
                None => Ok(page(&["a.3mf"], Some("p2"))),
                Some(_) => Err(StoreError::Http {
                    operation: "list objects",
                    status: 503,
                    body: "backend flaking".into(),
                }),
            }
        });

        let catalog = BucketCatalog::new(Arc::new(store), NameParser::new());
        let err = catalog.list_and_parse("molds", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::BackendUnavailable { .. }));
    }

    #[tokio::test]
    async fn prefix_is_forwarded_to_the_store() {
        let mut store = MockObjectStore::new();
        store
            .expect_list_page()
            .withf(|bucket, request| {
                bucket == "molds" && request.prefix.as_deref() == Some("cults_files/")
            })
            .returning(|_, _| Ok(page(&[], None)));

        let catalog = BucketCatalog::new(Arc::new(store), NameParser::new());
        let entries = catalog
            .list_and_parse("molds", Some("cults_files/"))
            .await
            .unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn columns_shape_matches_the_export_contract() {
        let parser = NameParser::new();
        let entries = vec![
            CatalogEntry {
                key: "cults_files/freshie_mold_ocean_wave.3mf".into(),
                name: parser.parse("cults_files/freshie_mold_ocean_wave.3mf"),
            },
            CatalogEntry {
                key: "photo.png".into(),
                name: parser.parse("photo.png"),
            },
        ];
        let columns = catalog_to_columns(&entries);
        assert_eq!(
            columns,
            serde_json::json!({
                "original_file_name": ["cults_files/freshie_mold_ocean_wave.3mf", "photo.png"],
                "parsed_file_name": ["ocean wave", "photo.png"],
            })
        );
    }
}
