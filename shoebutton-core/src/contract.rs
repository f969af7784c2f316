//! Trait seams to the external collaborators and the shared data types
//! exchanged across them.
//!
//! Three capabilities are consumed behind traits so the pipelines can be
//! driven by mocks in tests:
//!
//! - [`ObjectStore`]: the cloud bucket holding the print files. Pagination
//!   is part of the seam, so the catalog and downloader loops that must
//!   never truncate a listing are the code under test.
//! - [`Storefront`]: the remote GraphQL API the creations are published to.
//! - [`Encoder`]: the embedding service wrapping the pretrained
//!   vision-language model. Its numerics stay out of process.
//!
//! All traits are annotated for `mockall`; the generated mocks are exported
//! under the `test-export-mocks` feature (on by default) so integration
//! tests in dependent crates can use them too.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::{EncodeError, StoreError, StorefrontError, TransferError};
use crate::similarity::Embedding;

/// One page of a bucket listing.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<ObjectSummary>,
    /// Cursor for the next page; `None` means the listing is exhausted.
    pub next_page_token: Option<String>,
}

/// Metadata for one object in a bucket listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectSummary {
    /// Full object key within the bucket.
    pub key: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl ObjectSummary {
    pub fn from_key(key: impl Into<String>) -> Self {
        ObjectSummary {
            key: key.into(),
            size: None,
            updated: None,
            content_type: None,
        }
    }
}

/// Parameters for one listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    /// Only list keys starting with this prefix.
    pub prefix: Option<String>,
    /// Cursor from the previous page; `None` starts from the beginning.
    pub page_token: Option<String>,
    /// Upper bound on the page size; `None` leaves it to the backend.
    pub max_results: Option<u32>,
}

/// Capability: list and fetch objects in a remote bucket.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one page of the bucket listing.
    async fn list_page(
        &self,
        bucket: &str,
        request: PageRequest,
    ) -> Result<ObjectPage, StoreError>;

    /// Fetch the raw bytes of one object.
    async fn fetch_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;
}

/// Per-object outcome of a bulk download. The batch reports one of these
/// for every attempted object, successes and failures alike.
#[derive(Debug)]
pub struct DownloadResult {
    pub key: String,
    pub outcome: TransferOutcome,
}

#[derive(Debug)]
pub enum TransferOutcome {
    /// The object was written to this local path.
    Downloaded { path: PathBuf },
    /// The transfer failed; the cause is preserved for the caller.
    Failed { error: TransferError },
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, TransferOutcome::Downloaded { .. })
    }
}

/// A storefront product listing as returned by the creations query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreationSummary {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub downloads_count: u64,
    #[serde(default)]
    pub views_count: u64,
    /// Lifetime sales in cents (USD).
    #[serde(default)]
    pub total_sales_cents: i64,
    #[serde(default)]
    pub blueprints: Vec<Blueprint>,
}

/// File/image URL pair attached to a creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blueprint {
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Everything needed to publish one new creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreationDraft {
    pub name: String,
    pub description: String,
    /// Print-settings block. When absent, the client's configured template
    /// is used (see [`DEFAULT_PRINT_NOTES`]).
    #[serde(default)]
    pub details: Option<String>,
    pub image_urls: Vec<String>,
    pub file_urls: Vec<String>,
    pub category_id: String,
    pub subcategory_ids: Vec<String>,
    /// Submitted as a GraphQL Float, whatever numeric form the input had.
    pub price: f64,
    /// e.g. "VISIBLE" or "HIDDEN".
    pub visibility: String,
}

/// Confirmation returned for a created creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationReceipt {
    /// Public URL of the new listing.
    pub url: String,
}

/// Capability: the remote storefront's two fixed GraphQL operations.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Storefront: Send + Sync {
    /// Query up to `limit` of the account's existing creations.
    async fn list_creations(&self, limit: u32) -> Result<Vec<CreationSummary>, StorefrontError>;

    /// Submit one new creation.
    async fn create_creation(
        &self,
        draft: &CreationDraft,
    ) -> Result<CreationReceipt, StorefrontError>;
}

/// One image handed to the encoder: a display name plus the raw bytes.
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Capability: the embedding service wrapping the pretrained model.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode_images(&self, images: &[ImageInput]) -> Result<Vec<Embedding>, EncodeError>;

    async fn encode_texts(&self, texts: &[String]) -> Result<Vec<Embedding>, EncodeError>;
}

/// Default print-settings block attached to new creations when neither the
/// draft nor the client configuration supplies one. The wording is live on
/// existing listings, so changes here change published product pages.
pub const DEFAULT_PRINT_NOTES: &str = "Mold box is one piece, does not require supports.\n\
Intended for FDM printers.\n\n\
- Temperature: Use higher-end of recommended temperature based on your material for best layer adhesion\n\
- Infill: Use higher infill to increase reusability of the mold box, usually 10% is sufficient\n\
- Infill Type: Cubic for speed and durability, Lightning for speed over durability\n\
- Walls: Use 3-4 walls if silicone is leaking inside of the print\n\
- Layer Height: 0.28mm, it is not necessary to have small layer heights unless layer lines along the inside of the mold are an issue\n\
- Bed temperature: 60C if using PLA, but user high-end of bed temperature for all materials to prevent warping\n\n\
Advanced Settings:\n\
- Top Surface Skin Layer: 1-2, this will help with a more smooth surface and better molds\n\
- Monotonic Top/Bottom Order: Enabled\n\
- Enable Ironing: Enabled, irons layer lines from top surfaces flat\n\
- Retract at Layer Change: Enabled, if scarring the top surface from the nozzle dragging is an issue";
