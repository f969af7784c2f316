//! Cults3D storefront client: the two fixed GraphQL operations.
//!
//! Implements the core [`Storefront`] trait against `cults3d.com/graphql`,
//! authenticated with HTTP basic auth from the `USER`/`PASSWORD` pair,
//! encoded once at construction. Every transport- or API-level failure is
//! logged and returned as a [`StorefrontError`] value; nothing panics
//! through a caller's batch loop.
//!
//! The print-settings `details` block is an injected template: a draft may
//! carry its own, otherwise the client's configured template applies,
//! which defaults to [`DEFAULT_PRINT_NOTES`].

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use shoebutton_core::contract::{
    Blueprint, CreationDraft, CreationReceipt, CreationSummary, Storefront, DEFAULT_PRINT_NOTES,
};
use shoebutton_core::error::StorefrontError;

const GRAPHQL_URL: &str = "https://cults3d.com/graphql";
const USER_AGENT: &str = "GraphQL API client";

const CREATIONS_QUERY: &str = r#"
query CreationsBatch($limit: Int!) {
  myself {
    creationsBatch(limit: $limit, offset: 0) {
      results {
        name(locale: EN)
        url(locale: EN)
        downloadsCount
        viewsCount
        totalSalesAmount(currency: USD) { cents }
        blueprints {
          fileUrl
          imageUrl
        }
      }
    }
  }
}"#;

const CREATE_CREATION_MUTATION: &str = r#"
mutation CreateCreation(
  $name: String!,
  $description: String!,
  $details: String!,
  $imageUrls: [String!]!,
  $fileUrls: [String!]!,
  $categoryId: ID!,
  $subCategoryIds: [ID!]!,
  $downloadPrice: Float!,
  $visibility: Visibility!
) {
  createCreation(
    name: $name,
    description: $description,
    details: $details,
    imageUrls: $imageUrls,
    fileUrls: $fileUrls,
    locale: EN,
    categoryId: $categoryId,
    subCategoryIds: $subCategoryIds,
    downloadPrice: $downloadPrice,
    current: USD,
    licenseCode: "cults_cu",
    visibility: $visibility
  ) {
    creation { url(locale: EN) }
    errors
  }
}"#;

/// Authenticated handle to the storefront GraphQL endpoint.
pub struct CultsClient {
    http: reqwest::Client,
    url: String,
    /// `Basic <base64(user:password)>`, built once.
    authorization: String,
    details_template: String,
}

impl CultsClient {
    /// Build a client from the `USER`/`PASSWORD` environment pair.
    pub fn new_from_env() -> Result<Self, StorefrontError> {
        let user = std::env::var("USER")
            .map_err(|_| StorefrontError::Credentials("USER not set".into()))?;
        let password = std::env::var("PASSWORD")
            .map_err(|_| StorefrontError::Credentials("PASSWORD not set".into()))?;
        info!(user = %user, "Initialised storefront client from environment");
        Ok(CultsClient::new(&user, &password))
    }

    pub fn new(user: &str, password: &str) -> Self {
        let token = STANDARD.encode(format!("{user}:{password}"));
        CultsClient {
            http: reqwest::Client::new(),
            url: GRAPHQL_URL.to_string(),
            authorization: format!("Basic {token}"),
            details_template: DEFAULT_PRINT_NOTES.to_string(),
        }
    }

    /// Replace the default print-settings template used when a draft does
    /// not carry its own `details`.
    pub fn with_details_template(mut self, template: impl Into<String>) -> Self {
        self.details_template = template.into();
        self
    }

    /// One GraphQL round-trip. Returns the `data` value; transport
    /// failures, non-2xx statuses and GraphQL `errors` all come back as
    /// typed failures.
    async fn execute(
        &self,
        operation: &'static str,
        query: &str,
        variables: Value,
    ) -> Result<Value, StorefrontError> {
        let response = self
            .http
            .post(&self.url)
            .header("Authorization", &self.authorization)
            .header("User-Agent", USER_AGENT)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|source| StorefrontError::Transport {
                url: self.url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StorefrontError::Http { status, body });
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| StorefrontError::Decode(format!("{operation}: {e}")))?;
        parse_envelope(operation, envelope)
    }
}

/// Unwrap a GraphQL response envelope. A non-empty top-level `errors`
/// array fails the whole operation; otherwise the `data` value must be
/// present.
fn parse_envelope(operation: &str, envelope: Value) -> Result<Value, StorefrontError> {
    if let Some(errors) = envelope.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let messages = errors
                .iter()
                .map(|e| {
                    e.get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown GraphQL error")
                        .to_string()
                })
                .collect();
            return Err(StorefrontError::Api { messages });
        }
    }

    envelope
        .get("data")
        .cloned()
        .ok_or_else(|| StorefrontError::Decode(format!("{operation}: response has no data")))
}

/// Build the mutation variables for one draft. The `details` block is the
/// draft's own when present, otherwise the given template; the price is
/// submitted as a GraphQL Float either way.
fn build_variables(draft: &CreationDraft, details_template: &str) -> Value {
    let details = draft.details.as_deref().unwrap_or(details_template);
    json!({
        "name": draft.name,
        "description": draft.description,
        "details": details,
        "imageUrls": draft.image_urls,
        "fileUrls": draft.file_urls,
        "categoryId": draft.category_id,
        "subCategoryIds": draft.subcategory_ids,
        "downloadPrice": draft.price,
        "visibility": draft.visibility,
    })
}

#[derive(Debug, Deserialize)]
struct RawSales {
    #[serde(default)]
    cents: i64,
}

#[derive(Debug, Deserialize)]
struct RawBlueprint {
    #[serde(rename = "fileUrl", default)]
    file_url: Option<String>,
    #[serde(rename = "imageUrl", default)]
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCreation {
    name: String,
    url: String,
    #[serde(rename = "downloadsCount", default)]
    downloads_count: u64,
    #[serde(rename = "viewsCount", default)]
    views_count: u64,
    #[serde(rename = "totalSalesAmount", default)]
    total_sales: Option<RawSales>,
    #[serde(default)]
    blueprints: Vec<RawBlueprint>,
}

/// Extract the creations list from the query's `data` value.
fn parse_creations(data: &Value) -> Result<Vec<CreationSummary>, StorefrontError> {
    let results = data
        .pointer("/myself/creationsBatch/results")
        .ok_or_else(|| StorefrontError::Decode("creations response missing results".into()))?;
    let raw: Vec<RawCreation> = serde_json::from_value(results.clone())
        .map_err(|e| StorefrontError::Decode(format!("creations results: {e}")))?;
    Ok(raw
        .into_iter()
        .map(|c| CreationSummary {
            name: c.name,
            url: c.url,
            downloads_count: c.downloads_count,
            views_count: c.views_count,
            total_sales_cents: c.total_sales.map(|s| s.cents).unwrap_or_default(),
            blueprints: c
                .blueprints
                .into_iter()
                .map(|b| Blueprint {
                    file_url: b.file_url,
                    image_url: b.image_url,
                })
                .collect(),
        })
        .collect())
}

/// Extract the receipt from the mutation's `data` value. Creation-level
/// `errors` are failures even when the transport round-trip succeeded.
fn parse_receipt(data: &Value) -> Result<CreationReceipt, StorefrontError> {
    let creation = data
        .get("createCreation")
        .ok_or_else(|| StorefrontError::Decode("mutation response missing createCreation".into()))?;

    if let Some(errors) = creation.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let messages = errors
                .iter()
                .map(|e| match e.as_str() {
                    Some(text) => text.to_string(),
                    None => e.to_string(),
                })
                .collect();
            return Err(StorefrontError::Api { messages });
        }
    }

    let url = creation
        .pointer("/creation/url")
        .and_then(Value::as_str)
        .ok_or_else(|| StorefrontError::Decode("created creation has no url".into()))?;
    Ok(CreationReceipt {
        url: url.to_string(),
    })
}

#[async_trait]
impl Storefront for CultsClient {
    async fn list_creations(&self, limit: u32) -> Result<Vec<CreationSummary>, StorefrontError> {
        info!(limit, "Querying storefront creations");
        let data = self
            .execute("list_creations", CREATIONS_QUERY, json!({ "limit": limit }))
            .await
            .map_err(|e| {
                error!(error = %e, "list_creations failed");
                e
            })?;
        let creations = parse_creations(&data)?;
        info!(count = creations.len(), "Storefront creations query succeeded");
        Ok(creations)
    }

    async fn create_creation(
        &self,
        draft: &CreationDraft,
    ) -> Result<CreationReceipt, StorefrontError> {
        info!(name = %draft.name, "Submitting new creation");
        let variables = build_variables(draft, &self.details_template);
        let data = self
            .execute("create_creation", CREATE_CREATION_MUTATION, variables)
            .await
            .map_err(|e| {
                error!(name = %draft.name, error = %e, "create_creation failed");
                e
            })?;
        let receipt = parse_receipt(&data).map_err(|e| {
            error!(name = %draft.name, error = %e, "create_creation rejected");
            e
        })?;
        info!(name = %draft.name, url = %receipt.url, "Creation published");
        Ok(receipt)
    }
}
