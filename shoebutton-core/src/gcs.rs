//! Google Cloud Storage client implementing the [`ObjectStore`] contract.
//!
//! Talks to the GCS JSON API directly: a service-account key file signs an
//! RS256 JWT, the Google OAuth2 endpoint exchanges it for a bearer token,
//! and listing/download calls carry that token. The token is cached inside
//! the client handle and refreshed shortly before expiry. There is no
//! global state: the client is constructed once and passed into the
//! components that need it.

use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::contract::{ObjectPage, ObjectStore, ObjectSummary, PageRequest};
use crate::error::StoreError;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const STORAGE_URL: &str = "https://storage.googleapis.com/storage/v1";
/// Narrowest scope covering listing and object reads/writes.
const SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";
/// Refresh this long before the token actually expires.
const EXPIRY_SLACK: Duration = Duration::from_secs(60);

/// Fields of a service-account key file this client needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    TOKEN_URL.to_string()
}

/// Claims of the JWT asserted to the OAuth2 token endpoint.
#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    exp: u64,
    iat: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    refresh_after: Instant,
}

/// GCS listing response shapes.
#[derive(Debug, Deserialize, Default)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ObjectItem>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    name: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    updated: Option<String>,
    #[serde(rename = "contentType", default)]
    content_type: Option<String>,
}

/// Handle to one authenticated GCS connection.
#[derive(Debug)]
pub struct GcsClient {
    http: reqwest::Client,
    key: ServiceAccountKey,
    token: Mutex<Option<CachedToken>>,
}

impl GcsClient {
    /// Build a client from a service-account key file on local disk.
    ///
    /// Only reads and parses the file; no network call is made until the
    /// first listing or download needs a token.
    pub fn from_service_account_file(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Credentials(format!(
                "cannot read service account file {}: {e}",
                path.display()
            ))
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&raw).map_err(|e| {
            StoreError::Credentials(format!(
                "service account file {} is not a valid key file: {e}",
                path.display()
            ))
        })?;
        info!(client_email = %key.client_email, "Loaded service account key");
        Ok(GcsClient {
            http: reqwest::Client::new(),
            key,
            token: Mutex::new(None),
        })
    }

    /// Service-account identity this client authenticates as.
    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// Current bearer token, exchanging a fresh JWT when the cached one is
    /// missing or near expiry.
    async fn access_token(&self) -> Result<String, StoreError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_after {
                return Ok(token.value.clone());
            }
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| StoreError::Credentials(format!("system clock before epoch: {e}")))?
            .as_secs();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SCOPE,
            aud: &self.key.token_uri,
            exp: now + 3600,
            iat: now,
        };
        let encoding_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| StoreError::Credentials(format!("invalid private key: {e}")))?;
        let jwt = encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| StoreError::Credentials(format!("failed signing auth JWT: {e}")))?;

        let params = [
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", &jwt),
        ];
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|source| StoreError::Network {
                operation: "token exchange",
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                operation: "token exchange",
                status,
                body,
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| StoreError::Decode {
            operation: "token exchange",
            reason: e.to_string(),
        })?;
        debug!(expires_in = token.expires_in, "Obtained access token");

        let refresh_after = Instant::now()
            + Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_SLACK);
        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            value: token.access_token,
            refresh_after,
        });
        Ok(value)
    }
}

/// Percent-encode an object key as a single URL path segment. The GCS API
/// needs `/` inside keys encoded too.
fn encode_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 3);
    for b in s.as_bytes() {
        let c = *b as char;
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~') {
            out.push(c);
        } else {
            out.push('%');
            out.push_str(&format!("{:02X}", b));
        }
    }
    out
}

#[async_trait]
impl ObjectStore for GcsClient {
    async fn list_page(
        &self,
        bucket: &str,
        request: PageRequest,
    ) -> Result<ObjectPage, StoreError> {
        let token = self.access_token().await?;

        let mut url = Url::parse(&format!("{STORAGE_URL}/b/{bucket}/o"))
            .map_err(|e| StoreError::Decode {
                operation: "list objects",
                reason: format!("bad listing URL: {e}"),
            })?;
        {
            // Flat listing, no delimiter: the catalog wants every key.
            let mut query = url.query_pairs_mut();
            if let Some(prefix) = &request.prefix {
                query.append_pair("prefix", prefix);
            }
            if let Some(max_results) = request.max_results {
                query.append_pair("maxResults", &max_results.to_string());
            }
            if let Some(page_token) = &request.page_token {
                query.append_pair("pageToken", page_token);
            }
        }

        let response = self
            .http
            .get(url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|source| StoreError::Network {
                operation: "list objects",
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                operation: "list objects",
                status,
                body,
            });
        }

        let body: ListResponse = response.json().await.map_err(|e| StoreError::Decode {
            operation: "list objects",
            reason: e.to_string(),
        })?;

        let objects = body
            .items
            .into_iter()
            .map(|item| ObjectSummary {
                key: item.name,
                size: item.size.as_deref().and_then(|s| s.parse().ok()),
                updated: item.updated,
                content_type: item.content_type,
            })
            .collect();
        Ok(ObjectPage {
            objects,
            next_page_token: body.next_page_token,
        })
    }

    async fn fetch_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let token = self.access_token().await?;
        let url = format!(
            "{STORAGE_URL}/b/{bucket}/o/{}?alt=media",
            encode_component(key)
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|source| StoreError::Network {
                operation: "download object",
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                operation: "download object",
                status,
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|source| StoreError::Network {
            operation: "download object",
            source,
        })?;
        Ok(bytes.to_vec())
    }
}
