//! Remote embedding-encoder client.
//!
//! The pretrained vision-language model runs as an HTTP inference service;
//! this client implements the core [`Encoder`] trait against it. Images go
//! up base64-encoded, texts as plain strings, and embeddings come back as
//! float arrays. `ENCODER_URL` points at the service.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::info;

use shoebutton_core::contract::{Encoder, ImageInput};
use shoebutton_core::error::EncodeError;
use shoebutton_core::similarity::Embedding;

#[derive(Serialize)]
struct ImagePayload<'a> {
    name: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct EncodeResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Handle to the inference service.
#[derive(Debug)]
pub struct RemoteEncoder {
    http: reqwest::Client,
    base_url: String,
}

impl RemoteEncoder {
    /// Build a client from the `ENCODER_URL` environment variable.
    pub fn new_from_env() -> Result<Self, EncodeError> {
        let base_url = std::env::var("ENCODER_URL")
            .map_err(|_| EncodeError::Unconfigured("ENCODER_URL not set".into()))?;
        Ok(RemoteEncoder::new(base_url))
    }

    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        RemoteEncoder {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post_for_embeddings(
        &self,
        endpoint: &str,
        body: serde_json::Value,
        expected: usize,
    ) -> Result<Vec<Embedding>, EncodeError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|source| EncodeError::Transport { source })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(EncodeError::Http { status, body });
        }

        let parsed: EncodeResponse = response
            .json()
            .await
            .map_err(|e| EncodeError::Decode(e.to_string()))?;
        if parsed.embeddings.len() != expected {
            return Err(EncodeError::Decode(format!(
                "expected {expected} embeddings, got {}",
                parsed.embeddings.len()
            )));
        }
        Ok(parsed.embeddings.into_iter().map(Embedding).collect())
    }
}

#[async_trait]
impl Encoder for RemoteEncoder {
    async fn encode_images(&self, images: &[ImageInput]) -> Result<Vec<Embedding>, EncodeError> {
        info!(count = images.len(), "Encoding images");
        let payload: Vec<ImagePayload> = images
            .iter()
            .map(|image| ImagePayload {
                name: &image.name,
                content: STANDARD.encode(&image.bytes),
            })
            .collect();
        self.post_for_embeddings(
            "encode/images",
            serde_json::json!({ "images": payload }),
            images.len(),
        )
        .await
    }

    async fn encode_texts(&self, texts: &[String]) -> Result<Vec<Embedding>, EncodeError> {
        info!(count = texts.len(), "Encoding texts");
        self.post_for_embeddings(
            "encode/texts",
            serde_json::json!({ "texts": texts }),
            texts.len(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn missing_encoder_url_is_unconfigured() {
        std::env::remove_var("ENCODER_URL");
        let err = RemoteEncoder::new_from_env().unwrap_err();
        assert!(matches!(err, EncodeError::Unconfigured(_)));
    }

    #[test]
    #[serial]
    fn trailing_slash_is_trimmed_from_the_base_url() {
        let encoder = RemoteEncoder::new("http://localhost:8000/");
        assert_eq!(encoder.base_url, "http://localhost:8000");
    }
}
