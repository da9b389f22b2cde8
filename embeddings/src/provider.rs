//! Embedding providers.
//!
//! A provider turns one piece of text into a fixed-length vector. The remote
//! response is treated as an untrusted data contract: it is parsed and
//! validated here, and any deviation surfaces as [`ProviderError`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::Embedding;
use crate::error::{ProviderError, Result};

/// Default OpenAI-compatible API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default embedding model.
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Get the model this provider embeds with.
    fn model(&self) -> &str;

    /// Output dimension the provider is configured to produce, if fixed.
    fn dimension(&self) -> Option<usize> {
        None
    }

    /// Identity of the provider configuration that produced an embedding.
    ///
    /// Embeddings with different model ids must never be mixed in one index.
    /// A configured output dimension is part of the identity.
    fn model_id(&self) -> String {
        match self.dimension() {
            Some(dimension) => format!("{}:{}@{dimension}", self.name(), self.model()),
            None => format!("{}:{}", self.name(), self.model()),
        }
    }

    /// Generate an embedding for the given text.
    ///
    /// Blank text is rejected with [`ProviderError::EmptyInput`] without
    /// contacting the backend.
    async fn embed(&self, text: &str) -> Result<Embedding>;
}

/// OpenAI (or OpenAI-compatible) embedding provider.
pub struct OpenAIProvider {
    /// API key.
    api_key: Option<String>,

    /// API base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    /// Model to request.
    model: String,

    /// Expected output dimension, if known.
    dimension: Option<usize>,

    /// Per-request timeout.
    timeout: Duration,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider, reading the key from `OPENAI_API_KEY`.
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
            model: DEFAULT_MODEL.to_string(),
            dimension: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Require every returned vector to have exactly this many dimensions.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check if the provider has credentials.
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    fn validate(&self, response: OpenAIEmbeddingResponse) -> Result<Embedding> {
        let mut data = response.data;
        if data.len() != 1 {
            return Err(ProviderError::InvalidResponse(format!(
                "expected exactly one embedding, got {}",
                data.len()
            )));
        }
        let embedding = data.remove(0).embedding;

        if embedding.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "embedding vector is empty".to_string(),
            ));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(ProviderError::InvalidResponse(
                "embedding contains non-finite values".to_string(),
            ));
        }
        if let Some(expected) = self.dimension {
            if embedding.len() != expected {
                return Err(ProviderError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
        }

        Ok(embedding)
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyInput);
        }

        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::NotConfigured("missing API key".to_string()))?;

        debug!("Generating embedding with model: {}", self.model);

        let mut body = serde_json::json!({
            "input": text,
            "model": self.model,
        });
        if let Some(dims) = self.dimension {
            body["dimensions"] = serde_json::json!(dims);
        }

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(ProviderError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiRequest {
                status: status.as_u16(),
                message,
            });
        }

        let raw = response.text().await?;
        let parsed: OpenAIEmbeddingResponse = serde_json::from_str(&raw)
            .map_err(|e| ProviderError::InvalidResponse(format!("malformed body: {e}")))?;

        let embedding = self.validate(parsed)?;
        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
}
