//! Error types for the embeddings system.

use thiserror::Error;

/// Result type alias for embedding provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors raised by an [`EmbeddingProvider`](crate::EmbeddingProvider).
///
/// Transport failures are wrapped here so nothing past the provider boundary
/// ever sees a raw `reqwest` error.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Provider not configured.
    #[error("embedding provider not configured: {0}")]
    NotConfigured(String),

    /// Empty input text.
    #[error("cannot embed empty text")]
    EmptyInput,

    /// API request failed.
    #[error("API request failed ({status}): {message}")]
    ApiRequest { status: u16, message: String },

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The backend answered with a body that does not match the expected contract.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// HTTP transport error (includes timeouts).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors raised by the [`VectorIndex`](crate::VectorIndex).
#[derive(Error, Debug, PartialEq)]
pub enum IndexError {
    /// The id/text/embedding sequences passed to `upsert` are not aligned.
    #[error("length mismatch: {ids} ids, {texts} texts, {embeddings} embeddings")]
    LengthMismatch {
        ids: usize,
        texts: usize,
        embeddings: usize,
    },

    /// Dimension mismatch against the index.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Empty embedding vector.
    #[error("empty embedding for id {0}")]
    EmptyEmbedding(String),

    /// The same id appears twice in one upsert batch.
    #[error("duplicate id in batch: {0}")]
    DuplicateId(String),

    /// `k` must be positive.
    #[error("k must be greater than zero")]
    InvalidK,
}

/// Errors raised by a [`DurableEmbeddingCache`](crate::DurableEmbeddingCache) backend.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote store rejected the request.
    #[error("remote store returned status {status}: {message}")]
    Remote { status: u16, message: String },
}
