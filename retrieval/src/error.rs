//! Error types for the question-answering pipeline.

use docqa_documents::ReaderError;
use docqa_embeddings::{IndexError, ProviderError};
use thiserror::Error;

/// Result type alias for query-time retrieval.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors raised while retrieving documents for a query.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// The query could not be embedded. There is no fallback for this.
    #[error("query embedding failed: {0}")]
    Embedding(#[from] ProviderError),

    /// The index rejected the query.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// The index was built by a different embedding model.
    #[error("index built with {index}, queries embedded with {provider}")]
    ModelMismatch { index: String, provider: String },
}

/// Errors raised by a generation backend.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// Backend not configured.
    #[error("generation backend not configured: {0}")]
    NotConfigured(String),

    /// API request failed.
    #[error("API request failed ({status}): {message}")]
    ApiRequest { status: u16, message: String },

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The backend answered with a body that does not match the expected contract.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// HTTP transport error (includes timeouts).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors that abort an ingestion run.
///
/// Individual document and embedding failures never end up here; they are
/// recorded in the [`IngestReport`](crate::IngestReport) instead.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The corpus location could not be enumerated.
    #[error("cannot read corpus: {0}")]
    Corpus(#[from] ReaderError),

    /// The reader task panicked or was cancelled.
    #[error("document reader task failed: {0}")]
    ReaderTask(String),

    /// The staged index rejected the batch.
    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or inconsistent.
    #[error("invalid config value: {0}")]
    Invalid(String),

    /// A required API key is not set.
    #[error("API key not found, set the {env_var} environment variable")]
    MissingApiKey { env_var: String },

    /// The engine builder is missing a component.
    #[error("missing component: {0}")]
    Missing(&'static str),
}
