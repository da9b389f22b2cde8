//! # Embeddings
//!
//! This crate provides embedding generation, durable embedding caching and
//! similarity search for the docqa question-answering pipeline.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text to dense vectors through a remote provider
//! - **Vector Index**: Deterministic top-k cosine search over document embeddings
//! - **Durable Cache**: Persist document embeddings across restarts (memory, file, HTTP blob)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► Embedding ──► VectorIndex                │
//! │       │                    │              │                     │
//! │       ▼                    ▼              ▼                     │
//! │  OpenAI API      DurableEmbeddingCache  RetrievalResult         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod index;
pub mod provider;
pub mod similarity;

pub use cache::{
    CacheEntry, CacheSnapshot, DurableEmbeddingCache, FileEmbeddingCache, HttpBlobCache,
    MemoryEmbeddingCache, NoopCache,
};
pub use error::{CacheError, IndexError, ProviderError, Result};
pub use index::{IndexEntry, RetrievalResult, ScoredDocument, VectorIndex};
pub use provider::{EmbeddingProvider, OpenAIProvider};
pub use similarity::{cosine_similarity, normalize};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;
