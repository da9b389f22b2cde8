//! # Retrieval
//!
//! Retrieval-grounded question answering over a fixed document corpus:
//!
//! - **Ingestion**: Read the corpus, embed cache-first, rebuild the index
//! - **Retrieval**: Embed a question and find its nearest documents
//! - **Synthesis**: Answer strictly from retrieved text, or refuse
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          AskEngine                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │  Document    │   │  Embedding   │   │   Durable    │         │
//! │  │   Reader     │   │  Provider    │   │    Cache     │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! │         │                  │                  │                 │
//! │         └──────────────────┼──────────────────┘                 │
//! │                            ▼                                    │
//! │                   ┌──────────────────┐                          │
//! │                   │ IngestionPipeline│──► staged VectorIndex    │
//! │                   └──────────────────┘          │ swap          │
//! │                                                 ▼               │
//! │   question ──► RetrievalQueryPipeline ──► SharedIndex           │
//! │                            │                                    │
//! │                            ▼                                    │
//! │                   ┌──────────────────┐                          │
//! │                   │ AnswerSynthesizer│──► Answer / refusal      │
//! │                   └──────────────────┘                          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use docqa_retrieval::{AppConfig, AskEngine};
//!
//! let config = AppConfig::load_or_default(None)?;
//! let engine = AskEngine::from_config(&config)?;
//! engine.ingest().await?;
//!
//! let answer = engine.answer("What is the contribution cap?").await;
//! ```

use std::sync::Arc;

use docqa_embeddings::VectorIndex;
use tokio::sync::RwLock;

pub mod config;
pub mod engine;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod query;
pub mod synthesizer;

pub use config::{
    AppConfig, CacheBackend, CacheConfig, CorpusConfig, EmbeddingConfig, GenerationConfig,
    QueryConfig,
};
pub use engine::{AskEngine, AskEngineBuilder, EngineStats};
pub use error::{ConfigError, GenerationError, IngestError, Result, RetrievalError};
pub use generation::{GenerationBackend, GenerationRequest, OpenAIChatBackend};
pub use ingest::{IngestReport, IngestionPipeline};
pub use query::RetrievalQueryPipeline;
pub use synthesizer::{Answer, AnswerSynthesizer, REFUSAL_TEXT, is_refusal_text};

// Re-export from dependencies for convenience
pub use docqa_documents::{Document, DocumentReader, SkippedDocument};
pub use docqa_embeddings::{
    DurableEmbeddingCache, EmbeddingProvider, RetrievalResult, ScoredDocument,
};

/// The vector index shared between ingestion and query handling.
pub type SharedIndex = Arc<RwLock<VectorIndex>>;
