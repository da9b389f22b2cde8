//! Question-answering engine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use docqa_documents::{DirectoryReader, DocumentReader};
use docqa_embeddings::{
    DurableEmbeddingCache, EmbeddingProvider, FileEmbeddingCache, HttpBlobCache, NoopCache,
    OpenAIProvider, RetrievalResult, VectorIndex,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::SharedIndex;
use crate::config::{AppConfig, CacheBackend};
use crate::error::{ConfigError, IngestError, Result};
use crate::generation::{GenerationBackend, OpenAIChatBackend};
use crate::ingest::{IngestReport, IngestionPipeline};
use crate::query::{DEFAULT_TOP_K, RetrievalQueryPipeline};
use crate::synthesizer::{Answer, AnswerSynthesizer};

/// Question-answering engine over one corpus.
///
/// This is the entry point for callers. It owns the shared index and wires
/// together:
/// - Ingestion (reader, cache, provider, staged index swap)
/// - Query-time retrieval
/// - Grounded answer synthesis with the refusal policy
pub struct AskEngine {
    /// Index shared by ingestion and retrieval.
    index: SharedIndex,

    /// Rebuilds the index.
    ingestion: IngestionPipeline,

    /// Embeds questions and queries the index.
    retrieval: RetrievalQueryPipeline,

    /// Turns retrieved documents into answers.
    synthesizer: AnswerSynthesizer,

    /// Documents retrieved per question.
    top_k: usize,
}

impl AskEngine {
    /// Create a new engine builder.
    pub fn builder() -> AskEngineBuilder {
        AskEngineBuilder::new()
    }

    /// Build an engine with OpenAI-compatible backends from `config`.
    ///
    /// API keys are read from the environment variables the config names.
    /// Only the embedding key is required up front; without a generation key
    /// the engine still ingests, and every question is refused.
    pub fn from_config(config: &AppConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let embedding = &config.embedding;
        let mut provider = OpenAIProvider::new()
            .with_api_key(api_key(&embedding.api_key_env)?)
            .with_base_url(&embedding.base_url)
            .with_model(&embedding.model)
            .with_timeout(Duration::from_secs(embedding.timeout_secs));
        if let Some(dimension) = embedding.dimensions {
            provider = provider.with_dimension(dimension);
        }

        let generation = &config.generation;
        let mut generator = OpenAIChatBackend::new()
            .with_base_url(&generation.base_url)
            .with_model(&generation.model)
            .with_max_tokens(generation.max_tokens)
            .with_temperature(generation.temperature)
            .with_timeout(Duration::from_secs(generation.timeout_secs));
        generator = match api_key(&generation.api_key_env) {
            Ok(key) => generator.with_api_key(key),
            Err(e) => {
                warn!("Answer generation disabled: {e}");
                generator.without_api_key()
            }
        };

        let cache: Arc<dyn DurableEmbeddingCache> = match config.cache.backend {
            CacheBackend::None => Arc::new(NoopCache),
            CacheBackend::File => Arc::new(FileEmbeddingCache::new(&config.cache.path)),
            CacheBackend::Http => {
                let url = config
                    .cache
                    .url
                    .as_deref()
                    .ok_or(ConfigError::Missing("cache.url"))?;
                let mut cache = HttpBlobCache::new(url)
                    .with_timeout(Duration::from_secs(embedding.timeout_secs));
                if let Some(token) = config
                    .cache
                    .token_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
                {
                    cache = cache.with_token(token);
                }
                Arc::new(cache)
            }
        };

        Self::builder()
            .with_reader(Arc::new(DirectoryReader::new(config.corpus.reader.clone())))
            .with_corpus_dir(config.corpus.dir.clone())
            .with_provider(Arc::new(provider))
            .with_generator(Arc::new(generator))
            .with_cache(cache)
            .with_top_k(config.query.top_k)
            .with_min_relevance(config.query.min_relevance)
            .with_assistant_role(&config.generation.assistant_role)
            .build()
    }

    /// Rebuild the index from the corpus.
    ///
    /// Concurrent calls are serialized; queries keep using the previous index
    /// until the new one is swapped in.
    pub async fn ingest(&self) -> std::result::Result<IngestReport, IngestError> {
        self.ingestion.run().await
    }

    /// Retrieve the top documents for `query`, unfiltered.
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
        self.retrieval.retrieve(query, self.top_k).await
    }

    /// Answer `query` from already retrieved documents.
    pub async fn synthesize(&self, query: &str, retrieved: &RetrievalResult) -> Answer {
        self.synthesizer.synthesize(query, retrieved).await
    }

    /// Answer `query` end to end. Never fails; every failure is a refusal.
    pub async fn answer(&self, query: &str) -> Answer {
        let query = query.trim();
        if query.is_empty() {
            info!("Refusing: empty query");
            return Answer::refusal();
        }
        info!("Received query: {query}");

        match self.retrieve(query).await {
            Ok(retrieved) => self.synthesize(query, &retrieved).await,
            Err(e) => {
                error!("Retrieval failed, refusing: {e}");
                Answer::refusal()
            }
        }
    }

    /// Handle to the shared index.
    pub fn index(&self) -> SharedIndex {
        Arc::clone(&self.index)
    }

    /// Get engine statistics.
    pub async fn stats(&self) -> EngineStats {
        let index = self.index.read().await;
        EngineStats {
            documents_indexed: index.len(),
            dimension: index.dimension(),
            model: index.model().map(str::to_string),
            top_k: self.top_k,
            min_relevance: self.synthesizer.min_relevance(),
        }
    }
}

fn api_key(env_var: &str) -> std::result::Result<String, ConfigError> {
    std::env::var(env_var)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingApiKey {
            env_var: env_var.to_string(),
        })
}

/// Builder for [`AskEngine`].
pub struct AskEngineBuilder {
    reader: Arc<dyn DocumentReader>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn GenerationBackend>>,
    cache: Arc<dyn DurableEmbeddingCache>,
    index: Option<SharedIndex>,
    corpus_dir: PathBuf,
    top_k: usize,
    min_relevance: Option<f32>,
    assistant_role: Option<String>,
}

impl AskEngineBuilder {
    /// Create a new builder reading `./word` with no cache.
    pub fn new() -> Self {
        Self {
            reader: Arc::new(DirectoryReader::default()),
            provider: None,
            generator: None,
            cache: Arc::new(NoopCache),
            index: None,
            corpus_dir: PathBuf::from("./word"),
            top_k: DEFAULT_TOP_K,
            min_relevance: None,
            assistant_role: None,
        }
    }

    pub fn with_reader(mut self, reader: Arc<dyn DocumentReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn GenerationBackend>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn DurableEmbeddingCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Use an existing index instead of a fresh one.
    pub fn with_index(mut self, index: SharedIndex) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_corpus_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.corpus_dir = dir.into();
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_min_relevance(mut self, min_relevance: f32) -> Self {
        self.min_relevance = Some(min_relevance);
        self
    }

    pub fn with_assistant_role(mut self, role: impl Into<String>) -> Self {
        self.assistant_role = Some(role.into());
        self
    }

    /// Build the engine. The index starts empty until [`AskEngine::ingest`].
    pub fn build(self) -> std::result::Result<AskEngine, ConfigError> {
        let provider = self.provider.ok_or(ConfigError::Missing("embedding provider"))?;
        let generator = self.generator.ok_or(ConfigError::Missing("generation backend"))?;
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be > 0".to_string()));
        }

        let index = self
            .index
            .unwrap_or_else(|| Arc::new(RwLock::new(VectorIndex::for_model(provider.model_id()))));

        let mut synthesizer = AnswerSynthesizer::new(generator);
        if let Some(min_relevance) = self.min_relevance {
            synthesizer = synthesizer.with_min_relevance(min_relevance);
        }
        if let Some(role) = self.assistant_role {
            synthesizer = synthesizer.with_assistant_role(role);
        }

        Ok(AskEngine {
            ingestion: IngestionPipeline::new(
                self.reader,
                Arc::clone(&provider),
                self.cache,
                Arc::clone(&index),
                self.corpus_dir,
            ),
            retrieval: RetrievalQueryPipeline::new(provider, Arc::clone(&index)),
            synthesizer,
            index,
            top_k: self.top_k,
        })
    }
}

impl Default for AskEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStats {
    /// Number of documents in the index.
    pub documents_indexed: usize,

    /// Embedding dimension, once documents are indexed.
    pub dimension: Option<usize>,

    /// Model id the index was built for.
    pub model: Option<String>,

    /// Documents retrieved per question.
    pub top_k: usize,

    /// Relevance threshold for answer context.
    pub min_relevance: f32,
}
