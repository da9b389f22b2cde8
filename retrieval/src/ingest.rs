//! Corpus ingestion: documents in, populated vector index out.
//!
//! Each run is a full rebuild. Documents are read, embedded cache-first,
//! and loaded into a staged [`VectorIndex`] that replaces the shared index
//! in one step, so queries never see a half-built index.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use docqa_documents::{Document, DocumentReader, SkippedDocument};
use docqa_embeddings::{
    CacheSnapshot, DurableEmbeddingCache, Embedding, EmbeddingProvider, VectorIndex,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::SharedIndex;
use crate::error::IngestError;

/// What one ingestion run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    /// Documents the reader produced (after dropping duplicate ids).
    pub documents_read: usize,

    /// Files the reader could not turn into text.
    pub skipped: Vec<SkippedDocument>,

    /// Ids that appeared more than once; only the first was kept.
    pub duplicate_ids: Vec<String>,

    /// Embeddings served from the durable cache.
    pub from_cache: usize,

    /// Embeddings computed by the provider during this run.
    pub embedded: usize,

    /// Documents left out of the index because no embedding was available.
    pub missing: Vec<String>,

    /// Documents in the index after the run.
    pub indexed: usize,

    /// Whether a fresh snapshot was written to the cache.
    pub cache_written: bool,
}

/// Builds the shared [`VectorIndex`] from a corpus location.
pub struct IngestionPipeline {
    reader: Arc<dyn DocumentReader>,
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<dyn DurableEmbeddingCache>,
    index: SharedIndex,
    corpus_dir: PathBuf,

    /// Serializes runs; only one ingestion may stage and swap at a time.
    write_lock: Mutex<()>,
}

impl IngestionPipeline {
    pub fn new(
        reader: Arc<dyn DocumentReader>,
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<dyn DurableEmbeddingCache>,
        index: SharedIndex,
        corpus_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            reader,
            provider,
            cache,
            index,
            corpus_dir: corpus_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn corpus_dir(&self) -> &Path {
        &self.corpus_dir
    }

    /// Rebuild the index from the corpus.
    ///
    /// Fails only if the corpus cannot be enumerated. Unreadable documents
    /// and failed embeddings are recorded in the report and left out.
    pub async fn run(&self) -> Result<IngestReport, IngestError> {
        let _writer = self.write_lock.lock().await;
        info!("Ingesting corpus from {}", self.corpus_dir.display());

        let mut report = IngestReport::default();
        let (documents, skipped) = self.read_corpus().await?;
        report.skipped = skipped;

        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(documents.len());
        for document in documents {
            if seen.insert(document.id.clone()) {
                unique.push(document);
            } else {
                warn!("Ignoring duplicate document id {}", document.id);
                report.duplicate_ids.push(document.id);
            }
        }
        let documents = unique;
        report.documents_read = documents.len();

        let model = self.provider.model_id();
        let embeddings = match self.cached_embeddings(&model, &documents).await {
            Some(embeddings) => {
                report.from_cache = embeddings.len();
                embeddings.into_iter().map(Some).collect()
            }
            None => self.embed_all(&model, &documents, &mut report).await,
        };

        let mut ids = Vec::new();
        let mut texts = Vec::new();
        let mut vectors = Vec::new();
        for (document, embedding) in documents.into_iter().zip(embeddings) {
            match embedding {
                Some(embedding) => {
                    ids.push(document.id);
                    texts.push(document.text);
                    vectors.push(embedding);
                }
                None => report.missing.push(document.id),
            }
        }

        let mut staged = VectorIndex::for_model(model);
        report.indexed = staged.upsert(ids, texts, vectors)?;
        *self.index.write().await = staged;

        info!(
            "Ingestion finished: {} read, {} skipped, {} from cache, {} embedded, {} missing, {} indexed",
            report.documents_read,
            report.skipped.len(),
            report.from_cache,
            report.embedded,
            report.missing.len(),
            report.indexed
        );
        Ok(report)
    }

    async fn read_corpus(&self) -> Result<(Vec<Document>, Vec<SkippedDocument>), IngestError> {
        let reader = Arc::clone(&self.reader);
        let location = self.corpus_dir.clone();

        tokio::task::spawn_blocking(move || {
            let stream = reader.read(&location)?;
            let mut documents = Vec::new();
            let mut skipped = Vec::new();
            for outcome in stream {
                match outcome {
                    Ok(document) => documents.push(document),
                    Err(skip) => skipped.push(skip),
                }
            }
            Ok::<_, IngestError>((documents, skipped))
        })
        .await
        .map_err(|e| IngestError::ReaderTask(e.to_string()))?
    }

    /// Embeddings for every document from the cache, if the cache is fresh.
    async fn cached_embeddings(
        &self,
        model: &str,
        documents: &[Document],
    ) -> Option<Vec<Embedding>> {
        let Some(snapshot) = self.cache.load_all().await else {
            info!("No usable {} cache snapshot, computing embeddings", self.cache.name());
            return None;
        };

        let current = documents.iter().map(|d| (d.id.as_str(), d.text.as_str()));
        if let Some(reason) = snapshot.staleness(model, self.provider.dimension(), current) {
            info!("Ignoring stale {} cache: {reason}", self.cache.name());
            return None;
        }

        let embeddings: Option<Vec<Embedding>> = documents
            .iter()
            .map(|d| snapshot.lookup(&d.id, &d.text).cloned())
            .collect();
        if embeddings.is_some() {
            info!(
                "Using {} cached embeddings from {}",
                documents.len(),
                self.cache.name()
            );
        }
        embeddings
    }

    /// Embed every document with the provider, then persist the results.
    async fn embed_all(
        &self,
        model: &str,
        documents: &[Document],
        report: &mut IngestReport,
    ) -> Vec<Option<Embedding>> {
        let mut snapshot = CacheSnapshot::new(model);
        let mut dimension = None;
        let mut embeddings = Vec::with_capacity(documents.len());

        for document in documents {
            let embedding = match self.provider.embed(&document.text).await {
                Ok(embedding) if !is_usable(&embedding) => {
                    warn!("Provider returned an unusable vector for {}", document.id);
                    None
                }
                Ok(embedding) => {
                    let expected = *dimension.get_or_insert(embedding.len());
                    if embedding.len() == expected {
                        debug!("Embedded {}", document.id);
                        snapshot.insert(document.id.as_str(), &document.text, embedding.clone());
                        Some(embedding)
                    } else {
                        warn!(
                            "Embedding for {} has {} dimensions, expected {expected}",
                            document.id,
                            embedding.len()
                        );
                        None
                    }
                }
                Err(e) => {
                    warn!("Failed to embed {}: {e}", document.id);
                    None
                }
            };
            embeddings.push(embedding);
        }

        report.embedded = snapshot.len();
        if !snapshot.is_empty() {
            match self.cache.save_all(&snapshot).await {
                Ok(()) => {
                    report.cache_written = true;
                    debug!("Saved {} embeddings to {}", snapshot.len(), self.cache.name());
                }
                Err(e) => warn!("Failed to write {} cache: {e}", self.cache.name()),
            }
        }
        embeddings
    }
}

/// A vector that can go into the index: non-empty and finite.
fn is_usable(embedding: &[f32]) -> bool {
    !embedding.is_empty() && embedding.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docqa_documents::{MemoryReader, ReaderError};
    use docqa_embeddings::{CacheError, MemoryEmbeddingCache, ProviderError};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;

    /// Embeds by text length; fails on any text containing "corrupt".
    struct LengthProvider {
        calls: AtomicUsize,
        model: &'static str,
    }

    impl LengthProvider {
        fn new() -> Arc<Self> {
            Self::with_model("v1")
        }

        fn with_model(model: &'static str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                model,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LengthProvider {
        fn name(&self) -> &str {
            "length"
        }

        fn model(&self) -> &str {
            self.model
        }

        async fn embed(&self, text: &str) -> docqa_embeddings::Result<Embedding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("corrupt") {
                return Err(ProviderError::ApiRequest {
                    status: 500,
                    message: "backend down".to_string(),
                });
            }
            Ok(vec![text.len() as f32, 1.0])
        }
    }

    /// Emits vectors of a configured size; some texts yield unusable vectors.
    struct SizedProvider {
        dimension: Option<usize>,
        calls: AtomicUsize,
    }

    impl SizedProvider {
        fn new(dimension: Option<usize>) -> Arc<Self> {
            Arc::new(Self {
                dimension,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EmbeddingProvider for SizedProvider {
        fn name(&self) -> &str {
            "sized"
        }

        fn model(&self) -> &str {
            "v1"
        }

        fn dimension(&self) -> Option<usize> {
            self.dimension
        }

        async fn embed(&self, text: &str) -> docqa_embeddings::Result<Embedding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("hollow") {
                return Ok(Vec::new());
            }
            let mut embedding = vec![1.0; self.dimension.unwrap_or(2)];
            if text.contains("overflow") {
                embedding[0] = f32::NAN;
            }
            Ok(embedding)
        }
    }

    /// Cache whose writes always fail.
    struct BrokenCache;

    #[async_trait]
    impl DurableEmbeddingCache for BrokenCache {
        fn name(&self) -> &str {
            "broken"
        }

        async fn load_all(&self) -> Option<CacheSnapshot> {
            None
        }

        async fn save_all(&self, _snapshot: &CacheSnapshot) -> Result<(), CacheError> {
            Err(CacheError::Remote {
                status: 503,
                message: "unavailable".to_string(),
            })
        }
    }

    /// Reader whose location never exists.
    struct MissingCorpus;

    impl DocumentReader for MissingCorpus {
        fn read(
            &self,
            location: &Path,
        ) -> docqa_documents::Result<docqa_documents::DocumentStream> {
            Err(ReaderError::LocationNotFound(location.to_path_buf()))
        }
    }

    fn corpus() -> Arc<MemoryReader> {
        Arc::new(
            MemoryReader::new([
                Document::new("doc_0", "Pension contributions are capped at 5% of salary."),
                Document::new("doc_1", "Withdrawals start at 60."),
            ])
            .with_skipped(SkippedDocument::new("word/broken.docx", "not a zip archive")),
        )
    }

    fn setup(
        reader: Arc<dyn DocumentReader>,
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<dyn DurableEmbeddingCache>,
    ) -> (IngestionPipeline, SharedIndex) {
        let index: SharedIndex = Arc::new(RwLock::new(VectorIndex::new()));
        let pipeline = IngestionPipeline::new(reader, provider, cache, index.clone(), "word");
        (pipeline, index)
    }

    #[tokio::test]
    async fn test_cold_start_embeds_and_saves() {
        let provider = LengthProvider::new();
        let cache = Arc::new(MemoryEmbeddingCache::new());
        let (pipeline, index) = setup(corpus(), provider.clone(), cache.clone());

        let report = pipeline.run().await.unwrap();
        assert_eq!(report.documents_read, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.embedded, 2);
        assert_eq!(report.from_cache, 0);
        assert_eq!(report.indexed, 2);
        assert!(report.cache_written);
        assert_eq!(provider.calls(), 2);
        assert_eq!(cache.saves(), 1);

        let index = index.read().await;
        assert_eq!(index.ids(), vec!["doc_0", "doc_1"]);
        assert_eq!(index.model(), Some("length:v1"));
    }

    #[tokio::test]
    async fn test_matching_cache_skips_provider() {
        let provider = LengthProvider::new();
        let cache = Arc::new(MemoryEmbeddingCache::new());
        let (pipeline, index) = setup(corpus(), provider.clone(), cache.clone());

        pipeline.run().await.unwrap();
        let report = pipeline.run().await.unwrap();

        assert_eq!(provider.calls(), 2);
        assert_eq!(report.from_cache, 2);
        assert_eq!(report.embedded, 0);
        assert!(!report.cache_written);
        assert_eq!(cache.saves(), 1);
        assert_eq!(index.read().await.len(), 2);
    }

    #[tokio::test]
    async fn test_changed_text_invalidates_cache() {
        let cache = Arc::new(MemoryEmbeddingCache::new());
        let first = LengthProvider::new();
        let (pipeline, _) = setup(corpus(), first, cache.clone());
        pipeline.run().await.unwrap();

        let edited = Arc::new(MemoryReader::new([
            Document::new("doc_0", "Pension contributions are capped at 6% of salary."),
            Document::new("doc_1", "Withdrawals start at 60."),
        ]));
        let second = LengthProvider::new();
        let (pipeline, _) = setup(edited, second.clone(), cache.clone());
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.from_cache, 0);
        assert_eq!(report.embedded, 2);
        assert_eq!(second.calls(), 2);
        assert_eq!(cache.saves(), 2);
    }

    #[tokio::test]
    async fn test_other_model_invalidates_cache() {
        let cache = Arc::new(MemoryEmbeddingCache::new());
        let (pipeline, _) = setup(corpus(), LengthProvider::new(), cache.clone());
        pipeline.run().await.unwrap();

        let upgraded = LengthProvider::with_model("v2");
        let (pipeline, index) = setup(corpus(), upgraded.clone(), cache);
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.from_cache, 0);
        assert_eq!(upgraded.calls(), 2);
        assert_eq!(index.read().await.model(), Some("length:v2"));
    }

    #[tokio::test]
    async fn test_embedding_failure_leaves_document_out() {
        let reader = Arc::new(MemoryReader::new([
            Document::new("doc_0", "Pension contributions are capped at 5% of salary."),
            Document::new("doc_1", "corrupt upload"),
            Document::new("doc_2", "Withdrawals start at 60."),
        ]));
        let provider = LengthProvider::new();
        let cache = Arc::new(MemoryEmbeddingCache::new());
        let (pipeline, index) = setup(reader, provider.clone(), cache.clone());

        let report = pipeline.run().await.unwrap();
        assert_eq!(report.missing, vec!["doc_1".to_string()]);
        assert_eq!(report.embedded, 2);
        assert_eq!(report.indexed, 2);
        assert_eq!(index.read().await.ids(), vec!["doc_0", "doc_2"]);

        // The partial snapshot does not cover doc_1, so the next run recomputes.
        pipeline.run().await.unwrap();
        assert_eq!(provider.calls(), 6);
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_not_fatal() {
        let (pipeline, index) = setup(corpus(), LengthProvider::new(), Arc::new(BrokenCache));

        let report = pipeline.run().await.unwrap();
        assert!(!report.cache_written);
        assert_eq!(report.indexed, 2);
        assert_eq!(index.read().await.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_cache_is_cold_start() {
        let provider = LengthProvider::new();
        let cache = Arc::new(MemoryEmbeddingCache::with_raw("{not json"));
        let (pipeline, _) = setup(corpus(), provider.clone(), cache);

        let report = pipeline.run().await.unwrap();
        assert_eq!(report.embedded, 2);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_ids_keep_first() {
        let reader = Arc::new(MemoryReader::new([
            Document::new("doc_0", "first"),
            Document::new("doc_0", "second"),
        ]));
        let (pipeline, index) = setup(
            reader,
            LengthProvider::new(),
            Arc::new(MemoryEmbeddingCache::new()),
        );

        let report = pipeline.run().await.unwrap();
        assert_eq!(report.duplicate_ids, vec!["doc_0".to_string()]);
        assert_eq!(report.indexed, 1);
        assert_eq!(
            index.read().await.get("doc_0").map(|e| e.text.as_str()),
            Some("first")
        );
    }

    #[tokio::test]
    async fn test_unreadable_corpus_is_fatal_and_keeps_index() {
        let provider = LengthProvider::new();
        let (pipeline, index) = setup(
            corpus(),
            provider.clone(),
            Arc::new(MemoryEmbeddingCache::new()),
        );
        pipeline.run().await.unwrap();

        let broken = IngestionPipeline::new(
            Arc::new(MissingCorpus),
            provider,
            Arc::new(MemoryEmbeddingCache::new()),
            index.clone(),
            "missing",
        );
        assert!(matches!(
            broken.run().await,
            Err(IngestError::Corpus(ReaderError::LocationNotFound(_)))
        ));
        assert_eq!(index.read().await.len(), 2);
    }

    #[tokio::test]
    async fn test_reingest_replaces_removed_documents() {
        let provider = LengthProvider::new();
        let cache = Arc::new(MemoryEmbeddingCache::new());
        let (pipeline, index) = setup(corpus(), provider.clone(), cache.clone());
        pipeline.run().await.unwrap();

        let smaller = IngestionPipeline::new(
            Arc::new(MemoryReader::new([Document::new("doc_1", "Withdrawals start at 60.")])),
            provider,
            cache,
            index.clone(),
            "word",
        );
        smaller.run().await.unwrap();
        assert_eq!(index.read().await.ids(), vec!["doc_1"]);
    }

    #[tokio::test]
    async fn test_unusable_vectors_are_missing_not_fatal() {
        let reader = Arc::new(MemoryReader::new([
            Document::new("doc_0", "hollow response"),
            Document::new("doc_1", "Withdrawals start at 60."),
            Document::new("doc_2", "overflow response"),
            Document::new("doc_3", "Pension contributions are capped at 5% of salary."),
        ]));
        let cache = Arc::new(MemoryEmbeddingCache::new());
        let (pipeline, index) = setup(reader, SizedProvider::new(None), cache);

        let report = pipeline.run().await.unwrap();
        assert_eq!(report.missing, vec!["doc_0".to_string(), "doc_2".to_string()]);
        assert_eq!(report.embedded, 2);
        assert_eq!(report.indexed, 2);

        let index = index.read().await;
        assert_eq!(index.ids(), vec!["doc_1", "doc_3"]);
        assert_eq!(index.dimension(), Some(2));
    }

    #[tokio::test]
    async fn test_configured_dimension_change_invalidates_cache() {
        let cache = Arc::new(MemoryEmbeddingCache::new());
        let (pipeline, _) = setup(corpus(), SizedProvider::new(Some(3)), cache.clone());
        pipeline.run().await.unwrap();

        let resized = SizedProvider::new(Some(2));
        let (pipeline, index) = setup(corpus(), resized.clone(), cache);
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.from_cache, 0);
        assert_eq!(report.embedded, 2);
        assert_eq!(resized.calls.load(Ordering::SeqCst), 2);
        let index = index.read().await;
        assert_eq!(index.dimension(), Some(2));
        assert_eq!(index.model(), Some("sized:v1@2"));
    }

    #[tokio::test]
    async fn test_snapshot_of_other_dimension_is_not_reused() {
        // Same model id, but the stored vectors are narrower than configured.
        let mut snapshot = CacheSnapshot::new("sized:v1@3");
        snapshot.insert(
            "doc_0",
            "Pension contributions are capped at 5% of salary.",
            vec![1.0, 0.0],
        );
        snapshot.insert("doc_1", "Withdrawals start at 60.", vec![0.0, 1.0]);
        let cache = Arc::new(MemoryEmbeddingCache::new());
        cache.save_all(&snapshot).await.unwrap();

        let provider = SizedProvider::new(Some(3));
        let (pipeline, index) = setup(corpus(), provider.clone(), cache);
        let report = pipeline.run().await.unwrap();

        assert_eq!(report.from_cache, 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(index.read().await.dimension(), Some(3));
    }
}
