//! Integration tests for the ingest → retrieve → answer flow.
//!
//! The corpus lives in `tests/fixtures/word`. Embeddings come from a small
//! bag-of-words embedder over a fixed vocabulary so scores are predictable,
//! and generation is answered in-process, so no network is involved.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use docqa_embeddings::{Embedding, FileEmbeddingCache, MemoryEmbeddingCache, ProviderError};
use docqa_retrieval::{
    Answer, AskEngine, DurableEmbeddingCache, EmbeddingProvider, GenerationBackend,
    GenerationError, GenerationRequest, REFUSAL_TEXT,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// Get the path to the test corpus.
fn corpus_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/word")
}

/// Three-letter word prefixes, one per dimension.
const VOCABULARY: [&str; 13] = [
    "pen", "con", "cap", "sal", "wit", "acc", "sta", "age", "hel", "ope", "wee", "wea", "tod",
];

/// Bag-of-words embedder over [`VOCABULARY`].
struct VocabularyEmbedder {
    calls: AtomicUsize,
    fail_on: Option<&'static str>,
}

impl VocabularyEmbedder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_on: None,
        })
    }

    /// Fail for any text containing `needle`.
    fn failing_on(needle: &'static str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail_on: Some(needle),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for VocabularyEmbedder {
    fn name(&self) -> &str {
        "vocabulary"
    }

    fn model(&self) -> &str {
        "prefix-3"
    }

    async fn embed(&self, text: &str) -> docqa_embeddings::Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyInput);
        }
        if self.fail_on.is_some_and(|needle| text.contains(needle)) {
            return Err(ProviderError::ApiRequest {
                status: 502,
                message: "bad gateway".to_string(),
            });
        }

        let mut embedding = vec![0.0; VOCABULARY.len()];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() >= 3)
        {
            if let Some(slot) = VOCABULARY.iter().position(|p| word.starts_with(p)) {
                embedding[slot] = 1.0;
            }
        }
        Ok(embedding)
    }
}

/// How the fake generator responds.
enum Reply {
    /// Quote the first context document.
    QuoteContext,
    /// Answer with the refusal sentence.
    Refuse,
    /// Fail like an exhausted quota.
    Fail,
}

struct FakeGenerator {
    reply: Reply,
    calls: AtomicUsize,
}

impl FakeGenerator {
    fn new(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for FakeGenerator {
    fn name(&self) -> &str {
        "fake"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.reply {
            Reply::QuoteContext => Ok(request
                .prompt
                .lines()
                .nth(1)
                .unwrap_or_default()
                .to_string()),
            Reply::Refuse => Ok(format!("\"{REFUSAL_TEXT}\"")),
            Reply::Fail => Err(GenerationError::RateLimited {
                retry_after_secs: 30,
            }),
        }
    }
}

fn engine(
    provider: Arc<VocabularyEmbedder>,
    generator: Arc<FakeGenerator>,
    cache: Arc<dyn DurableEmbeddingCache>,
) -> AskEngine {
    AskEngine::builder()
        .with_corpus_dir(corpus_dir())
        .with_provider(provider)
        .with_generator(generator)
        .with_cache(cache)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_grounded_answer_cites_contribution_cap() {
    let provider = VocabularyEmbedder::new();
    let generator = FakeGenerator::new(Reply::QuoteContext);
    let engine = engine(provider, generator.clone(), Arc::new(MemoryEmbeddingCache::new()));

    let report = engine.ingest().await.unwrap();
    assert_eq!(report.documents_read, 3);
    assert_eq!(report.indexed, 3);
    assert!(report.skipped.is_empty());

    let retrieved = engine.retrieve("What is the contribution cap?").await.unwrap();
    let top = retrieved.top().unwrap();
    assert_eq!(top.id, "doc_0");
    assert!(top.score >= 0.3, "score {} below threshold", top.score);

    let answer = engine.answer("What is the contribution cap?").await;
    assert!(answer.grounded);
    assert!(answer.text.contains("5%"), "answer was {:?}", answer.text);
    assert_eq!(answer.sources, vec!["doc_0".to_string()]);
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_only_relevant_documents_become_context() {
    let generator = FakeGenerator::new(Reply::QuoteContext);
    let engine = engine(
        VocabularyEmbedder::new(),
        generator,
        Arc::new(MemoryEmbeddingCache::new()),
    );
    engine.ingest().await.unwrap();

    let answer = engine
        .answer("When can I start withdrawing from my pension?")
        .await;
    assert_eq!(
        answer,
        Answer::grounded("# Withdrawals", vec!["doc_1".to_string()])
    );
}

#[tokio::test]
async fn test_unrelated_question_is_refused_without_generation() {
    let generator = FakeGenerator::new(Reply::QuoteContext);
    let engine = engine(
        VocabularyEmbedder::new(),
        generator.clone(),
        Arc::new(MemoryEmbeddingCache::new()),
    );
    engine.ingest().await.unwrap();

    let answer = engine.answer("What is the weather today?").await;
    assert_eq!(answer, Answer::refusal());
    assert_eq!(answer.text, REFUSAL_TEXT);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_empty_index_is_refused_without_backend_calls() {
    let provider = VocabularyEmbedder::new();
    let generator = FakeGenerator::new(Reply::QuoteContext);
    let engine = engine(
        provider.clone(),
        generator.clone(),
        Arc::new(MemoryEmbeddingCache::new()),
    );

    assert!(engine.retrieve("What is the contribution cap?").await.unwrap().is_empty());
    assert!(engine.answer("What is the contribution cap?").await.is_refusal());
    assert_eq!(provider.calls(), 0);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_restart_with_file_cache_skips_provider() {
    let temp_dir = TempDir::new().unwrap();
    let cache_path = temp_dir.path().join("cache/embeddings.json");

    let first = VocabularyEmbedder::new();
    let engine_one = engine(
        first.clone(),
        FakeGenerator::new(Reply::QuoteContext),
        Arc::new(FileEmbeddingCache::new(&cache_path)),
    );
    let report = engine_one.ingest().await.unwrap();
    assert_eq!(report.embedded, 3);
    assert!(report.cache_written);
    assert_eq!(first.calls(), 3);
    assert!(cache_path.exists());

    // A second process with the same corpus and model.
    let second = VocabularyEmbedder::new();
    let engine_two = engine(
        second.clone(),
        FakeGenerator::new(Reply::QuoteContext),
        Arc::new(FileEmbeddingCache::new(&cache_path)),
    );
    let report = engine_two.ingest().await.unwrap();
    assert_eq!(report.from_cache, 3);
    assert_eq!(report.embedded, 0);
    assert_eq!(second.calls(), 0);

    let answer = engine_two.answer("What is the contribution cap?").await;
    assert!(answer.grounded);
    assert_eq!(second.calls(), 1);
}

#[tokio::test]
async fn test_failed_document_embedding_is_left_out() {
    let provider = VocabularyEmbedder::failing_on("helpdesk");
    let generator = FakeGenerator::new(Reply::QuoteContext);
    let engine = engine(provider, generator, Arc::new(MemoryEmbeddingCache::new()));

    let report = engine.ingest().await.unwrap();
    assert_eq!(report.missing, vec!["doc_2".to_string()]);
    assert_eq!(report.indexed, 2);

    let answer = engine.answer("What is the contribution cap?").await;
    assert!(answer.grounded);
    assert_eq!(engine.stats().await.documents_indexed, 2);
}

#[tokio::test]
async fn test_generation_failure_degrades_to_refusal() {
    let generator = FakeGenerator::new(Reply::Fail);
    let engine = engine(
        VocabularyEmbedder::new(),
        generator.clone(),
        Arc::new(MemoryEmbeddingCache::new()),
    );
    engine.ingest().await.unwrap();

    let answer = engine.answer("What is the contribution cap?").await;
    assert_eq!(answer, Answer::refusal());
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_backend_refusal_is_not_grounded() {
    let engine = engine(
        VocabularyEmbedder::new(),
        FakeGenerator::new(Reply::Refuse),
        Arc::new(MemoryEmbeddingCache::new()),
    );
    engine.ingest().await.unwrap();

    let answer = engine.answer("What is the contribution cap?").await;
    assert!(!answer.grounded);
    assert!(answer.sources.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_queries_during_reingest_see_a_complete_index() {
    let engine = Arc::new(engine(
        VocabularyEmbedder::new(),
        FakeGenerator::new(Reply::QuoteContext),
        Arc::new(MemoryEmbeddingCache::new()),
    ));
    engine.ingest().await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move { engine.ingest().await.map(|r| r.indexed) }));
    }
    let mut answers = Vec::new();
    for _ in 0..16 {
        let engine = Arc::clone(&engine);
        answers.push(tokio::spawn(async move {
            engine.answer("What is the contribution cap?").await
        }));
    }

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 3);
    }
    for answer in answers {
        let answer = answer.await.unwrap();
        assert!(answer.grounded);
        assert_eq!(answer.sources, vec!["doc_0".to_string()]);
    }
}
