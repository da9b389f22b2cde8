//! Durable embedding cache.
//!
//! The cache persists the document embeddings of one ingestion run as a
//! single snapshot so a restart can skip the embedding backend entirely. It is
//! an optimization, never a source of truth: loading is infallible (a missing
//! or unreadable snapshot is a cold start) and writes replace the whole
//! snapshot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::Embedding;
use crate::error::CacheError;

/// One cached document embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// SHA-256 of the document text the embedding was computed from.
    pub content_hash: String,

    /// The embedding vector.
    pub embedding: Embedding,
}

/// Everything one ingestion run wrote to the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    /// Model id of the provider that produced every entry.
    pub model: String,

    /// Shared dimension of every entry (0 while empty).
    pub dimension: usize,

    /// When the snapshot was written.
    pub saved_at: DateTime<Utc>,

    /// Entries keyed by document id.
    pub entries: BTreeMap<String, CacheEntry>,
}

impl CacheSnapshot {
    /// Create an empty snapshot for `model`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            dimension: 0,
            saved_at: Utc::now(),
            entries: BTreeMap::new(),
        }
    }

    /// Hash used to detect a document whose text changed under the same id.
    pub fn content_hash(text: &str) -> String {
        let digest = Sha256::digest(text.as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Record the embedding computed for document `id` with contents `text`.
    pub fn insert(&mut self, id: impl Into<String>, text: &str, embedding: Embedding) {
        if self.entries.is_empty() {
            self.dimension = embedding.len();
        }
        self.entries.insert(
            id.into(),
            CacheEntry {
                content_hash: Self::content_hash(text),
                embedding,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached embedding for `id`, if the stored hash matches `text`.
    pub fn lookup(&self, id: &str, text: &str) -> Option<&Embedding> {
        self.entries
            .get(id)
            .filter(|entry| entry.content_hash == Self::content_hash(text))
            .map(|entry| &entry.embedding)
    }

    /// Check the snapshot's internal invariants: every vector is non-empty
    /// and shares the recorded dimension.
    pub fn is_consistent(&self) -> bool {
        if self.entries.is_empty() {
            return true;
        }
        self.dimension > 0
            && self
                .entries
                .values()
                .all(|entry| entry.embedding.len() == self.dimension)
    }

    /// Why this snapshot cannot serve `documents` under `model`, if it can't.
    ///
    /// The snapshot is usable only when it was produced by the same model,
    /// is internally consistent, matches `dimension` when the provider fixes
    /// one, and holds an up-to-date entry for exactly the current set of
    /// document ids.
    pub fn staleness<'a>(
        &self,
        model: &str,
        dimension: Option<usize>,
        documents: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Option<String> {
        if self.model != model {
            return Some(format!("model changed from {} to {model}", self.model));
        }
        if let Some(expected) = dimension.filter(|&d| !self.is_empty() && self.dimension != d) {
            return Some(format!(
                "dimension changed from {} to {expected}",
                self.dimension
            ));
        }
        if !self.is_consistent() {
            return Some("inconsistent embedding dimensions".to_string());
        }

        let mut current = 0;
        for (id, text) in documents {
            current += 1;
            if self.lookup(id, text).is_none() {
                return Some(format!("no up-to-date entry for {id}"));
            }
        }
        if current != self.entries.len() {
            return Some(format!(
                "cache holds {} entries for {current} documents",
                self.entries.len()
            ));
        }
        None
    }
}

/// Best-effort persistence for document embeddings.
#[async_trait]
pub trait DurableEmbeddingCache: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Load the stored snapshot.
    ///
    /// Returns `None` when the store is empty, unreachable or holds
    /// something unreadable; the failure is logged, never raised.
    async fn load_all(&self) -> Option<CacheSnapshot>;

    /// Replace the stored snapshot with `snapshot`.
    async fn save_all(&self, snapshot: &CacheSnapshot) -> Result<(), CacheError>;
}

fn decode_snapshot(raw: &[u8], source: &str) -> Option<CacheSnapshot> {
    match serde_json::from_slice::<CacheSnapshot>(raw) {
        Ok(snapshot) if snapshot.is_consistent() => {
            debug!(
                "Decoded cache snapshot from {source} with {} entries",
                snapshot.len()
            );
            Some(snapshot)
        }
        Ok(_) => {
            warn!("Ignoring cache snapshot from {source}: inconsistent dimensions");
            None
        }
        Err(e) => {
            warn!("Ignoring malformed cache snapshot from {source}: {e}");
            None
        }
    }
}

/// Cache that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl DurableEmbeddingCache for NoopCache {
    fn name(&self) -> &str {
        "none"
    }

    async fn load_all(&self) -> Option<CacheSnapshot> {
        None
    }

    async fn save_all(&self, _snapshot: &CacheSnapshot) -> Result<(), CacheError> {
        Ok(())
    }
}

/// In-process cache holding the serialized snapshot.
///
/// Serializing on save keeps the round trip honest: what comes back from
/// `load_all` went through the same encoding as the durable backends.
#[derive(Debug, Default)]
pub struct MemoryEmbeddingCache {
    blob: RwLock<Option<Vec<u8>>>,
    loads: AtomicUsize,
    saves: AtomicUsize,
}

impl MemoryEmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with raw bytes in the store, e.g. a corrupted blob.
    pub fn with_raw(raw: impl Into<Vec<u8>>) -> Self {
        Self {
            blob: RwLock::new(Some(raw.into())),
            ..Self::default()
        }
    }

    /// Number of `load_all` calls so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of `save_all` calls so far.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DurableEmbeddingCache for MemoryEmbeddingCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load_all(&self) -> Option<CacheSnapshot> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let blob = self.blob.read().await;
        blob.as_deref().and_then(|raw| decode_snapshot(raw, "memory"))
    }

    async fn save_all(&self, snapshot: &CacheSnapshot) -> Result<(), CacheError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        let raw = serde_json::to_vec(snapshot)?;
        *self.blob.write().await = Some(raw);
        Ok(())
    }
}

/// Cache persisted as a JSON file on local disk.
#[derive(Debug, Clone)]
pub struct FileEmbeddingCache {
    path: PathBuf,
}

impl FileEmbeddingCache {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl DurableEmbeddingCache for FileEmbeddingCache {
    fn name(&self) -> &str {
        "file"
    }

    async fn load_all(&self) -> Option<CacheSnapshot> {
        let source = self.path.display().to_string();
        match fs::read(&self.path).await {
            Ok(raw) => decode_snapshot(&raw, &source),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No embedding cache at {source}, cold start");
                None
            }
            Err(e) => {
                warn!("Failed to read embedding cache {source}: {e}");
                None
            }
        }
    }

    async fn save_all(&self, snapshot: &CacheSnapshot) -> Result<(), CacheError> {
        let content = serde_json::to_vec(snapshot)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        // Write beside the target and rename so readers never see a torn file.
        let staging = self.staging_path();
        fs::write(&staging, content).await?;
        fs::rename(&staging, &self.path).await?;

        debug!(
            "Saved {} cache entries to {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Cache stored as a single JSON blob behind an HTTP URL.
///
/// `GET` reads the whole blob and `PUT` replaces it. A 404 is a cold start.
pub struct HttpBlobCache {
    url: String,
    token: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpBlobCache {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, &self.url)
            .timeout(self.timeout);
        match self.token {
            Some(ref token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl DurableEmbeddingCache for HttpBlobCache {
    fn name(&self) -> &str {
        "http"
    }

    async fn load_all(&self) -> Option<CacheSnapshot> {
        let response = match self.request(reqwest::Method::GET).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Embedding cache at {} unreachable: {e}", self.url);
                return None;
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            info!("No embedding cache at {}, cold start", self.url);
            return None;
        }
        if !status.is_success() {
            warn!("Embedding cache at {} returned {status}", self.url);
            return None;
        }

        match response.bytes().await {
            Ok(raw) => decode_snapshot(&raw, &self.url),
            Err(e) => {
                warn!("Failed to read embedding cache body from {}: {e}", self.url);
                None
            }
        }
    }

    async fn save_all(&self, snapshot: &CacheSnapshot) -> Result<(), CacheError> {
        let body = serde_json::to_vec(snapshot)?;
        let response = self
            .request(reqwest::Method::PUT)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CacheError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        debug!("Saved {} cache entries to {}", snapshot.len(), self.url);
        Ok(())
    }
}
