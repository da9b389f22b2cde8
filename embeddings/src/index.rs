//! Vector index for nearest-neighbour lookups over document embeddings.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Embedding;
use crate::error::IndexError;
use crate::similarity::{dot, normalize, rank_order};

/// An entry in the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Document id.
    pub id: String,

    /// Document text.
    pub text: String,

    /// The embedding vector (normalized).
    pub embedding: Embedding,
}

/// A document returned by a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    /// Document id.
    pub id: String,

    /// Document text.
    pub text: String,

    /// Cosine similarity to the query.
    pub score: f32,
}

/// Ranked hits for one query, ordered by descending similarity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    hits: Vec<ScoredDocument>,
}

impl RetrievalResult {
    /// A result with no hits.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a result from hits that are already ranked.
    pub fn from_ranked(hits: Vec<ScoredDocument>) -> Self {
        Self { hits }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn hits(&self) -> &[ScoredDocument] {
        &self.hits
    }

    /// Best hit, if any.
    pub fn top(&self) -> Option<&ScoredDocument> {
        self.hits.first()
    }

    pub fn into_hits(self) -> Vec<ScoredDocument> {
        self.hits
    }
}

/// In-memory exact cosine index.
///
/// Entries are kept in id order so iteration, and therefore tie-breaking, is
/// deterministic. All entries share one dimensionality, fixed by the first
/// successful upsert. The index can be tagged with the model id of the
/// provider that produced its vectors.
#[derive(Debug, Default)]
pub struct VectorIndex {
    /// Stored entries.
    entries: BTreeMap<String, IndexEntry>,

    /// Dimension of stored embeddings, once known.
    dimension: Option<usize>,

    /// Model id of the provider that produced the stored embeddings.
    model: Option<String>,
}

impl VectorIndex {
    /// Create an empty, untagged index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty index for embeddings produced by `model`.
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::default()
        }
    }

    /// Model id this index was built for.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Dimension of the stored embeddings.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Insert or replace documents.
    ///
    /// The three sequences are positionally aligned. The whole batch is
    /// validated before anything is written, so a rejected batch leaves the
    /// index unchanged.
    pub fn upsert(
        &mut self,
        ids: Vec<String>,
        texts: Vec<String>,
        embeddings: Vec<Embedding>,
    ) -> Result<usize, IndexError> {
        if ids.len() != texts.len() || ids.len() != embeddings.len() {
            return Err(IndexError::LengthMismatch {
                ids: ids.len(),
                texts: texts.len(),
                embeddings: embeddings.len(),
            });
        }

        let mut dimension = self.dimension;
        let mut seen = HashSet::with_capacity(ids.len());
        for (id, embedding) in ids.iter().zip(embeddings.iter()) {
            if embedding.is_empty() {
                return Err(IndexError::EmptyEmbedding(id.clone()));
            }
            match dimension {
                Some(expected) if expected != embedding.len() => {
                    return Err(IndexError::DimensionMismatch {
                        expected,
                        actual: embedding.len(),
                    });
                }
                Some(_) => {}
                None => dimension = Some(embedding.len()),
            }
            if !seen.insert(id.as_str()) {
                return Err(IndexError::DuplicateId(id.clone()));
            }
        }

        let count = ids.len();
        for ((id, text), mut embedding) in ids.into_iter().zip(texts).zip(embeddings) {
            normalize(&mut embedding);
            debug!("Upserting document into index: {id}");
            self.entries.insert(
                id.clone(),
                IndexEntry {
                    id,
                    text,
                    embedding,
                },
            );
        }
        self.dimension = dimension;

        info!("Upserted {count} documents, index now holds {}", self.len());
        Ok(count)
    }

    /// Return the `k` most similar documents to `embedding`.
    ///
    /// An empty index yields an empty result rather than an error.
    pub fn query(&self, embedding: &[f32], k: usize) -> Result<RetrievalResult, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidK);
        }
        let Some(dimension) = self.dimension else {
            return Ok(RetrievalResult::empty());
        };
        if self.entries.is_empty() {
            return Ok(RetrievalResult::empty());
        }
        if embedding.len() != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: embedding.len(),
            });
        }

        let mut query = embedding.to_vec();
        normalize(&mut query);

        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .values()
            .map(|entry| (dot(&query, &entry.embedding).clamp(-1.0, 1.0), entry))
            .collect();
        scored.sort_by(|a, b| rank_order((a.0, &a.1.id), (b.0, &b.1.id)));
        scored.truncate(k);

        let hits = scored
            .into_iter()
            .map(|(score, entry)| ScoredDocument {
                id: entry.id.clone(),
                text: entry.text.clone(),
                score,
            })
            .collect();

        Ok(RetrievalResult::from_ranked(hits))
    }

    /// Get an entry by id.
    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    /// Check if an id exists in the index.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Get the number of entries in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All ids, in ascending order.
    pub fn ids(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Remove every entry. The model tag is kept, the dimension is reset.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.dimension = None;
        info!("Cleared vector index");
    }
}
