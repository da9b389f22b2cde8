//! Query-time retrieval.

use std::sync::Arc;

use docqa_embeddings::{EmbeddingProvider, RetrievalResult};
use tracing::debug;

use crate::SharedIndex;
use crate::error::{Result, RetrievalError};

/// Default number of documents retrieved per query.
pub const DEFAULT_TOP_K: usize = 5;

/// Embeds a question and looks up its nearest documents.
///
/// Results are returned unfiltered; relevance thresholds belong to the
/// [`AnswerSynthesizer`](crate::AnswerSynthesizer).
#[derive(Clone)]
pub struct RetrievalQueryPipeline {
    provider: Arc<dyn EmbeddingProvider>,
    index: SharedIndex,
}

impl RetrievalQueryPipeline {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, index: SharedIndex) -> Self {
        Self { provider, index }
    }

    /// Retrieve up to `k` documents for `query`, most similar first.
    ///
    /// An empty index yields an empty result without embedding the query.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        let provider_model = self.provider.model_id();

        // Not held across the embedding call.
        {
            let index = self.index.read().await;
            check_model(index.model(), &provider_model)?;
            if index.is_empty() {
                debug!("Index is empty, nothing to retrieve");
                return Ok(RetrievalResult::empty());
            }
        }

        let embedding = self.provider.embed(query).await?;

        // The index may have been swapped while embedding.
        let index = self.index.read().await;
        check_model(index.model(), &provider_model)?;
        let result = index.query(&embedding, k)?;
        debug!("Retrieved {} documents", result.len());
        Ok(result)
    }
}

fn check_model(index_model: Option<&str>, provider_model: &str) -> Result<()> {
    match index_model {
        Some(index_model) if index_model != provider_model => Err(RetrievalError::ModelMismatch {
            index: index_model.to_string(),
            provider: provider_model.to_string(),
        }),
        _ => Ok(()),
    }
}
