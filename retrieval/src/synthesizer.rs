//! Grounded answer synthesis and the refusal policy.

use std::sync::Arc;

use docqa_embeddings::{RetrievalResult, ScoredDocument};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::GenerationError;
use crate::generation::{GenerationBackend, GenerationRequest};

/// The fixed answer given when the corpus cannot answer a question.
pub const REFUSAL_TEXT: &str = "Unfortunately, I don't have the answer in my database.";

/// Default minimum cosine similarity for a document to be used as context.
pub const DEFAULT_MIN_RELEVANCE: f32 = 0.3;

/// Default assistant persona used in the system instruction.
pub const DEFAULT_ASSISTANT_ROLE: &str = "a helpdesk assistant for pension savings";

/// Answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// Answer text, or [`REFUSAL_TEXT`].
    pub text: String,

    /// `false` marks the refusal sentinel.
    pub grounded: bool,

    /// Ids of the documents given to the backend as context.
    pub sources: Vec<String>,
}

impl Answer {
    /// The refusal sentinel.
    pub fn refusal() -> Self {
        Self {
            text: REFUSAL_TEXT.to_string(),
            grounded: false,
            sources: Vec::new(),
        }
    }

    pub fn grounded(text: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            text: text.into(),
            grounded: true,
            sources,
        }
    }

    pub fn is_refusal(&self) -> bool {
        !self.grounded
    }
}

/// Whether generated `text` is the backend's own version of the refusal.
pub fn is_refusal_text(text: &str) -> bool {
    let normalized = text
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '\u{201c}' | '\u{201d}' | '`'))
        .replace('\u{2019}', "'")
        .to_lowercase();
    let sentence = REFUSAL_TEXT.trim_end_matches('.').to_lowercase();
    normalized.contains(&sentence)
}

/// Turns retrieved documents into a grounded [`Answer`], or refuses.
pub struct AnswerSynthesizer {
    backend: Arc<dyn GenerationBackend>,
    min_relevance: f32,
    assistant_role: String,
}

impl AnswerSynthesizer {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            min_relevance: DEFAULT_MIN_RELEVANCE,
            assistant_role: DEFAULT_ASSISTANT_ROLE.to_string(),
        }
    }

    /// Documents scoring below `min_relevance` are never used as context.
    pub fn with_min_relevance(mut self, min_relevance: f32) -> Self {
        self.min_relevance = min_relevance;
        self
    }

    pub fn with_assistant_role(mut self, role: impl Into<String>) -> Self {
        self.assistant_role = role.into();
        self
    }

    pub fn min_relevance(&self) -> f32 {
        self.min_relevance
    }

    /// Answer `query` from `retrieved`, degrading to the refusal on any
    /// generation failure.
    pub async fn synthesize(&self, query: &str, retrieved: &RetrievalResult) -> Answer {
        match self.try_synthesize(query, retrieved).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("Answer generation failed, refusing: {e}");
                Answer::refusal()
            }
        }
    }

    /// Like [`synthesize`](Self::synthesize), but surfaces backend failures.
    pub async fn try_synthesize(
        &self,
        query: &str,
        retrieved: &RetrievalResult,
    ) -> Result<Answer, GenerationError> {
        if retrieved.is_empty() {
            info!("Refusing: no documents retrieved");
            return Ok(Answer::refusal());
        }

        let context: Vec<&ScoredDocument> = retrieved
            .hits()
            .iter()
            .filter(|hit| hit.score >= self.min_relevance)
            .collect();
        if context.is_empty() {
            let best = retrieved.top().map(|hit| hit.score).unwrap_or_default();
            info!(
                "Refusing: best score {best:.3} is below the relevance threshold {:.3}",
                self.min_relevance
            );
            return Ok(Answer::refusal());
        }

        debug!("Synthesizing answer from {} documents", context.len());
        let request = self.build_request(query, &context);
        let text = self.backend.generate(&request).await?;

        if is_refusal_text(&text) {
            info!("Refusing: generation backend found no answer in the context");
            return Ok(Answer::refusal());
        }

        let sources = context.iter().map(|hit| hit.id.clone()).collect();
        Ok(Answer::grounded(text, sources))
    }

    fn build_request(&self, query: &str, context: &[&ScoredDocument]) -> GenerationRequest {
        let system = format!(
            "You are {}. Answer only on the basis of the documents provided by the user. \
             If the documents do not contain the answer, reply exactly: '{REFUSAL_TEXT}'",
            self.assistant_role
        );
        let documents = context
            .iter()
            .map(|hit| hit.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = format!("Document context:\n{documents}\n\nQuestion: {query}\nAnswer:");
        GenerationRequest::new(system, prompt)
    }
}
