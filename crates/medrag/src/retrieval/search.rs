//! Question-time retrieval

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;
use crate::types::RetrievalResult;

use super::index::VectorIndex;

/// Embeds questions and looks them up in a built index
///
/// The embedder must be the one the index was built with.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<VectorIndex>) -> Self {
        Self { embedder, index }
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// The `k` chunks most relevant to `question`
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<RetrievalResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidArgument("question is empty".into()));
        }

        let query = self.embedder.embed(question).await?;
        let result = self.index.query(&query, k)?;

        tracing::debug!(
            "Retrieved {} chunks for question (top score {:.3})",
            result.len(),
            result.scores().first().copied().unwrap_or(0.0)
        );

        Ok(result)
    }
}
