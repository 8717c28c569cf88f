//! Embedding provider trait for generating text embeddings

use async_trait::async_trait;

use crate::error::Result;

/// Trait for generating text embeddings
///
/// Implementations:
/// - `OllamaEmbedder`: Local Ollama server (all-minilm)
/// - `HashingEmbedder`: Deterministic offline embedder
///
/// Implementations are assumed deterministic per model version; the
/// embedding cache relies on it.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embedding dimensions, if known before the first call
    fn dimensions(&self) -> Option<usize>;

    /// Check if the provider is healthy and available
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Model identifier; cached vectors are only reused for the same model
    fn model(&self) -> &str;
}
