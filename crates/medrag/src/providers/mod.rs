//! Capability providers for embeddings and answer generation
//!
//! The pipeline only depends on the traits; Ollama and the offline hashing
//! embedder are the bundled backends.

pub mod embedding;
pub mod hashing;
pub mod llm;
pub mod ollama;
pub mod retry;

pub use embedding::EmbeddingProvider;
pub use hashing::HashingEmbedder;
pub use llm::LlmProvider;
pub use ollama::{OllamaClient, OllamaEmbedder, OllamaLlm};
pub use retry::RetryPolicy;

use std::sync::Arc;

use crate::config::{EmbeddingBackend, RagConfig};
use crate::error::Result;

/// Capability providers selected by configuration
#[derive(Clone)]
pub struct Providers {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub llm: Arc<dyn LlmProvider>,
    pub ollama: Arc<OllamaClient>,
}

impl Providers {
    /// Build the providers. One Ollama client is shared by both capabilities.
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        let ollama = Arc::new(OllamaClient::new(&config.llm)?);

        let embedder: Arc<dyn EmbeddingProvider> = match config.embeddings.provider {
            EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::from_client(
                Arc::clone(&ollama),
                config.embeddings.model.clone(),
            )),
            EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(config.embeddings.dimensions)?),
        };
        let llm: Arc<dyn LlmProvider> = Arc::new(OllamaLlm::from_client(Arc::clone(&ollama), &config.llm));

        tracing::info!(
            "Using {} embeddings ({}) and {} generation ({})",
            embedder.name(),
            embedder.model(),
            llm.name(),
            llm.model()
        );

        Ok(Self {
            embedder,
            llm,
            ollama,
        })
    }

    /// Make sure the Ollama models in use are available locally
    pub async fn ensure_models(&self, config: &RagConfig) -> Result<()> {
        let pull = config.llm.pull_missing_models;
        if config.embeddings.provider == EmbeddingBackend::Ollama {
            self.ollama.ensure_model(&config.embeddings.model, pull).await?;
        }
        self.ollama.ensure_model(&config.llm.generate_model, pull).await
    }
}
